//! Leaderboard aggregation over block history and balances.
//!
//! Statistics are derived by folding the append-only history, so they are
//! recomputed rather than incrementally maintained. The fold is cached and
//! invalidated on `(current_block, balances hash)` changes, with a short TTL
//! as a safety net against hash collisions or missed invalidation.

use crate::ledger::Ledger;
use glyphmine_types::{RoundState, Symbol, UserId};
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;
use twox_hash::XxHash64;

/// Cache lifetime safety net.
const CACHE_TTL_MS: u64 = 30_000;
/// Entries shown on the public board.
pub const TOP_N: usize = 10;

/// Per-user derived statistics.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: UserId,
    pub balance: u64,
    /// How often each rune was picked.
    pub picks: BTreeMap<Symbol, u64>,
    pub exact_matches: u64,
    pub total_participations: u64,
    pub last_participation_at: Option<u64>,
    pub most_picked: Option<Symbol>,
}

/// Fold history + balances into ranked per-user statistics.
///
/// Every user seen in history, holding a balance, or holding an in-flight
/// choice gets a row. Sorted by exact matches, then balance, both
/// descending (user id as the final tiebreak for determinism).
pub fn compute_stats(state: &RoundState, ledger: &Ledger) -> Vec<UserStats> {
    let mut stats: BTreeMap<UserId, UserStats> = BTreeMap::new();

    let mut ensure = |stats: &mut BTreeMap<UserId, UserStats>, user: &str| {
        if !stats.contains_key(user) {
            stats.insert(
                user.to_string(),
                UserStats {
                    user_id: user.to_string(),
                    balance: ledger.get(user),
                    picks: BTreeMap::new(),
                    exact_matches: 0,
                    total_participations: 0,
                    last_participation_at: None,
                    most_picked: None,
                },
            );
        }
    };

    for record in &state.block_history {
        for result in &record.member_results {
            ensure(&mut stats, &result.user_id);
            let entry = stats.get_mut(&result.user_id).expect("just ensured");
            *entry.picks.entry(result.choice).or_insert(0) += 1;
            if result.distance == 0 {
                entry.exact_matches += 1;
            }
            entry.total_participations += 1;
            if entry.last_participation_at.is_none_or(|t| record.timestamp > t) {
                entry.last_participation_at = Some(record.timestamp);
            }
        }
    }

    for user in ledger.users() {
        ensure(&mut stats, user);
    }
    for user in state.current_choices.keys() {
        ensure(&mut stats, user);
    }

    let mut rows: Vec<UserStats> = stats
        .into_values()
        .map(|mut entry| {
            entry.most_picked = entry
                .picks
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(symbol, _)| *symbol);
            entry
        })
        .collect();

    rows.sort_by(|a, b| {
        b.exact_matches
            .cmp(&a.exact_matches)
            .then_with(|| b.balance.cmp(&a.balance))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    rows
}

/// The public view: top entries plus the requester's own rank when they fall
/// outside the top.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardView {
    pub top: Vec<UserStats>,
    /// `(rank, stats)` for a requester not already shown in `top`.
    pub requester: Option<(usize, UserStats)>,
}

pub fn view_for(stats: &[UserStats], requester: Option<&str>) -> LeaderboardView {
    let top: Vec<UserStats> = stats.iter().take(TOP_N).cloned().collect();
    let requester = requester.and_then(|user| {
        let position = stats.iter().position(|entry| entry.user_id == user)?;
        if position < TOP_N {
            return None;
        }
        Some((position + 1, stats[position].clone()))
    });
    LeaderboardView { top, requester }
}

fn balances_hash(ledger: &Ledger) -> u64 {
    let json = serde_json::to_vec(ledger.balances()).unwrap_or_default();
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(&json);
    hasher.finish()
}

struct CacheEntry {
    stats: Arc<Vec<UserStats>>,
    block: u64,
    balances_hash: u64,
    expires_at: u64,
}

/// Keyed, time-boxed cache around [`compute_stats`].
#[derive(Default)]
pub struct LeaderboardCache {
    entry: Option<CacheEntry>,
}

impl LeaderboardCache {
    /// Return cached statistics while `(block, balances)` are unchanged and
    /// the TTL has not lapsed; recompute otherwise.
    pub fn get_or_compute(
        &mut self,
        state: &RoundState,
        ledger: &Ledger,
        now_ms: u64,
    ) -> Arc<Vec<UserStats>> {
        let hash = balances_hash(ledger);
        if let Some(entry) = &self.entry {
            if entry.block == state.current_block
                && entry.balances_hash == hash
                && entry.expires_at > now_ms
            {
                return Arc::clone(&entry.stats);
            }
        }

        let stats = Arc::new(compute_stats(state, ledger));
        self.entry = Some(CacheEntry {
            stats: Arc::clone(&stats),
            block: state.current_block,
            balances_hash: hash,
            expires_at: now_ms + CACHE_TTL_MS,
        });
        stats
    }

    /// Drop the cached fold (admin resets).
    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphmine_types::{BlockRecord, MemberResult};

    fn symbol(index: usize) -> Symbol {
        Symbol::from_index(index).unwrap()
    }

    fn record(block: u64, ts: u64, results: Vec<(&str, usize, u64, u32)>) -> BlockRecord {
        BlockRecord {
            block_number: block,
            system_choice: symbol(0),
            timestamp: ts,
            member_results: results
                .into_iter()
                .map(|(user, choice, reward, distance)| MemberResult {
                    user_id: user.to_string(),
                    choice: symbol(choice),
                    reward,
                    distance,
                })
                .collect(),
        }
    }

    fn fixture() -> (RoundState, Ledger) {
        let mut state = RoundState::default();
        let mut ledger = Ledger::default();
        ledger.set("alice", 500);
        ledger.set("bob", 900);
        ledger.set("carol", 100);

        state.block_history.push(record(
            1,
            1_000,
            vec![("alice", 0, 950, 0), ("bob", 3, 700, 3)],
        ));
        state.block_history.push(record(
            2,
            2_000,
            vec![("alice", 0, 980, 0), ("bob", 0, 960, 0), ("carol", 7, 400, 7)],
        ));
        (state, ledger)
    }

    #[test]
    fn test_sorting_by_exact_matches_then_balance() {
        let (state, ledger) = fixture();
        let stats = compute_stats(&state, &ledger);

        // alice: 2 exact matches; bob: 1; carol: 0.
        assert_eq!(stats[0].user_id, "alice");
        assert_eq!(stats[1].user_id, "bob");
        assert_eq!(stats[2].user_id, "carol");
        assert_eq!(stats[0].exact_matches, 2);
        assert_eq!(stats[0].total_participations, 2);
        assert_eq!(stats[0].last_participation_at, Some(2_000));
    }

    #[test]
    fn test_most_picked_histogram() {
        let (state, ledger) = fixture();
        let stats = compute_stats(&state, &ledger);
        let alice = stats.iter().find(|s| s.user_id == "alice").unwrap();
        assert_eq!(alice.most_picked, Some(symbol(0)));
        assert_eq!(alice.picks[&symbol(0)], 2);

        let bob = stats.iter().find(|s| s.user_id == "bob").unwrap();
        assert_eq!(bob.total_participations, 2);
        assert_eq!(bob.picks.len(), 2);
    }

    #[test]
    fn test_balance_only_users_appear() {
        let mut state = RoundState::default();
        let mut ledger = Ledger::default();
        ledger.set("lurker", 50);
        state
            .current_choices
            .insert("chooser".to_string(), symbol(1));

        let stats = compute_stats(&state, &ledger);
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.total_participations == 0));
    }

    #[test]
    fn test_view_includes_out_of_top_requester() {
        let state = RoundState::default();
        let mut ledger = Ledger::default();
        // Twelve users with descending balances, no history.
        for i in 0..12u64 {
            ledger.set(&format!("user-{i:02}"), 1_000 - i * 10);
        }
        let stats = compute_stats(&state, &ledger);

        let view = view_for(&stats, Some("user-11"));
        assert_eq!(view.top.len(), TOP_N);
        let (rank, entry) = view.requester.unwrap();
        assert_eq!(rank, 12);
        assert_eq!(entry.user_id, "user-11");

        // A requester inside the top is not duplicated.
        let view = view_for(&stats, Some("user-00"));
        assert!(view.requester.is_none());
    }

    #[test]
    fn test_cache_hits_until_block_or_balances_change() {
        let (mut state, mut ledger) = fixture();
        let mut cache = LeaderboardCache::default();

        let first = cache.get_or_compute(&state, &ledger, 0);
        let second = cache.get_or_compute(&state, &ledger, 1_000);
        assert!(Arc::ptr_eq(&first, &second));

        // Block advance invalidates.
        state.current_block += 1;
        let third = cache.get_or_compute(&state, &ledger, 2_000);
        assert!(!Arc::ptr_eq(&second, &third));

        // Balance change invalidates.
        ledger.credit("alice", 1);
        let fourth = cache.get_or_compute(&state, &ledger, 3_000);
        assert!(!Arc::ptr_eq(&third, &fourth));

        // TTL lapse recomputes even with identical inputs.
        let fifth = cache.get_or_compute(&state, &ledger, 3_000 + CACHE_TTL_MS);
        assert!(!Arc::ptr_eq(&fourth, &fifth));
    }
}
