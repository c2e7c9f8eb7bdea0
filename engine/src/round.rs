//! Round state machine for the block/reward cycle.
//!
//! This module provides the deterministic round logic separately from
//! storage and scheduling concerns. A round has a single state:
//!
//! 1. **Open** - players record (and re-record) their rune choice
//! 2. **Resolving** - the deadline passed; payouts are computed, one
//!    `BlockRecord` is appended, the block counter advances, choices clear
//!
//! The async facade drives these functions from a fixed tick and holds the
//! [`RoundPhase`] guard; everything here takes `now_ms` and an injected RNG
//! so behavior is reproducible in tests.

use crate::ledger::Ledger;
use crate::reward;
use glyphmine_types::{BlockRecord, GameError, MemberResult, Result, RoundState, Symbol};
use rand::Rng;

/// Resolution guard: a tick that observes `Resolving` is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RoundPhase {
    #[default]
    Open,
    Resolving,
}

/// Milliseconds until the current block's deadline.
pub fn time_left_ms(state: &RoundState, now_ms: u64) -> u64 {
    state.next_block_at.saturating_sub(now_ms)
}

/// Whether the current block's deadline has passed.
pub fn tick_due(state: &RoundState, now_ms: u64) -> bool {
    now_ms >= state.next_block_at
}

/// Record (or overwrite) a player's rune for the current round.
///
/// Last write wins; players may re-pick until the round resolves.
pub fn record_choice(state: &mut RoundState, user: &str, choice: Symbol) {
    state.current_choices.insert(user.to_string(), choice);
}

/// Settle the current round against the drawn rune.
///
/// Every participant is credited a tiered-random reward and captured in one
/// appended [`BlockRecord`]. With zero participants nothing is appended and
/// no balances move — block numbers may therefore advance with gaps in the
/// history. Choices are left in place; [`advance_block`] clears them.
pub fn resolve_round<R: Rng + ?Sized>(
    state: &mut RoundState,
    ledger: &mut Ledger,
    rng: &mut R,
    system_choice: Symbol,
    now_ms: u64,
) -> Option<BlockRecord> {
    if state.current_choices.is_empty() {
        return None;
    }

    let base_reward = state.base_reward;
    let mut member_results = Vec::with_capacity(state.current_choices.len());
    for (user, &choice) in &state.current_choices {
        let distance = choice.distance(system_choice);
        let reward = reward::compute_reward(rng, base_reward, choice, system_choice);
        ledger.credit(user, reward);
        member_results.push(MemberResult {
            user_id: user.clone(),
            choice,
            reward,
            distance,
        });
    }

    let record = BlockRecord {
        block_number: state.current_block,
        system_choice,
        timestamp: now_ms,
        member_results,
    };
    state.block_history.push(record.clone());
    Some(record)
}

/// Advance to the next block: remember the drawn rune, bump the counter,
/// recompute the deadline, and clear the in-flight choices atomically.
pub fn advance_block(state: &mut RoundState, system_choice: Symbol, now_ms: u64) {
    state.last_system_choice = Some(system_choice);
    state.current_block = state.current_block.saturating_add(1);
    state.next_block_at = now_ms.saturating_add(state.block_duration_sec.saturating_mul(1_000));
    state.current_choices.clear();
}

/// Change the round length. Takes effect immediately: the deadline becomes
/// `now + seconds`, discarding any remaining time on the current block.
pub fn set_block_duration(state: &mut RoundState, seconds: u64, now_ms: u64) -> Result<()> {
    if seconds == 0 {
        return Err(GameError::Validation(
            "block duration must be greater than zero".into(),
        ));
    }
    state.block_duration_sec = seconds;
    state.next_block_at = now_ms.saturating_add(seconds.saturating_mul(1_000));
    Ok(())
}

pub fn set_current_block(state: &mut RoundState, block: u64) -> Result<()> {
    if block == 0 {
        return Err(GameError::Validation("block numbers start at 1".into()));
    }
    state.current_block = block;
    Ok(())
}

pub fn set_base_reward(state: &mut RoundState, amount: u64) -> Result<()> {
    if amount == 0 {
        return Err(GameError::Validation("base reward must be positive".into()));
    }
    state.base_reward = amount;
    Ok(())
}

pub fn set_total_rewards(state: &mut RoundState, amount: u64) -> Result<()> {
    if amount == 0 {
        return Err(GameError::Validation(
            "total rewards must be positive".into(),
        ));
    }
    state.total_rewards_per_block = amount;
    Ok(())
}

/// Clear the block history (admin reset).
pub fn reset_records(state: &mut RoundState) {
    state.block_history.clear();
}

/// Full reset: history, counter, deadline, and last drawn rune.
pub fn reset_all(state: &mut RoundState, ledger: &mut Ledger, now_ms: u64) {
    ledger.reset();
    state.block_history.clear();
    state.current_choices.clear();
    state.current_block = 1;
    state.next_block_at = now_ms.saturating_add(state.block_duration_sec.saturating_mul(1_000));
    state.last_system_choice = None;
}

/// The most recently resolved block's record, if it had participants.
pub fn last_round_summary(state: &RoundState) -> Option<&BlockRecord> {
    let last_block = state.current_block.checked_sub(1)?;
    state
        .block_history
        .iter()
        .rev()
        .find(|record| record.block_number == last_block)
}

/// One row of a player's participation history.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoundRecord {
    pub block_number: u64,
    pub system_choice: Symbol,
    pub choice: Symbol,
    pub reward: u64,
    pub distance: u32,
    pub timestamp: u64,
}

/// All rounds a player participated in, most recent first.
pub fn user_history(state: &RoundState, user: &str) -> Vec<UserRoundRecord> {
    let mut rows: Vec<UserRoundRecord> = state
        .block_history
        .iter()
        .filter_map(|record| {
            record
                .member_results
                .iter()
                .find(|result| result.user_id == user)
                .map(|result| UserRoundRecord {
                    block_number: record.block_number,
                    system_choice: record.system_choice,
                    choice: result.choice,
                    reward: result.reward,
                    distance: result.distance,
                    timestamp: record.timestamp,
                })
        })
        .collect();
    rows.sort_by(|a, b| b.block_number.cmp(&a.block_number));
    rows
}

/// Render a millisecond duration as `1h 2m 3s` (seconds rounded up).
pub fn format_duration(ms: u64) -> String {
    let sec = ms.div_ceil(1_000);
    let h = sec / 3_600;
    let m = (sec % 3_600) / 60;
    let s = sec % 60;
    let mut parts = Vec::new();
    if h > 0 {
        parts.push(format!("{h}h"));
    }
    if m > 0 || h > 0 {
        parts.push(format!("{m}m"));
    }
    parts.push(format!("{s}s"));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(99)
    }

    fn symbol(index: usize) -> Symbol {
        Symbol::from_index(index).unwrap()
    }

    #[test]
    fn test_time_left_and_due() {
        let mut state = RoundState::default();
        state.next_block_at = 10_000;
        assert_eq!(time_left_ms(&state, 4_000), 6_000);
        assert_eq!(time_left_ms(&state, 12_000), 0);
        assert!(!tick_due(&state, 9_999));
        assert!(tick_due(&state, 10_000));
    }

    #[test]
    fn test_record_choice_last_write_wins() {
        let mut state = RoundState::default();
        record_choice(&mut state, "alice", symbol(1));
        record_choice(&mut state, "alice", symbol(5));
        assert_eq!(state.current_choices["alice"], symbol(5));
        assert_eq!(state.current_choices.len(), 1);
    }

    #[test]
    fn test_zero_participant_round_produces_no_record() {
        let mut state = RoundState::default();
        let mut ledger = Ledger::default();
        let record = resolve_round(&mut state, &mut ledger, &mut rng(), symbol(0), 1_000);
        assert!(record.is_none());
        assert!(state.block_history.is_empty());
        assert_eq!(ledger.accounts(), 0);

        // The caller still advances, so history may have gaps.
        advance_block(&mut state, symbol(0), 1_000);
        assert_eq!(state.current_block, 2);
    }

    #[test]
    fn test_resolution_credits_by_tier_and_records_history() {
        let mut state = RoundState::default();
        let mut ledger = Ledger::default();
        record_choice(&mut state, "alice", symbol(11)); // exact match
        record_choice(&mut state, "bob", symbol(0)); // distance 11

        let record = resolve_round(&mut state, &mut ledger, &mut rng(), symbol(11), 5_000).unwrap();
        assert_eq!(record.block_number, 1);
        assert_eq!(record.member_results.len(), 2);
        assert_eq!(state.block_history.len(), 1);

        let alice = ledger.get("alice");
        let bob = ledger.get("bob");
        assert!((950_000..=1_000_000).contains(&alice), "alice {alice}");
        assert!((150_000..=300_000).contains(&bob), "bob {bob}");

        advance_block(&mut state, symbol(11), 5_000);
        assert_eq!(state.current_block, 2);
        assert_eq!(state.last_system_choice, Some(symbol(11)));
        assert!(state.current_choices.is_empty());
        assert_eq!(state.next_block_at, 5_000 + 30 * 1_000);
    }

    #[test]
    fn test_set_block_duration_resets_deadline() {
        let mut state = RoundState::default();
        state.next_block_at = 99_999;
        set_block_duration(&mut state, 120, 1_000).unwrap();
        assert_eq!(state.block_duration_sec, 120);
        assert_eq!(state.next_block_at, 1_000 + 120_000);

        assert!(matches!(
            set_block_duration(&mut state, 0, 1_000),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn test_admin_setters_validate() {
        let mut state = RoundState::default();
        assert!(set_current_block(&mut state, 0).is_err());
        set_current_block(&mut state, 50).unwrap();
        assert_eq!(state.current_block, 50);

        assert!(set_base_reward(&mut state, 0).is_err());
        set_base_reward(&mut state, 123).unwrap();
        assert_eq!(state.base_reward, 123);

        assert!(set_total_rewards(&mut state, 0).is_err());
        set_total_rewards(&mut state, 456).unwrap();
        assert_eq!(state.total_rewards_per_block, 456);
    }

    #[test]
    fn test_reset_all() {
        let mut state = RoundState::default();
        let mut ledger = Ledger::default();
        ledger.credit("alice", 10);
        record_choice(&mut state, "alice", symbol(2));
        resolve_round(&mut state, &mut ledger, &mut rng(), symbol(2), 1_000);
        advance_block(&mut state, symbol(2), 1_000);

        reset_all(&mut state, &mut ledger, 2_000);
        assert_eq!(state.current_block, 1);
        assert!(state.block_history.is_empty());
        assert!(state.current_choices.is_empty());
        assert!(state.last_system_choice.is_none());
        assert_eq!(state.next_block_at, 2_000 + 30_000);
        assert_eq!(ledger.accounts(), 0);
    }

    #[test]
    fn test_last_round_summary_skips_empty_blocks() {
        let mut state = RoundState::default();
        let mut ledger = Ledger::default();

        record_choice(&mut state, "alice", symbol(3));
        resolve_round(&mut state, &mut ledger, &mut rng(), symbol(4), 1_000);
        advance_block(&mut state, symbol(4), 1_000);
        assert_eq!(last_round_summary(&state).unwrap().block_number, 1);

        // Empty block 2: no record appended, summary for block 2 is gone.
        advance_block(&mut state, symbol(5), 2_000);
        assert!(last_round_summary(&state).is_none());
    }

    #[test]
    fn test_user_history_is_most_recent_first() {
        let mut state = RoundState::default();
        let mut ledger = Ledger::default();
        for block in 0..3 {
            record_choice(&mut state, "alice", symbol(block));
            let system = symbol(10);
            resolve_round(&mut state, &mut ledger, &mut rng(), system, 1_000 + block as u64);
            advance_block(&mut state, system, 1_000 + block as u64);
        }

        let history = user_history(&state, "alice");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].block_number, 3);
        assert_eq!(history[2].block_number, 1);
        assert!(user_history(&state, "nobody").is_empty());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(1_500), "2s");
        assert_eq!(format_duration(61_000), "1m 1s");
        assert_eq!(format_duration(3_661_000), "1h 1m 1s");
    }
}
