//! Persisted state documents.
//!
//! Two independent documents back the whole game: the round state (round
//! configuration, history, side-game slices, market data) and the balance
//! map. Both are flat JSON objects with camelCase field names. Loading an
//! older document is never fatal: every field carries an explicit serde
//! default, so absent fields merge to their documented defaults in one pass
//! at load time instead of being patched throughout the business logic.

use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Chat-platform user identifier (a Discord snowflake in production).
pub type UserId = String;

/// GLYPHS balances, persisted as its own document and coalesced separately
/// from the round state.
pub type Balances = BTreeMap<UserId, u64>;

/// Default round length in seconds.
pub const DEFAULT_BLOCK_DURATION_SEC: u64 = 30;
/// Default total rewards per block.
pub const DEFAULT_TOTAL_REWARDS_PER_BLOCK: u64 = 700_000;
/// Default base reward used by the tiered payout model.
pub const DEFAULT_BASE_REWARD: u64 = 1_000_000;
/// Default global dollar claim limit.
pub const DEFAULT_CLAIM_LIMIT: u64 = 80;

/// One participant's outcome in a resolved block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResult {
    pub user_id: UserId,
    pub choice: Symbol,
    pub reward: u64,
    pub distance: u32,
}

/// A resolved block. Append-only: records are never mutated after being
/// pushed, only wholesale-cleared by admin resets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub block_number: u64,
    pub system_choice: Symbol,
    pub timestamp: u64,
    pub member_results: Vec<MemberResult>,
}

/// A single grumble bet: the wager and the guessed rune.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrumbleBet {
    pub amount: u64,
    pub guess: Symbol,
}

/// State of the pari-mutuel grumble side-game.
///
/// The session ends either when the block counter passes `block_number` or,
/// if a custom timer is set, when that timer expires (the timer takes
/// precedence).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GrumbleState {
    pub prize_pool: u64,
    pub bets: BTreeMap<UserId, GrumbleBet>,
    pub message_id: Option<String>,
    pub channel_id: Option<String>,
    /// Block at which the session was opened; it resolves once the current
    /// block exceeds this.
    pub block_number: u64,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_timer_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_timer_ends_at: Option<u64>,
}

/// Sealed-bid auction state. Bids are escrowed at placement time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionState {
    pub id: String,
    pub description: String,
    pub roles_to_tag: Vec<String>,
    /// Epoch milliseconds.
    pub end_time: u64,
    pub number_of_winners: u32,
    pub bids: BTreeMap<UserId, u64>,
    pub message_id: Option<String>,
    pub channel_id: Option<String>,
    pub is_active: bool,
    pub ended: bool,
}

/// Pack inventory and capped dollar economy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketState {
    /// Unopened pack inventory per user.
    pub packs: BTreeMap<UserId, u64>,
    /// Dollar balances, each bounded to the market cap.
    pub dollars: BTreeMap<UserId, u64>,
    /// Monotonic counter of dollars claimed across all users.
    pub total_claimed_dollars: u64,
    pub claim_limit: u64,
    pub claim_button_disabled: bool,
}

impl Default for MarketState {
    fn default() -> Self {
        Self {
            packs: BTreeMap::new(),
            dollars: BTreeMap::new(),
            total_claimed_dollars: 0,
            claim_limit: DEFAULT_CLAIM_LIMIT,
            claim_button_disabled: false,
        }
    }
}

/// The round-state document: round configuration, in-flight choices,
/// history, and every side-game slice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundState {
    /// Monotonically increasing round counter, starting at 1.
    pub current_block: u64,
    pub total_rewards_per_block: u64,
    pub base_reward: u64,
    pub block_duration_sec: u64,
    /// Deadline for the current block in epoch milliseconds. A value of 0
    /// marks a fresh or stale document; `restore` recomputes it.
    pub next_block_at: u64,
    pub last_system_choice: Option<Symbol>,
    /// Picks for the current, unresolved round only. Cleared when the round
    /// resolves.
    pub current_choices: BTreeMap<UserId, Symbol>,
    pub block_history: Vec<BlockRecord>,
    pub grumble: Option<GrumbleState>,
    pub market: MarketState,
    pub auctions: BTreeMap<String, AuctionState>,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            current_block: 1,
            total_rewards_per_block: DEFAULT_TOTAL_REWARDS_PER_BLOCK,
            base_reward: DEFAULT_BASE_REWARD,
            block_duration_sec: DEFAULT_BLOCK_DURATION_SEC,
            next_block_at: 0,
            last_system_choice: None,
            current_choices: BTreeMap::new(),
            block_history: Vec::new(),
            grumble: None,
            market: MarketState::default(),
            auctions: BTreeMap::new(),
        }
    }
}

impl RoundState {
    /// Normalize a freshly loaded document against the current clock.
    ///
    /// Fills a missing block deadline and drops a grumble session that was
    /// already inactive when the process went down. A grumble whose end
    /// condition has passed is left in place: the first tick resolves it.
    pub fn restore(&mut self, now_ms: u64) {
        if self.next_block_at == 0 {
            self.next_block_at = now_ms.saturating_add(self.block_duration_sec.saturating_mul(1_000));
        }
        if self.grumble.as_ref().is_some_and(|g| !g.is_active) {
            self.grumble = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = RoundState::default();
        assert_eq!(state.current_block, 1);
        assert_eq!(state.total_rewards_per_block, 700_000);
        assert_eq!(state.base_reward, 1_000_000);
        assert_eq!(state.block_duration_sec, 30);
        assert!(state.block_history.is_empty());
        assert!(state.grumble.is_none());
        assert_eq!(state.market.claim_limit, 80);
    }

    #[test]
    fn test_legacy_document_merges_defaults() {
        // A document from before the market/auction/grumble fields existed
        // must load with the documented defaults, never fail.
        let legacy = r#"{
            "currentBlock": 42,
            "totalRewardsPerBlock": 500000,
            "baseReward": 250000,
            "blockDurationSec": 60,
            "nextBlockAt": 1700000000000,
            "blockHistory": [],
            "currentChoices": {}
        }"#;
        let state: RoundState = serde_json::from_str(legacy).unwrap();
        assert_eq!(state.current_block, 42);
        assert_eq!(state.block_duration_sec, 60);
        assert!(state.grumble.is_none());
        assert!(state.auctions.is_empty());
        assert_eq!(state.market.claim_limit, DEFAULT_CLAIM_LIMIT);
        assert!(!state.market.claim_button_disabled);
    }

    #[test]
    fn test_round_trip() {
        let mut state = RoundState::default();
        state.current_block = 7;
        state.last_system_choice = Symbol::from_index(3);
        state
            .current_choices
            .insert("user-1".to_string(), Symbol::from_index(0).unwrap());
        state.block_history.push(BlockRecord {
            block_number: 6,
            system_choice: Symbol::from_index(5).unwrap(),
            timestamp: 1_700_000_000_000,
            member_results: vec![MemberResult {
                user_id: "user-1".to_string(),
                choice: Symbol::from_index(4).unwrap(),
                reward: 123,
                distance: 1,
            }],
        });

        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: RoundState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_restore_fills_missing_deadline() {
        let mut state = RoundState::default();
        state.restore(1_000_000);
        assert_eq!(state.next_block_at, 1_000_000 + 30 * 1_000);

        // An existing deadline is preserved.
        let mut state = RoundState {
            next_block_at: 5_000,
            ..RoundState::default()
        };
        state.restore(1_000_000);
        assert_eq!(state.next_block_at, 5_000);
    }

    #[test]
    fn test_restore_drops_inactive_grumble() {
        let mut state = RoundState::default();
        state.grumble = Some(GrumbleState {
            is_active: false,
            ..GrumbleState::default()
        });
        state.restore(0);
        assert!(state.grumble.is_none());

        let mut state = RoundState::default();
        state.grumble = Some(GrumbleState {
            is_active: true,
            block_number: 1,
            ..GrumbleState::default()
        });
        state.restore(0);
        assert!(state.grumble.is_some());
    }
}
