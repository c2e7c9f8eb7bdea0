//! Sealed-bid auctions.
//!
//! Bids are sealed: a bidder learns only their own bid and rank. Funds are
//! escrowed at bid time, not at win time. When an auction ends, the top N
//! bids win; what happens to the losers' escrow is an explicit policy
//! because the historical behavior (the house keeps it) is ambiguous and
//! awaits product clarification.

use crate::ledger::Ledger;
use glyphmine_types::{AuctionState, GameError, Result, RoundState, UserId};
use uuid::Uuid;

/// What to do with losing bidders' escrowed funds at resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoserRefundPolicy {
    /// Historical behavior: losers' escrow is not returned.
    #[default]
    Retain,
    /// Credit losing bids back at resolution time.
    Refund,
}

impl std::str::FromStr for LoserRefundPolicy {
    type Err = &'static str;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "refund" => Ok(Self::Refund),
            _ => Err("valid values: retain, refund"),
        }
    }
}

/// Create a new auction and return its id.
pub fn create(
    state: &mut RoundState,
    description: &str,
    roles_to_tag: Vec<String>,
    end_time: u64,
    number_of_winners: u32,
    now_ms: u64,
) -> Result<String> {
    if description.trim().is_empty() {
        return Err(GameError::Validation("description must not be empty".into()));
    }
    if number_of_winners == 0 {
        return Err(GameError::Validation(
            "number of winners must be positive".into(),
        ));
    }
    if end_time <= now_ms {
        return Err(GameError::Validation("end time must be in the future".into()));
    }

    let id = format!("auction_{}", Uuid::new_v4().simple());
    state.auctions.insert(
        id.clone(),
        AuctionState {
            id: id.clone(),
            description: description.to_string(),
            roles_to_tag,
            end_time,
            number_of_winners,
            bids: Default::default(),
            message_id: None,
            channel_id: None,
            is_active: true,
            ended: false,
        },
    );
    Ok(id)
}

pub fn get<'a>(state: &'a RoundState, auction_id: &str) -> Option<&'a AuctionState> {
    state.auctions.get(auction_id)
}

/// Auctions still accepting bids at `now_ms`.
pub fn active<'a>(state: &'a RoundState, now_ms: u64) -> Vec<&'a AuctionState> {
    state
        .auctions
        .values()
        .filter(|a| a.is_active && !a.ended && a.end_time > now_ms)
        .collect()
}

/// Active auctions whose deadline has passed; discovered by polling.
pub fn expired_ids(state: &RoundState, now_ms: u64) -> Vec<String> {
    state
        .auctions
        .values()
        .filter(|a| a.is_active && !a.ended && a.end_time <= now_ms)
        .map(|a| a.id.clone())
        .collect()
}

/// Place a sealed bid. The amount is debited immediately (escrow-on-bid).
pub fn place_bid(
    state: &mut RoundState,
    ledger: &mut Ledger,
    auction_id: &str,
    user: &str,
    amount: u64,
    now_ms: u64,
) -> Result<()> {
    let auction = state
        .auctions
        .get_mut(auction_id)
        .ok_or_else(|| GameError::NotFound(format!("auction {auction_id}")))?;
    if auction.ended || !auction.is_active || now_ms >= auction.end_time {
        return Err(GameError::AlreadyEnded(format!("auction {auction_id}")));
    }
    if auction.bids.contains_key(user) {
        return Err(GameError::AlreadyPlaced);
    }
    if amount == 0 {
        return Err(GameError::Validation("bid amount must be positive".into()));
    }
    ledger.debit(user, amount)?;
    auction.bids.insert(user.to_string(), amount);
    Ok(())
}

/// Bids ranked descending by amount.
pub fn leaderboard(auction: &AuctionState) -> Vec<(UserId, u64)> {
    let mut rows: Vec<(UserId, u64)> = auction
        .bids
        .iter()
        .map(|(user, amount)| (user.clone(), *amount))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

pub fn user_bid(auction: &AuctionState, user: &str) -> Option<u64> {
    auction.bids.get(user).copied()
}

/// A bidder's 1-based rank, their only visibility into the sealed book.
pub fn user_rank(auction: &AuctionState, user: &str) -> Option<usize> {
    leaderboard(auction)
        .iter()
        .position(|(u, _)| u == user)
        .map(|i| i + 1)
}

/// Result of resolving an auction.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub auction_id: String,
    pub winners: Vec<(UserId, u64)>,
    /// Losing bids refunded under [`LoserRefundPolicy::Refund`].
    pub refunded: Vec<(UserId, u64)>,
}

/// End an auction and rank its bids; top N win.
///
/// Idempotent: resolving an already-ended auction returns `Ok(None)` and
/// changes nothing. Winners' escrow was consumed at bid time; losers'
/// escrow follows `policy`.
pub fn resolve(
    state: &mut RoundState,
    ledger: &mut Ledger,
    auction_id: &str,
    policy: LoserRefundPolicy,
) -> Result<Option<Settlement>> {
    let auction = state
        .auctions
        .get_mut(auction_id)
        .ok_or_else(|| GameError::NotFound(format!("auction {auction_id}")))?;
    if auction.ended {
        return Ok(None);
    }
    auction.ended = true;
    auction.is_active = false;

    let ranked = leaderboard(auction);
    let winners: Vec<(UserId, u64)> = ranked
        .iter()
        .take(auction.number_of_winners as usize)
        .cloned()
        .collect();

    let mut refunded = Vec::new();
    if policy == LoserRefundPolicy::Refund {
        for (user, amount) in ranked.iter().skip(auction.number_of_winners as usize) {
            ledger.credit(user, *amount);
            refunded.push((user.clone(), *amount));
        }
    }

    Ok(Some(Settlement {
        auction_id: auction_id.to_string(),
        winners,
        refunded,
    }))
}
