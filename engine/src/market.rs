//! Pack-opening loot economy and the capped dollar ledger.
//!
//! Packs cost GLYPHS and yield one prize from a fixed weighted table: either
//! a GLYPHS credit or virtual dollars. Dollar balances are hard-capped;
//! overflow beyond the cap is discarded and reported so the UI can show a
//! "capped" notice. Claiming zeroes a balance into a monotonic global
//! counter — the actual payout happens off-system, the engine only tracks
//! the ledger and the gate.

use crate::ledger::Ledger;
use glyphmine_types::{GameError, MarketState, Result};
use rand::Rng;
use std::collections::HashSet;

/// Cost of one pack in GLYPHS.
pub const PACK_COST: u64 = 500;
/// Minimum dollar balance required to claim.
pub const MIN_CLAIM_DOLLARS: u64 = 10;
/// Hard cap on any user's dollar balance.
pub const MAX_DOLLAR_BALANCE: u64 = 20;

/// Role whose holders are eligible for every prize.
pub const ROLE_ALL_PRIZES: &str = "1224077301092843620";
/// Role whose holders are restricted to the $1 dollar prize.
pub const ROLE_LIMITED_DOLLARS: &str = "1207680848862777417";

/// What a pack prize pays out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeKind {
    Glyphs,
    Dollars,
}

/// One entry of the weighted prize table.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackPrize {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: PrizeKind,
    pub amount: u64,
    pub weight: u64,
    pub image_url: &'static str,
}

/// The fixed prize table. Weights partition the draw range, so a uniform
/// integer in [1, total] selects exactly one entry.
pub static PRIZE_TABLE: [PackPrize; 7] = [
    PackPrize {
        id: "glyphs_250",
        label: "250 GLYPHS",
        kind: PrizeKind::Glyphs,
        amount: 250,
        weight: 750,
        image_url: "https://i.imgur.com/SwuzzoO.png",
    },
    PackPrize {
        id: "glyphs_500",
        label: "500 GLYPHS",
        kind: PrizeKind::Glyphs,
        amount: 500,
        weight: 150,
        image_url: "https://i.imgur.com/WK6QAsK.png",
    },
    PackPrize {
        id: "glyphs_750",
        label: "750 GLYPHS",
        kind: PrizeKind::Glyphs,
        amount: 750,
        weight: 60,
        image_url: "https://i.imgur.com/1oBOxsi.png",
    },
    PackPrize {
        id: "dollar_1",
        label: "$1",
        kind: PrizeKind::Dollars,
        amount: 1,
        weight: 25,
        image_url: "https://i.imgur.com/oyPLjoG.png",
    },
    PackPrize {
        id: "dollar_2",
        label: "$2",
        kind: PrizeKind::Dollars,
        amount: 2,
        weight: 10,
        image_url: "https://i.imgur.com/UHvsr15.png",
    },
    PackPrize {
        id: "dollar_3",
        label: "$3",
        kind: PrizeKind::Dollars,
        amount: 3,
        weight: 4,
        image_url: "https://i.imgur.com/Tgrt4ow.png",
    },
    PackPrize {
        id: "dollar_4",
        label: "$4",
        kind: PrizeKind::Dollars,
        amount: 4,
        weight: 1,
        image_url: "https://i.imgur.com/UOl6uz0.png",
    },
];

/// Filter the prize table by the caller's roles.
///
/// Dollar prizes above $1 are restricted: they require the all-prizes role,
/// or the absence of the limited-dollars role.
pub fn eligible_prizes<'a, I>(roles: I) -> Vec<&'static PackPrize>
where
    I: IntoIterator<Item = &'a str>,
{
    let roles: HashSet<&str> = roles.into_iter().collect();
    let allow_all_dollars =
        roles.contains(ROLE_ALL_PRIZES) || !roles.contains(ROLE_LIMITED_DOLLARS);
    PRIZE_TABLE
        .iter()
        .filter(|prize| {
            !(prize.kind == PrizeKind::Dollars && !allow_all_dollars && prize.amount > 1)
        })
        .collect()
}

/// Weighted draw over the eligible prizes: sum the weights, draw a uniform
/// integer in [1, total], walk the cumulative weights.
pub fn draw_prize<'a, R, I>(rng: &mut R, roles: I) -> Result<&'static PackPrize>
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let eligible = eligible_prizes(roles);
    let total: u64 = eligible.iter().map(|p| p.weight).sum();
    if total == 0 {
        return Err(GameError::Validation("no eligible prizes".into()));
    }
    let roll = rng.gen_range(1..=total);
    let mut cumulative = 0;
    for prize in eligible {
        cumulative += prize.weight;
        if roll <= cumulative {
            return Ok(prize);
        }
    }
    unreachable!("weights partition the draw range");
}

pub fn pack_count(market: &MarketState, user: &str) -> u64 {
    market.packs.get(user).copied().unwrap_or(0)
}

pub fn dollar_balance(market: &MarketState, user: &str) -> u64 {
    market.dollars.get(user).copied().unwrap_or(0)
}

/// Grant packs to a user, returning the new count.
pub fn add_packs(market: &mut MarketState, user: &str, count: u64) -> u64 {
    let entry = market.packs.entry(user.to_string()).or_insert(0);
    *entry = entry.saturating_add(count);
    *entry
}

/// Buy one pack for [`PACK_COST`] GLYPHS.
pub fn purchase_pack(market: &mut MarketState, ledger: &mut Ledger, user: &str) -> Result<u64> {
    ledger.debit(user, PACK_COST)?;
    Ok(add_packs(market, user, 1))
}

/// Consume one unopened pack, returning how many remain.
pub fn consume_pack(market: &mut MarketState, user: &str) -> Result<u64> {
    let current = pack_count(market, user);
    if current == 0 {
        return Err(GameError::NoPacks);
    }
    let remaining = current - 1;
    if remaining == 0 {
        market.packs.remove(user);
    } else {
        market.packs.insert(user.to_string(), remaining);
    }
    Ok(remaining)
}

/// Result of a bounded dollar credit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DollarUpdate {
    /// Amount actually added after clamping.
    pub added: u64,
    pub new_balance: u64,
    /// Whether the cap truncated the credit or the balance sits at the cap.
    pub capped: bool,
}

/// Credit dollars, clamping the balance to [`MAX_DOLLAR_BALANCE`]. Overflow
/// beyond the cap is discarded, not banked.
pub fn add_dollars(market: &mut MarketState, user: &str, amount: u64) -> DollarUpdate {
    let current = dollar_balance(market, user);
    let room = MAX_DOLLAR_BALANCE.saturating_sub(current);
    let added = amount.min(room);
    let new_balance = current + added;
    if new_balance == 0 {
        market.dollars.remove(user);
    } else {
        market.dollars.insert(user.to_string(), new_balance);
    }
    DollarUpdate {
        added,
        new_balance,
        capped: added < amount || new_balance >= MAX_DOLLAR_BALANCE,
    }
}

/// Outcome of opening one pack.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackOpenResult {
    pub prize: &'static PackPrize,
    pub packs_remaining: u64,
    /// New GLYPHS balance when the prize paid GLYPHS.
    pub glyph_balance: Option<u64>,
    /// Dollar outcome when the prize paid dollars.
    pub dollars: Option<DollarUpdate>,
}

/// Consume a pack and settle its prize into the appropriate ledger.
pub fn open_pack<'a, R, I>(
    market: &mut MarketState,
    ledger: &mut Ledger,
    rng: &mut R,
    user: &str,
    roles: I,
) -> Result<PackOpenResult>
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let packs_remaining = consume_pack(market, user)?;
    let prize = draw_prize(rng, roles)?;
    match prize.kind {
        PrizeKind::Glyphs => {
            let glyph_balance = ledger.credit(user, prize.amount);
            Ok(PackOpenResult {
                prize,
                packs_remaining,
                glyph_balance: Some(glyph_balance),
                dollars: None,
            })
        }
        PrizeKind::Dollars => {
            let update = add_dollars(market, user, prize.amount);
            Ok(PackOpenResult {
                prize,
                packs_remaining,
                glyph_balance: None,
                dollars: Some(update),
            })
        }
    }
}

pub fn claim_limit_reached(market: &MarketState) -> bool {
    market.total_claimed_dollars >= market.claim_limit
}

/// Claim a dollar balance: zero it and add it to the global claimed counter.
///
/// Gated on the minimum balance, the claim button, and the global limit.
pub fn claim(market: &mut MarketState, user: &str) -> Result<u64> {
    if market.claim_button_disabled {
        return Err(GameError::ClaimUnavailable("claiming is disabled".into()));
    }
    if claim_limit_reached(market) {
        return Err(GameError::ClaimUnavailable("claim limit reached".into()));
    }
    let balance = dollar_balance(market, user);
    if balance < MIN_CLAIM_DOLLARS {
        return Err(GameError::ClaimUnavailable(format!(
            "minimum claim is ${MIN_CLAIM_DOLLARS}, balance is ${balance}"
        )));
    }
    market.dollars.remove(user);
    market.total_claimed_dollars = market.total_claimed_dollars.saturating_add(balance);
    Ok(balance)
}

pub fn set_claim_limit(market: &mut MarketState, limit: u64) {
    market.claim_limit = limit;
}

/// Zero the claimed counter and re-enable claiming.
pub fn reset_claim_counter(market: &mut MarketState) {
    market.total_claimed_dollars = 0;
    market.claim_button_disabled = false;
}

pub fn set_claim_enabled(market: &mut MarketState, enabled: bool) {
    market.claim_button_disabled = !enabled;
}
