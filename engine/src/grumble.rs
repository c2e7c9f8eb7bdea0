//! Grumble: the pari-mutuel guessing side-game.
//!
//! An admin opens a session; players each place one bet (a wager plus a rune
//! guess) which is debited immediately into a shared prize pool. The session
//! resolves either when the block counter passes the session's opening block
//! or when an optional custom countdown expires — the countdown takes
//! precedence while set. All bettors at the global minimum distance to the
//! drawn rune are co-winners and split the pool by floor division; what
//! happens to the remainder is an explicit policy.

use crate::ledger::Ledger;
use glyphmine_types::{GameError, GrumbleBet, GrumbleState, Result, RoundState, Symbol, UserId};

/// What to do with the floor-division remainder on a tie.
///
/// `Retain` reproduces the long-standing behavior (the house keeps it);
/// `Distribute` hands one unit each to winners in user-id order until the
/// remainder is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RemainderPolicy {
    #[default]
    Retain,
    Distribute,
}

impl std::str::FromStr for RemainderPolicy {
    type Err = &'static str;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "distribute" => Ok(Self::Distribute),
            _ => Err("valid values: retain, distribute"),
        }
    }
}

/// Open a fresh session at the current block. Fails when one is running.
pub fn start(state: &mut RoundState) -> Result<&GrumbleState> {
    if state.grumble.as_ref().is_some_and(|g| g.is_active) {
        return Err(GameError::AlreadyActive);
    }
    state.grumble = Some(GrumbleState {
        prize_pool: 0,
        bets: Default::default(),
        message_id: None,
        channel_id: None,
        block_number: state.current_block,
        is_active: true,
        custom_timer_sec: None,
        custom_timer_ends_at: None,
    });
    Ok(state.grumble.as_ref().expect("just inserted"))
}

fn active_grumble(state: &mut RoundState) -> Result<&mut GrumbleState> {
    state
        .grumble
        .as_mut()
        .filter(|g| g.is_active)
        .ok_or_else(|| GameError::NotFound("no active grumble".into()))
}

/// Place a bet: debits the wager immediately and adds it to the pool.
///
/// One bet per user per session — a second attempt is rejected, not merged.
pub fn join(
    state: &mut RoundState,
    ledger: &mut Ledger,
    user: &str,
    guess: Symbol,
    amount: u64,
) -> Result<u64> {
    if amount == 0 {
        return Err(GameError::Validation("bet amount must be positive".into()));
    }
    let grumble = active_grumble(state)?;
    if grumble.bets.contains_key(user) {
        return Err(GameError::AlreadyPlaced);
    }
    ledger.debit(user, amount)?;
    grumble.bets.insert(user.to_string(), GrumbleBet { amount, guess });
    grumble.prize_pool = grumble.prize_pool.saturating_add(amount);
    Ok(grumble.prize_pool)
}

/// Set (seconds > 0) or disable (seconds == 0) the custom countdown.
///
/// Returns the new expiry in epoch ms when a countdown was armed.
pub fn set_timer(state: &mut RoundState, seconds: u64, now_ms: u64) -> Result<Option<u64>> {
    let grumble = active_grumble(state)?;
    if seconds == 0 {
        grumble.custom_timer_sec = None;
        grumble.custom_timer_ends_at = None;
        return Ok(None);
    }
    let ends_at = now_ms.saturating_add(seconds.saturating_mul(1_000));
    grumble.custom_timer_sec = Some(seconds);
    grumble.custom_timer_ends_at = Some(ends_at);
    Ok(Some(ends_at))
}

/// Re-arm the session to end at the next block, keeping pool and bets.
pub fn restart(state: &mut RoundState) -> Result<()> {
    let current_block = state.current_block;
    let grumble = active_grumble(state)?;
    grumble.block_number = current_block;
    grumble.custom_timer_sec = None;
    grumble.custom_timer_ends_at = None;
    Ok(())
}

/// Whether the session's end condition has been met.
pub fn should_resolve(state: &RoundState, now_ms: u64) -> bool {
    let Some(grumble) = state.grumble.as_ref().filter(|g| g.is_active) else {
        return false;
    };
    if let (Some(_), Some(ends_at)) = (grumble.custom_timer_sec, grumble.custom_timer_ends_at) {
        return now_ms >= ends_at;
    }
    state.current_block > grumble.block_number
}

/// Time until the session ends: the custom countdown when set, otherwise the
/// current block's deadline.
pub fn time_left_ms(state: &RoundState, now_ms: u64) -> u64 {
    let Some(grumble) = state.grumble.as_ref().filter(|g| g.is_active) else {
        return 0;
    };
    if let (Some(_), Some(ends_at)) = (grumble.custom_timer_sec, grumble.custom_timer_ends_at) {
        return ends_at.saturating_sub(now_ms);
    }
    crate::round::time_left_ms(state, now_ms)
}

pub fn using_custom_timer(state: &RoundState) -> bool {
    state
        .grumble
        .as_ref()
        .is_some_and(|g| g.is_active && g.custom_timer_sec.is_some() && g.custom_timer_ends_at.is_some())
}

pub fn bet_of<'a>(state: &'a RoundState, user: &str) -> Option<&'a GrumbleBet> {
    state
        .grumble
        .as_ref()
        .filter(|g| g.is_active)
        .and_then(|g| g.bets.get(user))
}

/// Bettors at the global minimum distance to `reference`.
pub fn potential_winners(grumble: &GrumbleState, reference: Symbol) -> Vec<UserId> {
    let mut min_distance = u32::MAX;
    let mut winners: Vec<UserId> = Vec::new();
    for (user, bet) in &grumble.bets {
        let distance = bet.guess.distance(reference);
        if distance < min_distance {
            min_distance = distance;
            winners.clear();
            winners.push(user.clone());
        } else if distance == min_distance {
            winners.push(user.clone());
        }
    }
    winners
}

/// Outcome of a resolved session.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    /// Nobody joined; the (necessarily untouched) pool is reported returned.
    NoBets { prize_pool: u64 },
    /// Minimum-distance bettors split the pool.
    Paid {
        system_choice: Symbol,
        min_distance: u32,
        prize_pool: u64,
        prize_per_winner: u64,
        /// Winner and the amount actually credited (differs only when the
        /// remainder is distributed).
        winners: Vec<(UserId, u64)>,
        /// Units left undistributed under [`RemainderPolicy::Retain`].
        retained_remainder: u64,
    },
}

/// Settle and clear the session against the drawn rune.
///
/// Returns `None` when no session is active. Ties are not broken: every
/// minimum-distance bettor is credited `floor(pool / winners)`, and the
/// remainder follows `policy`.
pub fn resolve(
    state: &mut RoundState,
    ledger: &mut Ledger,
    system_choice: Symbol,
    policy: RemainderPolicy,
) -> Option<Resolution> {
    let grumble = state.grumble.take().filter(|g| g.is_active)?;

    if grumble.bets.is_empty() {
        return Some(Resolution::NoBets {
            prize_pool: grumble.prize_pool,
        });
    }

    let winner_ids = potential_winners(&grumble, system_choice);
    let min_distance = grumble
        .bets
        .values()
        .map(|bet| bet.guess.distance(system_choice))
        .min()
        .expect("bets is non-empty");

    let count = winner_ids.len() as u64;
    let prize_per_winner = grumble.prize_pool / count;
    let mut remainder = grumble.prize_pool % count;

    let mut winners = Vec::with_capacity(winner_ids.len());
    for user in winner_ids {
        let mut prize = prize_per_winner;
        if policy == RemainderPolicy::Distribute && remainder > 0 {
            prize += 1;
            remainder -= 1;
        }
        ledger.credit(&user, prize);
        winners.push((user, prize));
    }

    Some(Resolution::Paid {
        system_choice,
        min_distance,
        prize_pool: grumble.prize_pool,
        prize_per_winner,
        winners,
        retained_remainder: remainder,
    })
}

/// Result of a member-departure check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepartureOutcome {
    /// The leaver was not holding a winning position; nothing changed.
    NoAction,
    /// The leaver was a potential (co-)winner: the pool is preserved, bets
    /// cleared, and a fresh session reopened at the current block.
    SessionReopened { preserved_pool: u64 },
}

/// Anti-abuse hook for member removal.
///
/// If the departing user holds a potential winning position against the most
/// recently drawn rune, the session reopens with the pool intact instead of
/// letting the prize walk out the door. This is a fairness heuristic keyed
/// on `lastSystemChoice`, not a proof over all departure timings.
pub fn handle_member_departure(state: &mut RoundState, user: &str) -> DepartureOutcome {
    let Some(reference) = state.last_system_choice else {
        return DepartureOutcome::NoAction;
    };
    let current_block = state.current_block;
    let Some(grumble) = state.grumble.as_mut().filter(|g| g.is_active) else {
        return DepartureOutcome::NoAction;
    };
    if !grumble.bets.contains_key(user) {
        return DepartureOutcome::NoAction;
    }
    if !potential_winners(grumble, reference).iter().any(|u| u == user) {
        return DepartureOutcome::NoAction;
    }

    let preserved_pool = grumble.prize_pool;
    grumble.bets.clear();
    grumble.block_number = current_block;
    grumble.custom_timer_sec = None;
    grumble.custom_timer_ends_at = None;
    DepartureOutcome::SessionReopened { preserved_pool }
}
