//! Error taxonomy shared by the engine and gateway.

use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Validation-class errors never mutate state. `ResolutionInProgress` is an
/// internal scheduling artifact: the scheduler logs and skips it rather than
/// surfacing it to players.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Bad user input: non-positive amounts, out-of-range seconds, etc.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A debit exceeded the available balance.
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    /// Referenced entity (auction, grumble) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The auction or side-game already finished.
    #[error("already ended: {0}")]
    AlreadyEnded(String),

    /// The user already placed a bid/bet in this session.
    #[error("already placed a bet in this session")]
    AlreadyPlaced,

    /// A side-game session is already running.
    #[error("a session is already active")]
    AlreadyActive,

    /// A round resolution is currently in flight.
    #[error("round resolution already in progress")]
    ResolutionInProgress,

    /// The engine was soft-stopped by an admin.
    #[error("engine is stopped")]
    Inactive,

    /// The user has no unopened packs.
    #[error("no packs available")]
    NoPacks,

    /// Dollar claim is gated: below the minimum, limit reached, or disabled.
    #[error("claim unavailable: {0}")]
    ClaimUnavailable(String),
}

pub type Result<T> = std::result::Result<T, GameError>;
