//! Common types for the glyphmine game service.
//!
//! This crate holds the data model shared between the engine and the
//! gateway: the rune alphabet and its ring distance, the persisted state
//! documents, and the error taxonomy. It contains no I/O and no clocks —
//! everything here is plain data so the engine stays the single place
//! where time and randomness enter the system.

pub mod error;
pub mod state;
pub mod symbol;

pub use error::{GameError, Result};
pub use state::{
    AuctionState, Balances, BlockRecord, GrumbleBet, GrumbleState, MarketState, MemberResult,
    RoundState, UserId,
};
pub use symbol::{Symbol, ALPHABET, SYMBOL_COUNT};
