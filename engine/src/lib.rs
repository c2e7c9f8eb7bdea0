//! Glyphmine execution engine.
//!
//! This crate contains the block/reward resolution engine and its
//! time-driven state machine: round advancement under a tiered-random
//! payout model, the balance ledger, the side-game coordinators (grumble,
//! pack market, auctions), the leaderboard aggregator, and the JSON-backed
//! durable store with write coalescing.
//!
//! ## Determinism and concurrency
//! - Core round/settlement logic is pure: callers pass `now_ms` and an RNG,
//!   so tests inject both.
//! - All mutation runs synchronously under a single writer lock; nothing
//!   awaits while holding it. Overlapping scheduler ticks are rejected by an
//!   explicit `RoundPhase` guard rather than interleaving.
//! - Persistence is asynchronous and coalesced; in-memory state is always
//!   authoritative. A crash inside the debounce window loses at most that
//!   window.
//!
//! The primary entrypoint is [`Engine`].

pub mod auction;
pub mod engine;
pub mod export;
pub mod grumble;
pub mod leaderboard;
pub mod ledger;
pub mod market;
pub mod reward;
pub mod round;
pub mod store;

pub use engine::{Engine, EngineConfig, EngineEvent};
pub use ledger::Ledger;
