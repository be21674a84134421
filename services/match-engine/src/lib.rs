//! Match Engine Service
//!
//! Runs ten-player drag matches: three timed heats, physics-checked score
//! locks, and hand-off to settlement once heat 3 ends.
//!
//! **Key Invariants:**
//! - A heat score is written at most once per player
//! - No score above the physics ceiling for the elapsed heat time is accepted
//! - Heat transitions are strictly ordered; stale timers are no-ops
//! - A completed match is settled exactly once

pub mod config;
pub mod clock;
pub mod state;
pub mod store;
pub mod lifecycle;
pub mod scoring;
pub mod engine;

pub use clock::{Clock, MonotonicClock};
pub use config::{EngineConfig, HeatTiming};
pub use engine::{CreatedMatch, MatchEngine};
pub use scoring::LockReceipt;
pub use state::{MatchState, PlayerState};
pub use store::MatchStateStore;
