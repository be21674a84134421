//! Types library for the drag league match engine
//!
//! This library provides the core type definitions shared by the match
//! engine, settlement and simulation crates.
//!
//! # Modules
//! - `ids`: Unique identifiers (MatchId, UserId, ParticipantId, LedgerEntryId)
//! - `numeric`: Floor-truncated decimal money helpers
//! - `status`: Match/heat status and validated heat numbers
//! - `league`: League tiers, buy-ins, BURN ladders
//! - `roster`: Roster input from matchmaking
//! - `scoring`: Write-once score cards and ranking rules
//! - `ledger`: Ledger entries, parties, wallets
//! - `fairness`: Commitment payload shape
//! - `events`: Notifications and the sink seam
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod status;
pub mod league;
pub mod roster;
pub mod scoring;
pub mod ledger;
pub mod fairness;
pub mod events;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::fairness::*;
    pub use crate::ids::*;
    pub use crate::league::*;
    pub use crate::ledger::*;
    pub use crate::numeric::*;
    pub use crate::roster::*;
    pub use crate::scoring::*;
    pub use crate::status::*;
}
