//! Settlement Service
//!
//! Converts final match standings into an atomic, balance-preserving set of
//! ledger postings.
//!
//! **Key Invariants:**
//! - The ledger is the system of record; wallets are a cache
//! - All postings of a settlement commit together or not at all
//! - Settlement runs at most once per match
//! - Each currency's postings for a match sum to zero

pub mod repository;
pub mod memory;
pub mod ledger;
pub mod prizes;
pub mod settlement;

pub use ledger::Ledger;
pub use memory::InMemoryStore;
pub use prizes::Economics;
pub use repository::{LedgerRepository, MatchRepository, Repository};
pub use settlement::{SettlementEngine, SettlementOutcome};
