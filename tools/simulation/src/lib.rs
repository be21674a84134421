//! Match Simulation Framework
//!
//! Drives full matches through the real engine with deterministic drivers.
//!
//! # Modules
//! - `pilots`: Seed-bound ghost drivers and repeatable live drivers
//! - `audit`: Lock timeline audit against the inverse physics curve
//! - `scenario`: Whole-match runner with settlement and conservation checks

pub mod pilots;
pub mod audit;
pub mod scenario;

pub use audit::{AuditReport, LockAudit, LockRecord};
pub use pilots::{GhostPilot, LivePilot, PilotAction, PilotConfig};
pub use scenario::{ScenarioConfig, ScenarioReport, ScenarioRunner};

/// Crate version constant
pub const VERSION: &str = "1.0.0";
