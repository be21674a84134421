//! Deterministic race computations
//!
//! Pure, stateless building blocks shared by the match engine and the
//! simulation tooling:
//! - `physics`: speed ceiling over heat time, its inverse, range checks
//! - `fairness`: per-heat seed generation, SHA-256 commit/verify, seed-bound derivation
//!
//! Neither module holds shared mutable state; construct the models and pass
//! them to whoever needs them.

pub mod fairness;
pub mod physics;

pub use fairness::{derive_value, FairnessEngine, FairnessError};
pub use physics::PhysicsModel;
