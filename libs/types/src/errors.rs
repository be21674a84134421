//! Error types for the match engine
//!
//! Comprehensive error taxonomy using thiserror. The variants of
//! [`MatchError`] map one-to-one onto how a caller is expected to react:
//! validation failures are final, conflicts may be retried after re-reading
//! state, anti-cheat rejections are final and audited, storage failures are
//! safe to retry.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::ids::{MatchId, ParticipantId};
use crate::ledger::{Currency, LedgerParty};
use crate::status::{HeatStatus, MatchStatus};

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Anti-cheat rejection: {0}")]
    AntiCheat(#[from] AntiCheatError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Arithmetic error: {0}")]
    Money(#[from] MoneyError),

    #[error("Fairness commitment failed: {reason}")]
    Fairness { reason: String },
}

impl MatchError {
    /// Whether the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::Storage(_))
    }

    /// Whether the rejection indicates possible score manipulation.
    pub fn is_anti_cheat(&self) -> bool {
        matches!(self, MatchError::AntiCheat(_))
    }
}

/// Malformed input, rejected synchronously and never retried
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid heat number: {heat} (expected 1..=3)")]
    InvalidHeatNumber { heat: u8 },

    #[error("Score must not be negative: {score}")]
    NegativeScore { score: Decimal },

    #[error("Roster must have exactly {expected} entries, got {actual}")]
    RosterSize { expected: usize, actual: usize },

    #[error("Buy-in mismatch for {display_name}: expected {expected}, got {actual}")]
    BuyinMismatch {
        display_name: String,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("Live roster entry {display_name} has no user")]
    MissingUser { display_name: String },

    #[error("Ghost roster entry {display_name} has no replay source")]
    MissingReplaySource { display_name: String },

    #[error("Ghost roster entry {display_name} must not reference a user")]
    GhostWithUser { display_name: String },

    #[error("User appears more than once in roster: {user}")]
    DuplicateUser { user: String },
}

/// The request was well-formed but the current state does not allow it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConflictError {
    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: MatchId },

    #[error("Match already exists: {match_id}")]
    MatchExists { match_id: MatchId },

    #[error("Match is not in progress: {status:?}")]
    MatchNotInProgress { status: MatchStatus },

    #[error("Match {match_id} has not finished its heats: {status:?}")]
    MatchNotComplete { match_id: MatchId, status: MatchStatus },

    #[error("Player not found: {participant_id}")]
    PlayerNotFound { participant_id: ParticipantId },

    #[error("Player {participant_id} already locked heat {heat}")]
    AlreadyLocked { participant_id: ParticipantId, heat: u8 },

    #[error("Player {participant_id} is out of the current heat")]
    PlayerNotAlive { participant_id: ParticipantId },

    #[error("Heat is not active: {status:?}")]
    HeatNotActive { status: HeatStatus },

    #[error("Heat {heat} score already recorded for {participant_id}")]
    ScoreAlreadySet { participant_id: ParticipantId, heat: u8 },

    #[error("Heat cannot move from {from} to {to}")]
    InvalidHeatTransition { from: u8, to: u8 },

    #[error("Match already settled: {match_id}")]
    AlreadySettled { match_id: MatchId },

    #[error("Insufficient {currency:?} for {party}: required {required}, available {available}")]
    InsufficientFunds {
        party: LedgerParty,
        currency: Currency,
        required: Decimal,
        available: Decimal,
    },
}

/// Score submissions that break the physics ceiling
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AntiCheatError {
    #[error("Score {requested} exceeds ceiling {max_allowed} at {heat_time_ms}ms")]
    ScoreExceedsCeiling {
        requested: Decimal,
        max_allowed: Decimal,
        heat_time_ms: i64,
    },

    #[error("Score submitted during countdown ({heat_time_ms}ms before start)")]
    SubmittedDuringCountdown { heat_time_ms: i64 },
}

/// Failures of the external repository layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Record not found: {what}")]
    NotFound { what: String },
}

/// Arithmetic faults in monetary helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MoneyError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Amount must be positive: {amount}")]
    NonPositiveAmount { amount: Decimal },

    #[error("Ledger entries must not carry a zero amount")]
    ZeroAmount,

    #[error("Value not representable as decimal: {value}")]
    NotRepresentable { value: String },
}

/// A notification could not be delivered. Never surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Notification failed: {reason}")]
pub struct NotifyError {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidHeatNumber { heat: 4 };
        assert_eq!(err.to_string(), "Invalid heat number: 4 (expected 1..=3)");
    }

    #[test]
    fn test_match_error_from_conflict() {
        let conflict = ConflictError::HeatNotActive {
            status: HeatStatus::Countdown,
        };
        let err: MatchError = conflict.into();
        assert!(matches!(err, MatchError::Conflict(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_anti_cheat_classification() {
        let err: MatchError = AntiCheatError::ScoreExceedsCeiling {
            requested: Decimal::from(400),
            max_allowed: Decimal::from(100),
            heat_time_ms: 5_000,
        }
        .into();
        assert!(err.is_anti_cheat());
        assert!(err.to_string().contains("400"));
    }

    #[test]
    fn test_fairness_errors_are_final() {
        let err = MatchError::Fairness {
            reason: "payload not serializable".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_anti_cheat());
    }

    #[test]
    fn test_storage_errors_are_retryable() {
        let err: MatchError = StorageError::Unavailable {
            reason: "connection reset".to_string(),
        }
        .into();
        assert!(err.is_retryable());
    }
}
