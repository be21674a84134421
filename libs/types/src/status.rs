//! Match and heat status types
//!
//! Heat number and heat status together decide which operations are legal
//! at any moment in a match.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Number of heats in every match.
pub const HEATS_PER_MATCH: u8 = 3;

/// Number of seats in every match, live and ghost combined.
pub const PARTICIPANTS_PER_MATCH: usize = 10;

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Created from a roster, heats not yet running
    Forming,
    /// Heats are running
    InProgress,
    /// Heat 3 finished (terminal)
    Completed,
    /// Stopped by an operator (terminal)
    Aborted,
}

impl MatchStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Aborted)
    }
}

/// Heat status within a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeatStatus {
    /// Before heat 1
    Waiting,
    /// Pre-heat countdown, locks rejected
    Countdown,
    /// Racing, locks accepted
    Active,
    /// Between heats
    Intermission,
    /// Heat over, results computed
    Completed,
}

/// Validated heat number in `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HeatNumber(u8);

impl HeatNumber {
    pub const FIRST: HeatNumber = HeatNumber(1);
    pub const LAST: HeatNumber = HeatNumber(HEATS_PER_MATCH);

    pub fn new(heat: u8) -> Result<Self, ValidationError> {
        if (1..=HEATS_PER_MATCH).contains(&heat) {
            Ok(Self(heat))
        } else {
            Err(ValidationError::InvalidHeatNumber { heat })
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based slot in a per-heat score array.
    pub fn index(&self) -> usize {
        usize::from(self.0 - 1)
    }

    pub fn next(&self) -> Option<HeatNumber> {
        HeatNumber::new(self.0 + 1).ok()
    }

    pub fn is_last(&self) -> bool {
        self.0 == HEATS_PER_MATCH
    }
}

impl TryFrom<u8> for HeatNumber {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        HeatNumber::new(value)
    }
}

impl From<HeatNumber> for u8 {
    fn from(heat: HeatNumber) -> Self {
        heat.0
    }
}

impl std::fmt::Display for HeatNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
