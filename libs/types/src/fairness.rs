//! Provable-fairness commitment payload
//!
//! Only the data shape lives here; hashing and verification are in
//! `race_core::fairness`.

use serde::{Deserialize, Serialize};

use crate::ids::MatchId;
use crate::status::HEATS_PER_MATCH;

/// Seeds fixed before the first heat and revealed at settlement.
///
/// Field order is the canonical serialization order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentPayload {
    pub match_id: MatchId,
    /// One hex-encoded 256-bit seed per heat
    pub seeds: [String; HEATS_PER_MATCH as usize],
    /// Unix seconds at generation
    pub created_at: i64,
}

/// What observers receive once the match is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairnessReveal {
    pub payload: CommitmentPayload,
    pub commit_hash: String,
}
