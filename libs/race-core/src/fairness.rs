//! Provable Fairness Engine: commit before play, reveal at settlement
//!
//! Three independent 256-bit seeds (one per heat) are drawn from OS entropy
//! when a match is created. The SHA-256 of their canonical JSON encoding is
//! published up front; the payload itself is revealed once the match is
//! settled so anyone can recompute the hash.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use types::errors::MatchError;
use types::fairness::CommitmentPayload;
use types::ids::MatchId;
use types::status::HeatNumber;

/// Bytes per heat seed.
pub const SEED_BYTES: usize = 32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FairnessError {
    #[error("Payload serialization failed: {0}")]
    Serialization(String),
}

impl From<FairnessError> for MatchError {
    fn from(e: FairnessError) -> Self {
        MatchError::Fairness { reason: e.to_string() }
    }
}

/// Stateless commitment scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct FairnessEngine;

impl FairnessEngine {
    pub fn new() -> Self {
        Self
    }

    /// Draw the per-heat seeds for `match_id`.
    pub fn generate_seeds(&self, match_id: MatchId, now: DateTime<Utc>) -> CommitmentPayload {
        let mut rng = OsRng;
        let seeds = std::array::from_fn(|_| {
            let mut seed = [0u8; SEED_BYTES];
            rng.fill_bytes(&mut seed);
            hex::encode(seed)
        });
        CommitmentPayload {
            match_id,
            seeds,
            created_at: now.timestamp(),
        }
    }

    /// Canonical bytes: compact JSON in declaration order.
    pub fn canonical_bytes(&self, payload: &CommitmentPayload) -> Result<Vec<u8>, FairnessError> {
        serde_json::to_vec(payload).map_err(|e| FairnessError::Serialization(e.to_string()))
    }

    /// Hex SHA-256 of the canonical payload.
    pub fn commit_hash(&self, payload: &CommitmentPayload) -> Result<String, FairnessError> {
        let bytes = self.canonical_bytes(payload)?;
        let digest = Sha256::digest(&bytes);
        Ok(hex::encode(digest))
    }

    /// Recompute the hash of a revealed payload and compare.
    pub fn verify(&self, payload: &CommitmentPayload, hash: &str) -> bool {
        match self.commit_hash(payload) {
            Ok(computed) => computed.eq_ignore_ascii_case(hash),
            Err(_) => false,
        }
    }

    /// Seed committed for `heat`.
    pub fn heat_seed<'a>(&self, payload: &'a CommitmentPayload, heat: HeatNumber) -> &'a str {
        &payload.seeds[heat.index()]
    }
}

/// Seed-bound deterministic value: first 8 bytes of
/// `SHA-256(seed ":" context)` as big-endian `u64`.
pub fn derive_value(seed: &str, context: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(context.as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}
