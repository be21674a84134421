//! Simulated drivers
//!
//! Ghosts are seed-bound: their lock time for a heat is derived from that
//! heat's committed seed, so a revealed payload reproduces every ghost run.
//! Live drivers use a seeded ChaCha RNG so scenarios are repeatable.

use race_core::{derive_value, FairnessEngine, PhysicsModel};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::MoneyError;
use types::fairness::CommitmentPayload;
use types::ids::ParticipantId;
use types::numeric::from_f64_truncated;
use types::status::HeatNumber;

/// Window in which simulated drivers lock, in ms after the heat goes active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    pub min_lock_ms: u64,
    pub max_lock_ms: u64,
    /// Chance a live driver crashes out of a heat
    pub crash_probability: f64,
    /// Fraction of the ceiling a live driver reaches, lower bound
    pub min_skill: f64,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            min_lock_ms: 8_000,
            max_lock_ms: 24_000,
            crash_probability: 0.05,
            min_skill: 0.9,
        }
    }
}

/// What a driver does in one heat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PilotAction {
    Lock { after_ms: u64, score: Decimal },
    Crash { after_ms: u64 },
    /// Submits above the ceiling for its lock time
    Cheat { after_ms: u64, score: Decimal },
}

impl PilotAction {
    pub fn after_ms(&self) -> u64 {
        match self {
            PilotAction::Lock { after_ms, .. }
            | PilotAction::Crash { after_ms }
            | PilotAction::Cheat { after_ms, .. } => *after_ms,
        }
    }
}

/// Replays a ghost from the committed heat seeds.
#[derive(Debug, Clone)]
pub struct GhostPilot {
    pub participant_id: ParticipantId,
    pub replay_source_id: String,
    physics: PhysicsModel,
    fairness: FairnessEngine,
}

impl GhostPilot {
    pub fn new(participant_id: ParticipantId, replay_source_id: impl Into<String>) -> Self {
        Self {
            participant_id,
            replay_source_id: replay_source_id.into(),
            physics: PhysicsModel::default(),
            fairness: FairnessEngine::new(),
        }
    }

    /// Lock time and score for `heat`; `speed_at` of the derived time.
    pub fn plan(
        &self,
        payload: &CommitmentPayload,
        heat: HeatNumber,
        config: &PilotConfig,
    ) -> Result<PilotAction, MoneyError> {
        let seed = self.fairness.heat_seed(payload, heat);
        let context = format!("ghost:{}:{}", self.replay_source_id, heat.get());
        let span = config.max_lock_ms.saturating_sub(config.min_lock_ms).max(1);
        let after_ms = config.min_lock_ms + derive_value(seed, &context) % span;
        let score = from_f64_truncated(self.physics.speed_at(after_ms as f64 / 1000.0))?;
        Ok(PilotAction::Lock { after_ms, score })
    }
}

/// Live driver with a repeatable random style.
#[derive(Debug, Clone)]
pub struct LivePilot {
    pub participant_id: ParticipantId,
    pub cheater: bool,
    physics: PhysicsModel,
    rng: ChaCha8Rng,
}

impl LivePilot {
    pub fn new(participant_id: ParticipantId, seed: u64, cheater: bool) -> Self {
        Self {
            participant_id,
            cheater,
            physics: PhysicsModel::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn plan(&mut self, config: &PilotConfig) -> Result<PilotAction, MoneyError> {
        let hi = config.max_lock_ms.max(config.min_lock_ms);
        let after_ms = self.rng.gen_range(config.min_lock_ms..=hi);
        let t = after_ms as f64 / 1000.0;

        if self.cheater {
            // two seconds ahead of the curve
            let score = from_f64_truncated(self.physics.speed_at(t + 2.0))?;
            return Ok(PilotAction::Cheat { after_ms, score });
        }
        if self.rng.gen_bool(config.crash_probability.clamp(0.0, 1.0)) {
            return Ok(PilotAction::Crash { after_ms });
        }

        let skill = self.rng.gen_range(config.min_skill.clamp(0.0, 1.0)..=1.0);
        let score = from_f64_truncated(self.physics.speed_at(t) * skill)?;
        Ok(PilotAction::Lock { after_ms, score })
    }
}
