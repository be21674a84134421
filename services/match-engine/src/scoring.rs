//! Score Locking Service
//!
//! Validates a submitted score against the physics ceiling for the time
//! actually spent in the active window, then records it through the state
//! store's atomic check-then-set. Anti-cheat rejections are logged on the
//! `anti_cheat` target.

use chrono::{DateTime, Utc};
use race_core::PhysicsModel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::repository::Repository;
use std::sync::Arc;
use tracing::{info, warn};
use types::errors::{AntiCheatError, ConflictError, MatchError, ValidationError};
use types::ids::{MatchId, ParticipantId};
use types::status::{HeatNumber, HeatStatus, MatchStatus};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::lifecycle::HeatLifecycle;
use crate::store::MatchStateStore;

/// Returned to the submitting player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReceipt {
    pub match_id: MatchId,
    pub participant_id: ParticipantId,
    pub score: Decimal,
    pub heat: HeatNumber,
    pub locked_at: DateTime<Utc>,
    pub heat_rank: u32,
    pub total_score: Decimal,
}

pub struct ScoreLockingService {
    store: Arc<MatchStateStore>,
    lifecycle: Arc<HeatLifecycle>,
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    physics: PhysicsModel,
    countdown_ms: i64,
    latency_tolerance_ms: u64,
}

impl ScoreLockingService {
    pub fn new(
        store: Arc<MatchStateStore>,
        lifecycle: Arc<HeatLifecycle>,
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            lifecycle,
            repo,
            clock,
            physics: PhysicsModel::default(),
            countdown_ms: i64::try_from(config.timing.countdown_ms).unwrap_or(i64::MAX),
            latency_tolerance_ms: config.latency_tolerance_ms,
        }
    }

    pub async fn lock_score(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        requested: Decimal,
    ) -> Result<LockReceipt, MatchError> {
        match self.try_lock(match_id, participant_id, requested).await {
            Ok(receipt) => Ok(receipt),
            Err(e) if e.is_anti_cheat() => {
                warn!(
                    target: "anti_cheat",
                    match_id = %match_id,
                    participant_id = %participant_id,
                    requested = %requested,
                    error = %e,
                    "Score rejected by physics ceiling"
                );
                Err(e)
            }
            Err(e) => {
                info!(
                    match_id = %match_id,
                    participant_id = %participant_id,
                    error = %e,
                    "Score lock rejected"
                );
                Err(e)
            }
        }
    }

    async fn try_lock(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        requested: Decimal,
    ) -> Result<LockReceipt, MatchError> {
        let state = self.store.get(match_id)?;
        if state.status != MatchStatus::InProgress {
            return Err(ConflictError::MatchNotInProgress { status: state.status }.into());
        }
        let (Some(heat), Some(heat_started_at), HeatStatus::Active) =
            (state.heat(), state.heat_started_at, state.heat_status)
        else {
            return Err(ConflictError::HeatNotActive { status: state.heat_status }.into());
        };

        let player = state
            .player(participant_id)
            .ok_or(ConflictError::PlayerNotFound { participant_id })?;
        if player.locked {
            return Err(ConflictError::AlreadyLocked {
                participant_id,
                heat: heat.get(),
            }
            .into());
        }
        if !player.alive {
            return Err(ConflictError::PlayerNotAlive { participant_id }.into());
        }
        if requested < Decimal::ZERO {
            return Err(ValidationError::NegativeScore { score: requested }.into());
        }

        let now = self.clock.now();
        let heat_time_ms = (now - heat_started_at).num_milliseconds() - self.countdown_ms;
        self.check_ceiling(requested, heat_time_ms)?;

        let outcome = self
            .store
            .lock_player_score(match_id, participant_id, heat, requested, now)?;

        if let Err(e) = self
            .repo
            .record_heat_score(match_id, participant_id, heat, requested)
            .await
        {
            warn!(match_id = %match_id, participant_id = %participant_id, error = %e, "Score not persisted; flushed at completion");
        }

        if outcome.heat_resolved {
            self.lifecycle.spawn_early_end(match_id, heat);
        }

        Ok(LockReceipt {
            match_id,
            participant_id,
            score: outcome.score,
            heat: outcome.heat,
            locked_at: outcome.locked_at,
            heat_rank: outcome.heat_rank,
            total_score: outcome.total_score,
        })
    }

    /// Reject scores above `speed_at(heat_time + tolerance)` and anything
    /// submitted before the active window opened.
    pub fn check_ceiling(&self, requested: Decimal, heat_time_ms: i64) -> Result<(), MatchError> {
        if heat_time_ms < 0 {
            return Err(AntiCheatError::SubmittedDuringCountdown { heat_time_ms }.into());
        }
        let t = heat_time_ms as f64 / 1000.0 + self.latency_tolerance_ms as f64 / 1000.0;
        let max_allowed = self.physics.max_score_at(t)?;
        if requested > max_allowed {
            return Err(AntiCheatError::ScoreExceedsCeiling {
                requested,
                max_allowed,
                heat_time_ms,
            }
            .into());
        }
        Ok(())
    }
}
