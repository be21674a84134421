//! Match State Store
//!
//! One [`MatchState`] per match behind a `DashMap`, so every mutation holds
//! only its own match's shard lock. Each method validates and mutates under
//! that lock and hands back an owned snapshot; callers never see a
//! half-applied change and never hold the lock across I/O.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;
use types::errors::{ConflictError, MatchError, ValidationError};
use types::ids::{MatchId, ParticipantId};
use types::league::League;
use types::status::{HeatNumber, HeatStatus, MatchStatus};

use crate::state::{MatchState, PlayerState};

/// Result of a successful lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOutcome {
    pub heat: HeatNumber,
    pub score: Decimal,
    pub locked_at: DateTime<Utc>,
    pub heat_rank: u32,
    pub total_score: Decimal,
    /// No alive, unlocked player remains in the heat
    pub heat_resolved: bool,
}

/// What `end_heat` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeatEnd {
    /// This call closed the heat; snapshot taken right after.
    Ended(Box<MatchState>),
    /// The heat was not active (already ended, different heat, aborted).
    Skipped,
}

#[derive(Debug, Default)]
pub struct MatchStateStore {
    matches: DashMap<MatchId, MatchState>,
}

impl MatchStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        match_id: MatchId,
        league: League,
        players: Vec<PlayerState>,
        now: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        match self.matches.entry(match_id) {
            Entry::Occupied(_) => Err(ConflictError::MatchExists { match_id }.into()),
            Entry::Vacant(slot) => {
                slot.insert(MatchState::new(match_id, league, players, now));
                debug!(match_id = %match_id, "Match state created");
                Ok(())
            }
        }
    }

    /// Deep copy of the current state.
    pub fn get(&self, match_id: MatchId) -> Result<MatchState, MatchError> {
        self.matches
            .get(&match_id)
            .map(|state| state.clone())
            .ok_or_else(|| ConflictError::MatchNotFound { match_id }.into())
    }

    pub fn contains(&self, match_id: MatchId) -> bool {
        self.matches.contains_key(&match_id)
    }

    pub fn set_status(&self, match_id: MatchId, status: MatchStatus) -> Result<(), MatchError> {
        self.with_match(match_id, |state| {
            state.status = status;
            Ok(())
        })
    }

    /// Mark a running or forming match aborted; fails once terminal.
    pub fn abort(&self, match_id: MatchId) -> Result<(), MatchError> {
        self.with_match(match_id, |state| {
            if state.status.is_terminal() {
                return Err(ConflictError::MatchNotInProgress { status: state.status }.into());
            }
            state.status = MatchStatus::Aborted;
            Ok(())
        })
    }

    /// Enter the countdown of `heat`.
    ///
    /// Heat 1 starts from `Waiting`, later heats from the previous heat's
    /// `Intermission`; anything else is an out-of-order transition.
    pub fn start_heat(&self, match_id: MatchId, heat: u8, now: DateTime<Utc>) -> Result<MatchState, MatchError> {
        let heat = HeatNumber::new(heat)?;
        self.with_match(match_id, |state| {
            if state.status != MatchStatus::InProgress {
                return Err(ConflictError::MatchNotInProgress { status: state.status }.into());
            }
            let expected_from = if heat == HeatNumber::FIRST {
                HeatStatus::Waiting
            } else {
                HeatStatus::Intermission
            };
            if state.current_heat + 1 != heat.get() || state.heat_status != expected_from {
                return Err(ConflictError::InvalidHeatTransition {
                    from: state.current_heat,
                    to: heat.get(),
                }
                .into());
            }
            state.begin_heat(heat, now);
            Ok(state.clone())
        })
    }

    /// Countdown to Active for `heat`. Returns `false` when the state has
    /// already moved on.
    pub fn activate_heat(&self, match_id: MatchId, heat: HeatNumber) -> Result<bool, MatchError> {
        self.with_match(match_id, |state| {
            if state.status != MatchStatus::InProgress
                || state.current_heat != heat.get()
                || state.heat_status != HeatStatus::Countdown
            {
                return Ok(false);
            }
            state.heat_status = HeatStatus::Active;
            Ok(true)
        })
    }

    /// Close `heat` if it is still the active heat.
    ///
    /// Ranks the heat; after heat 3 also completes the match and assigns
    /// final ranks, otherwise moves to `Intermission`.
    pub fn end_heat(&self, match_id: MatchId, heat: HeatNumber, now: DateTime<Utc>) -> Result<HeatEnd, MatchError> {
        self.with_match(match_id, |state| {
            if state.status != MatchStatus::InProgress
                || state.current_heat != heat.get()
                || state.heat_status != HeatStatus::Active
            {
                return Ok(HeatEnd::Skipped);
            }
            state.heat_ended_at = Some(now);
            state.rank_heat(heat);
            if heat.is_last() {
                state.heat_status = HeatStatus::Completed;
                state.status = MatchStatus::Completed;
                state.rank_final();
            } else {
                state.heat_status = HeatStatus::Intermission;
            }
            Ok(HeatEnd::Ended(Box::new(state.clone())))
        })
    }

    /// Record `score` for the player in `heat`, which must be the active heat.
    pub fn lock_player_score(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        heat: HeatNumber,
        score: Decimal,
        now: DateTime<Utc>,
    ) -> Result<LockOutcome, MatchError> {
        if score < Decimal::ZERO {
            return Err(ValidationError::NegativeScore { score }.into());
        }
        self.with_match(match_id, |state| {
            if state.status != MatchStatus::InProgress {
                return Err(ConflictError::MatchNotInProgress { status: state.status }.into());
            }
            if state.current_heat != heat.get() || state.heat_status != HeatStatus::Active {
                return Err(ConflictError::HeatNotActive { status: state.heat_status }.into());
            }
            let player = state
                .player_mut(participant_id)
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
            if !player.scores.record(heat, score) {
                return Err(ConflictError::ScoreAlreadySet {
                    participant_id,
                    heat: heat.get(),
                }
                .into());
            }
            player.locked = true;
            player.locked_at = Some(now);
            let total_score = player.total_score();

            let heat_rank = state
                .provisional_heat_rank(participant_id, heat)
                .unwrap_or(1);
            Ok(LockOutcome {
                heat,
                score,
                locked_at: now,
                heat_rank,
                total_score,
                heat_resolved: state.heat_resolved(),
            })
        })
    }

    /// Take a player out of the current heat without a score.
    ///
    /// Returns whether the heat is now resolved.
    pub fn forfeit_player(&self, match_id: MatchId, participant_id: ParticipantId) -> Result<bool, MatchError> {
        self.with_match(match_id, |state| {
            if state.status != MatchStatus::InProgress {
                return Err(ConflictError::MatchNotInProgress { status: state.status }.into());
            }
            if !matches!(state.heat_status, HeatStatus::Countdown | HeatStatus::Active) {
                return Err(ConflictError::HeatNotActive { status: state.heat_status }.into());
            }
            let heat = state.current_heat;
            let player = state
                .player_mut(participant_id)
                .ok_or(ConflictError::PlayerNotFound { participant_id })?;
            if player.locked {
                return Err(ConflictError::AlreadyLocked { participant_id, heat }.into());
            }
            if !player.alive {
                return Err(ConflictError::PlayerNotAlive { participant_id }.into());
            }
            player.alive = false;
            Ok(state.heat_resolved())
        })
    }

    /// Ids of every match currently `InProgress`.
    pub fn list_active_matches(&self) -> Vec<MatchId> {
        self.matches
            .iter()
            .filter(|entry| entry.status == MatchStatus::InProgress)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn remove(&self, match_id: MatchId) -> Option<MatchState> {
        self.matches.remove(&match_id).map(|(_, state)| state)
    }

    /// Drop every aborted match; returns how many were evicted.
    pub fn purge_aborted(&self) -> usize {
        let before = self.matches.len();
        self.matches.retain(|_, state| state.status != MatchStatus::Aborted);
        before.saturating_sub(self.matches.len())
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    fn with_match<T>(
        &self,
        match_id: MatchId,
        f: impl FnOnce(&mut MatchState) -> Result<T, MatchError>,
    ) -> Result<T, MatchError> {
        let mut state = self
            .matches
            .get_mut(&match_id)
            .ok_or(ConflictError::MatchNotFound { match_id })?;
        f(&mut state)
    }
}
