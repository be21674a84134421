//! Match engine core
//!
//! Main coordinator: creates matches from rosters, routes score locks and
//! forfeits, drives settlement once heat 3 completes.

use chrono::{DateTime, Utc};
use race_core::FairnessEngine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::prizes::Economics;
use settlement::repository::{MatchRecord, ParticipantRecord, Repository};
use settlement::{SettlementEngine, SettlementOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::errors::{ConflictError, MatchError};
use types::events::NotificationSink;
use types::ids::{MatchId, ParticipantId};
use types::league::League;
use types::roster::{validate_roster, RosterEntry};
use types::status::{HeatNumber, MatchStatus};

use crate::clock::{Clock, MonotonicClock};
use crate::config::EngineConfig;
use crate::lifecycle::HeatLifecycle;
use crate::scoring::{LockReceipt, ScoreLockingService};
use crate::state::{MatchState, PlayerState};
use crate::store::MatchStateStore;

/// Returned by [`MatchEngine::create_match`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedMatch {
    pub match_id: MatchId,
    pub league: League,
    /// Published now, verifiable once the seeds are revealed
    pub commit_hash: String,
    /// Roster order
    pub participants: Vec<ParticipantId>,
    pub prize_pool: Decimal,
    pub rake_amount: Decimal,
}

/// Flushes final scores, settles and evicts a completed match.
#[derive(Clone)]
struct Finalizer {
    store: Arc<MatchStateStore>,
    repo: Arc<dyn Repository>,
    settlement: Arc<SettlementEngine>,
}

impl Finalizer {
    async fn finalize(&self, match_id: MatchId) -> Result<SettlementOutcome, MatchError> {
        match self.store.get(match_id) {
            Ok(state) => {
                if state.status != MatchStatus::Completed {
                    return Err(ConflictError::MatchNotComplete {
                        match_id,
                        status: state.status,
                    }
                    .into());
                }
                self.flush_scores(&state).await?;
            }
            // without in-memory state only an existing settlement can be reported
            Err(_) if !self.repo.settlement_exists(match_id).await? => {
                let status = self
                    .repo
                    .get_match(match_id)
                    .await?
                    .ok_or(ConflictError::MatchNotFound { match_id })?
                    .status;
                return Err(ConflictError::MatchNotComplete { match_id, status }.into());
            }
            Err(_) => {}
        }

        let outcome = self.settlement.settle(match_id).await?;
        if self.store.remove(match_id).is_some() {
            debug!(match_id = %match_id, "Match state evicted");
        }
        Ok(outcome)
    }

    /// Write every in-memory heat score the repository does not have yet.
    async fn flush_scores(&self, state: &MatchState) -> Result<(), MatchError> {
        for player in &state.players {
            for (idx, slot) in player.scores.slots().iter().enumerate() {
                let Some(score) = slot else {
                    continue;
                };
                let heat = HeatNumber::new(idx as u8 + 1)?;
                match self
                    .repo
                    .record_heat_score(state.match_id, player.participant_id, heat, *score)
                    .await
                {
                    Ok(()) | Err(MatchError::Conflict(ConflictError::ScoreAlreadySet { .. })) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

pub struct MatchEngine {
    config: EngineConfig,
    store: Arc<MatchStateStore>,
    lifecycle: Arc<HeatLifecycle>,
    scoring: ScoreLockingService,
    finalizer: Finalizer,
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    fairness: FairnessEngine,
    economics: Economics,
}

impl MatchEngine {
    /// Build an engine on the tokio clock. Must be called inside a runtime;
    /// spawns the settlement worker.
    pub fn new(config: EngineConfig, repo: Arc<dyn Repository>, sink: Arc<dyn NotificationSink>) -> Arc<Self> {
        Self::with_clock(config, repo, sink, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        config: EngineConfig,
        repo: Arc<dyn Repository>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let economics = Economics::default();
        let store = Arc::new(MatchStateStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let lifecycle = HeatLifecycle::new(store.clone(), sink.clone(), clock.clone(), config.timing, tx);
        let settlement = Arc::new(SettlementEngine::new(repo.clone(), sink).with_economics(economics.clone()));
        let scoring = ScoreLockingService::new(store.clone(), lifecycle.clone(), repo.clone(), clock.clone(), &config);
        let finalizer = Finalizer {
            store: store.clone(),
            repo: repo.clone(),
            settlement,
        };

        spawn_settlement_worker(finalizer.clone(), rx);

        Arc::new(Self {
            config,
            store,
            lifecycle,
            scoring,
            finalizer,
            repo,
            clock,
            fairness: FairnessEngine::new(),
            economics,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate the roster, commit seeds, persist, and start heat 1.
    pub async fn create_match(&self, league: League, roster: Vec<RosterEntry>) -> Result<CreatedMatch, MatchError> {
        validate_roster(league, &roster)?;
        let split = self.economics.split_roster(&roster)?;

        let match_id = MatchId::new();
        let now = self.clock.now();
        let payload = self.fairness.generate_seeds(match_id, now);
        let commit_hash = self.fairness.commit_hash(&payload)?;

        let players: Vec<PlayerState> = roster
            .iter()
            .enumerate()
            .map(|(seat, entry)| PlayerState::from_roster(seat as u8, entry))
            .collect();
        let participants: Vec<ParticipantRecord> = players.iter().map(|p| participant_record(match_id, p)).collect();
        let ghost_count = players.iter().filter(|p| p.is_ghost).count() as u8;

        let record = MatchRecord {
            match_id,
            league,
            status: MatchStatus::Forming,
            live_count: players.len() as u8 - ghost_count,
            ghost_count,
            total_buyins: split.total_buyins,
            prize_pool: split.prize_pool,
            rake_amount: split.rake,
            commit_hash: commit_hash.clone(),
            fairness_payload: payload,
            seed_revealed: false,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        self.repo.create_match(record, participants).await?;

        let created = CreatedMatch {
            match_id,
            league,
            commit_hash,
            participants: players.iter().map(|p| p.participant_id).collect(),
            prize_pool: split.prize_pool,
            rake_amount: split.rake,
        };

        self.store.create(match_id, league, players, now)?;
        self.store.set_status(match_id, MatchStatus::InProgress)?;
        self.repo
            .update_match_status(match_id, MatchStatus::InProgress, now)
            .await?;
        self.lifecycle.start_countdown(match_id, HeatNumber::FIRST.get()).await?;

        info!(
            match_id = %match_id,
            league = ?league,
            live = created.participants.len() as u8 - ghost_count,
            ghosts = ghost_count,
            prize_pool = %split.prize_pool,
            "Match created"
        );
        Ok(created)
    }

    pub async fn lock_score(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        score: Decimal,
    ) -> Result<LockReceipt, MatchError> {
        self.scoring.lock_score(match_id, participant_id, score).await
    }

    /// Crash or forfeit: the player sits out the current heat with no score.
    pub async fn forfeit(&self, match_id: MatchId, participant_id: ParticipantId) -> Result<(), MatchError> {
        let resolved = self.store.forfeit_player(match_id, participant_id)?;
        info!(match_id = %match_id, participant_id = %participant_id, "Player out of heat");
        if resolved {
            if let Some(heat) = self.store.get(match_id)?.heat() {
                self.lifecycle.spawn_early_end(match_id, heat);
            }
        }
        Ok(())
    }

    /// Stop a match. Pending timers see the status and do nothing; no
    /// settlement runs.
    ///
    /// The repository record is written first; memory only follows once
    /// the abort is durable, so a failed write leaves the match running.
    pub async fn abort_match(&self, match_id: MatchId) -> Result<(), MatchError> {
        let status = self.store.get(match_id)?.status;
        if status.is_terminal() {
            return Err(ConflictError::MatchNotInProgress { status }.into());
        }
        let now = self.clock.now();
        if let Err(e) = self.repo.update_match_status(match_id, MatchStatus::Aborted, now).await {
            warn!(match_id = %match_id, error = %e, "Abort not persisted; match keeps running");
            return Err(e);
        }
        if let Err(e) = self.store.abort(match_id) {
            // heat 3 ended in between; the persisted abort blocks settlement
            warn!(match_id = %match_id, error = %e, "Abort raced match completion");
        }
        warn!(match_id = %match_id, "Match aborted");
        Ok(())
    }

    /// Settle a completed match. Normally done by the settlement worker;
    /// call again to retry after a failure.
    pub async fn settle(&self, match_id: MatchId) -> Result<SettlementOutcome, MatchError> {
        self.finalizer.finalize(match_id).await
    }

    /// Snapshot of in-memory state.
    pub fn snapshot(&self, match_id: MatchId) -> Result<MatchState, MatchError> {
        self.store.get(match_id)
    }

    pub fn active_matches(&self) -> Vec<MatchId> {
        self.store.list_active_matches()
    }

    pub async fn check_timeouts(&self) -> usize {
        self.lifecycle.check_timeouts().await
    }

    /// Periodic lost-timer sweep; also evicts aborted matches.
    pub fn spawn_timeout_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.sweep_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let closed = this.lifecycle.check_timeouts().await;
                let purged = this.store.purge_aborted();
                if closed > 0 || purged > 0 {
                    debug!(closed, purged, "Timeout sweep");
                }
            }
        })
    }

    /// Current time on the engine clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn participant_record(match_id: MatchId, player: &PlayerState) -> ParticipantRecord {
    ParticipantRecord {
        participant_id: player.participant_id,
        match_id,
        seat: player.seat,
        user_id: player.user_id,
        display_name: player.display_name.clone(),
        is_ghost: player.is_ghost,
        ghost_replay_source_id: player.ghost_replay_source_id.clone(),
        scores: player.scores.clone(),
        total_score: Decimal::ZERO,
        final_rank: None,
        prize: Decimal::ZERO,
        burn_reward: Decimal::ZERO,
    }
}

fn spawn_settlement_worker(finalizer: Finalizer, mut completions: mpsc::UnboundedReceiver<MatchId>) {
    tokio::spawn(async move {
        while let Some(match_id) = completions.recv().await {
            match finalizer.finalize(match_id).await {
                Ok(SettlementOutcome::Settled(_)) => {
                    info!(match_id = %match_id, "Completed match settled");
                }
                Ok(SettlementOutcome::AlreadySettled) => {
                    debug!(match_id = %match_id, "Completed match was already settled");
                }
                Err(e) => {
                    error!(
                        match_id = %match_id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Settlement failed; state kept for retry"
                    );
                }
            }
        }
    });
}
