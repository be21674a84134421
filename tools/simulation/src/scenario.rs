//! Whole-match scenario runner
//!
//! Builds a roster, drives every seat through three heats against a real
//! [`MatchEngine`], waits for settlement, then audits the lock timeline and
//! the match's ledger postings.

use chrono::{DateTime, Utc};
use match_engine::{CreatedMatch, EngineConfig, MatchEngine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::repository::{LedgerRepository, MatchRepository};
use settlement::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use types::errors::{ConflictError, MatchError, StorageError};
use types::events::RecordingSink;
use types::fairness::CommitmentPayload;
use types::ids::{MatchId, ParticipantId, UserId};
use types::league::League;
use types::ledger::Currency;
use types::numeric::checked_sum;
use types::roster::RosterEntry;
use types::status::{HeatNumber, HeatStatus, MatchStatus, HEATS_PER_MATCH, PARTICIPANTS_PER_MATCH};

use crate::audit::{AuditReport, LockAudit, LockRecord};
use crate::pilots::{GhostPilot, LivePilot, PilotAction, PilotConfig};

const POLL: Duration = Duration::from_millis(10);
const MAX_POLLS: usize = 20_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub league: League,
    /// Remaining seats are ghosts
    pub live_players: usize,
    /// Live seats, counted from the first, that submit above the ceiling
    pub cheaters: usize,
    pub seed: u64,
    pub pilots: PilotConfig,
    pub engine: EngineConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            league: League::Street,
            live_players: 7,
            cheaters: 0,
            seed: 1,
            pilots: PilotConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatResult {
    pub display_name: String,
    pub is_ghost: bool,
    pub total_score: Decimal,
    pub final_rank: Option<u32>,
    pub prize: Decimal,
    pub burn_reward: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub match_id: MatchId,
    pub league: League,
    pub seats: Vec<SeatResult>,
    pub accepted_locks: usize,
    /// Actions that came due after the heat had already closed
    pub missed_actions: usize,
    pub crashes: usize,
    pub anti_cheat_rejections: usize,
    pub audit: AuditReport,
    /// Sum of the match's postings per currency; zero when conserved
    pub fuel_net: Decimal,
    pub burn_net: Decimal,
    pub events_published: usize,
}

impl ScenarioReport {
    pub fn is_conserved(&self) -> bool {
        self.fuel_net.is_zero() && self.burn_net.is_zero()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

enum Seat {
    Live(LivePilot),
    Ghost(GhostPilot),
}

#[derive(Default)]
struct Tally {
    locks: Vec<LockRecord>,
    missed: usize,
    crashes: usize,
    rejections: usize,
}

pub struct ScenarioRunner {
    config: ScenarioConfig,
    store: Arc<InMemoryStore>,
    sink: Arc<RecordingSink>,
    engine: Arc<MatchEngine>,
}

impl ScenarioRunner {
    /// Must be called inside a tokio runtime.
    pub fn new(config: ScenarioConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let engine = MatchEngine::new(config.engine, store.clone(), sink.clone());
        Self {
            config,
            store,
            sink,
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<MatchEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub async fn run(&self) -> Result<ScenarioReport, MatchError> {
        let roster = self.roster();
        let created = self.engine.create_match(self.config.league, roster.clone()).await?;
        let match_id = created.match_id;
        info!(match_id = %match_id, seed = self.config.seed, "Scenario started");

        let payload = self.payload(match_id).await?;
        let mut seats = self.seats(&created, &roster);
        let mut tally = Tally::default();

        for heat in 1..=HEATS_PER_MATCH {
            let heat = HeatNumber::new(heat)?;
            let activated_at = self.wait_for_active(match_id, heat).await?;
            self.drive_heat(match_id, heat, activated_at, &payload, &mut seats, &mut tally)
                .await?;
            self.wait_for_heat_end(match_id, heat).await?;
        }
        self.wait_for_settlement(match_id).await?;

        let audit = LockAudit::new(self.config.engine.latency_tolerance_ms).run(&tally.locks);
        let entries = self.store.entries_for_reference(match_id).await?;
        let net = |currency: Currency| checked_sum(entries.iter().filter(|e| e.currency == currency).map(|e| e.amount));
        let seats = self
            .store
            .list_participants(match_id)
            .await?
            .into_iter()
            .map(|p| SeatResult {
                display_name: p.display_name,
                is_ghost: p.is_ghost,
                total_score: p.total_score,
                final_rank: p.final_rank,
                prize: p.prize,
                burn_reward: p.burn_reward,
            })
            .collect();

        let report = ScenarioReport {
            match_id,
            league: self.config.league,
            seats,
            accepted_locks: tally.locks.len(),
            missed_actions: tally.missed,
            crashes: tally.crashes,
            anti_cheat_rejections: tally.rejections,
            audit,
            fuel_net: net(Currency::Fuel)?,
            burn_net: net(Currency::Burn)?,
            events_published: self.sink.events().len(),
        };
        info!(
            match_id = %match_id,
            locks = report.accepted_locks,
            rejections = report.anti_cheat_rejections,
            conserved = report.is_conserved(),
            "Scenario finished"
        );
        Ok(report)
    }

    fn roster(&self) -> Vec<RosterEntry> {
        let buyin = self.config.league.buyin();
        let live = self.config.live_players.min(PARTICIPANTS_PER_MATCH);
        (0..PARTICIPANTS_PER_MATCH)
            .map(|seat| {
                if seat < live {
                    RosterEntry::live(UserId::new(), format!("driver-{}", seat), buyin)
                } else {
                    RosterEntry::ghost(format!("ghost-{}", seat), format!("replay-{}-{}", self.config.seed, seat), buyin)
                }
            })
            .collect()
    }

    fn seats(&self, created: &CreatedMatch, roster: &[RosterEntry]) -> Vec<(ParticipantId, Seat)> {
        created
            .participants
            .iter()
            .zip(roster)
            .enumerate()
            .map(|(idx, (pid, entry))| {
                let seat = match &entry.ghost_replay_source_id {
                    Some(source) if entry.is_ghost => Seat::Ghost(GhostPilot::new(*pid, source.clone())),
                    _ => Seat::Live(LivePilot::new(
                        *pid,
                        self.config.seed.wrapping_add(idx as u64),
                        idx < self.config.cheaters,
                    )),
                };
                (*pid, seat)
            })
            .collect()
    }

    async fn payload(&self, match_id: MatchId) -> Result<CommitmentPayload, MatchError> {
        self.store
            .get_match(match_id)
            .await?
            .map(|record| record.fairness_payload)
            .ok_or_else(|| {
                StorageError::NotFound {
                    what: format!("match {}", match_id),
                }
                .into()
            })
    }

    async fn drive_heat(
        &self,
        match_id: MatchId,
        heat: HeatNumber,
        activated_at: DateTime<Utc>,
        payload: &CommitmentPayload,
        seats: &mut [(ParticipantId, Seat)],
        tally: &mut Tally,
    ) -> Result<(), MatchError> {
        let mut plan = Vec::with_capacity(seats.len());
        for (pid, seat) in seats.iter_mut() {
            let action = match seat {
                Seat::Ghost(ghost) => ghost.plan(payload, heat, &self.config.pilots)?,
                Seat::Live(pilot) => pilot.plan(&self.config.pilots)?,
            };
            plan.push((*pid, action));
        }
        plan.sort_by_key(|(_, action)| action.after_ms());

        let planned = plan.len();
        for (done, (pid, action)) in plan.into_iter().enumerate() {
            let elapsed = (self.engine.now() - activated_at).num_milliseconds().max(0) as u64;
            let wait = action.after_ms().saturating_sub(elapsed);
            if wait > 0 {
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }
            // live seats are done and the heat ended early; ghosts still due sit it out
            if !self.heat_open(match_id, heat) {
                tally.missed += planned - done;
                break;
            }

            match action {
                PilotAction::Crash { .. } => {
                    self.engine.forfeit(match_id, pid).await?;
                    tally.crashes += 1;
                }
                PilotAction::Lock { score, .. } | PilotAction::Cheat { score, .. } => {
                    match self.engine.lock_score(match_id, pid, score).await {
                        Ok(receipt) => tally.locks.push(LockRecord {
                            participant_id: pid,
                            heat,
                            score: receipt.score,
                            elapsed_ms: (receipt.locked_at - activated_at).num_milliseconds(),
                        }),
                        Err(e) if e.is_anti_cheat() => tally.rejections += 1,
                        Err(MatchError::Conflict(ConflictError::HeatNotActive { .. })) => tally.missed += 1,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        debug!(match_id = %match_id, heat = heat.get(), missed = tally.missed, "Heat driven");
        Ok(())
    }

    fn heat_open(&self, match_id: MatchId, heat: HeatNumber) -> bool {
        self.engine
            .snapshot(match_id)
            .is_ok_and(|state| state.heat() == Some(heat) && state.heat_status == HeatStatus::Active)
    }

    /// Poll until `heat` is active; returns the start of its active window.
    async fn wait_for_active(&self, match_id: MatchId, heat: HeatNumber) -> Result<DateTime<Utc>, MatchError> {
        let countdown = chrono::Duration::milliseconds(self.config.engine.timing.countdown_ms as i64);
        for _ in 0..MAX_POLLS {
            let state = self.engine.snapshot(match_id)?;
            if state.heat() == Some(heat) && state.heat_status == HeatStatus::Active {
                if let Some(started) = state.heat_started_at {
                    return Ok(started + countdown);
                }
            }
            tokio::time::sleep(POLL).await;
        }
        Err(timed_out(match_id, "heat activation"))
    }

    async fn wait_for_heat_end(&self, match_id: MatchId, heat: HeatNumber) -> Result<(), MatchError> {
        for _ in 0..MAX_POLLS {
            match self.engine.snapshot(match_id) {
                Ok(state) if state.heat() == Some(heat) && state.heat_status == HeatStatus::Active => {}
                // evicted after settlement also counts
                _ => return Ok(()),
            }
            tokio::time::sleep(POLL).await;
        }
        Err(timed_out(match_id, "heat end"))
    }

    async fn wait_for_settlement(&self, match_id: MatchId) -> Result<(), MatchError> {
        for _ in 0..MAX_POLLS {
            let settled = self
                .store
                .get_match(match_id)
                .await?
                .is_some_and(|record| record.status == MatchStatus::Completed);
            if settled && !self.engine.active_matches().contains(&match_id) {
                return Ok(());
            }
            tokio::time::sleep(POLL).await;
        }
        Err(timed_out(match_id, "settlement"))
    }
}

fn timed_out(match_id: MatchId, what: &str) -> MatchError {
    StorageError::Unavailable {
        reason: format!("match {} timed out waiting for {}", match_id, what),
    }
    .into()
}
