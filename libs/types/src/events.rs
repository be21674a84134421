//! Match lifecycle notifications
//!
//! Events are immutable records handed to the external pub/sub transport.
//! Delivery is fire-and-forget: a failed publish is logged by the emitter
//! and never unwinds the state change that produced it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::errors::NotifyError;
use crate::fairness::FairnessReveal;
use crate::ids::{MatchId, ParticipantId, UserId};
use crate::league::League;
use crate::ledger::Currency;
use crate::status::{HeatNumber, HEATS_PER_MATCH};

/// A seat as shown in heat announcements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub is_ghost: bool,
    pub total_score: Decimal,
}

/// What the target line on the track represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKind {
    /// Winning score of heat 1 (shown in heat 2)
    PreviousHeatWinner,
    /// Current total-score leader (shown in heat 3)
    OverallLeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLine {
    pub kind: TargetKind,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub score: Decimal,
}

/// One row of a heat's results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatResult {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub score: Option<Decimal>,
    pub position: u32,
    pub crashed: bool,
}

/// Running standings after a heat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub total_score: Decimal,
    pub rank: u32,
}

/// Final placing with payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStanding {
    pub participant_id: ParticipantId,
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub is_ghost: bool,
    pub heat_scores: [Option<Decimal>; HEATS_PER_MATCH as usize],
    pub total_score: Decimal,
    pub rank: u32,
    pub prize: Decimal,
    pub burn_reward: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeLine {
    pub rank: u32,
    pub fuel: Decimal,
    pub burn: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDelta {
    pub currency: Currency,
    pub amount: Decimal,
}

/// All notifications emitted by the match engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum MatchEvent {
    HeatStarted {
        match_id: MatchId,
        heat: HeatNumber,
        participants: Vec<ParticipantView>,
        target: Option<TargetLine>,
        countdown_ms: u64,
        duration_ms: u64,
        started_at: DateTime<Utc>,
    },
    HeatEnded {
        match_id: MatchId,
        heat: HeatNumber,
        results: Vec<HeatResult>,
        standings: Vec<Standing>,
        ended_at: DateTime<Utc>,
    },
    MatchSettled {
        match_id: MatchId,
        league: League,
        prize_pool: Decimal,
        standings: Vec<FinalStanding>,
        prize_table: Vec<PrizeLine>,
        fairness: FairnessReveal,
        settled_at: DateTime<Utc>,
    },
    BalanceUpdated {
        match_id: MatchId,
        user_id: UserId,
        deltas: Vec<CurrencyDelta>,
    },
}

impl MatchEvent {
    pub fn match_id(&self) -> MatchId {
        match self {
            MatchEvent::HeatStarted { match_id, .. }
            | MatchEvent::HeatEnded { match_id, .. }
            | MatchEvent::MatchSettled { match_id, .. }
            | MatchEvent::BalanceUpdated { match_id, .. } => *match_id,
        }
    }

    /// Short label for logs
    pub fn event_type_label(&self) -> &'static str {
        match self {
            MatchEvent::HeatStarted { .. } => "heat_started",
            MatchEvent::HeatEnded { .. } => "heat_ended",
            MatchEvent::MatchSettled { .. } => "match_settled",
            MatchEvent::BalanceUpdated { .. } => "balance_updated",
        }
    }
}

/// Outbound notification transport.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: MatchEvent) -> Result<(), NotifyError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn publish(&self, _event: MatchEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Keeps every event in memory; used by tests and the simulation harness.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MatchEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<MatchEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type_label() == label)
            .count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, event: MatchEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|_| NotifyError {
                reason: "recording sink poisoned".to_string(),
            })?
            .push(event);
        Ok(())
    }
}
