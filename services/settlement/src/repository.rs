//! Persistence seams
//!
//! The engine never talks to a database directly. It calls these traits,
//! which a relational backend implements in production and
//! [`crate::memory::InMemoryStore`] implements for tests and simulation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::MatchError;
use types::fairness::CommitmentPayload;
use types::ids::{MatchId, ParticipantId, UserId};
use types::league::League;
use types::ledger::{Currency, LedgerEntry, LedgerParty, SettlementRecord, Wallet};
use types::scoring::ScoreCard;
use types::status::{HeatNumber, MatchStatus};

/// Persisted match row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub league: League,
    pub status: MatchStatus,
    pub live_count: u8,
    pub ghost_count: u8,
    pub total_buyins: Decimal,
    pub prize_pool: Decimal,
    pub rake_amount: Decimal,
    /// Published before heat 1
    pub commit_hash: String,
    /// Kept secret until `seed_revealed`
    pub fairness_payload: CommitmentPayload,
    pub seed_revealed: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persisted participant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub participant_id: ParticipantId,
    pub match_id: MatchId,
    /// Roster position, used as the last-resort tie-break
    pub seat: u8,
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub is_ghost: bool,
    pub ghost_replay_source_id: Option<String>,
    pub scores: ScoreCard,
    pub total_score: Decimal,
    pub final_rank: Option<u32>,
    pub prize: Decimal,
    pub burn_reward: Decimal,
}

impl ParticipantRecord {
    pub fn is_live(&self) -> bool {
        !self.is_ghost
    }
}

/// Final placing written back to a participant at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub participant_id: ParticipantId,
    pub final_rank: u32,
    pub prize: Decimal,
    pub burn_reward: Decimal,
}

/// Everything settlement writes, applied as one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementCommit {
    pub match_id: MatchId,
    pub entries: Vec<LedgerEntry>,
    pub results: Vec<ParticipantResult>,
    pub completed_at: DateTime<Utc>,
}

/// Match and participant storage.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn create_match(
        &self,
        record: MatchRecord,
        participants: Vec<ParticipantRecord>,
    ) -> Result<(), MatchError>;

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchError>;

    /// Set status; stamps `started_at` on `InProgress` and `completed_at` on
    /// terminal statuses.
    async fn update_match_status(
        &self,
        match_id: MatchId,
        status: MatchStatus,
        at: DateTime<Utc>,
    ) -> Result<(), MatchError>;

    /// Participants in seat order.
    async fn list_participants(&self, match_id: MatchId) -> Result<Vec<ParticipantRecord>, MatchError>;

    /// Write one heat slot. Filled slots are never overwritten.
    async fn record_heat_score(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        heat: HeatNumber,
        score: Decimal,
    ) -> Result<(), MatchError>;
}

/// Ledger, wallet projection and settlement idempotence.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Append entries all-or-nothing and update the materialized wallets of
    /// every user they touch in the same unit of work.
    async fn append_entries(&self, entries: Vec<LedgerEntry>) -> Result<(), MatchError>;

    /// Live sum over the ledger for one party and currency.
    async fn ledger_balance(&self, party: LedgerParty, currency: Currency) -> Result<Decimal, MatchError>;

    async fn entries_for_reference(&self, match_id: MatchId) -> Result<Vec<LedgerEntry>, MatchError>;

    async fn entries_for_party(&self, party: LedgerParty) -> Result<Vec<LedgerEntry>, MatchError>;

    async fn wallet(&self, user_id: UserId) -> Result<Option<Wallet>, MatchError>;

    async fn put_wallet(&self, wallet: Wallet) -> Result<(), MatchError>;

    async fn settlement_exists(&self, match_id: MatchId) -> Result<bool, MatchError>;

    /// One transaction: reject if a settlement record exists, append the
    /// entries, update wallets, write participant results, mark the match
    /// completed and revealed, insert the settlement record.
    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<SettlementRecord, MatchError>;
}

/// Full storage surface the engine needs.
pub trait Repository: MatchRepository + LedgerRepository {}

impl<T: MatchRepository + LedgerRepository> Repository for T {}
