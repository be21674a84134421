//! In-memory repository
//!
//! One mutex guards every table so multi-table writes are atomic the same
//! way a database transaction would be. Used by tests, the simulation
//! harness and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use types::errors::{ConflictError, MatchError, MoneyError, StorageError};
use types::ids::{MatchId, ParticipantId, UserId};
use types::ledger::{Currency, LedgerEntry, LedgerParty, SettlementRecord, Wallet};
use types::status::{HeatNumber, MatchStatus};

use crate::repository::{
    LedgerRepository, MatchRecord, MatchRepository, ParticipantRecord, SettlementCommit,
};

#[derive(Debug, Default)]
struct Tables {
    matches: HashMap<MatchId, MatchRecord>,
    participants: HashMap<MatchId, Vec<ParticipantRecord>>,
    entries: Vec<LedgerEntry>,
    wallets: HashMap<UserId, Wallet>,
    settlements: HashMap<MatchId, SettlementRecord>,
}

impl Tables {
    fn match_mut(&mut self, match_id: MatchId) -> Result<&mut MatchRecord, MatchError> {
        self.matches
            .get_mut(&match_id)
            .ok_or_else(|| ConflictError::MatchNotFound { match_id }.into())
    }

    /// Validate a batch against current wallets and return the wallets it
    /// would produce. Nothing is written.
    fn stage_wallets(
        &self,
        entries: &[LedgerEntry],
        now: DateTime<Utc>,
    ) -> Result<HashMap<UserId, Wallet>, MatchError> {
        let mut staged: HashMap<UserId, Wallet> = HashMap::new();
        for entry in entries {
            if entry.amount.is_zero() {
                return Err(MoneyError::ZeroAmount.into());
            }
            let Some(user_id) = entry.user() else {
                continue;
            };
            let wallet = staged.entry(user_id).or_insert_with(|| {
                self.wallets
                    .get(&user_id)
                    .cloned()
                    .unwrap_or_else(|| Wallet::new(user_id, now))
            });
            let available = wallet.balance(entry.currency);
            wallet.apply(entry.currency, entry.amount, now)?;
            if entry.amount < Decimal::ZERO && wallet.balance(entry.currency) < Decimal::ZERO {
                return Err(ConflictError::InsufficientFunds {
                    party: entry.party,
                    currency: entry.currency,
                    required: -entry.amount,
                    available,
                }
                .into());
            }
        }
        Ok(staged)
    }

    fn commit_entries(&mut self, entries: Vec<LedgerEntry>, now: DateTime<Utc>) -> Result<(), MatchError> {
        let staged = self.stage_wallets(&entries, now)?;
        self.wallets.extend(staged);
        self.entries.extend(entries);
        Ok(())
    }
}

/// Shared in-process store implementing both repository traits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, MatchError> {
        self.tables
            .lock()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Number of ledger rows; handy in tests.
    pub fn entry_count(&self) -> Result<usize, MatchError> {
        Ok(self.lock()?.entries.len())
    }
}

#[async_trait]
impl MatchRepository for InMemoryStore {
    async fn create_match(
        &self,
        record: MatchRecord,
        mut participants: Vec<ParticipantRecord>,
    ) -> Result<(), MatchError> {
        let mut tables = self.lock()?;
        let match_id = record.match_id;
        if tables.matches.contains_key(&match_id) {
            return Err(ConflictError::MatchExists { match_id }.into());
        }
        participants.sort_by_key(|p| p.seat);
        tables.matches.insert(match_id, record);
        tables.participants.insert(match_id, participants);
        Ok(())
    }

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchError> {
        Ok(self.lock()?.matches.get(&match_id).cloned())
    }

    async fn update_match_status(
        &self,
        match_id: MatchId,
        status: MatchStatus,
        at: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        let mut tables = self.lock()?;
        let record = tables.match_mut(match_id)?;
        record.status = status;
        match status {
            MatchStatus::InProgress => record.started_at = Some(at),
            MatchStatus::Completed | MatchStatus::Aborted => record.completed_at = Some(at),
            MatchStatus::Forming => {}
        }
        Ok(())
    }

    async fn list_participants(&self, match_id: MatchId) -> Result<Vec<ParticipantRecord>, MatchError> {
        let tables = self.lock()?;
        tables
            .participants
            .get(&match_id)
            .cloned()
            .ok_or_else(|| ConflictError::MatchNotFound { match_id }.into())
    }

    async fn record_heat_score(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        heat: HeatNumber,
        score: Decimal,
    ) -> Result<(), MatchError> {
        let mut tables = self.lock()?;
        let participant = tables
            .participants
            .get_mut(&match_id)
            .ok_or(ConflictError::MatchNotFound { match_id })?
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
            .ok_or(ConflictError::PlayerNotFound { participant_id })?;
        if !participant.scores.record(heat, score) {
            return Err(ConflictError::ScoreAlreadySet {
                participant_id,
                heat: heat.get(),
            }
            .into());
        }
        participant.total_score = participant.scores.total();
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn append_entries(&self, entries: Vec<LedgerEntry>) -> Result<(), MatchError> {
        let now = Utc::now();
        self.lock()?.commit_entries(entries, now)
    }

    async fn ledger_balance(&self, party: LedgerParty, currency: Currency) -> Result<Decimal, MatchError> {
        let tables = self.lock()?;
        Ok(tables
            .entries
            .iter()
            .filter(|e| e.party == party && e.currency == currency)
            .map(|e| e.amount)
            .sum())
    }

    async fn entries_for_reference(&self, match_id: MatchId) -> Result<Vec<LedgerEntry>, MatchError> {
        let tables = self.lock()?;
        Ok(tables
            .entries
            .iter()
            .filter(|e| e.reference_id == Some(match_id))
            .cloned()
            .collect())
    }

    async fn entries_for_party(&self, party: LedgerParty) -> Result<Vec<LedgerEntry>, MatchError> {
        let tables = self.lock()?;
        Ok(tables.entries.iter().filter(|e| e.party == party).cloned().collect())
    }

    async fn wallet(&self, user_id: UserId) -> Result<Option<Wallet>, MatchError> {
        Ok(self.lock()?.wallets.get(&user_id).cloned())
    }

    async fn put_wallet(&self, wallet: Wallet) -> Result<(), MatchError> {
        self.lock()?.wallets.insert(wallet.user_id, wallet);
        Ok(())
    }

    async fn settlement_exists(&self, match_id: MatchId) -> Result<bool, MatchError> {
        Ok(self.lock()?.settlements.contains_key(&match_id))
    }

    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<SettlementRecord, MatchError> {
        let mut tables = self.lock()?;
        let match_id = commit.match_id;
        if tables.settlements.contains_key(&match_id) {
            return Err(ConflictError::AlreadySettled { match_id }.into());
        }
        if !tables.matches.contains_key(&match_id) {
            return Err(ConflictError::MatchNotFound { match_id }.into());
        }

        // Validate everything before the first write.
        let staged = tables.stage_wallets(&commit.entries, commit.completed_at)?;
        let participants = tables
            .participants
            .get(&match_id)
            .ok_or(ConflictError::MatchNotFound { match_id })?;
        for result in &commit.results {
            if !participants.iter().any(|p| p.participant_id == result.participant_id) {
                return Err(ConflictError::PlayerNotFound {
                    participant_id: result.participant_id,
                }
                .into());
            }
        }

        let record = SettlementRecord {
            match_id,
            entry_count: commit.entries.len(),
            settled_at: commit.completed_at,
        };

        tables.wallets.extend(staged);
        tables.entries.extend(commit.entries);
        if let Some(rows) = tables.participants.get_mut(&match_id) {
            for result in &commit.results {
                if let Some(row) = rows.iter_mut().find(|p| p.participant_id == result.participant_id) {
                    row.final_rank = Some(result.final_rank);
                    row.prize = result.prize;
                    row.burn_reward = result.burn_reward;
                }
            }
        }
        let row = tables.match_mut(match_id)?;
        row.status = MatchStatus::Completed;
        row.completed_at = Some(commit.completed_at);
        row.seed_revealed = true;
        tables.settlements.insert(match_id, record.clone());
        Ok(record)
    }
}
