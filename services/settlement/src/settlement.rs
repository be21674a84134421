//! Settlement Engine: final standings to ledger postings
//!
//! Runs once per match after heat 3. All postings, participant results, the
//! match completion and the idempotence record are committed in a single
//! repository transaction; notifications follow best-effort.
//!
//! Posting set per match (all referencing the match id):
//! - live podium finishers: FUEL credit, `MatchPrize`
//! - live BURN ladder finishers: BURN credit, `MatchBurnReward`
//! - rake wallet: FUEL credit, `MatchRake`
//! - ghost podium finishers: FUEL debit of the house wallet, `MatchPrize`
//! - balancing FUEL debit of the prize-pool escrow, `MatchPoolRelease`
//! - balancing BURN debit of the house wallet, `MatchBurnEmission`
//!
//! The last two make each currency's postings for the match sum to zero.

use chrono::{DateTime, Utc};
use race_core::FairnessEngine;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use types::errors::{ConflictError, MatchError, ValidationError};
use types::events::{CurrencyDelta, FinalStanding, MatchEvent, NotificationSink, PrizeLine};
use types::fairness::FairnessReveal;
use types::ids::{MatchId, UserId};
use types::ledger::{Currency, LedgerEntry, LedgerParty, OperationType, SettlementRecord, SystemWallet};
use types::numeric::checked_sum;
use types::scoring::sort_final;
use types::status::MatchStatus;

use crate::ledger::{credit_entry, debit_entry};
use crate::prizes::Economics;
use crate::repository::{MatchRecord, ParticipantRecord, ParticipantResult, Repository, SettlementCommit};

/// What a successful settlement wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReport {
    pub match_id: MatchId,
    pub standings: Vec<FinalStanding>,
    pub prize_table: Vec<PrizeLine>,
    pub entries: Vec<LedgerEntry>,
    pub record: SettlementRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Settled(Box<SettlementReport>),
    /// A settlement record already existed; nothing was written.
    AlreadySettled,
}

impl SettlementOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementOutcome::Settled(_))
    }

    pub fn report(&self) -> Option<&SettlementReport> {
        match self {
            SettlementOutcome::Settled(report) => Some(report.as_ref()),
            SettlementOutcome::AlreadySettled => None,
        }
    }
}

pub struct SettlementEngine {
    repo: Arc<dyn Repository>,
    sink: Arc<dyn NotificationSink>,
    economics: Economics,
    fairness: FairnessEngine,
}

impl SettlementEngine {
    pub fn new(repo: Arc<dyn Repository>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            repo,
            sink,
            economics: Economics::default(),
            fairness: FairnessEngine::new(),
        }
    }

    pub fn with_economics(mut self, economics: Economics) -> Self {
        self.economics = economics;
        self
    }

    pub fn economics(&self) -> &Economics {
        &self.economics
    }

    /// Settle `match_id`. Re-settling returns [`SettlementOutcome::AlreadySettled`].
    pub async fn settle(&self, match_id: MatchId) -> Result<SettlementOutcome, MatchError> {
        let record = self
            .repo
            .get_match(match_id)
            .await?
            .ok_or(ConflictError::MatchNotFound { match_id })?;

        if self.repo.settlement_exists(match_id).await? {
            info!(match_id = %match_id, "Settlement already recorded; skipping");
            return Ok(SettlementOutcome::AlreadySettled);
        }
        if record.status != MatchStatus::InProgress {
            return Err(ConflictError::MatchNotInProgress { status: record.status }.into());
        }

        let participants = self.repo.list_participants(match_id).await?;
        let now = Utc::now();
        let standings = self.final_standings(&record, participants)?;
        let prize_table = self.economics.prize_table(record.league, record.prize_pool)?;
        let entries = self.build_entries(&record, &standings, now)?;

        let commit = SettlementCommit {
            match_id,
            entries: entries.clone(),
            results: standings
                .iter()
                .map(|s| ParticipantResult {
                    participant_id: s.participant_id,
                    final_rank: s.rank,
                    prize: s.prize,
                    burn_reward: s.burn_reward,
                })
                .collect(),
            completed_at: now,
        };

        let settlement = match self.repo.commit_settlement(commit).await {
            Ok(settlement) => settlement,
            Err(MatchError::Conflict(ConflictError::AlreadySettled { .. })) => {
                info!(match_id = %match_id, "Concurrent settlement won; skipping");
                return Ok(SettlementOutcome::AlreadySettled);
            }
            Err(e) => {
                error!(match_id = %match_id, error = %e, "Settlement commit failed; nothing applied");
                return Err(e);
            }
        };

        info!(
            match_id = %match_id,
            league = ?record.league,
            entries = settlement.entry_count,
            prize_pool = %record.prize_pool,
            "Match settled"
        );

        let report = SettlementReport {
            match_id,
            standings,
            prize_table,
            entries,
            record: settlement,
        };
        self.announce(&record, &report).await;
        Ok(SettlementOutcome::Settled(Box::new(report)))
    }

    /// Rank participants best-first and attach payouts.
    ///
    /// `participants` must be in seat order so full ties keep roster order.
    pub fn final_standings(
        &self,
        record: &MatchRecord,
        mut participants: Vec<ParticipantRecord>,
    ) -> Result<Vec<FinalStanding>, MatchError> {
        participants.sort_by_key(|p| p.seat);
        sort_final(&mut participants, |p| &p.scores);

        participants
            .into_iter()
            .zip(1u32..)
            .map(|(p, rank)| -> Result<FinalStanding, MatchError> {
                let prize = self.economics.prize_for_rank(record.prize_pool, rank)?;
                let burn_reward = if p.is_ghost {
                    Decimal::ZERO
                } else {
                    record.league.burn_reward_for_rank(rank)
                };
                Ok(FinalStanding {
                    participant_id: p.participant_id,
                    user_id: p.user_id,
                    display_name: p.display_name,
                    is_ghost: p.is_ghost,
                    heat_scores: *p.scores.slots(),
                    total_score: p.scores.total(),
                    rank,
                    prize,
                    burn_reward,
                })
            })
            .collect()
    }

    fn build_entries(
        &self,
        record: &MatchRecord,
        standings: &[FinalStanding],
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, MatchError> {
        let reference = Some(record.match_id);
        let mut entries = Vec::new();

        for s in standings {
            if s.is_ghost {
                if s.prize > Decimal::ZERO {
                    entries.push(debit_entry(
                        LedgerParty::System(SystemWallet::House),
                        Currency::Fuel,
                        s.prize,
                        OperationType::MatchPrize,
                        reference,
                        format!("Ghost {} finished #{}", s.display_name, s.rank),
                        now,
                    )?);
                }
                continue;
            }

            let user_id = s.user_id.ok_or_else(|| ValidationError::MissingUser {
                display_name: s.display_name.clone(),
            })?;
            if s.prize > Decimal::ZERO {
                entries.push(credit_entry(
                    LedgerParty::User(user_id),
                    Currency::Fuel,
                    s.prize,
                    OperationType::MatchPrize,
                    reference,
                    format!("Prize for finishing #{}", s.rank),
                    now,
                )?);
            }
            if s.burn_reward > Decimal::ZERO {
                entries.push(credit_entry(
                    LedgerParty::User(user_id),
                    Currency::Burn,
                    s.burn_reward,
                    OperationType::MatchBurnReward,
                    reference,
                    format!("BURN reward for finishing #{}", s.rank),
                    now,
                )?);
            }
        }

        if record.rake_amount > Decimal::ZERO {
            entries.push(credit_entry(
                LedgerParty::System(SystemWallet::Rake),
                Currency::Fuel,
                record.rake_amount,
                OperationType::MatchRake,
                reference,
                "Match rake",
                now,
            )?);
        }

        for (currency, wallet, operation) in [
            (Currency::Fuel, SystemWallet::PrizePool, OperationType::MatchPoolRelease),
            (Currency::Burn, SystemWallet::House, OperationType::MatchBurnEmission),
        ] {
            let net = checked_sum(
                entries
                    .iter()
                    .filter(|e| e.currency == currency)
                    .map(|e| e.amount),
            )?;
            if net.is_zero() {
                continue;
            }
            entries.push(LedgerEntry::new(
                LedgerParty::System(wallet),
                currency,
                -net,
                operation,
                reference,
                "Settlement balance",
                now,
            )?);
        }

        Ok(entries)
    }

    async fn announce(&self, record: &MatchRecord, report: &SettlementReport) {
        if !self.fairness.verify(&record.fairness_payload, &record.commit_hash) {
            warn!(match_id = %record.match_id, "Revealed seeds do not match the published commitment");
        }

        let settled = MatchEvent::MatchSettled {
            match_id: record.match_id,
            league: record.league,
            prize_pool: record.prize_pool,
            standings: report.standings.clone(),
            prize_table: report.prize_table.clone(),
            fairness: FairnessReveal {
                payload: record.fairness_payload.clone(),
                commit_hash: record.commit_hash.clone(),
            },
            settled_at: report.record.settled_at,
        };
        self.publish(settled).await;

        for user_id in report.standings.iter().filter(|s| !s.is_ghost).filter_map(|s| s.user_id) {
            let event = MatchEvent::BalanceUpdated {
                match_id: record.match_id,
                user_id,
                deltas: user_deltas(&report.entries, user_id),
            };
            self.publish(event).await;
        }
    }

    async fn publish(&self, event: MatchEvent) {
        let label = event.event_type_label();
        let match_id = event.match_id();
        if let Err(e) = self.sink.publish(event).await {
            warn!(match_id = %match_id, event = label, error = %e, "Notification dropped");
        }
    }
}

/// Net per-currency change for one user within `entries`.
fn user_deltas(entries: &[LedgerEntry], user_id: UserId) -> Vec<CurrencyDelta> {
    let mut totals: BTreeMap<Currency, Decimal> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.user() == Some(user_id)) {
        *totals.entry(entry.currency).or_insert(Decimal::ZERO) += entry.amount;
    }
    totals
        .into_iter()
        .map(|(currency, amount)| CurrencyDelta { currency, amount })
        .collect()
}
