//! Ledger service: validated postings and balance queries
//!
//! Every balance change is an appended [`LedgerEntry`]. Callers pass
//! positive amounts; the service applies the sign for debits. Balances are
//! always answered from the ledger, the wallet table is only a cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use types::errors::MatchError;
use types::events::CurrencyDelta;
use types::ids::{MatchId, UserId};
use types::ledger::{Currency, LedgerEntry, LedgerParty, OperationType, SystemWallet, Wallet};
use types::numeric::ensure_positive;

use crate::repository::LedgerRepository;

/// Positive entry for `party`.
pub fn credit_entry(
    party: LedgerParty,
    currency: Currency,
    amount: Decimal,
    operation: OperationType,
    reference_id: Option<MatchId>,
    description: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, MatchError> {
    let amount = ensure_positive(amount)?;
    Ok(LedgerEntry::new(party, currency, amount, operation, reference_id, description, now)?)
}

/// Negative entry for `party`; `amount` is given positive.
pub fn debit_entry(
    party: LedgerParty,
    currency: Currency,
    amount: Decimal,
    operation: OperationType,
    reference_id: Option<MatchId>,
    description: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, MatchError> {
    let amount = ensure_positive(amount)?;
    Ok(LedgerEntry::new(party, currency, -amount, operation, reference_id, description, now)?)
}

/// Result of rebuilding one wallet from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub user_id: UserId,
    /// `ledger - cached` for every currency that disagreed
    pub drift: Vec<CurrencyDelta>,
    pub wallet: Wallet,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty()
    }
}

/// Posting front end over a [`LedgerRepository`].
#[derive(Clone)]
pub struct Ledger {
    repo: Arc<dyn LedgerRepository>,
}

impl Ledger {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    // ───────────────────────── Users ─────────────────────────

    pub async fn credit_user(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
        operation: OperationType,
        reference_id: Option<MatchId>,
        description: &str,
    ) -> Result<LedgerEntry, MatchError> {
        let entry = credit_entry(
            LedgerParty::User(user_id),
            currency,
            amount,
            operation,
            reference_id,
            description,
            Utc::now(),
        )?;
        self.post(entry).await
    }

    /// Fails with `InsufficientFunds` rather than overdrawing.
    pub async fn debit_user(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
        operation: OperationType,
        reference_id: Option<MatchId>,
        description: &str,
    ) -> Result<LedgerEntry, MatchError> {
        let entry = debit_entry(
            LedgerParty::User(user_id),
            currency,
            amount,
            operation,
            reference_id,
            description,
            Utc::now(),
        )?;
        self.post(entry).await
    }

    // ───────────────────────── System wallets ─────────────────────────

    pub async fn credit_system(
        &self,
        wallet: SystemWallet,
        currency: Currency,
        amount: Decimal,
        operation: OperationType,
        reference_id: Option<MatchId>,
        description: &str,
    ) -> Result<LedgerEntry, MatchError> {
        let entry = credit_entry(
            LedgerParty::System(wallet),
            currency,
            amount,
            operation,
            reference_id,
            description,
            Utc::now(),
        )?;
        self.post(entry).await
    }

    /// System wallets may run negative; the house backs ghost prizes.
    pub async fn debit_system(
        &self,
        wallet: SystemWallet,
        currency: Currency,
        amount: Decimal,
        operation: OperationType,
        reference_id: Option<MatchId>,
        description: &str,
    ) -> Result<LedgerEntry, MatchError> {
        let entry = debit_entry(
            LedgerParty::System(wallet),
            currency,
            amount,
            operation,
            reference_id,
            description,
            Utc::now(),
        )?;
        self.post(entry).await
    }

    /// Append prepared entries as one unit.
    pub async fn record_batch(&self, entries: Vec<LedgerEntry>) -> Result<(), MatchError> {
        if entries.is_empty() {
            return Ok(());
        }
        let count = entries.len();
        self.repo.append_entries(entries).await?;
        info!(count, "Ledger batch recorded");
        Ok(())
    }

    // ───────────────────────── Queries ─────────────────────────

    pub async fn user_balance(&self, user_id: UserId, currency: Currency) -> Result<Decimal, MatchError> {
        self.repo.ledger_balance(LedgerParty::User(user_id), currency).await
    }

    pub async fn system_balance(
        &self,
        wallet: SystemWallet,
        currency: Currency,
    ) -> Result<Decimal, MatchError> {
        self.repo.ledger_balance(LedgerParty::System(wallet), currency).await
    }

    /// Cached wallet balance; zero when the user has no wallet row yet.
    pub async fn cached_balance(&self, user_id: UserId, currency: Currency) -> Result<Decimal, MatchError> {
        Ok(self
            .repo
            .wallet(user_id)
            .await?
            .map(|w| w.balance(currency))
            .unwrap_or(Decimal::ZERO))
    }

    pub async fn entries_for_match(&self, match_id: MatchId) -> Result<Vec<LedgerEntry>, MatchError> {
        self.repo.entries_for_reference(match_id).await
    }

    /// Rebuild a user's cached wallet from the ledger and report any drift.
    pub async fn reconcile_user(&self, user_id: UserId) -> Result<Reconciliation, MatchError> {
        let now = Utc::now();
        let cached = self.repo.wallet(user_id).await?;
        let mut rebuilt = Wallet::new(user_id, now);
        let mut drift = Vec::new();

        for currency in [Currency::Fuel, Currency::Burn, Currency::Ton] {
            let truth = self.user_balance(user_id, currency).await?;
            rebuilt.apply(currency, truth, now)?;
            let seen = cached.as_ref().map(|w| w.balance(currency)).unwrap_or(Decimal::ZERO);
            if truth != seen {
                drift.push(CurrencyDelta {
                    currency,
                    amount: truth - seen,
                });
            }
        }

        if !drift.is_empty() {
            warn!(user_id = %user_id, ?drift, "Wallet cache drifted from ledger; rewriting");
            self.repo.put_wallet(rebuilt.clone()).await?;
        }

        Ok(Reconciliation {
            user_id,
            drift,
            wallet: rebuilt,
        })
    }

    async fn post(&self, entry: LedgerEntry) -> Result<LedgerEntry, MatchError> {
        self.repo.append_entries(vec![entry.clone()]).await?;
        info!(
            party = %entry.party,
            currency = ?entry.currency,
            amount = %entry.amount,
            operation = ?entry.operation,
            "Ledger entry posted"
        );
        Ok(entry)
    }
}
