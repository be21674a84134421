//! Ledger entry and wallet types
//!
//! The ledger is append-only and is the system of record. A wallet's
//! materialized balances are a cache written in the same unit of work as
//! the entries that change them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::MoneyError;
use crate::ids::{LedgerEntryId, MatchId, UserId};

/// Currencies carried by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Primary in-game currency; buy-ins and prizes
    Fuel,
    /// Reward currency
    Burn,
    /// External chain asset, only ever moved by deposit/withdrawal flows
    Ton,
}

/// Named non-user ledger parties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemWallet {
    /// Backs ghost seats and mints BURN rewards
    House,
    /// Collects the rake of every match
    Rake,
    /// Escrow holding collected buy-ins until settlement releases them
    PrizePool,
}

/// Exactly one party per entry: a user or a system wallet, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerParty {
    User(UserId),
    System(SystemWallet),
}

impl fmt::Display for LedgerParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerParty::User(user) => write!(f, "user:{}", user),
            LedgerParty::System(wallet) => write!(f, "system:{:?}", wallet),
        }
    }
}

/// Operation types recorded on ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Deposit,
    Withdrawal,
    MatchBuyin,
    MatchPrize,
    MatchBurnReward,
    MatchRake,
    /// Balancing release of the prize-pool escrow at settlement
    MatchPoolRelease,
    /// BURN minted by the house for settlement rewards
    MatchBurnEmission,
    AdminAdjustment,
}

/// One immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub party: LedgerParty,
    pub currency: Currency,
    /// Signed; credits positive, debits negative, never zero
    pub amount: Decimal,
    pub operation: OperationType,
    pub reference_id: Option<MatchId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build an entry, rejecting a zero amount.
    pub fn new(
        party: LedgerParty,
        currency: Currency,
        amount: Decimal,
        operation: OperationType,
        reference_id: Option<MatchId>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, MoneyError> {
        if amount.is_zero() {
            return Err(MoneyError::ZeroAmount);
        }
        Ok(Self {
            id: LedgerEntryId::new(),
            party,
            currency,
            amount,
            operation,
            reference_id,
            description: description.into(),
            created_at,
        })
    }

    pub fn user(&self) -> Option<UserId> {
        match self.party {
            LedgerParty::User(user) => Some(user),
            LedgerParty::System(_) => None,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

/// Materialized balance cache for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub fuel: Decimal,
    pub burn: Decimal,
    pub ton: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            fuel: Decimal::ZERO,
            burn: Decimal::ZERO,
            ton: Decimal::ZERO,
            updated_at: now,
        }
    }

    pub fn balance(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Fuel => self.fuel,
            Currency::Burn => self.burn,
            Currency::Ton => self.ton,
        }
    }

    /// Add a signed delta to one currency.
    pub fn apply(&mut self, currency: Currency, delta: Decimal, now: DateTime<Utc>) -> Result<(), MoneyError> {
        let slot = match currency {
            Currency::Fuel => &mut self.fuel,
            Currency::Burn => &mut self.burn,
            Currency::Ton => &mut self.ton,
        };
        *slot = slot.checked_add(delta).ok_or(MoneyError::Overflow)?;
        self.updated_at = now;
        Ok(())
    }
}

/// Marker that settlement for a match has been durably applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub match_id: MatchId,
    pub entry_count: usize,
    pub settled_at: DateTime<Utc>,
}
