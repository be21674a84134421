//! Match economics: rake, prize pool and payout ladders

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::MoneyError;
use types::events::PrizeLine;
use types::league::League;
use types::numeric::{checked_sum, fraction_of};
use types::roster::RosterEntry;
use types::status::PARTICIPANTS_PER_MATCH;

/// Percentages applied to a match's collected buy-ins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Economics {
    /// Share of total buy-ins kept as rake
    pub rake_percent: u32,
    /// Prize pool share per podium rank (index 0 = rank 1)
    pub podium_percents: Vec<u32>,
}

impl Default for Economics {
    fn default() -> Self {
        Self {
            rake_percent: 8,
            podium_percents: vec![50, 30, 20],
        }
    }
}

/// Split of the collected buy-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSplit {
    pub total_buyins: Decimal,
    pub rake: Decimal,
    pub prize_pool: Decimal,
}

impl Economics {
    /// `rake = trunc(total * r%)`, `pool = trunc(total * (100 - r)%)`.
    ///
    /// Both are truncated independently so the pair may fall a cent short of
    /// the total; that dust stays in escrow.
    pub fn split_pool(&self, total_buyins: Decimal) -> Result<PoolSplit, MoneyError> {
        let pool_percent = 100u32
            .checked_sub(self.rake_percent)
            .ok_or(MoneyError::Overflow)?;
        Ok(PoolSplit {
            total_buyins,
            rake: fraction_of(total_buyins, self.rake_percent, 100)?,
            prize_pool: fraction_of(total_buyins, pool_percent, 100)?,
        })
    }

    /// Sum every seat's buy-in, ghosts included.
    pub fn split_roster(&self, roster: &[RosterEntry]) -> Result<PoolSplit, MoneyError> {
        let total = checked_sum(roster.iter().map(|e| e.buyin_amount))?;
        self.split_pool(total)
    }

    /// FUEL prize for a 1-based rank; zero off the podium.
    pub fn prize_for_rank(&self, prize_pool: Decimal, rank: u32) -> Result<Decimal, MoneyError> {
        let share = rank
            .checked_sub(1)
            .and_then(|idx| self.podium_percents.get(idx as usize));
        match share {
            Some(percent) => fraction_of(prize_pool, *percent, 100),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Full ten-rank table of FUEL and BURN payouts.
    pub fn prize_table(&self, league: League, prize_pool: Decimal) -> Result<Vec<PrizeLine>, MoneyError> {
        (1..=PARTICIPANTS_PER_MATCH as u32)
            .map(|rank| -> Result<PrizeLine, MoneyError> {
                Ok(PrizeLine {
                    rank,
                    fuel: self.prize_for_rank(prize_pool, rank)?,
                    burn: league.burn_reward_for_rank(rank),
                })
            })
            .collect()
    }
}
