//! League tiers
//!
//! Each league fixes the buy-in every seat pays and the BURN reward ladder
//! live finishers earn.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// League tier of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum League {
    Rookie,
    Street,
    Pro,
    TopFuel,
}

impl League {
    pub const ALL: [League; 4] = [League::Rookie, League::Street, League::Pro, League::TopFuel];

    /// FUEL buy-in per seat.
    pub fn buyin(&self) -> Decimal {
        match self {
            League::Rookie => Decimal::from(10),
            League::Street => Decimal::from(50),
            League::Pro => Decimal::from(300),
            League::TopFuel => Decimal::from(3000),
        }
    }

    /// BURN awarded per finishing rank (index 0 = rank 1).
    pub fn burn_rewards(&self) -> &'static [u32] {
        match self {
            League::Rookie => &[],
            League::Street => &[50, 30, 20, 10, 5],
            League::Pro => &[300, 200, 150, 100, 75, 50, 25],
            League::TopFuel => &[3000, 2000, 1500, 1000, 750, 500, 400, 300, 200, 100],
        }
    }

    /// BURN reward for a 1-based rank, zero past the end of the ladder.
    pub fn burn_reward_for_rank(&self, rank: u32) -> Decimal {
        rank.checked_sub(1)
            .and_then(|idx| self.burn_rewards().get(idx as usize))
            .map(|v| Decimal::from(*v))
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_street_ladder() {
        assert_eq!(League::Street.buyin(), Decimal::from(50));
        assert_eq!(League::Street.burn_reward_for_rank(1), Decimal::from(50));
        assert_eq!(League::Street.burn_reward_for_rank(5), Decimal::from(5));
        assert_eq!(League::Street.burn_reward_for_rank(6), Decimal::ZERO);
    }

    #[test]
    fn test_rookie_has_no_burn() {
        for rank in 0..=10 {
            assert_eq!(League::Rookie.burn_reward_for_rank(rank), Decimal::ZERO);
        }
    }

    #[test]
    fn test_ladders_are_non_increasing() {
        for league in League::ALL {
            let ladder = league.burn_rewards();
            assert!(ladder.windows(2).all(|w| w[0] >= w[1]), "{:?}", league);
            assert!(ladder.len() <= 10);
        }
    }

    #[test]
    fn test_top_fuel_full_ladder() {
        assert_eq!(League::TopFuel.burn_rewards().len(), 10);
        assert_eq!(League::TopFuel.burn_reward_for_rank(10), Decimal::from(100));
        assert_eq!(League::TopFuel.burn_reward_for_rank(0), Decimal::ZERO);
    }
}
