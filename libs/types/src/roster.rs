//! Roster handed over by matchmaking
//!
//! Matchmaking assembles exactly ten seats and calls match creation with
//! them; the engine validates the roster before any state is created.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::ValidationError;
use crate::ids::UserId;
use crate::league::League;
use crate::status::PARTICIPANTS_PER_MATCH;

/// One seat as assembled by matchmaking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub is_ghost: bool,
    /// Historical run the ghost replays
    pub ghost_replay_source_id: Option<String>,
    pub buyin_amount: Decimal,
}

impl RosterEntry {
    pub fn live(user_id: UserId, display_name: impl Into<String>, buyin_amount: Decimal) -> Self {
        Self {
            user_id: Some(user_id),
            display_name: display_name.into(),
            is_ghost: false,
            ghost_replay_source_id: None,
            buyin_amount,
        }
    }

    pub fn ghost(
        display_name: impl Into<String>,
        replay_source_id: impl Into<String>,
        buyin_amount: Decimal,
    ) -> Self {
        Self {
            user_id: None,
            display_name: display_name.into(),
            is_ghost: true,
            ghost_replay_source_id: Some(replay_source_id.into()),
            buyin_amount,
        }
    }
}

/// Check size, identities and buy-ins of a roster for `league`.
pub fn validate_roster(league: League, roster: &[RosterEntry]) -> Result<(), ValidationError> {
    if roster.len() != PARTICIPANTS_PER_MATCH {
        return Err(ValidationError::RosterSize {
            expected: PARTICIPANTS_PER_MATCH,
            actual: roster.len(),
        });
    }

    let mut seen = HashSet::new();
    for entry in roster {
        match (entry.is_ghost, entry.user_id) {
            (false, None) => {
                return Err(ValidationError::MissingUser {
                    display_name: entry.display_name.clone(),
                })
            }
            (false, Some(user)) => {
                if !seen.insert(user) {
                    return Err(ValidationError::DuplicateUser {
                        user: user.to_string(),
                    });
                }
            }
            (true, Some(_)) => {
                return Err(ValidationError::GhostWithUser {
                    display_name: entry.display_name.clone(),
                })
            }
            (true, None) => {
                if entry.ghost_replay_source_id.is_none() {
                    return Err(ValidationError::MissingReplaySource {
                        display_name: entry.display_name.clone(),
                    });
                }
            }
        }

        if entry.buyin_amount != league.buyin() {
            return Err(ValidationError::BuyinMismatch {
                display_name: entry.display_name.clone(),
                expected: league.buyin(),
                actual: entry.buyin_amount,
            });
        }
    }
    Ok(())
}
