//! Per-heat score cards and ranking rules
//!
//! Shared by the in-memory match state (heat-end standings) and by
//! settlement (final payout order), so both always agree on who won.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::status::{HeatNumber, HEATS_PER_MATCH};

/// Three write-once heat slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    heats: [Option<Decimal>; HEATS_PER_MATCH as usize],
}

impl ScoreCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted slots.
    pub fn from_slots(heats: [Option<Decimal>; HEATS_PER_MATCH as usize]) -> Self {
        Self { heats }
    }

    pub fn slots(&self) -> &[Option<Decimal>; HEATS_PER_MATCH as usize] {
        &self.heats
    }

    pub fn heat(&self, heat: HeatNumber) -> Option<Decimal> {
        self.heats[heat.index()]
    }

    /// Heat score with an empty slot read as zero.
    pub fn heat_or_zero(&self, heat: HeatNumber) -> Decimal {
        self.heat(heat).unwrap_or(Decimal::ZERO)
    }

    /// Write a heat slot once. Returns `false` and leaves the card untouched
    /// when the slot is already filled.
    pub fn record(&mut self, heat: HeatNumber, score: Decimal) -> bool {
        let slot = &mut self.heats[heat.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(score);
        true
    }

    /// Sum of filled slots.
    pub fn total(&self) -> Decimal {
        self.heats.iter().flatten().copied().sum()
    }
}

/// Final cross-heat ordering, best first.
///
/// Higher total wins; ties fall back to heat 3, then heat 2, then heat 1.
/// Remaining ties compare equal so a stable sort keeps prior order.
pub fn compare_final(a: &ScoreCard, b: &ScoreCard) -> Ordering {
    let by_heat = |h: u8| {
        let heat = HeatNumber::new(h).unwrap_or(HeatNumber::LAST);
        b.heat_or_zero(heat).cmp(&a.heat_or_zero(heat))
    };
    b.total()
        .cmp(&a.total())
        .then_with(|| by_heat(3))
        .then_with(|| by_heat(2))
        .then_with(|| by_heat(1))
}

/// Sort best-first by the final ordering (stable).
pub fn sort_final<T, F>(items: &mut [T], card: F)
where
    F: Fn(&T) -> &ScoreCard,
{
    items.sort_by(|a, b| compare_final(card(a), card(b)));
}

/// Inputs for one player's heat-local placing.
#[derive(Debug, Clone, Copy)]
pub struct HeatEntry {
    pub score: Option<Decimal>,
    pub locked_at: Option<DateTime<Utc>>,
}

/// Heat-local ordering, best first.
///
/// Higher score wins; equal scores go to whoever locked first; players
/// without a score for the heat sort last. Anything still tied keeps roster
/// order under a stable sort.
pub fn compare_heat(a: &HeatEntry, b: &HeatEntry) -> Ordering {
    match (a.score, b.score) {
        (Some(sa), Some(sb)) => sb.cmp(&sa).then_with(|| match (a.locked_at, b.locked_at) {
            (Some(ta), Some(tb)) => ta.cmp(&tb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort best-first by heat-local ordering (stable).
pub fn sort_heat<T, F>(items: &mut [T], entry: F)
where
    F: Fn(&T) -> HeatEntry,
{
    items.sort_by(|a, b| compare_heat(&entry(a), &entry(b)));
}
