//! Lock timeline audit
//!
//! Runs the physics curve backwards: a score implies the earliest moment it
//! was reachable. A lock recorded before that moment (plus the latency
//! tolerance) should never have been accepted.

use race_core::PhysicsModel;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::ParticipantId;
use types::status::HeatNumber;

/// One accepted lock as observed by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub participant_id: ParticipantId,
    pub heat: HeatNumber,
    pub score: Decimal,
    /// Active-window time at which the engine stamped the lock
    pub elapsed_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub record: LockRecord,
    pub implied_ms: i64,
    pub excess_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub checked: usize,
    pub findings: Vec<AuditFinding>,
    /// Smallest `elapsed - implied` seen, in ms
    pub min_slack_ms: Option<i64>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LockAudit {
    physics: PhysicsModel,
    tolerance_ms: i64,
}

impl LockAudit {
    pub fn new(tolerance_ms: u64) -> Self {
        Self {
            physics: PhysicsModel::default(),
            tolerance_ms: i64::try_from(tolerance_ms).unwrap_or(i64::MAX),
        }
    }

    /// Earliest active-window time, in ms, at which `score` was reachable.
    pub fn implied_ms(&self, score: Decimal) -> i64 {
        let speed = score.to_f64().unwrap_or(f64::MAX);
        (self.physics.time_for_speed(speed) * 1000.0).ceil() as i64
    }

    pub fn check(&self, record: &LockRecord) -> Option<AuditFinding> {
        let implied_ms = self.implied_ms(record.score);
        let excess_ms = implied_ms - (record.elapsed_ms + self.tolerance_ms);
        (excess_ms > 0).then(|| AuditFinding {
            record: record.clone(),
            implied_ms,
            excess_ms,
        })
    }

    pub fn run(&self, records: &[LockRecord]) -> AuditReport {
        let mut report = AuditReport {
            checked: records.len(),
            ..AuditReport::default()
        };
        for record in records {
            let slack = record.elapsed_ms - self.implied_ms(record.score);
            report.min_slack_ms = Some(report.min_slack_ms.map_or(slack, |m| m.min(slack)));
            if let Some(finding) = self.check(record) {
                report.findings.push(finding);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(score: Decimal, elapsed_ms: i64) -> LockRecord {
        LockRecord {
            participant_id: ParticipantId::new(),
            heat: HeatNumber::FIRST,
            score,
            elapsed_ms,
        }
    }

    #[test]
    fn test_honest_locks_pass() {
        let audit = LockAudit::new(100);
        let physics = PhysicsModel::default();
        let records: Vec<LockRecord> = [5_000i64, 12_500, 24_000]
            .iter()
            .map(|ms| record(physics.max_score_at(*ms as f64 / 1000.0).unwrap(), *ms))
            .collect();

        let report = audit.run(&records);
        assert_eq!(report.checked, 3);
        assert!(report.is_clean());
        assert!(report.min_slack_ms.unwrap() >= -1);
    }

    #[test]
    fn test_early_lock_flagged() {
        let audit = LockAudit::new(100);
        // 95.90 needs ten seconds
        let finding = audit.check(&record(Decimal::new(9590, 2), 8_000)).unwrap();
        assert!(finding.implied_ms > 9_900);
        assert!(finding.excess_ms > 1_000);
    }

    #[test]
    fn test_tolerance_absorbs_latency() {
        let audit = LockAudit::new(100);
        let score = Decimal::new(9590, 2);
        let implied = audit.implied_ms(score);
        assert!(audit.check(&record(score, implied - 100)).is_none());
        assert!(audit.check(&record(score, implied - 101)).is_some());
    }
}
