//! Physics Model: speed ceiling over heat time
//!
//! `speed(t) = max · (e^{k·t} − 1) / (e^{k·T} − 1)` for `t ∈ [0, T]`,
//! floor-truncated to two decimals. Used to show what is achievable now and
//! to reject submitted scores above it.
//!
//! The exponential is evaluated as `exp(x) - 1.0` rather than `exp_m1` so
//! results match other implementations bit for bit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::MoneyError;
use types::numeric::from_f64_truncated;

/// Top speed reached at the end of a heat.
pub const MAX_SPEED: f64 = 500.0;

/// Exponential growth rate per second.
pub const GROWTH_RATE: f64 = 0.08;

/// Active heat window in seconds.
pub const HEAT_DURATION_SECS: f64 = 25.0;

/// Speed curve parameters. Stateless; construct once and share by copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsModel {
    pub max_speed: f64,
    pub growth_rate: f64,
    pub duration_secs: f64,
}

impl Default for PhysicsModel {
    fn default() -> Self {
        Self {
            max_speed: MAX_SPEED,
            growth_rate: GROWTH_RATE,
            duration_secs: HEAT_DURATION_SECS,
        }
    }
}

impl PhysicsModel {
    /// Maximum achievable score `t` seconds into the active window.
    pub fn speed_at(&self, t: f64) -> f64 {
        let t = self.clamp_time(t);
        let raw = self.max_speed * ((self.growth_rate * t).exp() - 1.0) / self.span();
        truncate2(raw)
    }

    /// Inverse of [`speed_at`](Self::speed_at): seconds needed to reach `speed`.
    pub fn time_for_speed(&self, speed: f64) -> f64 {
        if speed.is_nan() {
            return 0.0;
        }
        let s = speed.clamp(0.0, self.max_speed);
        let t = ((s / self.max_speed) * self.span() + 1.0).ln() / self.growth_rate;
        self.clamp_time(t)
    }

    /// Whether `speed` lies on the curve's range.
    pub fn is_valid_speed(&self, speed: f64) -> bool {
        (0.0..=self.max_speed).contains(&speed)
    }

    /// [`speed_at`](Self::speed_at) as a score value.
    pub fn max_score_at(&self, t: f64) -> Result<Decimal, MoneyError> {
        from_f64_truncated(self.speed_at(t))
    }

    fn span(&self) -> f64 {
        (self.growth_rate * self.duration_secs).exp() - 1.0
    }

    fn clamp_time(&self, t: f64) -> f64 {
        if t.is_nan() {
            return 0.0;
        }
        t.clamp(0.0, self.duration_secs)
    }
}

/// Floor to two decimal places.
fn truncate2(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}
