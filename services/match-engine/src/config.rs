//! Engine configuration
//!
//! Plain serde structs with production defaults. Callers construct or
//! deserialize them; nothing here reads files or the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Heat phase lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatTiming {
    pub countdown_ms: u64,
    /// Active window; matches the physics curve's time axis
    pub heat_ms: u64,
    pub intermission_ms: u64,
}

impl Default for HeatTiming {
    fn default() -> Self {
        Self {
            countdown_ms: 3_000,
            heat_ms: 25_000,
            intermission_ms: 5_000,
        }
    }
}

impl HeatTiming {
    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    pub fn heat(&self) -> Duration {
        Duration::from_millis(self.heat_ms)
    }

    pub fn intermission(&self) -> Duration {
        Duration::from_millis(self.intermission_ms)
    }

    /// Countdown plus active window, measured from heat start.
    pub fn heat_span_ms(&self) -> i64 {
        i64::try_from(self.countdown_ms.saturating_add(self.heat_ms)).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timing: HeatTiming,
    /// Grace added to heat time before evaluating the speed ceiling
    pub latency_tolerance_ms: u64,
    /// Period of the lost-timer safety sweep
    pub timeout_sweep_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: HeatTiming::default(),
            latency_tolerance_ms: 100,
            timeout_sweep_interval_ms: 1_000,
        }
    }
}

impl EngineConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timing.countdown(), Duration::from_secs(3));
        assert_eq!(config.timing.heat(), Duration::from_secs(25));
        assert_eq!(config.timing.intermission(), Duration::from_secs(5));
        assert_eq!(config.timing.heat_span_ms(), 28_000);
        assert_eq!(config.latency_tolerance_ms, 100);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"timing":{"heat_ms":10000},"latency_tolerance_ms":50}"#).unwrap();
        assert_eq!(config.timing.heat_ms, 10_000);
        assert_eq!(config.timing.countdown_ms, 3_000);
        assert_eq!(config.latency_tolerance_ms, 50);
        assert_eq!(config.timeout_sweep_interval_ms, 1_000);
    }
}
