//! Wall-clock source
//!
//! Heat timers run on tokio's clock, so timestamps must come from the same
//! source or elapsed heat time and timer firings drift apart.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt::Debug;
use tokio::time::Instant;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// UTC anchored to a tokio [`Instant`]; follows the paused test clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_utc: DateTime<Utc>,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(anchor_utc: DateTime<Utc>) -> Self {
        Self {
            anchor_utc,
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = ChronoDuration::from_std(self.anchor.elapsed()).unwrap_or_else(|_| ChronoDuration::zero());
        self.anchor_utc + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_clock() {
        let start = Utc::now();
        let clock = MonotonicClock::starting_at(start);
        assert_eq!(clock.now(), start);

        tokio::time::advance(Duration::from_millis(3_250)).await;
        assert_eq!((clock.now() - start).num_milliseconds(), 3_250);
    }
}
