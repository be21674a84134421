//! Heat Lifecycle Controller
//!
//! `Waiting → Countdown → Active → {Intermission → Countdown | Completed}`
//!
//! Every transition is a spawned `sleep` that cannot be cancelled. When it
//! fires it asks the store for a guarded transition, which refuses if the
//! match has moved on (aborted, heat already ended, a later heat running).
//! Duplicate and late firings are therefore harmless, and the timeout sweep
//! can race the timers freely.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::errors::MatchError;
use types::events::{MatchEvent, NotificationSink};
use types::ids::MatchId;
use types::status::{HeatNumber, HeatStatus};

use crate::clock::Clock;
use crate::config::HeatTiming;
use crate::store::{HeatEnd, MatchStateStore};

pub struct HeatLifecycle {
    store: Arc<MatchStateStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    timing: HeatTiming,
    /// Receives the id of every match whose heat 3 just ended
    completions: mpsc::UnboundedSender<MatchId>,
}

impl HeatLifecycle {
    pub fn new(
        store: Arc<MatchStateStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        timing: HeatTiming,
        completions: mpsc::UnboundedSender<MatchId>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sink,
            clock,
            timing,
            completions,
        })
    }

    pub fn timing(&self) -> &HeatTiming {
        &self.timing
    }

    /// Enter the countdown of `heat`, announce it and schedule activation.
    pub async fn start_countdown(self: &Arc<Self>, match_id: MatchId, heat: u8) -> Result<(), MatchError> {
        let now = self.clock.now();
        let state = self.store.start_heat(match_id, heat, now)?;
        let heat = HeatNumber::new(heat)?;
        debug!(match_id = %match_id, heat = heat.get(), "Heat countdown started");

        let event = MatchEvent::HeatStarted {
            match_id,
            heat,
            participants: state.participant_views(),
            target: state.target_line(heat),
            countdown_ms: self.timing.countdown_ms,
            duration_ms: self.timing.heat_ms,
            started_at: now,
        };

        let this = Arc::clone(self);
        let delay = self.timing.countdown();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.start_active(match_id, heat).await;
        });

        publish(self.sink.as_ref(), event).await;
        Ok(())
    }

    /// Countdown elapsed: open the heat and schedule its end.
    pub async fn start_active(self: &Arc<Self>, match_id: MatchId, heat: HeatNumber) {
        match self.store.activate_heat(match_id, heat) {
            Ok(true) => {
                debug!(match_id = %match_id, heat = heat.get(), "Heat active");
                let this = Arc::clone(self);
                let delay = self.timing.heat();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = this.end_heat(match_id, heat).await {
                        debug!(match_id = %match_id, error = %e, "Heat end timer found no match");
                    }
                });
                // everyone dropped out during the countdown
                if self.store.get(match_id).is_ok_and(|state| state.heat_resolved()) {
                    self.spawn_early_end(match_id, heat);
                }
            }
            Ok(false) => {
                debug!(match_id = %match_id, heat = heat.get(), "Activation skipped; state moved on");
            }
            Err(e) => {
                debug!(match_id = %match_id, error = %e, "Activation timer found no match");
            }
        }
    }

    /// Close `heat` if it is still active. Returns whether this call closed it.
    ///
    /// Announces results; after heat 3 reports completion, otherwise
    /// schedules the next countdown.
    pub async fn end_heat(self: &Arc<Self>, match_id: MatchId, heat: HeatNumber) -> Result<bool, MatchError> {
        let now = self.clock.now();
        let state = match self.store.end_heat(match_id, heat, now)? {
            HeatEnd::Ended(state) => state,
            HeatEnd::Skipped => {
                debug!(match_id = %match_id, heat = heat.get(), "Heat end skipped; already closed");
                return Ok(false);
            }
        };
        info!(match_id = %match_id, heat = heat.get(), "Heat ended");

        let event = MatchEvent::HeatEnded {
            match_id,
            heat,
            results: state.heat_results(heat),
            standings: state.standings(),
            ended_at: now,
        };
        publish(self.sink.as_ref(), event).await;

        if heat.is_last() {
            if self.completions.send(match_id).is_err() {
                warn!(match_id = %match_id, "Completion channel closed; match awaits manual settlement");
            }
        } else {
            self.start_intermission(match_id, heat);
        }
        Ok(true)
    }

    /// Schedule the countdown of the heat after `completed`.
    pub fn start_intermission(self: &Arc<Self>, match_id: MatchId, completed: HeatNumber) {
        let Some(next) = completed.next() else {
            return;
        };
        let this = Arc::clone(self);
        let delay = self.timing.intermission();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.start_countdown(match_id, next.get()).await {
                debug!(match_id = %match_id, heat = next.get(), error = %e, "Next heat not started");
            }
        });
    }

    /// Force-end every active heat that has outlived countdown plus
    /// duration. Returns how many heats this sweep closed.
    pub async fn check_timeouts(self: &Arc<Self>) -> usize {
        let now = self.clock.now();
        let span_ms = self.timing.heat_span_ms();
        let mut closed = 0;

        for match_id in self.store.list_active_matches() {
            let Ok(state) = self.store.get(match_id) else {
                continue;
            };
            let (Some(heat), Some(started_at)) = (state.heat(), state.heat_started_at) else {
                continue;
            };
            if state.heat_status != HeatStatus::Active {
                continue;
            }
            let elapsed_ms = (now - started_at).num_milliseconds();
            if elapsed_ms <= span_ms {
                continue;
            }
            match self.end_heat(match_id, heat).await {
                Ok(true) => {
                    warn!(match_id = %match_id, heat = heat.get(), elapsed_ms, "Heat force-ended by timeout sweep");
                    closed += 1;
                }
                Ok(false) => {}
                Err(e) => debug!(match_id = %match_id, error = %e, "Timeout sweep skipped match"),
            }
        }
        closed
    }

    /// End `heat` off the caller's path once nobody is left to act.
    pub fn spawn_early_end(self: &Arc<Self>, match_id: MatchId, heat: HeatNumber) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.end_heat(match_id, heat).await {
                Ok(true) => debug!(match_id = %match_id, heat = heat.get(), "Heat ended early"),
                Ok(false) => {}
                Err(e) => debug!(match_id = %match_id, error = %e, "Early heat end skipped"),
            }
        });
    }
}

/// Fire-and-forget publish; failures are logged only.
pub(crate) async fn publish(sink: &dyn NotificationSink, event: MatchEvent) {
    let label = event.event_type_label();
    let match_id = event.match_id();
    if let Err(e) = sink.publish(event).await {
        warn!(match_id = %match_id, event = label, error = %e, "Notification dropped");
    }
}
