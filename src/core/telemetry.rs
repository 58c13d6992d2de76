//! Rolling requests-per-second window and per-tick counter bookkeeping.
//!
//! The published rate is sticky: it only changes when a window closes, and
//! every tick in between reports the last published value.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::classifier::Label;
use crate::core::control::TrafficType;
use crate::core::metrics::MetricsRegistry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSnapshot {
    pub window_counter: u64,
    pub window_start: Instant,
    pub current_rps: f64,
}

/// Owns the rate window and feeds counters and the rate gauge to the registry.
#[derive(Debug)]
pub struct TelemetryAggregator {
    snapshot: RateSnapshot,
    window: Duration,
    registry: Arc<MetricsRegistry>,
}

impl TelemetryAggregator {
    pub fn new(registry: Arc<MetricsRegistry>, window: Duration, now: Instant) -> Self {
        Self {
            snapshot: RateSnapshot {
                window_counter: 0,
                window_start: now,
                current_rps: 0.0,
            },
            window,
            registry,
        }
    }

    /// Account one tick's admitted requests against both labeled counters.
    pub fn count_tick(&self, traffic_type: TrafficType, label: Label, admitted: u64) {
        self.registry.inc_total_requests(traffic_type, admitted);
        self.registry.inc_classified(label, admitted);
    }

    /// Accumulate `admitted`; close the window once it has run for at least the
    /// window length. Returns the current (possibly sticky) rate.
    pub fn record(&mut self, admitted: u64, now: Instant) -> f64 {
        self.snapshot.window_counter += admitted;
        let elapsed = now.saturating_duration_since(self.snapshot.window_start);
        if elapsed >= self.window {
            let rps = self.snapshot.window_counter as f64 / elapsed.as_secs_f64();
            self.snapshot.current_rps = rps;
            self.snapshot.window_counter = 0;
            self.snapshot.window_start = now;
            self.registry.set_current_rate(rps);
        }
        self.snapshot.current_rps
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> RateSnapshot {
        self.snapshot
    }

    pub fn current_rps(&self) -> f64 {
        self.snapshot.current_rps
    }
}
