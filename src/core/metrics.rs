//! Process-wide metrics registry with Prometheus text exposition.
//!
//! Counters are keyed by (metric, label value) in a DashMap so command handlers,
//! the tick task and the `/metrics` endpoint can touch them without a shared lock.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::core::classifier::Label;
use crate::core::control::TrafficType;

pub const TOTAL_REQUESTS: &str = "total_requests";
pub const REQUESTS_CLASSIFIED: &str = "requests_classified";
pub const CURRENT_REQUEST_RATE: &str = "current_request_rate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CounterKey {
    metric: &'static str,
    label: &'static str,
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<CounterKey, u64>,
    /// f64 bits of the published request rate.
    current_rate: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_total_requests(&self, traffic_type: TrafficType, by: u64) {
        self.inc(TOTAL_REQUESTS, traffic_type.as_str(), by);
    }

    pub fn inc_classified(&self, label: Label, by: u64) {
        self.inc(REQUESTS_CLASSIFIED, label.as_str(), by);
    }

    pub fn set_current_rate(&self, rps: f64) {
        self.current_rate.store(rps.to_bits(), Ordering::Relaxed);
    }

    pub fn current_rate(&self) -> f64 {
        f64::from_bits(self.current_rate.load(Ordering::Relaxed))
    }

    pub fn total_requests(&self, traffic_type: TrafficType) -> u64 {
        self.get(TOTAL_REQUESTS, traffic_type.as_str())
    }

    pub fn classified(&self, label: Label) -> u64 {
        self.get(REQUESTS_CLASSIFIED, label.as_str())
    }

    fn inc(&self, metric: &'static str, label: &'static str, by: u64) {
        *self.counters.entry(CounterKey { metric, label }).or_insert(0) += by;
    }

    fn get(&self, metric: &'static str, label: &'static str) -> u64 {
        self.counters
            .get(&CounterKey { metric, label })
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Render all metrics in the Prometheus text format (version 0.0.4).
    pub fn render(&self) -> String {
        let mut entries: Vec<(CounterKey, u64)> = self
            .counters
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        entries.sort();

        let mut out = String::new();
        write_counter_family(
            &mut out,
            TOTAL_REQUESTS,
            "Total number of simulated requests admitted",
            "traffic_type",
            &entries,
        );
        write_counter_family(
            &mut out,
            REQUESTS_CLASSIFIED,
            "Number of admitted requests by classification result",
            "result",
            &entries,
        );
        let _ = writeln!(
            out,
            "# HELP {CURRENT_REQUEST_RATE} Current simulated requests per second"
        );
        let _ = writeln!(out, "# TYPE {CURRENT_REQUEST_RATE} gauge");
        let _ = writeln!(out, "{CURRENT_REQUEST_RATE} {}", self.current_rate());
        out
    }
}

fn write_counter_family(
    out: &mut String,
    metric: &str,
    help: &str,
    label_name: &str,
    entries: &[(CounterKey, u64)],
) {
    let _ = writeln!(out, "# HELP {metric} {help}");
    let _ = writeln!(out, "# TYPE {metric} counter");
    for (key, value) in entries.iter().filter(|(k, _)| k.metric == metric) {
        let _ = writeln!(out, "{metric}{{{label_name}=\"{}\"}} {value}", key.label);
    }
}
