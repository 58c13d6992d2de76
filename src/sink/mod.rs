//! Sink adapter: fan-out of each tick's output to persistence and observers.
//!
//! - [`TickSink`] — an append-only record destination (SQLite store, CSV log)
//! - [`SinkSet`] — persists one record to every sink, logging failures
//! - [`EventBus`] / [`EngineEvent`] — broadcast push channel for live updates

pub mod events;
pub mod flat_log;

pub use events::{EngineEvent, EventBus};
pub use flat_log::FlatLog;

use std::sync::Arc;

use crate::core::record::TickRecord;

/// Destination for persisted tick records.
pub trait TickSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn append(&self, record: &TickRecord) -> anyhow::Result<()>;
}

/// Every configured record sink. Failures are logged and never propagate.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn TickSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TickSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Append `record` to every sink. Returns the number of sinks that failed.
    pub fn persist(&self, record: &TickRecord) -> usize {
        let mut failures = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.append(record) {
                failures += 1;
                tracing::warn!("Failed to persist tick record to {}: {e:#}", sink.name());
            }
        }
        failures
    }
}
