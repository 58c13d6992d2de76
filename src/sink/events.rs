//! Push channel: a broadcast bus of engine events for live observers.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::control::ControlStatus;
use crate::core::record::TickEvent;
use crate::error::AppError;

/// Server-to-client message. Serializes as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Update(TickEvent),
    Status(ControlStatus),
    Error(AppError),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Broadcast to current subscribers. Returns how many received it.
    pub fn emit(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
