//! Shared application state handed to every transport handler.

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::engine::Engine;
use crate::db::Database;
use crate::sink::EventBus;

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub database: Arc<Database>,
    /// Push channel for tick updates and broadcast errors.
    pub events: EventBus,
    /// Flipped to `true` once on process shutdown.
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, database: Arc<Database>, events: EventBus) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            database,
            events,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask every task and push-channel client to stop.
    pub fn trigger_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
