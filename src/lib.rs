pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod server;
pub mod services;
pub mod sink;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::commands::AppState;
use crate::config::{ServiceConfig, EVENT_CHANNEL_CAPACITY};
use crate::core::classifier::{Classifier, ThresholdClassifier};
use crate::core::engine::Engine;
use crate::core::metrics::MetricsRegistry;
use crate::sink::{EventBus, FlatLog, SinkSet};

pub async fn run() -> anyhow::Result<()> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in ddosguard: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ddosguard=info,ddosguard_lib=info".into()),
        )
        .init();

    let config = ServiceConfig::from_env()?;

    let database = Arc::new(db::Database::open(&config.db_path)?);
    let flat_log = Arc::new(FlatLog::open(&config.log_path)?);
    tracing::info!("Flat log at {}", flat_log.path().display());
    let sinks = SinkSet::new().with(database.clone()).with(flat_log);

    let classifier: Arc<dyn Classifier> = Arc::new(ThresholdClassifier::default());
    let engine = Arc::new(Engine::new(
        config.engine.clone(),
        classifier,
        Arc::new(MetricsRegistry::new()),
    ));
    let state = AppState::new(engine, database, EventBus::new(EVENT_CHANNEL_CAPACITY));

    let services = services::BackgroundServices::start(
        &state.engine,
        &state.database,
        sinks,
        &state.events,
        config.tick_interval,
        state.shutdown_signal(),
    );

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("ddosguard listening on {}", listener.local_addr()?);

    let app = server::create_router(state.clone());
    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {e}");
            }
            tracing::info!("Shutdown requested");
            shutdown_state.trigger_shutdown();
        })
        .await?;

    // Covers the server exiting on its own as well.
    state.trigger_shutdown();
    services.join().await;
    tracing::info!("ddosguard stopped");
    Ok(())
}
