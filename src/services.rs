//! Background service lifecycle management.
//!
//! `BackgroundServices` owns the tokio tasks spawned at startup:
//! 1. Tick loop (engine step, persistence, event emission)
//! 2. History pruner (daily removal of records older than 90 days)
//!
//! Both stop when the shutdown signal flips. The tick loop only observes it
//! between ticks, so a tick that has started always finishes persisting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config;
use crate::core::engine::{Engine, TickOutcome};
use crate::db::Database;
use crate::sink::{EngineEvent, EventBus, SinkSet};

/// Handles to the running background tasks.
pub struct BackgroundServices {
    tick: JoinHandle<()>,
    pruner: JoinHandle<()>,
}

impl BackgroundServices {
    /// Start all background services.
    pub fn start(
        engine: &Arc<Engine>,
        database: &Arc<Database>,
        sinks: SinkSet,
        events: &EventBus,
        tick_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let tick = tokio::spawn(run_tick_loop(
            Arc::clone(engine),
            sinks,
            events.clone(),
            tick_interval,
            shutdown.clone(),
        ));
        let pruner = tokio::spawn(run_pruner(
            Arc::clone(database),
            Duration::from_secs(config::PRUNE_INTERVAL_SECS),
            shutdown,
        ));
        tracing::info!("Background services started (tick every {tick_interval:?})");
        Self { tick, pruner }
    }

    /// Wait for both tasks to exit after shutdown was signalled.
    pub async fn join(self) {
        if let Err(e) = self.tick.await {
            tracing::error!("Tick loop terminated abnormally: {e}");
        }
        if let Err(e) = self.pruner.await {
            tracing::error!("History pruner terminated abnormally: {e}");
        }
    }
}

/// Drive the engine on a fixed period until shutdown. Late ticks are delayed,
/// never skipped or coalesced.
pub async fn run_tick_loop(
    engine: Arc<Engine>,
    sinks: SinkSet,
    events: EventBus,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = interval.tick() => {}
        }
        drive_tick(&engine, &sinks, &events).await;
    }
    tracing::info!("Tick loop stopped");
}

/// Run one engine cycle, then persist and emit its output outside the engine lock.
///
/// Persistence runs on the blocking pool and is awaited before emission, so an
/// observer never sees an update the store does not have yet.
pub async fn drive_tick(engine: &Engine, sinks: &SinkSet, events: &EventBus) {
    match engine.step(Instant::now().into_std()) {
        TickOutcome::Idle => {}
        TickOutcome::Completed(output) => {
            let sinks = sinks.clone();
            let record = output.record;
            if let Err(e) = tokio::task::spawn_blocking(move || sinks.persist(&record)).await {
                tracing::warn!("Persistence task failed: {e}");
            }
            events.emit(EngineEvent::Update(output.event));
        }
        TickOutcome::Failed(err) => {
            tracing::warn!("Tick failed ({}): {err}", err.kind());
            events.emit(EngineEvent::Error(err));
        }
    }
}

async fn run_pruner(database: Arc<Database>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = interval.tick() => {}
        }
        let db = Arc::clone(&database);
        match tokio::task::spawn_blocking(move || db.prune_old_records(config::PRUNE_MAX_AGE_DAYS))
            .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("Failed to prune old records: {e:#}"),
            Err(e) => tracing::warn!("Prune task failed: {e}"),
        }
    }
}

/// Resolves once the flag is true or the sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, EVENT_CHANNEL_CAPACITY};
    use crate::core::classifier::{Classifier, Label, Prediction, ThresholdClassifier};
    use crate::core::control::TrafficType;
    use crate::core::metrics::MetricsRegistry;
    use crate::db::tests::open_memory_db;
    use crate::error::AppError;
    use chrono::Utc;

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _features: &[f64]) -> Result<Prediction, AppError> {
            Err(AppError::Inference("model unavailable".into()))
        }
    }

    fn engine(classifier: Arc<dyn Classifier>) -> Arc<Engine> {
        let config = EngineConfig {
            seed: Some(11),
            ..EngineConfig::default()
        };
        Arc::new(Engine::new(config, classifier, Arc::new(MetricsRegistry::new())))
    }

    fn all_history(db: &Database) -> Vec<crate::core::record::TickRecord> {
        let now = Utc::now();
        db.query_history(now - chrono::Duration::hours(1), now + chrono::Duration::hours(1), None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_drive_tick_persists_then_emits() {
        let engine = engine(Arc::new(ThresholdClassifier::default()));
        let db = Arc::new(open_memory_db());
        let sinks = SinkSet::new().with(db.clone());
        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let mut rx = events.subscribe();

        engine.start(TrafficType::Attack);
        drive_tick(&engine, &sinks, &events).await;

        let update = match rx.try_recv().unwrap() {
            EngineEvent::Update(update) => update,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(update.label, Label::Attack);
        assert_eq!(update.predicted_label, 1);
        assert_eq!(update.anomaly_score, -1.0);
        assert!((5000..=10000).contains(&update.requested_count));

        let stored = all_history(&db);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].requested_count, update.requested_count);
        assert_eq!(stored[0].admitted_count, update.admitted_count);
    }

    #[tokio::test]
    async fn test_idle_tick_emits_and_persists_nothing() {
        let engine = engine(Arc::new(ThresholdClassifier::default()));
        let db = Arc::new(open_memory_db());
        let sinks = SinkSet::new().with(db.clone());
        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let mut rx = events.subscribe();

        drive_tick(&engine, &sinks, &events).await;

        assert!(rx.try_recv().is_err());
        assert!(all_history(&db).is_empty());
        assert_eq!(engine.metrics().total_requests(TrafficType::Normal), 0);
    }

    #[tokio::test]
    async fn test_failed_tick_broadcasts_error_and_skips_persistence() {
        let engine = engine(Arc::new(FailingClassifier));
        let db = Arc::new(open_memory_db());
        let sinks = SinkSet::new().with(db.clone());
        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let mut rx = events.subscribe();

        engine.start(TrafficType::Normal);
        drive_tick(&engine, &sinks, &events).await;

        match rx.try_recv().unwrap() {
            EngineEvent::Error(err) => assert_eq!(err.kind(), "Inference"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(all_history(&db).is_empty());

        // The loop keeps going: the next tick fails the same way, no panic.
        drive_tick(&engine, &sinks, &events).await;
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Error(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_loop_runs_on_schedule_and_stops_on_shutdown() {
        let engine = engine(Arc::new(ThresholdClassifier::default()));
        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let mut rx = events.subscribe();
        let (tx, shutdown) = watch::channel(false);

        engine.start(TrafficType::Normal);
        let handle = tokio::spawn(run_tick_loop(
            Arc::clone(&engine),
            SinkSet::new(),
            events.clone(),
            Duration::from_millis(500),
            shutdown,
        ));

        // Immediate first tick, then one per 500ms.
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            assert!(matches!(event, EngineEvent::Update(_)));
        }

        tx.send(true).unwrap();
        handle.await.unwrap();

        let seen = engine.metrics().total_requests(TrafficType::Normal);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.metrics().total_requests(TrafficType::Normal), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_engine_keeps_loop_alive_without_output() {
        let engine = engine(Arc::new(ThresholdClassifier::default()));
        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let mut rx = events.subscribe();
        let (tx, shutdown) = watch::channel(false);

        let handle = tokio::spawn(run_tick_loop(
            Arc::clone(&engine),
            SinkSet::new(),
            events.clone(),
            Duration::from_millis(500),
            shutdown,
        ));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());
        assert!(!handle.is_finished());

        // Starting later takes effect at the next tick boundary.
        engine.start(TrafficType::Attack);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::Update(ref u) if u.label == Label::Attack));

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_services_shut_down_cleanly() {
        let engine = engine(Arc::new(ThresholdClassifier::default()));
        let db = Arc::new(open_memory_db());
        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let (tx, shutdown) = watch::channel(false);

        let services = BackgroundServices::start(
            &engine,
            &db,
            SinkSet::new().with(db.clone()),
            &events,
            Duration::from_millis(500),
            shutdown,
        );
        engine.start(TrafficType::Normal);
        tokio::time::sleep(Duration::from_millis(1200)).await;

        tx.send(true).unwrap();
        services.join().await;
        assert!(!all_history(&db).is_empty());
    }
}
