//! The tick engine: one simulated traffic cycle per call to [`Engine::step`].
//!
//! Control state, the blocklist, the token bucket and the RPS window live in a
//! single [`EngineState`] behind one mutex. A tick takes the lock twice: once
//! to refill, draw and admit, and once to account the classified result. The
//! classifier runs between the two with the lock released, and the caller
//! persists and emits the returned [`TickOutput`] after both are done.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{EngineConfig, ADDRESS_HOST_MAX, ADDRESS_HOST_MIN, ADDRESS_PREFIX};
use crate::core::blocklist::BlockList;
use crate::core::classifier::{ClassificationMode, ClassificationResult, Classifier};
use crate::core::control::{BehaviorMode, ControlState, ControlStatus, TrafficType};
use crate::core::metrics::MetricsRegistry;
use crate::core::rate_limiter::RateLimiter;
use crate::core::record::{TickEvent, TickRecord};
use crate::core::sample::{FeatureSample, SampleGenerator, SyntheticGenerator};
use crate::core::telemetry::TelemetryAggregator;
use crate::error::AppError;

/// Everything a tick reads or mutates, guarded together.
pub struct EngineState {
    control: ControlState,
    blocklist: BlockList,
    limiter: RateLimiter,
    telemetry: TelemetryAggregator,
    generator: Box<dyn SampleGenerator>,
    rng: ChaCha8Rng,
}

/// Values captured under the lock in the admission phase.
struct Admission {
    traffic_type: TrafficType,
    mode: ClassificationMode,
    sample: FeatureSample,
    requested: u64,
    admitted: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub record: TickRecord,
    pub event: TickEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not running; nothing changed.
    Idle,
    Completed(TickOutput),
    /// The cycle was abandoned. Nothing is persisted or emitted for it.
    Failed(AppError),
}

pub struct Engine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    classifier: Arc<dyn Classifier>,
    metrics: Arc<MetricsRegistry>,
}

impl Engine {
    /// Engine with the built-in synthetic generator, seeded from `config.seed`.
    pub fn new(
        config: EngineConfig,
        classifier: Arc<dyn Classifier>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let generator = match config.seed {
            Some(seed) => SyntheticGenerator::with_seed(seed),
            None => SyntheticGenerator::new(),
        };
        Self::with_generator(config, Box::new(generator), classifier, metrics, Instant::now())
    }

    pub fn with_generator(
        config: EngineConfig,
        generator: Box<dyn SampleGenerator>,
        classifier: Arc<dyn Classifier>,
        metrics: Arc<MetricsRegistry>,
        now: Instant,
    ) -> Self {
        let rng = match config.seed {
            // Offset so counts and addresses do not mirror the generator's stream.
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
            None => ChaCha8Rng::from_entropy(),
        };
        let state = EngineState {
            control: ControlState::new(),
            blocklist: BlockList::new(),
            limiter: RateLimiter::new(config.bucket_capacity, config.nominal_refill_rate, now),
            telemetry: TelemetryAggregator::new(Arc::clone(&metrics), config.rps_window, now),
            generator,
            rng,
        };
        Self {
            config,
            state: Mutex::new(state),
            classifier,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    // ---- control commands ----

    pub fn start(&self, traffic_type: TrafficType) -> ControlStatus {
        let mut state = self.lock();
        state.control.start(traffic_type);
        tracing::info!("Simulation started ({traffic_type})");
        status_of(&state)
    }

    pub fn stop(&self) -> ControlStatus {
        let mut state = self.lock();
        state.control.stop();
        tracing::info!("Simulation stopped");
        status_of(&state)
    }

    pub fn neutralize(&self) -> Result<ControlStatus, AppError> {
        let mut state = self.lock();
        state.control.neutralize()?;
        tracing::info!("Attack neutralized; traffic now treated as benign");
        Ok(status_of(&state))
    }

    pub fn block_address(&self, address: &str) -> Result<ControlStatus, AppError> {
        let mut state = self.lock();
        if state.blocklist.insert(address)? {
            tracing::info!("Blocked source address {}", address.trim());
        }
        Ok(status_of(&state))
    }

    pub fn set_rate_limiting(&self, enabled: bool) -> ControlStatus {
        let rate = if enabled {
            self.config.nominal_refill_rate
        } else {
            0.0
        };
        let mut state = self.lock();
        state.limiter.set_refill_rate(rate);
        tracing::info!(
            "Rate limiting {}",
            if enabled { "enabled" } else { "disabled" }
        );
        status_of(&state)
    }

    pub fn status(&self) -> ControlStatus {
        status_of(&self.lock())
    }

    pub fn current_rps(&self) -> f64 {
        self.lock().telemetry.current_rps()
    }

    /// Classify an ad-hoc sample with the configured classifier.
    pub fn classify_sample(&self, sample: &FeatureSample) -> Result<ClassificationResult, AppError> {
        sample.validate()?;
        ClassificationMode::Delegated.resolve(self.classifier.as_ref(), sample)
    }

    // ---- tick ----

    /// Run one cycle at monotonic time `now`.
    pub fn step(&self, now: Instant) -> TickOutcome {
        let admission = {
            let mut guard = self.lock();
            if !guard.control.running() {
                return TickOutcome::Idle;
            }
            match self.admit(&mut guard, now) {
                Ok(admission) => admission,
                Err(err) => return TickOutcome::Failed(err),
            }
        };

        let classification = match admission
            .mode
            .resolve(self.classifier.as_ref(), &admission.sample)
        {
            Ok(result) => result,
            Err(err) => {
                // Nothing was admitted for an abandoned cycle.
                self.lock().limiter.restore(admission.admitted);
                return TickOutcome::Failed(err);
            }
        };

        let current_rps = {
            let mut state = self.lock();
            state.telemetry.count_tick(
                admission.traffic_type,
                classification.label,
                admission.admitted,
            );
            state.telemetry.record(admission.admitted, now)
        };

        let record = TickRecord::new(
            Utc::now(),
            admission.traffic_type,
            &admission.sample,
            &classification,
            admission.requested,
            admission.admitted,
        );
        tracing::debug!(
            traffic_type = %record.traffic_type,
            label = %record.label,
            requested = record.requested_count,
            admitted = record.admitted_count,
            rps = current_rps,
            "tick"
        );
        let event = TickEvent::new(&record, admission.sample, current_rps);
        TickOutcome::Completed(TickOutput { record, event })
    }

    fn admit(&self, state: &mut EngineState, now: Instant) -> Result<Admission, AppError> {
        state.limiter.refill(now);

        let behavior = state.control.behavior();
        let range = match behavior {
            BehaviorMode::Benign => &self.config.benign_count,
            BehaviorMode::Attack => &self.config.attack_count,
        };
        let requested = draw_count(&mut state.rng, range);
        let address = pick_address(&mut state.rng);

        let mut sample = state.generator.generate(behavior, address.clone())?;
        sample.validate()?;
        sample.source_address = address;

        let admitted = if state.blocklist.contains(&sample.source_address) {
            0
        } else {
            state.limiter.admit(requested)
        };

        Ok(Admission {
            traffic_type: state.control.traffic_type(),
            mode: ClassificationMode::for_behavior(behavior),
            sample,
            requested,
            admitted,
        })
    }
}

fn status_of(state: &EngineState) -> ControlStatus {
    ControlStatus {
        running: state.control.running(),
        mode: state.control.mode(),
        traffic_type: state.control.traffic_type(),
        neutralized: state.control.neutralized(),
        rate_limiting: state.limiter.refill_rate() > 0.0,
        tokens: state.limiter.tokens(),
        blocked: state.blocklist.addresses(),
    }
}

/// Uniform draw from an inclusive range; reversed bounds are swapped.
fn draw_count(rng: &mut ChaCha8Rng, range: &RangeInclusive<u64>) -> u64 {
    let (lo, hi) = (*range.start(), *range.end());
    rng.gen_range(lo.min(hi)..=lo.max(hi))
}

fn pick_address(rng: &mut ChaCha8Rng) -> String {
    format!(
        "{ADDRESS_PREFIX}{}",
        rng.gen_range(ADDRESS_HOST_MIN..=ADDRESS_HOST_MAX)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::{Label, Prediction, ThresholdClassifier};
    use crate::core::control::EngineMode;
    use crate::core::sample::Protocol;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct PanickingClassifier;

    impl Classifier for PanickingClassifier {
        fn classify(&self, _features: &[f64]) -> Result<Prediction, AppError> {
            panic!("classifier must not be invoked for attack traffic");
        }
    }

    struct CountingClassifier {
        calls: AtomicUsize,
    }

    impl Classifier for CountingClassifier {
        fn classify(&self, _features: &[f64]) -> Result<Prediction, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Prediction {
                predicted_label: 0,
                anomaly_score: 0.25,
            })
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _features: &[f64]) -> Result<Prediction, AppError> {
            Err(AppError::Inference("model unavailable".into()))
        }
    }

    /// Emits a negative byte count.
    struct BrokenGenerator;

    impl SampleGenerator for BrokenGenerator {
        fn generate(
            &mut self,
            _mode: BehaviorMode,
            source_address: String,
        ) -> Result<FeatureSample, AppError> {
            Ok(FeatureSample {
                duration: 0.1,
                protocol_type: Protocol::Tcp,
                src_bytes: -5.0,
                dst_bytes: 1.0,
                source_address,
            })
        }
    }

    fn seeded_config() -> EngineConfig {
        EngineConfig {
            seed: Some(17),
            ..EngineConfig::default()
        }
    }

    fn engine_with(classifier: Arc<dyn Classifier>, start: Instant) -> Engine {
        Engine::with_generator(
            seeded_config(),
            Box::new(SyntheticGenerator::with_seed(17)),
            classifier,
            Arc::new(MetricsRegistry::new()),
            start,
        )
    }

    fn completed(outcome: TickOutcome) -> TickOutput {
        match outcome {
            TickOutcome::Completed(output) => output,
            other => panic!("expected a completed tick, got {other:?}"),
        }
    }

    #[test]
    fn test_idle_tick_is_noop() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(PanickingClassifier), start);

        assert_eq!(engine.step(start + Duration::from_millis(500)), TickOutcome::Idle);
        let status = engine.status();
        assert_eq!(status.mode, EngineMode::Idle);
        assert_eq!(status.tokens, 1000.0);
        assert_eq!(engine.metrics().total_requests(TrafficType::Normal), 0);
        assert_eq!(engine.metrics().classified(Label::Normal), 0);
    }

    #[test]
    fn test_attack_tick_is_forced_without_classifier() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(PanickingClassifier), start);
        engine.start(TrafficType::Attack);

        let output = completed(engine.step(start + Duration::from_millis(500)));
        let record = output.record;
        assert!((5000..=10000).contains(&record.requested_count));
        assert_eq!(record.label, Label::Attack);
        assert_eq!(record.predicted_label, 1);
        assert_eq!(record.anomaly_score, -1.0);
        assert_eq!(record.traffic_type, TrafficType::Attack);
        assert_eq!(
            record.admitted_count + record.dropped_count,
            record.requested_count
        );
        assert_eq!(output.event.sample.source_address, record.source_address);
    }

    #[test]
    fn test_neutralize_switches_to_benign_classification() {
        let start = Instant::now();
        let classifier = Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
        });
        let engine = engine_with(classifier.clone(), start);
        engine.start(TrafficType::Attack);
        let status = engine.neutralize().unwrap();
        assert!(status.neutralized);

        let record = completed(engine.step(start + Duration::from_millis(500))).record;
        assert!((5..=10).contains(&record.requested_count));
        assert_eq!(record.label, Label::Normal);
        assert_eq!(record.anomaly_score, 0.25);
        // Traffic type is still reported as the operator selected it.
        assert_eq!(record.traffic_type, TrafficType::Attack);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);

        // Restart re-arms the attack.
        engine.start(TrafficType::Attack);
        let record = completed(engine.step(start + Duration::from_secs(1))).record;
        assert_eq!(record.label, Label::Attack);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_neutralize_on_normal_traffic_fails_without_change() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(ThresholdClassifier::default()), start);
        let before = engine.start(TrafficType::Normal);
        let err = engine.neutralize().unwrap_err();
        assert_eq!(err.kind(), "InvalidTransition");
        assert_eq!(engine.status(), before);
    }

    #[test]
    fn test_bucket_drains_then_refills_at_nominal_rate() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(PanickingClassifier), start);
        engine.start(TrafficType::Attack);

        // First tick: whole bucket admitted since requested >= 5000 > 1000.
        let first = completed(engine.step(start)).record;
        assert_eq!(first.admitted_count, 1000);
        assert_eq!(first.dropped_count, first.requested_count - 1000);

        // 500ms at 200 tokens/s refills exactly 100.
        let second = completed(engine.step(start + Duration::from_millis(500))).record;
        assert_eq!(second.admitted_count, 100);
        assert_eq!(engine.status().tokens, 0.0);
    }

    #[test]
    fn test_disabling_rate_limiting_keeps_tokens_and_stops_refill() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(PanickingClassifier), start);
        engine.start(TrafficType::Attack);
        completed(engine.step(start));

        let status = engine.set_rate_limiting(false);
        assert!(!status.rate_limiting);
        assert_eq!(status.tokens, 0.0);

        let record = completed(engine.step(start + Duration::from_secs(5))).record;
        assert_eq!(record.admitted_count, 0);

        let status = engine.set_rate_limiting(true);
        assert!(status.rate_limiting);
        let record = completed(engine.step(start + Duration::from_millis(5500))).record;
        assert_eq!(record.admitted_count, 100);
    }

    #[test]
    fn test_blocked_address_admits_nothing_and_keeps_tokens() {
        let start = Instant::now();
        let engine = engine_with(
            Arc::new(CountingClassifier {
                calls: AtomicUsize::new(0),
            }),
            start,
        );
        for host in ADDRESS_HOST_MIN..=ADDRESS_HOST_MAX {
            engine
                .block_address(&format!("{ADDRESS_PREFIX}{host}"))
                .unwrap();
        }
        engine.start(TrafficType::Normal);

        for i in 0..5u64 {
            let record = completed(engine.step(start + Duration::from_millis(500 * i))).record;
            assert_eq!(record.admitted_count, 0);
            assert_eq!(record.dropped_count, record.requested_count);
        }
        assert_eq!(engine.status().tokens, 1000.0);
        assert_eq!(engine.metrics().total_requests(TrafficType::Normal), 0);
    }

    #[test]
    fn test_block_address_rejects_empty() {
        let engine = engine_with(Arc::new(PanickingClassifier), Instant::now());
        let err = engine.block_address("   ").unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
        assert!(engine.status().blocked.is_empty());

        let status = engine.block_address(" 10.0.0.7 ").unwrap();
        assert_eq!(status.blocked, vec!["10.0.0.7".to_string()]);
    }

    #[test]
    fn test_inference_failure_skips_accounting() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(FailingClassifier), start);
        engine.start(TrafficType::Normal);

        match engine.step(start + Duration::from_millis(500)) {
            TickOutcome::Failed(err) => assert_eq!(err.kind(), "Inference"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(engine.metrics().total_requests(TrafficType::Normal), 0);
        assert_eq!(engine.metrics().classified(Label::Normal), 0);
        assert!(engine.status().running);
    }

    #[test]
    fn test_inference_failure_returns_tokens() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(FailingClassifier), start);
        engine.set_rate_limiting(false);
        engine.start(TrafficType::Normal);

        for i in 0..50u64 {
            let outcome = engine.step(start + Duration::from_millis(500 * i));
            assert!(matches!(outcome, TickOutcome::Failed(_)));
        }
        assert_eq!(engine.status().tokens, 1000.0);
        assert_eq!(engine.metrics().total_requests(TrafficType::Normal), 0);
    }

    #[test]
    fn test_malformed_sample_fails_the_tick() {
        let start = Instant::now();
        let engine = Engine::with_generator(
            seeded_config(),
            Box::new(BrokenGenerator),
            Arc::new(PanickingClassifier),
            Arc::new(MetricsRegistry::new()),
            start,
        );
        engine.start(TrafficType::Attack);
        match engine.step(start) {
            TickOutcome::Failed(err) => assert_eq!(err.kind(), "InvalidArgument"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(engine.status().tokens, 1000.0);
    }

    #[test]
    fn test_counters_and_rate_follow_admitted_counts() {
        let start = Instant::now();
        let engine = engine_with(
            Arc::new(CountingClassifier {
                calls: AtomicUsize::new(0),
            }),
            start,
        );
        engine.start(TrafficType::Normal);

        let a = completed(engine.step(start + Duration::from_millis(500))).record;
        let b = completed(engine.step(start + Duration::from_secs(1))).event;
        let admitted = a.admitted_count + b.admitted_count;

        assert_eq!(engine.metrics().total_requests(TrafficType::Normal), admitted);
        assert_eq!(engine.metrics().classified(Label::Normal), admitted);
        // Window closed at exactly one second.
        assert_eq!(b.current_rps, admitted as f64);
        assert_eq!(engine.metrics().current_rate(), admitted as f64);
        assert_eq!(engine.current_rps(), admitted as f64);
    }

    #[test]
    fn test_addresses_come_from_the_pool() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(PanickingClassifier), start);
        engine.start(TrafficType::Attack);
        for i in 0..50u64 {
            let record = completed(engine.step(start + Duration::from_millis(500 * i))).record;
            let host: u8 = record
                .source_address
                .strip_prefix(ADDRESS_PREFIX)
                .unwrap()
                .parse()
                .unwrap();
            assert!((ADDRESS_HOST_MIN..=ADDRESS_HOST_MAX).contains(&host));
        }
    }

    #[test]
    fn test_classify_sample_uses_configured_classifier() {
        let engine = engine_with(Arc::new(ThresholdClassifier::default()), Instant::now());
        let result = engine
            .classify_sample(&FeatureSample {
                duration: 0.01,
                protocol_type: Protocol::Udp,
                src_bytes: 18_000.0,
                dst_bytes: 2.0,
                source_address: String::new(),
            })
            .unwrap();
        assert_eq!(result.label, Label::Attack);
        assert_eq!(result.predicted_label, 1);
    }

    #[test]
    fn test_concurrent_commands_keep_tick_accounting_consistent() {
        let start = Instant::now();
        let engine = engine_with(Arc::new(ThresholdClassifier::default()), start);
        engine.start(TrafficType::Attack);

        let admitted_total = std::thread::scope(|scope| {
            let ticker = scope.spawn(|| {
                let mut admitted = 0u64;
                for i in 0..400u64 {
                    let outcome = engine.step(start + Duration::from_millis(50 * i));
                    if let TickOutcome::Completed(output) = outcome {
                        let record = output.record;
                        assert_eq!(
                            record.admitted_count + record.dropped_count,
                            record.requested_count
                        );
                        admitted += record.admitted_count;
                    }
                    let tokens = engine.status().tokens;
                    assert!((0.0..=1000.0).contains(&tokens), "tokens out of bounds: {tokens}");
                }
                admitted
            });
            scope.spawn(|| {
                for i in 0..300 {
                    let traffic_type = if i % 2 == 0 {
                        TrafficType::Normal
                    } else {
                        TrafficType::Attack
                    };
                    engine.start(traffic_type);
                    if i % 7 == 0 {
                        engine.stop();
                    }
                }
            });
            scope.spawn(|| {
                for host in ADDRESS_HOST_MIN..=100 {
                    engine
                        .block_address(&format!("{ADDRESS_PREFIX}{host}"))
                        .unwrap();
                }
            });
            scope.spawn(|| {
                for i in 0..200 {
                    engine.set_rate_limiting(i % 3 != 0);
                    let _ = engine.neutralize();
                }
            });
            ticker.join().unwrap()
        });

        let counted = engine.metrics().total_requests(TrafficType::Normal)
            + engine.metrics().total_requests(TrafficType::Attack);
        assert_eq!(counted, admitted_total);
        assert_eq!(
            engine.status().blocked.len(),
            usize::from(100 - ADDRESS_HOST_MIN) + 1
        );
    }

    #[test]
    fn test_draw_count_handles_degenerate_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(draw_count(&mut rng, &(7..=7)), 7);
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = 10..=5;
        assert!((5..=10).contains(&draw_count(&mut rng, &reversed)));
    }
}
