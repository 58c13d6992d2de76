//! Core logic: control state, admission, classification, the tick engine.
//!
//! - [`ControlState`] — running flag, traffic selector, neutralization
//! - [`RateLimiter`] — token bucket admission
//! - [`BlockList`] — blocked source addresses
//! - [`SampleGenerator`] / [`SyntheticGenerator`] — per-tick feature samples
//! - [`Classifier`] / [`ThresholdClassifier`] — inference seam and reference model
//! - [`TelemetryAggregator`] / [`MetricsRegistry`] — RPS window and counters
//! - [`Engine`] — one simulation cycle per tick

pub mod blocklist;
pub mod classifier;
pub mod control;
pub mod engine;
pub mod metrics;
pub mod rate_limiter;
pub mod record;
pub mod sample;
pub mod telemetry;

pub use blocklist::BlockList;
pub use classifier::{
    ClassificationMode, ClassificationResult, Classifier, Label, Prediction, ThresholdClassifier,
};
pub use control::{BehaviorMode, ControlState, ControlStatus, EngineMode, TrafficType};
pub use engine::{Engine, TickOutcome, TickOutput};
pub use metrics::MetricsRegistry;
pub use rate_limiter::RateLimiter;
pub use record::{TickEvent, TickRecord};
pub use sample::{FeatureSample, Protocol, SampleGenerator, SyntheticGenerator};
pub use telemetry::{RateSnapshot, TelemetryAggregator};
