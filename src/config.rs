//! Centralized runtime constants and configuration for ddosguard.
//!
//! All tunable intervals, bucket parameters, and simulation ranges are collected
//! here so they can be found and adjusted in a single place rather than scattered
//! across modules. [`EngineConfig`] and [`ServiceConfig`] build on these defaults
//! and accept environment overrides.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Interval between simulation ticks (milliseconds).
pub const TICK_INTERVAL_MS: u64 = 500;

/// Maximum number of tokens the admission bucket can hold.
pub const BUCKET_CAPACITY: f64 = 1000.0;

/// Refill rate applied when rate limiting is enabled (tokens/sec).
pub const NOMINAL_REFILL_RATE: f64 = 200.0;

/// Requests per tick drawn for benign traffic.
pub const BENIGN_COUNT_MIN: u64 = 5;
pub const BENIGN_COUNT_MAX: u64 = 10;

/// Requests per tick drawn for volumetric attack traffic.
pub const ATTACK_COUNT_MIN: u64 = 5000;
pub const ATTACK_COUNT_MAX: u64 = 10000;

/// Length of the rolling requests-per-second window (seconds).
pub const RPS_WINDOW_SECS: f64 = 1.0;

/// Synthetic source addresses are `10.0.0.{ADDRESS_HOST_MIN..=ADDRESS_HOST_MAX}`.
pub const ADDRESS_PREFIX: &str = "10.0.0.";
pub const ADDRESS_HOST_MIN: u8 = 2;
pub const ADDRESS_HOST_MAX: u8 = 254;

/// Capacity of the push-channel broadcast buffer (events).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Maximum age of persisted tick records before they are pruned (days).
pub const PRUNE_MAX_AGE_DAYS: u64 = 90;

/// Interval between pruning passes (seconds). One day.
pub const PRUNE_INTERVAL_SECS: u64 = 86_400;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_DB_PATH: &str = "ddosguard.db";
pub const DEFAULT_LOG_PATH: &str = "predictions.csv";

/// Simulation parameters owned by the tick engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub bucket_capacity: f64,
    pub nominal_refill_rate: f64,
    pub benign_count: RangeInclusive<u64>,
    pub attack_count: RangeInclusive<u64>,
    pub rps_window: Duration,
    /// Seed for the engine RNG. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: BUCKET_CAPACITY,
            nominal_refill_rate: NOMINAL_REFILL_RATE,
            benign_count: BENIGN_COUNT_MIN..=BENIGN_COUNT_MAX,
            attack_count: ATTACK_COUNT_MIN..=ATTACK_COUNT_MAX,
            rps_window: Duration::from_secs_f64(RPS_WINDOW_SECS),
            seed: None,
        }
    }
}

/// Process-level settings: where to listen, where to persist, how often to tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub tick_interval: Duration,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `DDOSGUARD_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("DDOSGUARD_BIND") {
            config.bind_addr = bind;
        }
        if let Some(path) = lookup("DDOSGUARD_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("DDOSGUARD_LOG_PATH") {
            config.log_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("DDOSGUARD_TICK_MS") {
            let ms: u64 = raw.parse().map_err(|_| {
                AppError::InvalidArgument(format!("DDOSGUARD_TICK_MS is not a number: {raw}"))
            })?;
            if ms == 0 {
                return Err(AppError::InvalidArgument(
                    "DDOSGUARD_TICK_MS must be positive".into(),
                ));
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("DDOSGUARD_SEED") {
            let seed: u64 = raw.parse().map_err(|_| {
                AppError::InvalidArgument(format!("DDOSGUARD_SEED is not a number: {raw}"))
            })?;
            config.engine.seed = Some(seed);
        }

        Ok(config)
    }
}
