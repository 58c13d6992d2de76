//! Synthetic traffic samples and the generator seam.
//!
//! A [`FeatureSample`] describes the single representative request generated
//! per tick. [`SampleGenerator`] is the seam the engine generates through;
//! [`SyntheticGenerator`] is the built-in implementation.

use std::fmt;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::core::control::BehaviorMode;
use crate::error::AppError;

/// Transport protocol of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// Numeric code used in classifier feature vectors.
    pub fn code(&self) -> f64 {
        match self {
            Protocol::Tcp => 0.0,
            Protocol::Udp => 1.0,
            Protocol::Icmp => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }

    /// Parse a stored protocol name. Unknown names map to TCP, like their code.
    pub fn from_name(name: &str) -> Self {
        match name {
            "udp" => Protocol::Udp,
            "icmp" => Protocol::Icmp,
            _ => Protocol::Tcp,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated request. Immutable once produced; scoped to a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSample {
    pub duration: f64,
    pub protocol_type: Protocol,
    pub src_bytes: f64,
    pub dst_bytes: f64,
    #[serde(default)]
    pub source_address: String,
}

impl FeatureSample {
    /// Classifier input: `[duration, protocol_code, src_bytes, dst_bytes]`.
    pub fn features(&self) -> [f64; 4] {
        [
            self.duration,
            self.protocol_type.code(),
            self.src_bytes,
            self.dst_bytes,
        ]
    }

    /// Reject samples with non-finite or negative numeric fields.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("duration", self.duration),
            ("src_bytes", self.src_bytes),
            ("dst_bytes", self.dst_bytes),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::InvalidArgument(format!(
                    "malformed sample: {name} = {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Produces one sample per tick for the effective behavior mode.
pub trait SampleGenerator: Send {
    fn generate(
        &mut self,
        mode: BehaviorMode,
        source_address: String,
    ) -> Result<FeatureSample, AppError>;
}

/// Uniform synthetic traffic: small balanced flows for benign traffic,
/// short lopsided floods for attack traffic.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    rng: ChaCha8Rng,
}

impl SyntheticGenerator {
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleGenerator for SyntheticGenerator {
    fn generate(
        &mut self,
        mode: BehaviorMode,
        source_address: String,
    ) -> Result<FeatureSample, AppError> {
        let rng = &mut self.rng;
        let sample = match mode {
            BehaviorMode::Benign => FeatureSample {
                duration: round_to(rng.gen_range(0.1..=1.0), 4),
                protocol_type: *[Protocol::Tcp, Protocol::Udp]
                    .choose(rng)
                    .unwrap_or(&Protocol::Tcp),
                src_bytes: round_to(rng.gen_range(100.0..=1000.0), 2),
                dst_bytes: round_to(rng.gen_range(100.0..=1000.0), 2),
                source_address,
            },
            BehaviorMode::Attack => FeatureSample {
                duration: round_to(rng.gen_range(0.0..=0.2), 4),
                protocol_type: *[Protocol::Tcp, Protocol::Udp, Protocol::Icmp]
                    .choose(rng)
                    .unwrap_or(&Protocol::Tcp),
                src_bytes: round_to(rng.gen_range(10_000.0..=20_000.0), 2),
                dst_bytes: round_to(rng.gen_range(0.0..=10.0), 2),
                source_address,
            },
        };
        Ok(sample)
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
