//! Operator control state: running flag, traffic selector, neutralization.
//!
//! Mutated only by control commands. The tick engine reads it once per cycle
//! to decide whether to do any work and which behavior mode applies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Traffic pattern selected by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficType {
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "ddos", alias = "attack")]
    Attack,
}

impl TrafficType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficType::Normal => "normal",
            TrafficType::Attack => "ddos",
        }
    }

    /// Parse the wire name. `"attack"` is accepted as an alias of `"ddos"`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(TrafficType::Normal),
            "ddos" | "attack" => Ok(TrafficType::Attack),
            other => Err(AppError::InvalidArgument(format!(
                "unknown traffic type '{other}' (expected 'normal' or 'ddos')"
            ))),
        }
    }
}

impl fmt::Display for TrafficType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a tick generates and classifies traffic, after neutralization is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorMode {
    Benign,
    Attack,
}

/// Whether the tick loop currently has any effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Idle,
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    running: bool,
    traffic_type: TrafficType,
    neutralized: bool,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or re-arm) simulation of the given traffic type.
    pub fn start(&mut self, traffic_type: TrafficType) {
        self.running = true;
        self.traffic_type = traffic_type;
        self.neutralized = false;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Treat attack traffic as benign until the next start.
    pub fn neutralize(&mut self) -> Result<(), AppError> {
        if self.traffic_type != TrafficType::Attack {
            return Err(AppError::InvalidTransition(format!(
                "cannot neutralize while traffic type is '{}'",
                self.traffic_type
            )));
        }
        self.neutralized = true;
        Ok(())
    }

    pub fn mode(&self) -> EngineMode {
        if self.running {
            EngineMode::Active
        } else {
            EngineMode::Idle
        }
    }

    /// Benign when traffic is normal or neutralized, attack otherwise.
    pub fn behavior(&self) -> BehaviorMode {
        if self.traffic_type == TrafficType::Normal || self.neutralized {
            BehaviorMode::Benign
        } else {
            BehaviorMode::Attack
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn traffic_type(&self) -> TrafficType {
        self.traffic_type
    }

    pub fn neutralized(&self) -> bool {
        self.neutralized
    }
}

/// Acknowledgment returned by every control command: the state after it applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlStatus {
    pub running: bool,
    pub mode: EngineMode,
    pub traffic_type: TrafficType,
    pub neutralized: bool,
    pub rate_limiting: bool,
    pub tokens: f64,
    pub blocked: Vec<String>,
}
