//! Classification of a tick's sample: forced for attack traffic, delegated to
//! the inference capability otherwise.
//!
//! [`ClassificationMode`] is resolved once per tick. The forced branch never
//! touches the classifier, so attack traffic is always flagged no matter what
//! the model would say.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::control::BehaviorMode;
use crate::core::sample::FeatureSample;
use crate::error::AppError;

/// Final verdict for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    #[serde(rename = "DDoS")]
    Attack,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "Normal",
            Label::Attack => "DDoS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Normal" => Some(Label::Normal),
            "DDoS" => Some(Label::Attack),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw output of the inference capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub predicted_label: u8,
    pub anomaly_score: f64,
}

/// Inference capability: `[duration, protocol_code, src_bytes, dst_bytes]` in,
/// `(predicted_label, anomaly_score)` out.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &[f64]) -> Result<Prediction, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub predicted_label: u8,
    pub anomaly_score: f64,
    pub label: Label,
}

impl ClassificationResult {
    /// The verdict applied to unmitigated attack traffic.
    pub const FORCED_ATTACK: ClassificationResult = ClassificationResult {
        predicted_label: 1,
        anomaly_score: -1.0,
        label: Label::Attack,
    };

    /// Attack if the model predicts 1 or scores the sample as an outlier.
    pub fn from_prediction(prediction: Prediction) -> Result<Self, AppError> {
        if prediction.predicted_label > 1 {
            return Err(AppError::Inference(format!(
                "classifier returned label {} (expected 0 or 1)",
                prediction.predicted_label
            )));
        }
        if !prediction.anomaly_score.is_finite() {
            return Err(AppError::Inference(
                "classifier returned a non-finite anomaly score".into(),
            ));
        }
        let label = if prediction.predicted_label == 1 || prediction.anomaly_score < 0.0 {
            Label::Attack
        } else {
            Label::Normal
        };
        Ok(Self {
            predicted_label: prediction.predicted_label,
            anomaly_score: prediction.anomaly_score,
            label,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassificationMode {
    Forced(ClassificationResult),
    Delegated,
}

impl ClassificationMode {
    pub fn for_behavior(behavior: BehaviorMode) -> Self {
        match behavior {
            BehaviorMode::Attack => ClassificationMode::Forced(ClassificationResult::FORCED_ATTACK),
            BehaviorMode::Benign => ClassificationMode::Delegated,
        }
    }

    pub fn resolve(
        self,
        classifier: &dyn Classifier,
        sample: &FeatureSample,
    ) -> Result<ClassificationResult, AppError> {
        match self {
            ClassificationMode::Forced(result) => Ok(result),
            ClassificationMode::Delegated => {
                let prediction = classifier.classify(&sample.features())?;
                ClassificationResult::from_prediction(prediction)
            }
        }
    }
}

/// Volumetric source-byte level at which a flow is predicted as attack.
pub const VOLUMETRIC_SRC_BYTES: f64 = 5000.0;

/// Byte imbalance that maps the anomaly score from 0.5 down to 0.0.
const IMBALANCE_SCALE: f64 = 2000.0;

/// Rule-based stand-in for a trained model.
///
/// Inputs are zero-padded or truncated to `arity` before scoring, the way a
/// fixed-width model would accept them.
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    arity: usize,
}

impl ThresholdClassifier {
    pub fn new(arity: usize) -> Self {
        Self { arity }
    }

    fn fit_arity(&self, features: &[f64]) -> Vec<f64> {
        let mut fitted: Vec<f64> = features.iter().take(self.arity).copied().collect();
        fitted.resize(self.arity, 0.0);
        fitted
    }
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Classifier for ThresholdClassifier {
    fn classify(&self, features: &[f64]) -> Result<Prediction, AppError> {
        if features.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Inference("non-finite feature value".into()));
        }
        let fitted = self.fit_arity(features);
        let src_bytes = fitted.get(2).copied().unwrap_or(0.0);
        let dst_bytes = fitted.get(3).copied().unwrap_or(0.0);

        let predicted_label = u8::from(src_bytes >= VOLUMETRIC_SRC_BYTES);
        let anomaly_score = 0.5 - (src_bytes - dst_bytes).abs() / IMBALANCE_SCALE;
        Ok(Prediction {
            predicted_label,
            anomaly_score,
        })
    }
}
