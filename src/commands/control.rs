//! Control commands, status, ad-hoc classification and metrics.

use crate::core::classifier::ClassificationResult;
use crate::core::control::ControlStatus;
use crate::core::sample::FeatureSample;
use crate::error::AppError;

use super::logic::{apply_command, parse_command, ClientMessage};
use super::state::AppState;

/// Parse and apply one control envelope. Returns the status after it applied.
pub fn handle_control(state: &AppState, msg: &ClientMessage) -> Result<ControlStatus, AppError> {
    let command = parse_command(msg)?;
    apply_command(&state.engine, command).inspect_err(|e| {
        tracing::warn!("Control command '{}' rejected: {e}", msg.event);
    })
}

pub fn get_status(state: &AppState) -> ControlStatus {
    state.engine.status()
}

/// Classify an ad-hoc sample with the engine's classifier.
pub fn classify_sample(
    state: &AppState,
    sample: &FeatureSample,
) -> Result<ClassificationResult, AppError> {
    state.engine.classify_sample(sample)
}

/// Prometheus text exposition of the engine's registry.
pub fn render_metrics(state: &AppState) -> String {
    state.engine.metrics().render()
}
