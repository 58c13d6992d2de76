//! Pure command parsing and dispatch, shared by the push channel and HTTP.
//!
//! These functions take plain parameters (no transport types) and can be
//! unit-tested without a running server.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::core::control::{ControlStatus, TrafficType};
use crate::core::engine::Engine;
use crate::error::AppError;

/// Client-to-server envelope: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start(TrafficType),
    Stop,
    Neutralize,
    BlockAddress(String),
    SetRateLimiting(bool),
}

/// Decode an envelope into a command. `start` defaults to normal traffic and
/// `toggle_rate_limit` to disabled when their fields are absent.
pub fn parse_command(msg: &ClientMessage) -> Result<ControlCommand, AppError> {
    match msg.event.as_str() {
        "start" => {
            let traffic_type = match msg.data.get("type") {
                None | Some(Value::Null) => TrafficType::Normal,
                Some(Value::String(raw)) => TrafficType::parse(raw)?,
                Some(other) => {
                    return Err(AppError::InvalidArgument(format!(
                        "traffic type must be a string, got {other}"
                    )))
                }
            };
            Ok(ControlCommand::Start(traffic_type))
        }
        "stop" => Ok(ControlCommand::Stop),
        "neutralize" => Ok(ControlCommand::Neutralize),
        "block_ip" => match msg.data.get("ip") {
            Some(Value::String(ip)) => Ok(ControlCommand::BlockAddress(ip.clone())),
            _ => Err(AppError::InvalidArgument(
                "block_ip requires a string 'ip' field".into(),
            )),
        },
        "toggle_rate_limit" => match msg.data.get("enabled") {
            None | Some(Value::Null) => Ok(ControlCommand::SetRateLimiting(false)),
            Some(Value::Bool(enabled)) => Ok(ControlCommand::SetRateLimiting(*enabled)),
            Some(other) => Err(AppError::InvalidArgument(format!(
                "'enabled' must be a boolean, got {other}"
            ))),
        },
        other => Err(AppError::InvalidArgument(format!(
            "unknown command '{other}'"
        ))),
    }
}

/// Apply a command to the engine and return the resulting status.
pub fn apply_command(
    engine: &Engine,
    command: ControlCommand,
) -> Result<ControlStatus, AppError> {
    match command {
        ControlCommand::Start(traffic_type) => Ok(engine.start(traffic_type)),
        ControlCommand::Stop => Ok(engine.stop()),
        ControlCommand::Neutralize => engine.neutralize(),
        ControlCommand::BlockAddress(address) => engine.block_address(&address),
        ControlCommand::SetRateLimiting(enabled) => Ok(engine.set_rate_limiting(enabled)),
    }
}

/// Default lookback for history queries without a `from` bound.
const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Resolve optional RFC 3339 bounds. `to` defaults to `now`, `from` to 24 hours before `to`.
pub fn parse_time_range(
    from: Option<&str>,
    to: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let to = match to {
        Some(raw) => parse_timestamp("to", raw)?,
        None => now,
    };
    let from = match from {
        Some(raw) => parse_timestamp("from", raw)?,
        None => to - Duration::hours(DEFAULT_LOOKBACK_HOURS),
    };
    if from > to {
        return Err(AppError::InvalidArgument(format!(
            "'from' ({from}) is after 'to' ({to})"
        )));
    }
    Ok((from, to))
}

fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            AppError::InvalidArgument(format!("'{name}' is not an RFC 3339 timestamp: {e}"))
        })
}

/// Parse an optional traffic-type filter; empty means no filter.
pub fn parse_traffic_filter(raw: Option<&str>) -> Result<Option<TrafficType>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => TrafficType::parse(raw).map(Some),
    }
}
