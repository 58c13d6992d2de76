//! Persisted tick history queries.

use chrono::Utc;
use serde::Deserialize;

use crate::core::record::TickRecord;
use crate::db::LabelSummary;
use crate::error::AppError;

use super::logic::{parse_time_range, parse_traffic_filter};
use super::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub traffic_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Tick records within a time range (RFC 3339 bounds), optionally for one traffic type.
pub fn get_history(state: &AppState, query: &HistoryQuery) -> Result<Vec<TickRecord>, AppError> {
    let (from, to) = parse_time_range(query.from.as_deref(), query.to.as_deref(), Utc::now())?;
    let traffic_type = parse_traffic_filter(query.traffic_type.as_deref())?;
    state
        .database
        .query_history(from, to, traffic_type)
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Per-label totals over a time window.
pub fn get_summary(state: &AppState, query: &SummaryQuery) -> Result<Vec<LabelSummary>, AppError> {
    let (from, to) = parse_time_range(query.from.as_deref(), query.to.as_deref(), Utc::now())?;
    state
        .database
        .label_summary(from, to)
        .map_err(|e| AppError::Database(e.to_string()))
}
