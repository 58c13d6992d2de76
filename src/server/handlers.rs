use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use tokio::task::JoinError;

use crate::commands::history as queries;
use crate::commands::{control as commands, AppState, ClientMessage, HistoryQuery, SummaryQuery};
use crate::core::classifier::ClassificationResult;
use crate::core::control::ControlStatus;
use crate::core::record::TickRecord;
use crate::core::sample::FeatureSample;
use crate::db::LabelSummary;
use crate::error::AppError;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn control(
    State(state): State<AppState>,
    Json(msg): Json<ClientMessage>,
) -> Result<Json<ControlStatus>, AppError> {
    commands::handle_control(&state, &msg).map(Json)
}

pub async fn status(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(commands::get_status(&state))
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TickRecord>>, AppError> {
    // SQLite access stays off the async workers.
    tokio::task::spawn_blocking(move || queries::get_history(&state, &query))
        .await
        .map_err(join_error)?
        .map(Json)
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<LabelSummary>>, AppError> {
    tokio::task::spawn_blocking(move || queries::get_summary(&state, &query))
        .await
        .map_err(join_error)?
        .map(Json)
}

pub async fn classify(
    State(state): State<AppState>,
    Json(sample): Json<FeatureSample>,
) -> Result<Json<ClassificationResult>, AppError> {
    commands::classify_sample(&state, &sample).map(Json)
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        commands::render_metrics(&state),
    )
}

fn join_error(e: JoinError) -> AppError {
    AppError::Database(format!("query task failed: {e}"))
}
