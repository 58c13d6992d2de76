//! HTTP and WebSocket transport over the command handlers.
//!
//! - `GET /ws` — push channel (updates, status replies, errors) and commands
//! - `POST /api/control`, `GET /api/status` — control surface
//! - `GET /api/history`, `GET /api/summary` — persisted history
//! - `POST /api/classify` — ad-hoc classification
//! - `GET /metrics` — Prometheus exposition

mod handlers;
mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::commands::AppState;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/control", post(handlers::control))
        .route("/status", get(handlers::status))
        .route("/history", get(handlers::history))
        .route("/summary", get(handlers::summary))
        .route("/classify", post(handlers::classify));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws::ws_handler))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
