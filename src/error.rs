//! Unified error type for control commands, ticks, and the HTTP surface.
//!
//! `AppError` is the single error type returned by every command handler and
//! reported to push-channel observers. It serializes as
//! `{ "kind": "...", "message": "..." }` so clients can programmatically
//! distinguish error categories.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::ser::SerializeStruct;

/// Application-level error.
///
/// Each variant maps to a distinct failure domain. Observers receive a JSON
/// object with `kind` (variant name) and `message` (human-readable description).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    /// A command was issued in a state that does not allow it.
    #[error("{0}")]
    InvalidTransition(String),

    /// Invalid or missing input, including malformed generator samples.
    #[error("{0}")]
    InvalidArgument(String),

    /// The inference capability failed or broke its output contract.
    #[error("{0}")]
    Inference(String),

    /// Errors originating from SQLite / database operations.
    #[error("{0}")]
    Database(String),

    /// I/O and OS-level errors (flat log, sockets).
    #[error("{0}")]
    Io(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidTransition(_) => "InvalidTransition",
            AppError::InvalidArgument(_) => "InvalidArgument",
            AppError::Inference(_) => "Inference",
            AppError::Database(_) => "Database",
            AppError::Io(_) => "Io",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::Inference(_) | AppError::Database(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(format!("{err:#}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
