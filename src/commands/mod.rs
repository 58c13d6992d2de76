//! Command handlers, organized by functional domain.
//!
//! - `control`: start/stop/neutralize/block/rate-limit, status, classify, metrics
//! - `history`: persisted tick history and per-label summaries
//! - `logic`: Pure parsing and dispatch functions (unit-testable)
//! - `state`: Shared `AppState` definition

pub(crate) mod control;
pub(crate) mod history;
mod logic;
mod state;

pub use history::{HistoryQuery, SummaryQuery};
pub use logic::{apply_command, parse_command, ClientMessage, ControlCommand};
pub use state::AppState;
