//! SQLite persistence layer for tick history.
//!
//! Uses `rusqlite` with bundled SQLite. Handles:
//! - One row per active tick in `tick_records`
//! - Per-label summaries over a time window
//! - Auto-pruning of data older than 90 days
//!
//! Timestamps are stored as fixed-width RFC 3339 text (UTC, milliseconds), so
//! range filters compare lexically.

mod history;

pub use history::LabelSummary;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use rusqlite::Connection;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tick_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        traffic_type TEXT NOT NULL,
        source_address TEXT NOT NULL DEFAULT '',
        duration REAL NOT NULL,
        protocol_type TEXT NOT NULL,
        src_bytes REAL NOT NULL,
        dst_bytes REAL NOT NULL,
        predicted_label INTEGER NOT NULL,
        anomaly_score REAL NOT NULL,
        label TEXT NOT NULL,
        requested_count INTEGER NOT NULL DEFAULT 0,
        admitted_count INTEGER NOT NULL DEFAULT 0,
        dropped_count INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_tick_timestamp ON tick_records(timestamp);
";

/// Manages the SQLite database for tick history.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        tracing::info!("Opened history database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh in-memory database with the same schema.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
