//! Append-only CSV log of tick records.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

use super::TickSink;
use crate::core::record::TickRecord;

pub const CSV_HEADER: &str = "timestamp,traffic_type,source_address,duration,protocol_type,\
src_bytes,dst_bytes,predicted_label,anomaly_score,label,requested_count,admitted_count,dropped_count";

pub struct FlatLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FlatLog {
    /// Open `path` for appending. A new or empty file gets the header line first.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open flat log {}", path.display()))?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{CSV_HEADER}")?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TickSink for FlatLog {
    fn name(&self) -> &'static str {
        "flat log"
    }

    fn append(&self, record: &TickRecord) -> Result<()> {
        let line = csv_line(record);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}

/// One data row, in header order. Addresses never contain commas.
pub fn csv_line(r: &TickRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{}",
        r.timestamp_text(),
        r.traffic_type,
        r.source_address,
        r.duration,
        r.protocol_type,
        r.src_bytes,
        r.dst_bytes,
        r.predicted_label,
        r.anomaly_score,
        r.label,
        r.requested_count,
        r.admitted_count,
        r.dropped_count,
    )
}
