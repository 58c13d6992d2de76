//! Tick history table operations.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::Serialize;

use super::Database;
use crate::core::classifier::Label;
use crate::core::control::TrafficType;
use crate::core::record::{format_timestamp, TickRecord};
use crate::core::sample::Protocol;
use crate::sink::TickSink;

const SELECT_COLUMNS: &str = "SELECT timestamp, traffic_type, source_address, duration, protocol_type,
        src_bytes, dst_bytes, predicted_label, anomaly_score, label,
        requested_count, admitted_count, dropped_count
 FROM tick_records";

/// Totals for one label over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub label: Label,
    pub ticks: u64,
    pub requested: u64,
    pub admitted: u64,
    pub dropped: u64,
}

impl Database {
    /// Append one tick record.
    pub fn insert_tick_record(&self, r: &TickRecord) -> Result<()> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO tick_records (timestamp, traffic_type, source_address, duration, protocol_type,
                 src_bytes, dst_bytes, predicted_label, anomaly_score, label,
                 requested_count, admitted_count, dropped_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        stmt.execute(params![
            r.timestamp_text(),
            r.traffic_type.as_str(),
            r.source_address,
            r.duration,
            r.protocol_type.as_str(),
            r.src_bytes,
            r.dst_bytes,
            r.predicted_label,
            r.anomaly_score,
            r.label.as_str(),
            r.requested_count,
            r.admitted_count,
            r.dropped_count,
        ])?;
        Ok(())
    }

    /// Records with `from <= timestamp <= to`, oldest first, optionally for one traffic type.
    pub fn query_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        traffic_type: Option<TrafficType>,
    ) -> Result<Vec<TickRecord>> {
        let conn = self.conn();
        let from = format_timestamp(&from);
        let to = format_timestamp(&to);

        let rows = match traffic_type {
            Some(tt) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "{SELECT_COLUMNS}
                     WHERE timestamp >= ?1 AND timestamp <= ?2 AND traffic_type = ?3
                     ORDER BY timestamp ASC, id ASC"
                ))?;
                let rows = stmt.query_map(params![from, to, tt.as_str()], map_tick_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "{SELECT_COLUMNS}
                     WHERE timestamp >= ?1 AND timestamp <= ?2
                     ORDER BY timestamp ASC, id ASC"
                ))?;
                let rows = stmt.query_map(params![from, to], map_tick_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Per-label tick count and request totals over a time window.
    pub fn label_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LabelSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT label, COUNT(*), SUM(requested_count), SUM(admitted_count), SUM(dropped_count)
             FROM tick_records
             WHERE timestamp >= ?1 AND timestamp <= ?2
             GROUP BY label
             ORDER BY label ASC",
        )?;

        let rows = stmt.query_map(
            params![format_timestamp(&from), format_timestamp(&to)],
            |row| {
                Ok(LabelSummary {
                    label: parse_column(row, 0, Label::from_name)?,
                    ticks: row.get(1)?,
                    requested: row.get(2)?,
                    admitted: row.get(3)?,
                    dropped: row.get(4)?,
                })
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Prune records older than the specified number of days.
    pub fn prune_old_records(&self, max_age_days: u64) -> Result<usize> {
        let cutoff = i64::try_from(max_age_days)
            .ok()
            .and_then(Duration::try_days)
            .and_then(|age| Utc::now().checked_sub_signed(age));
        // An age beyond the representable range prunes nothing.
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM tick_records WHERE timestamp < ?1",
            params![format_timestamp(&cutoff)],
        )?;
        if deleted > 0 {
            tracing::info!("Pruned {deleted} tick records older than {max_age_days} days");
        }
        Ok(deleted)
    }
}

impl TickSink for Database {
    fn name(&self) -> &'static str {
        "history database"
    }

    fn append(&self, record: &TickRecord) -> Result<()> {
        self.insert_tick_record(record)
    }
}

fn map_tick_row(row: &Row) -> rusqlite::Result<TickRecord> {
    Ok(TickRecord {
        timestamp: parse_column(row, 0, |s| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc))
        })?,
        traffic_type: parse_column(row, 1, |s| TrafficType::parse(s).ok())?,
        source_address: row.get(2)?,
        duration: row.get(3)?,
        protocol_type: Protocol::from_name(&row.get::<_, String>(4)?),
        src_bytes: row.get(5)?,
        dst_bytes: row.get(6)?,
        predicted_label: row.get(7)?,
        anomaly_score: row.get(8)?,
        label: parse_column(row, 9, Label::from_name)?,
        requested_count: row.get(10)?,
        admitted_count: row.get(11)?,
        dropped_count: row.get(12)?,
    })
}

/// Read a text column and parse it, reporting unparseable values as conversion failures.
fn parse_column<T>(
    row: &Row,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized value '{raw}'").into(),
        )
    })
}
