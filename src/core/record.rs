//! Per-tick outputs: the persisted [`TickRecord`] and the pushed [`TickEvent`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::classifier::{ClassificationResult, Label};
use crate::core::control::TrafficType;
use crate::core::sample::{FeatureSample, Protocol};

/// One append-only history row. The durable store and the flat log share this field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub traffic_type: TrafficType,
    pub source_address: String,
    pub duration: f64,
    pub protocol_type: Protocol,
    pub src_bytes: f64,
    pub dst_bytes: f64,
    pub predicted_label: u8,
    pub anomaly_score: f64,
    pub label: Label,
    pub requested_count: u64,
    pub admitted_count: u64,
    pub dropped_count: u64,
}

impl TickRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        traffic_type: TrafficType,
        sample: &FeatureSample,
        classification: &ClassificationResult,
        requested_count: u64,
        admitted_count: u64,
    ) -> Self {
        Self {
            timestamp,
            traffic_type,
            source_address: sample.source_address.clone(),
            duration: sample.duration,
            protocol_type: sample.protocol_type,
            src_bytes: sample.src_bytes,
            dst_bytes: sample.dst_bytes,
            predicted_label: classification.predicted_label,
            anomaly_score: classification.anomaly_score,
            label: classification.label,
            requested_count,
            admitted_count,
            dropped_count: requested_count - admitted_count,
        }
    }

    pub fn timestamp_text(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// RFC 3339 UTC with millisecond precision. Fixed width, so text order is time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}

/// Live update pushed to observers once per active tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickEvent {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub traffic_type: TrafficType,
    pub sample: FeatureSample,
    pub label: Label,
    pub predicted_label: u8,
    pub anomaly_score: f64,
    pub requested_count: u64,
    pub admitted_count: u64,
    pub dropped_count: u64,
    /// Rounded to two decimals.
    pub current_rps: f64,
}

impl TickEvent {
    pub fn new(record: &TickRecord, sample: FeatureSample, current_rps: f64) -> Self {
        Self {
            timestamp: record.timestamp,
            traffic_type: record.traffic_type,
            sample,
            label: record.label,
            predicted_label: record.predicted_label,
            anomaly_score: record.anomaly_score,
            requested_count: record.requested_count,
            admitted_count: record.admitted_count,
            dropped_count: record.dropped_count,
            current_rps: (current_rps * 100.0).round() / 100.0,
        }
    }
}
