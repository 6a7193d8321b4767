//! Provider payload decoding into flat record batches.
//!
//! The payload is a JSON time-series document: a list of named metrics, each
//! with one or more timeseries, each with timestamped values. The decoder
//! flattens it into one record per (metric, timeseries, data point). Resource
//! identity is not part of the payload; it comes from the configuration's
//! `additionalVariables.ResourceId` entry.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::ExporterConfig;
use crate::error::DecodeError;
use crate::record::RecordBatch;

const SNIPPET_MAX: usize = 256;

#[derive(Debug, Deserialize)]
struct MetricsPayload {
    #[serde(default)]
    value: Vec<MetricValue>,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
    name: MetricName,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
struct MetricName {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    data: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    #[serde(rename = "timeStamp", deserialize_with = "rfc3339_timestamp")]
    timestamp: OffsetDateTime,
    #[serde(default = "zero_text", deserialize_with = "decimal_text")]
    average: String,
}

fn rfc3339_timestamp<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    OffsetDateTime::parse(&raw, &Rfc3339).map_err(DeError::custom)
}

fn zero_text() -> String {
    String::from("0")
}

/// Captures the value as decimal text without an f64 round trip. Providers
/// send averages as JSON numbers or numeric strings; an absent or null value
/// decodes as zero, matching the original exporter.
fn decimal_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(zero_text()),
        other => Err(DeError::custom(format!(
            "expected a number or numeric string, got {other}"
        ))),
    }
}

/// Decodes raw payload bytes into a record batch.
///
/// # Errors
///
/// Malformed JSON yields [`DecodeError::Malformed`] carrying a bounded
/// payload snippet for diagnosis. The caller treats this as non-fatal and
/// applies an empty batch for the cycle.
pub fn decode(payload: &[u8], config: &ExporterConfig) -> Result<RecordBatch, DecodeError> {
    let parsed: MetricsPayload =
        serde_json::from_slice(payload).map_err(|source| DecodeError::Malformed {
            source,
            snippet: snippet(payload),
        })?;

    let resource_id = config
        .additional_variables
        .get("ResourceId")
        .cloned()
        .unwrap_or_default();

    let mut batch = RecordBatch::with_header();
    for metric in &parsed.value {
        for series in &metric.timeseries {
            for point in &series.data {
                batch.push_row([
                    resource_id.clone(),
                    metric.name.value.clone(),
                    point.timestamp.format(&Rfc3339)?,
                    point.average.clone(),
                    metric.unit.clone(),
                ]);
            }
        }
    }
    Ok(batch)
}

fn snippet(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .chars()
        .take(SNIPPET_MAX)
        .collect()
}
