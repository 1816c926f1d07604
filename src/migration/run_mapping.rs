// Run field mapping - declarative logbook column -> run DTO field table
// Only the columns listed here are read from the source; extend the table to carry more.

use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::models::RunRow;

/// How a source column is decoded and rendered in the run payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    /// Floating point Unix seconds, sent as an RFC 3339 timestamp.
    EpochSeconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFieldMapping {
    pub source: &'static str,
    pub target: &'static str,
    pub kind: FieldKind,
}

pub const RUN_FIELD_MAPPINGS: &[RunFieldMapping] = &[
    RunFieldMapping { source: "DAQ_time_start", target: "O2StartTime", kind: FieldKind::EpochSeconds },
    RunFieldMapping { source: "TRGTimeStart", target: "TrgStartTime", kind: FieldKind::EpochSeconds },
    RunFieldMapping { source: "run_type", target: "runType", kind: FieldKind::Text },
    RunFieldMapping { source: "numberOfDetectors", target: "nDetectors", kind: FieldKind::Integer },
    RunFieldMapping { source: "numberOfLDCs", target: "nFlps", kind: FieldKind::Integer },
    RunFieldMapping { source: "numberOfGDCs", target: "nEpns", kind: FieldKind::Integer },
];

/// Values for fields the run endpoint requires when the source column is NULL.
pub const RUN_FIELD_DEFAULTS: &[(&str, &str)] = &[
    ("O2StartTime", "2001-01-01T11:11:11Z"),
    ("TrgStartTime", "2001-01-01T11:11:11Z"),
    ("runType", "my-run-type"),
];

/// Bounds of the run query: `min_run <= run <= max_run`, at most `limit` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunQuery {
    pub min_run: i64,
    pub max_run: i64,
    pub limit: i64,
}

impl Default for RunQuery {
    fn default() -> Self {
        Self {
            min_run: 500,
            max_run: 9_999_999,
            limit: 10,
        }
    }
}

/// Build the run creation payload for one source row.
pub fn build_run_payload(row: &RunRow, mappings: &[RunFieldMapping]) -> AppResult<Value> {
    let mut payload = Map::new();

    for mapping in mappings {
        let value = match row.values.get(mapping.source) {
            None | Some(Value::Null) => continue,
            Some(value) => value,
        };
        let rendered = match mapping.kind {
            FieldKind::Integer | FieldKind::Text => value.clone(),
            FieldKind::EpochSeconds => Value::String(epoch_to_rfc3339(mapping.source, value)?),
        };
        payload.insert(mapping.target.to_string(), rendered);
    }

    for (field, default) in RUN_FIELD_DEFAULTS {
        payload
            .entry(field.to_string())
            .or_insert_with(|| Value::String(default.to_string()));
    }

    Ok(Value::Object(payload))
}

fn epoch_to_rfc3339(column: &str, value: &Value) -> AppResult<String> {
    let seconds = value.as_f64().ok_or_else(|| {
        AppError::DeserializationError(format!("Column {} is not numeric: {}", column, value))
    })?;
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;

    DateTime::from_timestamp(whole as i64, nanos)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| {
            AppError::DeserializationError(format!("Column {} is out of range: {}", column, seconds))
        })
}
