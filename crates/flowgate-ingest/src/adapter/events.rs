//! Event-feed adapter.
//!
//! Accepts a sequence of JSON objects carrying the same field contract as the
//! tabular upload. Each event is projected onto the known columns; unknown
//! keys are dropped before the row enters the pipeline.
//!
//! The batch `content_hash` is the SHA-256 over the canonical serialization
//! of each projected event (recursively sorted keys, serde_json's stable
//! number formatting), concatenated in document order. Two payloads that
//! differ only in key order or in dropped extras therefore hash identically.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{COLUMN_COUNT, Column, ParsedBatch, RowMap};

/// Project feed events onto typed rows and compute the payload hash.
pub fn parse_events(events: &[Map<String, Value>]) -> ParsedBatch {
    let mut hasher = Sha256::new();
    let mut has_status_column = false;
    let mut rows = Vec::with_capacity(events.len());

    for event in events {
        let mut projected: Vec<(Column, &Value)> = Vec::with_capacity(COLUMN_COUNT);
        for (key, value) in event {
            if let Some(column) = Column::from_header(key) {
                if column == Column::RecordStatus {
                    has_status_column = true;
                }
                projected.push((column, value));
            }
        }
        projected.sort_by_key(|(column, _)| column.name());

        hasher.update(canonical_event(&projected).as_bytes());

        let mut row = RowMap::new();
        for (column, value) in projected {
            if let Some(s) = value_to_field(value) {
                row.set(column, s);
            }
        }
        rows.push(row);
    }

    ParsedBatch {
        rows,
        has_status_column,
        content_hash: hex::encode(hasher.finalize()),
    }
}

/// Canonical JSON for one projected event: `{"amount":100,"channel":"UPI",...}`.
fn canonical_event(fields: &[(Column, &Value)]) -> String {
    let mut out = String::from("{");
    for (i, (column, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(column.name());
        out.push_str("\":");
        out.push_str(&canonical_value(value));
    }
    out.push('}');
    out
}

/// Canonical JSON for an arbitrary value: object keys sorted recursively,
/// no whitespace, serde_json's stable number formatting.
fn canonical_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                out.push_str(&canonical_value(&map[*key]));
            }
            out.push('}');
            out
        }
        Value::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonical_value(item));
            }
            out.push(']');
            out
        }
        other => other.to_string(),
    }
}

/// Coerce a JSON value into the row-map string representation.
///
/// Nulls become missing fields; scalars stringify; nested structures keep
/// their canonical JSON form (and fail row validation downstream).
fn value_to_field(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(canonical_value(other)),
    }
}
