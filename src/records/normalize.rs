//! Normalization of stored log documents.
//!
//! Documents arrive either in native shape (`{"createdAt": "..."}`) or in
//! wire-serialized shape where every value is wrapped in a single-key tag
//! object (`{"createdAt": {"stringValue": "..."}}`). Both shapes, and any mix
//! of them, normalize to the same [`LogRecord`].

use crate::records::timestamp::format_token;
use crate::types::{LogRecord, MemberId, RawSnapshot, UserSnapshot};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

const STRING_TAG: &str = "stringValue";
const INTEGER_TAG: &str = "integerValue";
const DOUBLE_TAG: &str = "doubleValue";
const BOOLEAN_TAG: &str = "booleanValue";
const TIMESTAMP_TAG: &str = "timestampValue";
const ARRAY_TAG: &str = "arrayValue";
const MAP_TAG: &str = "mapValue";
const NULL_TAG: &str = "nullValue";

/// Unwrap a possibly tagged value into its plain form.
///
/// Returns `None` for `null` and for wrappers whose payload has the wrong
/// type. Arrays and maps are unwrapped one level; their elements may still be
/// wrapped and are unwrapped by the caller as needed.
pub fn unwrap_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) if map.len() == 1 => {
            let (tag, inner) = map.iter().next()?;
            match tag.as_str() {
                STRING_TAG => inner.as_str().map(|s| Value::String(s.to_string())),
                INTEGER_TAG => unwrap_integer(inner),
                DOUBLE_TAG => inner
                    .as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number),
                BOOLEAN_TAG => inner.as_bool().map(Value::Bool),
                TIMESTAMP_TAG => inner.as_str().map(|s| Value::String(timestamp_to_token(s))),
                ARRAY_TAG => unwrap_array(inner),
                MAP_TAG => unwrap_map(inner),
                NULL_TAG => None,
                _ => Some(value.clone()),
            }
        }
        other => Some(other.clone()),
    }
}

/// Integers travel as decimal strings on the wire.
fn unwrap_integer(inner: &Value) -> Option<Value> {
    match inner {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::Number(n.clone())),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

/// An empty array is encoded as `{"arrayValue": {}}`.
fn unwrap_array(inner: &Value) -> Option<Value> {
    let obj = inner.as_object()?;
    match obj.get("values") {
        None => Some(Value::Array(Vec::new())),
        Some(Value::Array(values)) => Some(Value::Array(values.clone())),
        Some(_) => None,
    }
}

fn unwrap_map(inner: &Value) -> Option<Value> {
    let obj = inner.as_object()?;
    match obj.get("fields") {
        None => Some(Value::Object(Map::new())),
        Some(Value::Object(fields)) => Some(Value::Object(fields.clone())),
        Some(_) => None,
    }
}

/// Wire timestamps are RFC 3339; convert them to timestamp tokens so they
/// order alongside native tokens. Anything else passes through unchanged.
fn timestamp_to_token(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| format_token(at.with_timezone(&Utc)))
        .unwrap_or_else(|_| raw.to_string())
}

/// Unwrap a value that must be textual. Numbers are rendered in decimal.
fn unwrap_text(value: &Value) -> Option<String> {
    match unwrap_value(value)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unwrap a value that must be a string; numbers are rejected.
fn unwrap_string(value: &Value) -> Option<String> {
    match unwrap_value(value)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Normalize one stored log.
///
/// `createdAt` and `duration` are required; the record is discarded when
/// either is missing after unwrapping. Tags that are not strings are dropped
/// individually.
pub fn normalize_log(raw: &Value) -> Option<LogRecord> {
    let fields = match unwrap_value(raw)? {
        Value::Object(fields) => fields,
        _ => return None,
    };

    let created_at = fields.get("createdAt").and_then(unwrap_text)?;
    let duration_minutes = fields.get("duration").and_then(unwrap_text)?;

    let tags = match fields.get("tags").and_then(unwrap_value) {
        Some(Value::Array(items)) => items.iter().filter_map(unwrap_string).collect(),
        _ => Vec::new(),
    };

    let description = fields.get("description").and_then(unwrap_string);

    Some(LogRecord {
        created_at,
        duration_minutes,
        tags,
        description,
    })
}

/// Normalize a full member snapshot, dropping malformed records.
pub fn normalize_snapshot(author_id: &MemberId, raw: RawSnapshot) -> UserSnapshot {
    let total = raw.logs.len();
    let logs: Vec<LogRecord> = raw.logs.iter().filter_map(normalize_log).collect();

    if logs.len() < total {
        debug!(
            member = %author_id,
            dropped = total - logs.len(),
            "Dropped malformed log records"
        );
    }

    UserSnapshot {
        author_id: author_id.clone(),
        display_name: raw.display_name,
        logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_plain_values() {
        assert_eq!(unwrap_value(&json!("x")), Some(json!("x")));
        assert_eq!(unwrap_value(&json!(45)), Some(json!(45)));
        assert_eq!(unwrap_value(&Value::Null), None);
    }

    #[test]
    fn test_unwrap_tagged_values() {
        assert_eq!(unwrap_value(&json!({"stringValue": "piano"})), Some(json!("piano")));
        assert_eq!(unwrap_value(&json!({"integerValue": "45"})), Some(json!(45)));
        assert_eq!(unwrap_value(&json!({"doubleValue": 1.5})), Some(json!(1.5)));
        assert_eq!(unwrap_value(&json!({"booleanValue": true})), Some(json!(true)));
        assert_eq!(
            unwrap_value(&json!({"timestampValue": "2024-01-15T19:00:00Z"})),
            Some(json!("2024-01-15-19-00"))
        );
        assert_eq!(unwrap_value(&json!({"arrayValue": {}})), Some(json!([])));
        assert_eq!(
            unwrap_value(&json!({"mapValue": {"fields": {"a": {"stringValue": "b"}}}})),
            Some(json!({"a": {"stringValue": "b"}}))
        );
    }

    #[test]
    fn test_unwrap_rejects_mistyped_wrapper() {
        assert_eq!(unwrap_value(&json!({"stringValue": 3})), None);
        assert_eq!(unwrap_value(&json!({"integerValue": "abc"})), None);
        assert_eq!(unwrap_value(&json!({"booleanValue": "yes"})), None);
    }

    #[test]
    fn test_normalize_native_log() {
        let raw = json!({
            "createdAt": "2024-01-15-19-00",
            "duration": "45",
            "tags": ["piano", 7, "scales"],
            "description": "x"
        });

        let log = normalize_log(&raw).unwrap();
        assert_eq!(log.created_at, "2024-01-15-19-00");
        assert_eq!(log.duration_minutes, "45");
        assert_eq!(log.tags, vec!["piano", "scales"]);
        assert_eq!(log.description.as_deref(), Some("x"));
    }

    #[test]
    fn test_normalize_wire_log() {
        let raw = json!({
            "mapValue": {
                "fields": {
                    "createdAt": {"stringValue": "2024-01-16-14-00"},
                    "duration": {"integerValue": "60"},
                    "tags": {"arrayValue": {"values": [
                        {"stringValue": "guitar"},
                        {"integerValue": "1"}
                    ]}},
                    "description": {"nullValue": null}
                }
            }
        });

        let log = normalize_log(&raw).unwrap();
        assert_eq!(log.created_at, "2024-01-16-14-00");
        assert_eq!(log.duration_minutes, "60");
        assert_eq!(log.tags, vec!["guitar"]);
        assert_eq!(log.description, None);
    }

    #[test]
    fn test_normalize_defaults() {
        let log = normalize_log(&json!({"createdAt": "2024-01-15-19-00", "duration": 30})).unwrap();
        assert_eq!(log.duration_minutes, "30");
        assert!(log.tags.is_empty());
        assert!(log.description.is_none());
    }

    #[test]
    fn test_normalize_discards_missing_required() {
        assert!(normalize_log(&json!({"duration": "45"})).is_none());
        assert!(normalize_log(&json!({"createdAt": "2024-01-15-19-00"})).is_none());
        assert!(normalize_log(&json!({"createdAt": {"stringValue": null}, "duration": "5"})).is_none());
        assert!(normalize_log(&json!("not a log")).is_none());
        assert!(normalize_log(&Value::Null).is_none());
    }

    #[test]
    fn test_normalize_snapshot_isolates_malformed() {
        let raw = RawSnapshot::new(
            "Ada",
            vec![
                json!({"createdAt": "2024-01-15-19-00", "duration": "45"}),
                json!({"duration": "10"}),
                json!({"createdAt": "2024-01-17-08-00", "duration": "20"}),
            ],
        );

        let snapshot = normalize_snapshot(&MemberId::from("u1"), raw);
        assert_eq!(snapshot.display_name, "Ada");
        assert_eq!(snapshot.logs.len(), 2);
        assert_eq!(snapshot.logs[1].created_at, "2024-01-17-08-00");
    }
}
