//! One-JSON-object-per-line event emission.
//!
//! Every event carries `event_type`, `timestamp`, and `run_id` (null only for
//! commands that have no run context). Lines use canonical serialization
//! (sorted keys, ASCII-safe) so downstream log processing is stable.

use chrono::{SecondsFormat, Utc};
use models::canon::to_canonical_string;
use models::FetchLog;
use serde_json::{json, Map, Value};

/// Render one event line without printing it.
pub fn event_line(event_type: &str, run_id: Option<&str>, payload: Value) -> String {
    let mut event = Map::new();
    event.insert("event_type".to_string(), json!(event_type));
    event.insert(
        "timestamp".to_string(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    event.insert("run_id".to_string(), json!(run_id));
    if let Value::Object(fields) = payload {
        for (key, value) in fields {
            event.insert(key, value);
        }
    }
    to_canonical_string(&Value::Object(event))
}

/// Emit one event line to stdout and return it for testability.
pub fn emit_event(event_type: &str, run_id: Option<&str>, payload: Value) -> String {
    let line = event_line(event_type, run_id, payload);
    println!("{line}");
    line
}

/// JSON shape of one fetch-log line.
pub fn fetch_log_value(fetch_log: &FetchLog) -> Value {
    json!({
        "id": fetch_log.id,
        "url": fetch_log.url,
        "status_code": fetch_log.status_code,
        "latency_ms": fetch_log.latency_ms,
        "bytes_received": fetch_log.bytes_received,
        "error_code": fetch_log.error_code.map(|code| code.as_str()),
        "timestamp": fetch_log.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        "run_id": fetch_log.run_id,
    })
}

/// Emit one fetch-log line to stdout and return it.
pub fn emit_fetch_log(fetch_log: &FetchLog) -> String {
    let line = to_canonical_string(&fetch_log_value(fetch_log));
    println!("{line}");
    line
}
