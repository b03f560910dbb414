//! Outer envelope parsing: unwraps the log-forwarder's JSON wrapper and, when
//! `message` itself carries a JSON-encoded inner log, merges inner fields on
//! top of the outer ones (inner wins). Two-pass: a cheap header parse here,
//! full typed extraction happens once the merge is resolved.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use alert_core::LogEntry;

use crate::error::BusError;

fn as_str(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn labels_from(v: &Value) -> HashMap<String, String> {
    v.get("labels")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, val)| val.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse one raw bus message body into a [`LogEntry`].
///
/// Defaulting performed here is limited to what doesn't need runtime config:
/// `timestamp` falls back to `@timestamp` then to now. Level/message/namespace
/// defaulting and rejection happens in [`crate::validation`], which needs the
/// configured `default_log_level`.
pub fn parse_envelope(raw: &[u8]) -> Result<LogEntry, BusError> {
    let outer: Value = serde_json::from_slice(raw)
        .map_err(|e| BusError::Parse(format!("invalid outer envelope JSON: {e}")))?;

    let message_field = outer.get("message").and_then(Value::as_str);
    let inner: Option<Value> = message_field.and_then(|s| serde_json::from_str(s).ok());

    // Merge: start from outer, overlay inner's top-level keys (inner wins).
    let merged = match &inner {
        Some(Value::Object(inner_obj)) => {
            let mut merged = outer
                .as_object()
                .cloned()
                .unwrap_or_default();
            for (k, v) in inner_obj {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => outer.clone(),
    };

    let kubernetes = merged.get("kubernetes").cloned().unwrap_or(Value::Null);

    let timestamp = as_str(&merged, "timestamp")
        .or_else(|| as_str(&merged, "@timestamp"))
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let level = as_str(&merged, "level").unwrap_or_default();

    let message = as_str(&merged, "message").unwrap_or_default();

    let mut labels = labels_from(&kubernetes);
    labels.extend(labels_from(&merged));

    let service = as_str(&merged, "service")
        .filter(|s| !s.is_empty())
        .or_else(|| labels.get("app").cloned())
        .unwrap_or_default();

    let namespace = as_str(&merged, "namespace")
        .or_else(|| as_str(&kubernetes, "namespace_name"))
        .unwrap_or_default();

    let pod = as_str(&merged, "pod")
        .or_else(|| as_str(&kubernetes, "pod_name"))
        .unwrap_or_default();

    let container = as_str(&merged, "container")
        .or_else(|| as_str(&kubernetes, "container_name"))
        .unwrap_or_default();

    let host = as_str(&merged, "host").unwrap_or_default();

    let raw_str = String::from_utf8_lossy(raw).into_owned();

    Ok(LogEntry {
        timestamp,
        level,
        message,
        service,
        namespace,
        pod,
        container,
        host,
        labels,
        raw: raw_str,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_passes_through() {
        let body = br#"{"@timestamp":"2025-01-01T00:00:00Z","kubernetes":{"namespace_name":"prod","labels":{"app":"user-service"}},"message":"boom"}"#;
        let entry = parse_envelope(body).unwrap();
        assert_eq!(entry.message, "boom");
        assert_eq!(entry.namespace, "prod");
        assert_eq!(entry.app_label(), Some("user-service"));
        assert_eq!(entry.service, "user-service");
    }

    #[test]
    fn explicit_service_field_wins_over_app_label() {
        let body = br#"{"@timestamp":"2025-01-01T00:00:00Z","service":"checkout","kubernetes":{"labels":{"app":"user-service"}},"message":"boom"}"#;
        let entry = parse_envelope(body).unwrap();
        assert_eq!(entry.service, "checkout");
    }

    #[test]
    fn inner_json_log_wins() {
        let body = br#"{
            "@timestamp": "2025-01-01T00:00:00Z",
            "kubernetes": {"namespace_name": "staging"},
            "message": "{\"level\":\"ERROR\",\"namespace\":\"prod\",\"message\":\"inner boom\"}"
        }"#;
        let entry = parse_envelope(body).unwrap();
        assert_eq!(entry.level, "ERROR");
        assert_eq!(entry.namespace, "prod");
        assert_eq!(entry.message, "inner boom");
    }

    #[test]
    fn malformed_json_rejected() {
        let err = parse_envelope(b"not json").unwrap_err();
        assert!(matches!(err, BusError::Parse(_)));
    }
}
