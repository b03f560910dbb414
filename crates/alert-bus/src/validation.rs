//! Post-envelope validation and config-dependent defaulting.
//!
//! A bad record is rejected and skipped; it never blocks the rest of the
//! batch.

use alert_core::config::LogProcessingConfig;
use alert_core::LogEntry;

use crate::error::BusError;

/// Apply config-dependent defaults and reject records that remain invalid.
///
/// `timestamp` defaulting already happened in [`crate::envelope::parse_envelope`];
/// this only handles `level`, `message`, and `namespace`.
pub fn validate_and_default(mut entry: LogEntry, cfg: &LogProcessingConfig) -> Result<LogEntry, BusError> {
    let v = &cfg.validation;

    if entry.level.is_empty() {
        entry.level = v.default_log_level.clone();
    }
    if v.require_level && entry.level.is_empty() {
        return Err(BusError::Parse("missing log level".into()));
    }

    if v.require_message && entry.message.is_empty() {
        return Err(BusError::Parse("missing log message".into()));
    }

    if v.require_namespace && entry.namespace.is_empty() {
        return Err(BusError::Parse("missing namespace after envelope unwrap".into()));
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::config::ValidationConfig;
    use chrono::Utc;
    use std::collections::HashMap;

    fn cfg() -> LogProcessingConfig {
        LogProcessingConfig {
            batch_size: 100,
            flush_interval_ms: 1000,
            max_message_size: 1_048_576,
            validation: ValidationConfig {
                require_timestamp: false,
                require_level: false,
                require_message: true,
                require_namespace: true,
                default_log_level: "INFO".into(),
            },
        }
    }

    fn entry() -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: String::new(),
            message: "hello".into(),
            service: String::new(),
            namespace: "prod".into(),
            pod: String::new(),
            container: String::new(),
            host: String::new(),
            labels: HashMap::new(),
            raw: String::new(),
        }
    }

    #[test]
    fn empty_level_gets_default() {
        let validated = validate_and_default(entry(), &cfg()).unwrap();
        assert_eq!(validated.level, "INFO");
    }

    #[test]
    fn empty_message_rejected_when_required() {
        let mut e = entry();
        e.message = String::new();
        assert!(validate_and_default(e, &cfg()).is_err());
    }

    #[test]
    fn empty_namespace_rejected_when_required() {
        let mut e = entry();
        e.namespace = String::new();
        assert!(validate_and_default(e, &cfg()).is_err());
    }
}
