//! Typed configuration, assembled from profiled environment variables.
//!
//! Mirrors the `{PROFILE}_{KEY}` → `{KEY}` fallback convention used elsewhere
//! in this codebase: set `ALERT_PROFILE=PROD` and then `PROD_BUS_BROKERS`
//! takes precedence over the unprefixed `BUS_BROKERS`.

use std::env;

use serde::{Deserialize, Serialize};

/// Load a `.env` file if present (silently ignored otherwise).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_i32(profile: &str, key: &str, default: i32) -> i32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn profiled_env_list(profile: &str, key: &str, default: &[&str]) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub bus: BusConfig,
    pub state_store: StateStoreConfig,
    pub log_processing: LogProcessingConfig,
    pub alerting: AlertingConfig,
    pub notifications: NotificationsConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["BUS_BROKERS", "STATE_STORE_ADDRESS", "SLACK_WEBHOOK_URL"];

impl Config {
    /// Build config from environment variables (call [`load_dotenv`] first).
    /// Profile is read from `ALERT_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ALERT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            bus: BusConfig::from_env_profiled(p),
            state_store: StateStoreConfig::from_env_profiled(p),
            log_processing: LogProcessingConfig::from_env_profiled(p),
            alerting: AlertingConfig::from_env_profiled(p),
            notifications: NotificationsConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}`.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a startup summary. Safe to call before the webhook URL override
    /// is resolved — `redacted_summary` is what masks secrets.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  bus:           brokers={:?} topic={} group={}",
            self.bus.brokers,
            self.bus.topic,
            self.bus.group_id
        );
        tracing::info!(
            "  state_store:   address={} cluster={}",
            self.state_store.address,
            self.state_store.cluster_mode
        );
        tracing::info!(
            "  log_processing batch_size={} flush_interval_ms={}",
            self.log_processing.batch_size,
            self.log_processing.flush_interval_ms
        );
        tracing::info!(
            "  alerting:      enabled={} max_rules={}",
            self.alerting.enabled,
            self.alerting.max_rules
        );
        tracing::info!(
            "  notifications: enabled={} rate_limit_per_min={}",
            self.notifications.enabled,
            self.notifications.rate_limit_per_min
        );
    }

    /// Redacted view safe for logs or an API response (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "bus": {
                "brokers": self.bus.brokers,
                "topic": self.bus.topic,
                "group_id": self.bus.group_id,
            },
            "state_store": {
                "address": self.state_store.address,
                "cluster_mode": self.state_store.cluster_mode,
                "password_set": self.state_store.password.is_some(),
            },
            "log_processing": {
                "batch_size": self.log_processing.batch_size,
                "flush_interval_ms": self.log_processing.flush_interval_ms,
            },
            "alerting": {
                "enabled": self.alerting.enabled,
                "max_rules": self.alerting.max_rules,
            },
            "notifications": {
                "enabled": self.notifications.enabled,
                "webhook_url_set": !self.notifications.webhook.url.is_empty(),
            },
        })
    }
}

// ── Bus ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// One of `"memory"`, `"redis"`, `"sqs"` — selects the `BusAdapter` impl
    /// via `alert_bus::build_backend`.
    pub backend: String,
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub min_bytes: u32,
    pub max_bytes: u32,
    pub max_wait_ms: u64,
    /// `-1` = latest, `-2` = earliest.
    pub start_offset: i32,
}

impl BusConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "BUS_BACKEND", "memory"),
            brokers: profiled_env_list(p, "BUS_BROKERS", &["localhost:9092"]),
            topic: profiled_env_or(p, "BUS_TOPIC", "app-logs"),
            group_id: profiled_env_or(p, "BUS_GROUP_ID", "alert-engine"),
            min_bytes: profiled_env_u32(p, "BUS_MIN_BYTES", 1),
            max_bytes: profiled_env_u32(p, "BUS_MAX_BYTES", 1_048_576),
            max_wait_ms: profiled_env_u64(p, "BUS_MAX_WAIT_MS", 500),
            start_offset: profiled_env_i32(p, "BUS_START_OFFSET", -1),
        }
    }
}

// ── State store ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStoreConfig {
    /// One of `"memory"`, `"redis"` — selects the `StateStore` impl via
    /// `alert_state::build_backend`.
    pub backend: String,
    pub address: String,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: u32,
    pub dial_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub cluster_mode: bool,
}

impl StateStoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "STATE_STORE_BACKEND", "memory"),
            address: profiled_env_or(p, "STATE_STORE_ADDRESS", "redis://127.0.0.1:6379"),
            password: profiled_env_opt(p, "STATE_STORE_PASSWORD"),
            database: profiled_env_u32(p, "STATE_STORE_DATABASE", 0),
            pool_size: profiled_env_u32(p, "STATE_STORE_POOL_SIZE", 10),
            dial_timeout_ms: profiled_env_u64(p, "STATE_STORE_DIAL_TIMEOUT_MS", 2_000),
            read_timeout_ms: profiled_env_u64(p, "STATE_STORE_READ_TIMEOUT_MS", 1_000),
            write_timeout_ms: profiled_env_u64(p, "STATE_STORE_WRITE_TIMEOUT_MS", 1_000),
            cluster_mode: profiled_env_bool(p, "STATE_STORE_CLUSTER_MODE", false),
        }
    }
}

// ── Log processing ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub require_timestamp: bool,
    pub require_level: bool,
    pub require_message: bool,
    pub require_namespace: bool,
    pub default_log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogProcessingConfig {
    pub batch_size: u32,
    pub flush_interval_ms: u64,
    pub max_message_size: u32,
    pub validation: ValidationConfig,
}

impl LogProcessingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            batch_size: profiled_env_u32(p, "LOG_BATCH_SIZE", 100),
            flush_interval_ms: profiled_env_u64(p, "LOG_FLUSH_INTERVAL_MS", 1_000),
            max_message_size: profiled_env_u32(p, "LOG_MAX_MESSAGE_SIZE", 1_048_576),
            validation: ValidationConfig {
                require_timestamp: profiled_env_bool(p, "LOG_REQUIRE_TIMESTAMP", false),
                require_level: profiled_env_bool(p, "LOG_REQUIRE_LEVEL", false),
                require_message: profiled_env_bool(p, "LOG_REQUIRE_MESSAGE", true),
                require_namespace: profiled_env_bool(p, "LOG_REQUIRE_NAMESPACE", true),
                default_log_level: profiled_env_or(p, "LOG_DEFAULT_LEVEL", "INFO"),
            },
        }
    }
}

// ── Alerting ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub evaluation_interval_ms: u64,
    pub max_concurrent_evaluations: u32,
    pub default_time_window_secs: u64,
    pub default_threshold: u64,
    pub cleanup_interval_secs: u64,
    pub max_rules: u32,
}

impl AlertingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "ALERTING_ENABLED", true),
            evaluation_interval_ms: profiled_env_u64(p, "ALERTING_EVALUATION_INTERVAL_MS", 0),
            max_concurrent_evaluations: profiled_env_u32(p, "ALERTING_MAX_CONCURRENT", 16),
            default_time_window_secs: profiled_env_u64(p, "ALERTING_DEFAULT_WINDOW_SECS", 60),
            default_threshold: profiled_env_u64(p, "ALERTING_DEFAULT_THRESHOLD", 1),
            cleanup_interval_secs: profiled_env_u64(p, "ALERTING_CLEANUP_INTERVAL_SECS", 300),
            max_rules: profiled_env_u32(p, "ALERTING_MAX_RULES", 500),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub channel: String,
    pub username: String,
    pub icon_emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityConfig {
    pub emojis: std::collections::HashMap<String, String>,
    pub colors: std::collections::HashMap<String, String>,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        let emojis = [
            ("critical", "\u{1f6a8}"),
            ("high", "\u{26a0}\u{fe0f}"),
            ("medium", "\u{1f514}"),
            ("low", "\u{2139}\u{fe0f}"),
            ("default", "\u{1f4cb}"),
        ];
        let colors = [
            ("critical", "#d32f2f"),
            ("high", "#f57c00"),
            ("medium", "#fbc02d"),
            ("low", "#388e3c"),
            ("default", "#757575"),
        ];
        Self {
            emojis: emojis.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            colors: colors.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    pub alert_message: String,
    pub slack_alert_title: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            alert_message: "{{ rule_name }} fired {{ count }} times in {{ time_window }} \
                (service={{ service }}, namespace={{ namespace }}, level={{ level }}): {{ message }}"
                .to_string(),
            slack_alert_title: "{{ severity_emoji }} {{ rule_name }}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub rate_limit_per_min: u32,
    pub batch_size: u32,
    pub batch_delay_ms: u64,
    pub enable_deduplication: bool,
    pub deduplication_window_secs: u64,
    pub webhook: WebhookConfig,
    pub templates: TemplatesConfig,
    pub severity: SeverityConfig,
}

impl NotificationsConfig {
    fn from_env_profiled(p: &str) -> Self {
        // SLACK_WEBHOOK_URL is the one secret-injection path and is
        // intentionally looked up without the profile prefix fallback logic
        // applying twice — profiled_env_opt already handles {P}_KEY → KEY.
        let url = profiled_env_opt(p, "SLACK_WEBHOOK_URL").unwrap_or_default();
        Self {
            enabled: profiled_env_bool(p, "NOTIFY_ENABLED", true),
            max_retries: profiled_env_u32(p, "NOTIFY_MAX_RETRIES", 3),
            retry_delay_ms: profiled_env_u64(p, "NOTIFY_RETRY_DELAY_MS", 1_000),
            timeout_ms: profiled_env_u64(p, "NOTIFY_TIMEOUT_MS", 10_000),
            rate_limit_per_min: profiled_env_u32(p, "NOTIFY_RATE_LIMIT_PER_MIN", 60),
            batch_size: profiled_env_u32(p, "NOTIFY_BATCH_SIZE", 1),
            batch_delay_ms: profiled_env_u64(p, "NOTIFY_BATCH_DELAY_MS", 0),
            enable_deduplication: profiled_env_bool(p, "NOTIFY_ENABLE_DEDUP", true),
            deduplication_window_secs: profiled_env_u64(p, "NOTIFY_DEDUP_WINDOW_SECS", 300),
            webhook: WebhookConfig {
                url,
                channel: profiled_env_or(p, "NOTIFY_CHANNEL", "#alerts"),
                username: profiled_env_or(p, "NOTIFY_USERNAME", "alert-engine"),
                icon_emoji: profiled_env_or(p, "NOTIFY_ICON_EMOJI", ":rotating_light:"),
            },
            templates: TemplatesConfig::default(),
            severity: SeverityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_config_has_sane_defaults() {
        let cfg = Config::for_profile("");
        assert_eq!(cfg.profile_label(), "default");
        assert_eq!(cfg.bus.start_offset, -1);
        assert_eq!(cfg.log_processing.batch_size, 100);
        assert!(cfg.alerting.enabled);
        assert!(cfg.notifications.enable_deduplication);
    }

    #[test]
    fn profiled_override_takes_precedence() {
        std::env::set_var("BUS_TOPIC", "default-topic");
        std::env::set_var("PROD_BUS_TOPIC", "prod-topic");
        let cfg = Config::for_profile("PROD");
        assert_eq!(cfg.bus.topic, "prod-topic");
        let default_cfg = Config::for_profile("");
        assert_eq!(default_cfg.bus.topic, "default-topic");
        std::env::remove_var("BUS_TOPIC");
        std::env::remove_var("PROD_BUS_TOPIC");
    }

    #[test]
    fn redacted_summary_never_leaks_webhook_url() {
        std::env::set_var("SLACK_WEBHOOK_URL", "https://hooks.example.com/secret");
        let cfg = Config::from_env();
        let summary = cfg.redacted_summary();
        let rendered = summary.to_string();
        assert!(!rendered.contains("secret"));
        assert_eq!(summary["notifications"]["webhook_url_set"], true);
        std::env::remove_var("SLACK_WEBHOOK_URL");
    }

    #[test]
    fn severity_config_has_all_known_keys() {
        let sev = SeverityConfig::default();
        for key in ["critical", "high", "medium", "low", "default"] {
            assert!(sev.emojis.contains_key(key));
            assert!(sev.colors.contains_key(key));
        }
    }
}
