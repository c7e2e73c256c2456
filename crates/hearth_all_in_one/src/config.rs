use common::telemetry::{LogFormat, TelemetryConfig};
use config::{Config, ConfigError, Environment};
use event_forwarder::{default_allowlists, ForwarderConfig, RedactionOptions};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    // Delivery
    /// Base URL of the ingestion service
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Bearer token sent with every batch
    #[serde(default)]
    pub api_token: String,

    /// Value of the `src` header field on every envelope
    #[serde(default = "default_source_tag")]
    pub source_tag: String,

    /// Envelopes that trigger an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timer flush period in seconds (fractions allowed)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: f64,

    /// Pending queue capacity; the oldest envelopes are dropped beyond it
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_heartbeat_enabled")]
    pub heartbeat_enabled: bool,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    // Filtering and redaction
    /// Comma-separated domains to forward; empty means every allowlisted domain
    #[serde(default)]
    pub enabled_domains: String,

    #[serde(default = "default_forward_action_events")]
    pub forward_action_events: bool,

    /// Comma-separated service domains to forward; empty means the enabled domains
    #[serde(default)]
    pub action_domains: String,

    #[serde(default)]
    pub keep_friendly_names: bool,

    #[serde(default)]
    pub keep_full_correlation_ids: bool,

    /// Comma-separated attribute names dropped in every domain
    #[serde(default)]
    pub extra_redacted_keys: String,

    /// `domain=seconds` pairs, comma-separated
    #[serde(default = "default_debounce_intervals")]
    pub debounce_intervals: String,

    /// 0 disables duplicate suppression
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// 0 keeps the zones loaded at startup
    #[serde(default)]
    pub zone_refresh_interval_secs: u64,

    // Local files
    #[serde(default = "default_state_path")]
    pub state_path: String,

    #[serde(default = "default_registry_path")]
    pub registry_path: String,

    /// JSON-lines event stream; `-` reads standard input
    #[serde(default = "default_events_path")]
    pub events_path: String,

    /// Upper bound for the final flush and state save
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_endpoint_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_source_tag() -> String {
    "hearth".to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_flush_interval_secs() -> f64 {
    0.5
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_enabled() -> bool {
    true
}

fn default_heartbeat_interval_secs() -> u64 {
    60
}

fn default_forward_action_events() -> bool {
    true
}

fn default_debounce_intervals() -> String {
    "sensor=5,media_player=2,device_tracker=10".to_string()
}

fn default_idempotency_ttl_secs() -> u64 {
    120
}

fn default_state_path() -> String {
    "./hearth_state.json".to_string()
}

fn default_registry_path() -> String {
    "./registry.json".to_string()
}

fn default_events_path() -> String {
    "-".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    15
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("HEARTH"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> Result<TelemetryConfig, ConfigError> {
        Ok(TelemetryConfig {
            service_name: self.source_tag.clone(),
            log_level: self.log_level.clone(),
            log_format: LogFormat::from_str(&self.log_format).map_err(ConfigError::Message)?,
        })
    }

    pub fn forwarder_config(&self) -> Result<ForwarderConfig, ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Message("batch_size must be at least 1".to_string()));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Message(
                "max_queue_size must be at least 1".to_string(),
            ));
        }
        if self.shutdown_timeout_secs <= self.request_timeout_secs {
            return Err(ConfigError::Message(format!(
                "shutdown_timeout_secs ({}) must exceed request_timeout_secs ({})",
                self.shutdown_timeout_secs, self.request_timeout_secs
            )));
        }
        let flush_interval = seconds("flush_interval_secs", self.flush_interval_secs)?;
        if flush_interval.is_zero() {
            return Err(ConfigError::Message(
                "flush_interval_secs must be positive".to_string(),
            ));
        }

        let mut enabled_domains = parse_list(&self.enabled_domains);
        if enabled_domains.is_empty() {
            enabled_domains = default_allowlists().into_keys().collect();
        }
        let mut action_domains = parse_list(&self.action_domains);
        if action_domains.is_empty() {
            action_domains = enabled_domains.clone();
        }

        Ok(ForwarderConfig {
            endpoint_url: self.endpoint_url.clone(),
            api_token: self.api_token.clone(),
            source_tag: self.source_tag.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            batch_size: self.batch_size,
            flush_interval,
            max_queue_size: self.max_queue_size,
            enabled_domains,
            forward_action_events: self.forward_action_events,
            action_domains,
            redaction: RedactionOptions {
                keep_friendly_names: self.keep_friendly_names,
                keep_full_correlation_ids: self.keep_full_correlation_ids,
                extra_redacted_keys: parse_list(&self.extra_redacted_keys),
                extra_redacted_patterns: Vec::new(),
            },
            debounce_intervals: parse_debounce_intervals(&self.debounce_intervals)?,
            idempotency_ttl: Duration::from_secs(self.idempotency_ttl_secs),
            heartbeat_enabled: self.heartbeat_enabled,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            zone_refresh_interval: (self.zone_refresh_interval_secs > 0)
                .then(|| Duration::from_secs(self.zone_refresh_interval_secs)),
        })
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|err| ConfigError::Message(format!("{field}: invalid duration {value}: {err}")))
}

fn parse_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `sensor=5,media_player=2.5` into per-domain intervals
fn parse_debounce_intervals(value: &str) -> Result<BTreeMap<String, Duration>, ConfigError> {
    let mut intervals = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (domain, secs) = entry.split_once('=').ok_or_else(|| {
            ConfigError::Message(format!("debounce_intervals: expected domain=seconds, got {entry:?}"))
        })?;
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(ConfigError::Message(format!(
                "debounce_intervals: missing domain in {entry:?}"
            )));
        }
        let secs: f64 = secs.trim().parse().map_err(|_| {
            ConfigError::Message(format!("debounce_intervals: invalid seconds in {entry:?}"))
        })?;
        intervals.insert(domain.to_string(), seconds("debounce_intervals", secs)?);
    }
    Ok(intervals)
}
