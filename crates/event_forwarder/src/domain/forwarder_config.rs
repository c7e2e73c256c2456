use crate::domain::default_allowlists;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Privacy switches applied by the projector and envelope builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionOptions {
    pub keep_friendly_names: bool,
    pub keep_full_correlation_ids: bool,
    /// Exact attribute names to drop in every domain
    pub extra_redacted_keys: BTreeSet<String>,
    /// Additional case-insensitive key patterns (regex) to drop
    pub extra_redacted_patterns: Vec<String>,
}

/// Runtime settings of one forwarder instance
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub endpoint_url: String,
    pub api_token: String,
    pub source_tag: String,
    pub request_timeout: Duration,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_queue_size: usize,
    pub enabled_domains: BTreeSet<String>,
    pub forward_action_events: bool,
    /// Service domains whose calls are forwarded (hard block list still wins)
    pub action_domains: BTreeSet<String>,
    pub redaction: RedactionOptions,
    pub debounce_intervals: BTreeMap<String, Duration>,
    /// Zero disables the idempotency gate
    pub idempotency_ttl: Duration,
    pub heartbeat_enabled: bool,
    pub heartbeat_interval: Duration,
    /// `None` keeps the zone resolver built at startup
    pub zone_refresh_interval: Option<Duration>,
}

impl ForwarderConfig {
    pub fn is_domain_enabled(&self, domain: &str) -> bool {
        self.enabled_domains.contains(domain)
    }
}

pub fn default_debounce_intervals() -> BTreeMap<String, Duration> {
    [
        ("sensor", Duration::from_secs(5)),
        ("media_player", Duration::from_secs(2)),
        ("device_tracker", Duration::from_secs(10)),
    ]
    .into_iter()
    .map(|(domain, interval)| (domain.to_string(), interval))
    .collect()
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        let enabled_domains: BTreeSet<String> = default_allowlists().into_keys().collect();
        Self {
            endpoint_url: "http://localhost:8080".to_string(),
            api_token: String::new(),
            source_tag: "hearth".to_string(),
            request_timeout: Duration::from_secs(10),
            batch_size: 50,
            flush_interval: Duration::from_millis(500),
            max_queue_size: 1000,
            action_domains: enabled_domains.clone(),
            enabled_domains,
            forward_action_events: true,
            redaction: RedactionOptions::default(),
            debounce_intervals: default_debounce_intervals(),
            idempotency_ttl: Duration::from_secs(120),
            heartbeat_enabled: true,
            heartbeat_interval: Duration::from_secs(60),
            zone_refresh_interval: None,
        }
    }
}
