use chrono::{DateTime, Utc};
use serde::Serialize;

/// Running counters of one forwarder instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderStats {
    pub events_received: u64,
    pub envelopes_enqueued: u64,
    pub debounced: u64,
    pub duplicates: u64,
    /// Events rejected for any other reason
    pub skipped: u64,
    pub dropped_overflow: u64,
    pub batches_delivered: u64,
    pub envelopes_delivered: u64,
    pub batches_failed: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_failed: u64,
    pub last_flush_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
