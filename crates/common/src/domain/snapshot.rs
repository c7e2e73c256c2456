use crate::domain::envelope::Envelope;
use crate::domain::result::PersistenceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted forwarder state
///
/// Cache values are epoch seconds: last-sent time for `debounce_cache`,
/// expiry time for `seen_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwarderSnapshot {
    #[serde(default)]
    pub pending_events: Vec<Envelope>,
    #[serde(default)]
    pub debounce_cache: BTreeMap<String, f64>,
    #[serde(default)]
    pub seen_events: BTreeMap<String, f64>,
    pub saved_at: DateTime<Utc>,
}

/// Crash-resilient storage for the forwarder snapshot
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot, `None` when nothing was saved yet
    async fn load(&self) -> PersistenceResult<Option<ForwarderSnapshot>>;

    /// Replace the stored snapshot
    async fn save(&self, snapshot: &ForwarderSnapshot) -> PersistenceResult<()>;
}
