use crate::domain::result::DeliveryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Wire schema version stamped on every envelope built by this process
pub const ENVELOPE_SCHEMA_VERSION: u32 = 1;

/// Fields shared by every envelope kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub v: u32,
    pub ts: DateTime<Utc>,
    pub src: String,
}

impl EnvelopeHeader {
    pub fn new(ts: DateTime<Utc>, src: impl Into<String>) -> Self {
        Self {
            v: ENVELOPE_SCHEMA_VERSION,
            ts,
            src: src.into(),
        }
    }
}

/// Inferred cause of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    User,
    Automation,
    Unknown,
}

/// State value plus its redacted attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedState {
    pub state: String,
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedPayload {
    pub entity_id: String,
    pub domain: String,
    pub zone_id: Option<String>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub old: Option<ProjectedState>,
    pub new: ProjectedState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallServicePayload {
    pub domain: String,
    pub service: String,
    pub entity_ids: Vec<String>,
    pub zone_ids: Vec<String>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub entity_count: usize,
    pub domain_counts: BTreeMap<String, usize>,
    pub pending_events: usize,
    pub enabled_domains: Vec<String>,
}

/// Kind-specific part of an envelope, tagged by `kind` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvelopeBody {
    StateChanged(StateChangedPayload),
    CallService(CallServicePayload),
    Heartbeat(HeartbeatPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    StateChanged,
    CallService,
    Heartbeat,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::StateChanged => "state_changed",
            EnvelopeKind::CallService => "call_service",
            EnvelopeKind::Heartbeat => "heartbeat",
        }
    }
}

/// Versioned, redacted record shipped to the ingestion endpoint
///
/// Immutable once built. Serializes to a flat JSON object:
/// `{"v":1,"ts":"...","src":"hearth","kind":"state_changed",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub header: EnvelopeHeader,
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

impl Envelope {
    pub fn new(header: EnvelopeHeader, body: EnvelopeBody) -> Self {
        Self { header, body }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self.body {
            EnvelopeBody::StateChanged(_) => EnvelopeKind::StateChanged,
            EnvelopeBody::CallService(_) => EnvelopeKind::CallService,
            EnvelopeBody::Heartbeat(_) => EnvelopeKind::Heartbeat,
        }
    }

    /// Entity id for state changes, `None` otherwise
    pub fn entity_id(&self) -> Option<&str> {
        match &self.body {
            EnvelopeBody::StateChanged(payload) => Some(payload.entity_id.as_str()),
            _ => None,
        }
    }

    /// Redacted correlation id, if the envelope carries one
    pub fn context_id(&self) -> Option<&str> {
        match &self.body {
            EnvelopeBody::StateChanged(payload) => payload.context_id.as_deref(),
            EnvelopeBody::CallService(payload) => payload.context_id.as_deref(),
            EnvelopeBody::Heartbeat(_) => None,
        }
    }
}

/// Destination for envelope batches
///
/// Implementations should:
/// - Deliver the whole batch as a single request
/// - Return an error for any non-success outcome so the caller can re-queue
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    /// Deliver a batch of envelopes, preserving order
    async fn deliver(&self, batch: &[Envelope]) -> DeliveryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header() -> EnvelopeHeader {
        EnvelopeHeader::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(), "hearth")
    }

    #[test]
    fn test_state_changed_serializes_flat() {
        let mut attrs = Map::new();
        attrs.insert("brightness".to_string(), Value::from(180));
        let envelope = Envelope::new(
            header(),
            EnvelopeBody::StateChanged(StateChangedPayload {
                entity_id: "light.kitchen".to_string(),
                domain: "light".to_string(),
                zone_id: None,
                trigger: Trigger::User,
                context_id: Some("01HXYZABCDEF".to_string()),
                parent_id: None,
                old: None,
                new: ProjectedState {
                    state: "on".to_string(),
                    attrs,
                },
            }),
        );

        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["v"], 1);
        assert_eq!(json["src"], "hearth");
        assert_eq!(json["kind"], "state_changed");
        assert_eq!(json["entity_id"], "light.kitchen");
        assert_eq!(json["trigger"], "user");
        assert!(json["zone_id"].is_null());
        assert!(json.get("parent_id").is_none());
        assert_eq!(json["new"]["attrs"]["brightness"], 180);
    }

    #[test]
    fn test_heartbeat_parses_back_from_wire_shape() {
        let json = serde_json::json!({
            "v": 1,
            "ts": "2024-05-01T12:00:00Z",
            "src": "hearth",
            "kind": "heartbeat",
            "entity_count": 3,
            "domain_counts": {"light": 2, "sensor": 1},
            "pending_events": 0,
            "enabled_domains": ["light", "sensor"]
        });

        let envelope: Envelope = serde_json::from_value(json).unwrap();

        assert_eq!(envelope.kind(), EnvelopeKind::Heartbeat);
        assert_eq!(envelope.header, header());
        match envelope.body {
            EnvelopeBody::Heartbeat(payload) => {
                assert_eq!(payload.entity_count, 3);
                assert_eq!(payload.domain_counts.get("light"), Some(&2));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
