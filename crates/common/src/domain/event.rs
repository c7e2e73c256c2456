use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Correlation context the host attaches to every event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Snapshot of one entity's state as reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Raw state value (`on`, `21.5`, `home`, ...). Never redacted.
    pub value: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl EntityState {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attributes: Map::new(),
            last_changed: None,
            last_updated: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A state transition of a single entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub entity_id: String,
    #[serde(default)]
    pub old_state: Option<EntityState>,
    #[serde(default)]
    pub new_state: Option<EntityState>,
    #[serde(default)]
    pub correlation: Correlation,
}

impl StateChangedEvent {
    /// Domain derived from the `domain.object_id` entity id, if well-formed
    pub fn domain(&self) -> Option<&str> {
        split_entity_id(&self.entity_id).map(|(domain, _)| domain)
    }
}

/// An action (service call) issued against the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallServiceEvent {
    pub domain: String,
    pub service: String,
    #[serde(default)]
    pub service_data: Map<String, Value>,
    #[serde(default)]
    pub correlation: Correlation,
}

/// Event delivered by the host event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RawEvent {
    StateChanged(StateChangedEvent),
    CallService(CallServiceEvent),
}

impl RawEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RawEvent::StateChanged(_) => EventKind::StateChanged,
            RawEvent::CallService(_) => EventKind::CallService,
        }
    }

    pub fn domain(&self) -> Option<&str> {
        match self {
            RawEvent::StateChanged(event) => event.domain(),
            RawEvent::CallService(event) => Some(event.domain.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    CallService,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::StateChanged => "state_changed",
            EventKind::CallService => "call_service",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits `light.kitchen` into `("light", "kitchen")`.
pub fn split_entity_id(entity_id: &str) -> Option<(&str, &str)> {
    let (domain, object_id) = entity_id.split_once('.')?;
    if domain.is_empty() || object_id.is_empty() {
        return None;
    }
    Some((domain, object_id))
}

pub type EventPredicate = Arc<dyn Fn(&RawEvent) -> bool + Send + Sync>;
pub type EventCallback = Arc<dyn Fn(RawEvent) + Send + Sync>;

/// Host event bus abstraction
///
/// The forwarder never polls: it registers a callback and the source invokes
/// it for every event matching the predicate, in dispatch order.
pub trait EventSource: Send + Sync {
    fn subscribe(&self, predicate: EventPredicate, callback: EventCallback) -> SubscriptionHandle;
}

/// Keeps a subscription alive; unsubscribes when dropped
pub struct SubscriptionHandle {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Detach the callback from the source now
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_split_entity_id() {
        assert_eq!(split_entity_id("light.kitchen"), Some(("light", "kitchen")));
        assert_eq!(
            split_entity_id("sensor.outdoor.temp"),
            Some(("sensor", "outdoor.temp"))
        );
        assert_eq!(split_entity_id("kitchen"), None);
        assert_eq!(split_entity_id(".kitchen"), None);
        assert_eq!(split_entity_id("light."), None);
    }

    #[test]
    fn test_raw_event_deserializes_from_tagged_json() {
        let json = serde_json::json!({
            "event_type": "call_service",
            "domain": "light",
            "service": "turn_on",
            "service_data": {"entity_id": "light.a"},
            "correlation": {"id": "01HXYZ", "user_id": "u1"}
        });

        let event: RawEvent = serde_json::from_value(json).unwrap();

        assert_eq!(event.kind(), EventKind::CallService);
        assert_eq!(event.domain(), Some("light"));
    }

    #[test]
    fn test_subscription_handle_unsubscribes_on_drop() {
        let detached = Arc::new(AtomicBool::new(false));
        let flag = detached.clone();
        let handle = SubscriptionHandle::new(move || flag.store(true, Ordering::SeqCst));

        drop(handle);

        assert!(detached.load(Ordering::SeqCst));
    }
}
