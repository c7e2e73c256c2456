use crate::domain::{
    classify_trigger, redact_correlation_id, AttributeProjector, ForwarderConfig, ProjectorError,
    ZoneResolver,
};
use chrono::{DateTime, Utc};
use common::domain::{
    split_entity_id, CallServiceEvent, CallServicePayload, EntityState, Envelope, EnvelopeBody,
    EnvelopeHeader, ProjectedState, StateChangedEvent, StateChangedPayload,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Service domains never forwarded, whatever the action allowlist says
pub const HARD_BLOCKED_SERVICE_DOMAINS: &[&str] = &[
    "notify",
    "persistent_notification",
    "tts",
    "shell_command",
    "rest_command",
    "conversation",
    "system_log",
    "recorder",
    "logbook",
];

/// Why an event produced no envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    InvalidEntityId,
    EntityRemoved,
    NoTransition,
    DomainDisabled,
    Debounced,
    Duplicate,
    ActionsDisabled,
    ActionDomainBlocked,
    ActionDomainNotForwarded,
    NoTrackedTargets,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::InvalidEntityId => "invalid_entity_id",
            SkipReason::EntityRemoved => "entity_removed",
            SkipReason::NoTransition => "no_transition",
            SkipReason::DomainDisabled => "domain_disabled",
            SkipReason::Debounced => "debounced",
            SkipReason::Duplicate => "duplicate",
            SkipReason::ActionsDisabled => "actions_disabled",
            SkipReason::ActionDomainBlocked => "action_domain_blocked",
            SkipReason::ActionDomainNotForwarded => "action_domain_not_forwarded",
            SkipReason::NoTrackedTargets => "no_tracked_targets",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change that passed the structural checks
#[derive(Debug, Clone, Copy)]
pub struct AdmittedStateChange<'a> {
    pub domain: &'a str,
    pub new_state: &'a EntityState,
}

/// Turns raw host events into versioned, redacted envelopes
///
/// Admission (`admit_*`) covers the structural and policy checks; the
/// debounce and idempotency gates sit between admission and `build_*`.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    source_tag: String,
    projector: AttributeProjector,
    keep_full_correlation_ids: bool,
    enabled_domains: BTreeSet<String>,
    forward_action_events: bool,
    action_domains: BTreeSet<String>,
}

impl EnvelopeBuilder {
    pub fn new(config: &ForwarderConfig) -> Result<Self, ProjectorError> {
        Ok(Self::with_projector(
            config,
            AttributeProjector::new(&config.redaction)?,
        ))
    }

    pub fn with_projector(config: &ForwarderConfig, projector: AttributeProjector) -> Self {
        Self {
            source_tag: config.source_tag.clone(),
            projector,
            keep_full_correlation_ids: config.redaction.keep_full_correlation_ids,
            enabled_domains: config.enabled_domains.clone(),
            forward_action_events: config.forward_action_events,
            action_domains: config.action_domains.clone(),
        }
    }

    pub fn enabled_domains(&self) -> &BTreeSet<String> {
        &self.enabled_domains
    }

    pub fn admit_state_changed<'a>(
        &self,
        event: &'a StateChangedEvent,
    ) -> Result<AdmittedStateChange<'a>, SkipReason> {
        let (domain, _) = split_entity_id(&event.entity_id).ok_or(SkipReason::InvalidEntityId)?;
        let new_state = event.new_state.as_ref().ok_or(SkipReason::EntityRemoved)?;
        if let Some(old_state) = &event.old_state {
            if old_state.value == new_state.value {
                return Err(SkipReason::NoTransition);
            }
        }
        if !self.enabled_domains.contains(domain) {
            return Err(SkipReason::DomainDisabled);
        }
        Ok(AdmittedStateChange { domain, new_state })
    }

    pub fn build_state_changed(
        &self,
        event: &StateChangedEvent,
        admitted: AdmittedStateChange<'_>,
        zones: &ZoneResolver,
        ts: DateTime<Utc>,
    ) -> Envelope {
        let correlation = &event.correlation;
        let payload = StateChangedPayload {
            entity_id: event.entity_id.clone(),
            domain: admitted.domain.to_string(),
            zone_id: zones
                .resolve_with_state(&event.entity_id, Some(admitted.new_state.value.as_str())),
            trigger: classify_trigger(correlation),
            context_id: redact_correlation_id(
                Some(correlation.id.as_str()),
                self.keep_full_correlation_ids,
            ),
            parent_id: redact_correlation_id(
                correlation.parent_id.as_deref(),
                self.keep_full_correlation_ids,
            ),
            old: event
                .old_state
                .as_ref()
                .map(|state| self.project_state(admitted.domain, state)),
            new: self.project_state(admitted.domain, admitted.new_state),
        };

        Envelope::new(self.header(ts), EnvelopeBody::StateChanged(payload))
    }

    /// Returns the tracked target entity ids of an admitted service call
    pub fn admit_call_service(&self, event: &CallServiceEvent) -> Result<Vec<String>, SkipReason> {
        if !self.forward_action_events {
            return Err(SkipReason::ActionsDisabled);
        }
        if HARD_BLOCKED_SERVICE_DOMAINS.contains(&event.domain.as_str()) {
            return Err(SkipReason::ActionDomainBlocked);
        }
        if !self.action_domains.contains(&event.domain) {
            return Err(SkipReason::ActionDomainNotForwarded);
        }

        let targets: Vec<String> = extract_target_entity_ids(event.service_data.get("entity_id"))
            .into_iter()
            .filter(|entity_id| {
                split_entity_id(entity_id)
                    .is_some_and(|(domain, _)| self.enabled_domains.contains(domain))
            })
            .collect();
        if targets.is_empty() {
            return Err(SkipReason::NoTrackedTargets);
        }
        Ok(targets)
    }

    pub fn build_call_service(
        &self,
        event: &CallServiceEvent,
        targets: Vec<String>,
        zones: &ZoneResolver,
        ts: DateTime<Utc>,
    ) -> Envelope {
        let zone_ids: BTreeSet<String> = targets
            .iter()
            .filter_map(|entity_id| zones.resolve(entity_id))
            .map(str::to_string)
            .collect();

        let payload = CallServicePayload {
            domain: event.domain.clone(),
            service: event.service.clone(),
            entity_ids: targets,
            zone_ids: zone_ids.into_iter().collect(),
            trigger: classify_trigger(&event.correlation),
            context_id: redact_correlation_id(
                Some(event.correlation.id.as_str()),
                self.keep_full_correlation_ids,
            ),
        };

        Envelope::new(self.header(ts), EnvelopeBody::CallService(payload))
    }

    pub fn header(&self, ts: DateTime<Utc>) -> EnvelopeHeader {
        EnvelopeHeader::new(ts, self.source_tag.clone())
    }

    fn project_state(&self, domain: &str, state: &EntityState) -> ProjectedState {
        ProjectedState {
            state: state.value.clone(),
            attrs: self.projector.project(domain, &state.attributes),
        }
    }
}

/// Reads `entity_id` targets from service data: a single id, a
/// comma-separated string, or a list. Order kept, duplicates removed.
pub fn extract_target_entity_ids(value: Option<&Value>) -> Vec<String> {
    let candidates: Vec<&str> = match value {
        Some(Value::String(ids)) => ids.split(',').collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}
