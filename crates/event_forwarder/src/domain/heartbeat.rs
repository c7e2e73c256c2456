use crate::domain::ZoneResolver;
use common::domain::{Envelope, EnvelopeBody, EnvelopeHeader, HeartbeatPayload};
use std::collections::BTreeSet;

/// Liveness summary: registry size, per-domain counts over enabled
/// domains and queue depth
pub fn build_heartbeat(
    header: EnvelopeHeader,
    zones: &ZoneResolver,
    enabled_domains: &BTreeSet<String>,
    pending_events: usize,
) -> Envelope {
    let domain_counts = zones.domain_counts(enabled_domains);
    let payload = HeartbeatPayload {
        entity_count: zones.entity_count(),
        domain_counts,
        pending_events,
        enabled_domains: enabled_domains.iter().cloned().collect(),
    };
    Envelope::new(header, EnvelopeBody::Heartbeat(payload))
}
