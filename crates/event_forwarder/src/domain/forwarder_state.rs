use crate::domain::{
    build_heartbeat, event_key, BatcherState, DebounceGate, EnqueueOutcome, EnvelopeBuilder,
    ForwarderConfig, ForwarderStats, IdempotencyGate, PendingQueue, ProjectorError, SkipReason,
    ZoneResolver,
};
use chrono::{DateTime, Utc};
use common::domain::{
    epoch_seconds, CallServiceEvent, DeliveryError, Envelope, EnvelopeKind, ForwarderSnapshot,
    RawEvent, StateChangedEvent,
};
use std::time::Duration;
use tracing::debug;

/// Debounce entries older than this are not persisted
pub const DEBOUNCE_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Enqueued(EnqueueOutcome),
    Skipped(SkipReason),
}

impl EventOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, EventOutcome::Enqueued(_))
    }

    pub fn flush_due(&self) -> bool {
        matches!(self, EventOutcome::Enqueued(outcome) if outcome.flush_due)
    }
}

/// Everything mutable in a forwarder: gates, queue, zones and counters
///
/// Purely synchronous. Callers own the locking and the I/O around
/// `take_batch` / `flush_succeeded` / `flush_failed`.
#[derive(Debug)]
pub struct ForwarderState {
    builder: EnvelopeBuilder,
    zones: ZoneResolver,
    debounce: DebounceGate,
    idempotency: IdempotencyGate,
    queue: PendingQueue,
    stats: ForwarderStats,
}

impl ForwarderState {
    pub fn new(config: &ForwarderConfig, zones: ZoneResolver) -> Result<Self, ProjectorError> {
        Ok(Self {
            builder: EnvelopeBuilder::new(config)?,
            zones,
            debounce: DebounceGate::new(config.debounce_intervals.clone()),
            idempotency: IdempotencyGate::new(config.idempotency_ttl),
            queue: PendingQueue::new(config.max_queue_size, config.batch_size),
            stats: ForwarderStats::default(),
        })
    }

    pub fn handle_event(&mut self, event: &RawEvent, now: DateTime<Utc>) -> EventOutcome {
        self.stats.events_received += 1;

        let envelope = match event {
            RawEvent::StateChanged(event) => self.state_changed_envelope(event, now),
            RawEvent::CallService(event) => self.call_service_envelope(event, now),
        };

        match envelope {
            Ok(envelope) => {
                let outcome = self.queue.enqueue(envelope);
                self.stats.envelopes_enqueued += 1;
                self.stats.dropped_overflow += outcome.dropped as u64;
                EventOutcome::Enqueued(outcome)
            }
            Err(reason) => {
                match reason {
                    SkipReason::Debounced => self.stats.debounced += 1,
                    SkipReason::Duplicate => self.stats.duplicates += 1,
                    _ => self.stats.skipped += 1,
                }
                debug!(
                    event_type = %event.kind(),
                    domain = event.domain().unwrap_or_default(),
                    reason = %reason,
                    "event skipped"
                );
                EventOutcome::Skipped(reason)
            }
        }
    }

    fn state_changed_envelope(
        &mut self,
        event: &StateChangedEvent,
        now: DateTime<Utc>,
    ) -> Result<Envelope, SkipReason> {
        let admitted = self.builder.admit_state_changed(event)?;
        let now_secs = epoch_seconds(now);

        if !self
            .debounce
            .should_forward(&event.entity_id, admitted.domain, now_secs)
        {
            return Err(SkipReason::Debounced);
        }
        self.check_idempotency(EnvelopeKind::StateChanged, &event.correlation.id, now_secs)?;

        Ok(self
            .builder
            .build_state_changed(event, admitted, &self.zones, now))
    }

    fn call_service_envelope(
        &mut self,
        event: &CallServiceEvent,
        now: DateTime<Utc>,
    ) -> Result<Envelope, SkipReason> {
        let targets = self.builder.admit_call_service(event)?;
        self.check_idempotency(
            EnvelopeKind::CallService,
            &event.correlation.id,
            epoch_seconds(now),
        )?;

        Ok(self
            .builder
            .build_call_service(event, targets, &self.zones, now))
    }

    // Events without a correlation id cannot be deduplicated
    fn check_idempotency(
        &mut self,
        kind: EnvelopeKind,
        correlation_id: &str,
        now: f64,
    ) -> Result<(), SkipReason> {
        if correlation_id.is_empty() || self.idempotency.is_new(&event_key(kind, correlation_id), now)
        {
            Ok(())
        } else {
            Err(SkipReason::Duplicate)
        }
    }

    pub fn take_batch(&mut self) -> Option<Vec<Envelope>> {
        self.queue.take_batch()
    }

    pub fn flush_succeeded(&mut self, delivered: usize, at: DateTime<Utc>) {
        self.queue.complete_flush();
        self.stats.batches_delivered += 1;
        self.stats.envelopes_delivered += delivered as u64;
        self.stats.last_flush_at = Some(at);
    }

    /// Re-queues a failed batch; returns how many envelopes overflowed
    pub fn flush_failed(&mut self, batch: Vec<Envelope>, error: &DeliveryError) -> usize {
        let dropped = self.queue.requeue_front(batch);
        self.stats.batches_failed += 1;
        self.stats.dropped_overflow += dropped as u64;
        self.stats.last_error = Some(error.to_string());
        dropped
    }

    /// Puts back a batch whose delivery was abandoned before completing
    pub fn flush_abandoned(&mut self, batch: Vec<Envelope>) -> usize {
        let dropped = self.queue.requeue_front(batch);
        self.stats.dropped_overflow += dropped as u64;
        dropped
    }

    pub fn heartbeat(&self, now: DateTime<Utc>) -> Envelope {
        build_heartbeat(
            self.builder.header(now),
            &self.zones,
            self.builder.enabled_domains(),
            self.queue.len(),
        )
    }

    pub fn heartbeat_sent(&mut self) {
        self.stats.heartbeats_sent += 1;
    }

    pub fn heartbeat_failed(&mut self, error: &DeliveryError) {
        self.stats.heartbeats_failed += 1;
        self.stats.last_error = Some(error.to_string());
    }

    pub fn replace_zones(&mut self, zones: ZoneResolver) {
        self.zones = zones;
    }

    pub fn zones(&self) -> &ZoneResolver {
        &self.zones
    }

    /// Drops expired idempotency keys ahead of persistence
    pub fn prune_caches(&mut self, now: DateTime<Utc>) -> usize {
        self.idempotency.prune(epoch_seconds(now))
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ForwarderSnapshot {
        let now_secs = epoch_seconds(now);
        ForwarderSnapshot {
            pending_events: self.queue.iter().cloned().collect(),
            debounce_cache: self.debounce.snapshot(now_secs, DEBOUNCE_RETENTION),
            seen_events: self.idempotency.snapshot(now_secs),
            saved_at: now,
        }
    }

    /// Loads a persisted snapshot; returns the number of envelopes dropped
    /// to fit the queue
    pub fn restore(&mut self, snapshot: ForwarderSnapshot) -> usize {
        self.debounce.restore(snapshot.debounce_cache);
        self.idempotency.restore(snapshot.seen_events);
        let dropped = self.queue.restore(snapshot.pending_events);
        self.stats.dropped_overflow += dropped as u64;
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn batcher_state(&self) -> BatcherState {
        self.queue.state()
    }

    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }
}
