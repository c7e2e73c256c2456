use crate::domain::{
    BatcherState, EventOutcome, ForwarderConfig, ForwarderState, ForwarderStats, ZoneResolver,
};
use common::domain::{
    Clock, DeliveryResult, DirectoryResult, Envelope, EnvelopeSink, EventCallback, EventPredicate,
    EventSource, PersistenceResult, RawEvent, SnapshotStore, SubscriptionHandle, ZoneDirectory,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub type ForwarderProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing pending, or another flush is in flight
    Idle,
    Delivered(usize),
    Requeued(usize),
}

struct ForwarderInner {
    config: ForwarderConfig,
    state: Mutex<ForwarderState>,
    sink: Arc<dyn EnvelopeSink>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    flush_requested: Notify,
}

/// Batch taken from the queue for delivery. Requeued on drop unless settled.
struct InFlightBatch<'a> {
    forwarder: &'a EventForwarder,
    batch: Option<Vec<Envelope>>,
}

impl InFlightBatch<'_> {
    fn len(&self) -> usize {
        self.batch.as_ref().map_or(0, Vec::len)
    }

    fn envelopes(&self) -> &[Envelope] {
        self.batch.as_deref().unwrap_or_default()
    }

    fn settle(&mut self) -> Vec<Envelope> {
        self.batch.take().unwrap_or_default()
    }
}

impl Drop for InFlightBatch<'_> {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            let count = batch.len();
            let dropped = self.forwarder.lock_state().flush_abandoned(batch);
            warn!(count, dropped, "delivery interrupted, batch re-queued");
        }
    }
}

/// Redacts host events into envelopes and ships them in batches
///
/// Cheap to clone; clones share the same queue, caches and counters.
/// The event callback path is synchronous and never awaits. Network and
/// persistence I/O happen in `flush`, `send_heartbeat`, `restore` and
/// `persist`, none of which hold the state lock across an await point.
#[derive(Clone)]
pub struct EventForwarder {
    inner: Arc<ForwarderInner>,
}

impl EventForwarder {
    pub fn new(
        config: ForwarderConfig,
        zones: ZoneResolver,
        sink: Arc<dyn EnvelopeSink>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let state = ForwarderState::new(&config, zones)?;

        info!(
            enabled_domains = config.enabled_domains.len(),
            batch_size = config.batch_size,
            max_queue_size = config.max_queue_size,
            forward_action_events = config.forward_action_events,
            "event forwarder initialized"
        );

        Ok(Self {
            inner: Arc::new(ForwarderInner {
                config,
                state: Mutex::new(state),
                sink,
                store,
                clock,
                flush_requested: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.inner.config
    }

    fn lock_state(&self) -> MutexGuard<'_, ForwarderState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to the source. Dropping the handle detaches the forwarder.
    pub fn attach(&self, source: &dyn EventSource) -> SubscriptionHandle {
        let config = &self.inner.config;
        let enabled_domains = config.enabled_domains.clone();
        let forward_action_events = config.forward_action_events;
        let predicate: EventPredicate = Arc::new(move |event: &RawEvent| match event {
            RawEvent::StateChanged(event) => event
                .domain()
                .is_some_and(|domain| enabled_domains.contains(domain)),
            RawEvent::CallService(_) => forward_action_events,
        });

        let forwarder = self.clone();
        let callback: EventCallback = Arc::new(move |event: RawEvent| {
            forwarder.handle_event(event);
        });

        source.subscribe(predicate, callback)
    }

    /// Runs one event through the gates and into the queue
    pub fn handle_event(&self, event: RawEvent) -> EventOutcome {
        let now = self.inner.clock.now();
        let outcome = self.lock_state().handle_event(&event, now);
        if outcome.flush_due() {
            self.inner.flush_requested.notify_one();
        }
        outcome
    }

    /// Delivers everything pending as one batch. A failed batch goes back
    /// to the front of the queue, as does a batch whose delivery future is
    /// dropped before resolving.
    pub async fn flush(&self) -> FlushOutcome {
        let batch = self.lock_state().take_batch();
        let Some(batch) = batch else {
            return FlushOutcome::Idle;
        };
        let mut in_flight = InFlightBatch {
            forwarder: self,
            batch: Some(batch),
        };
        let count = in_flight.len();

        let result = self.inner.sink.deliver(in_flight.envelopes()).await;
        let batch = in_flight.settle();
        match result {
            Ok(()) => {
                let now = self.inner.clock.now();
                self.lock_state().flush_succeeded(count, now);
                debug!(delivered = count, "flushed pending envelopes");
                FlushOutcome::Delivered(count)
            }
            Err(err) => {
                error!(batch_size = count, error = %err, "batch delivery failed, re-queued");
                let dropped = self.lock_state().flush_failed(batch, &err);
                if dropped > 0 {
                    warn!(dropped, "re-queued batch exceeded queue capacity");
                }
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Sends a heartbeat straight to the sink, bypassing the queue.
    /// Failures are counted and logged, never retried.
    pub async fn send_heartbeat(&self) -> DeliveryResult<()> {
        let envelope = self.lock_state().heartbeat(self.inner.clock.now());

        let result = self
            .inner
            .sink
            .deliver(std::slice::from_ref(&envelope))
            .await;
        match &result {
            Ok(()) => {
                self.lock_state().heartbeat_sent();
                debug!("heartbeat sent");
            }
            Err(err) => {
                self.lock_state().heartbeat_failed(err);
                warn!(error = %err, "heartbeat delivery failed");
            }
        }
        result
    }

    /// Rebuilds the zone resolver; on failure the previous one stays.
    #[instrument(skip_all)]
    pub async fn refresh_zones(&self, directory: &dyn ZoneDirectory) -> DirectoryResult<usize> {
        match directory.snapshot().await {
            Ok(snapshot) => {
                let zones = ZoneResolver::from_registry(&snapshot);
                let entity_count = zones.entity_count();
                self.lock_state().replace_zones(zones);
                debug!(entity_count, "zone resolver refreshed");
                Ok(entity_count)
            }
            Err(err) => {
                warn!(error = %err, "zone refresh failed, keeping previous zones");
                Err(err)
            }
        }
    }

    /// Loads persisted queue and caches. Returns the number of restored
    /// pending envelopes; load failures leave the forwarder empty.
    pub async fn restore(&self) -> usize {
        match self.inner.store.load().await {
            Ok(Some(snapshot)) => {
                let saved_at = snapshot.saved_at;
                let mut state = self.lock_state();
                let dropped = state.restore(snapshot);
                let pending = state.pending_len();
                info!(pending, dropped, %saved_at, "restored forwarder state");
                pending
            }
            Ok(None) => {
                debug!("no persisted forwarder state");
                0
            }
            Err(err) => {
                warn!(error = %err, "failed to load forwarder state, starting empty");
                0
            }
        }
    }

    /// Saves the queue and pruned caches
    pub async fn persist(&self) -> PersistenceResult<()> {
        let snapshot = {
            let now = self.inner.clock.now();
            let mut state = self.lock_state();
            state.prune_caches(now);
            state.snapshot(now)
        };
        let pending = snapshot.pending_events.len();

        self.inner.store.save(&snapshot).await?;
        info!(pending, "persisted forwarder state");
        Ok(())
    }

    /// Final flush then state save. Errors are logged, not returned.
    pub async fn shutdown(&self) {
        info!("event forwarder shutting down");

        if let FlushOutcome::Requeued(count) = self.flush().await {
            warn!(count, "final flush failed, envelopes kept for persistence");
        }
        if let Err(err) = self.persist().await {
            error!(error = %err, "failed to persist forwarder state");
        }

        let stats = self.stats();
        info!(
            events_received = stats.events_received,
            envelopes_enqueued = stats.envelopes_enqueued,
            envelopes_delivered = stats.envelopes_delivered,
            debounced = stats.debounced,
            duplicates = stats.duplicates,
            skipped = stats.skipped,
            dropped_overflow = stats.dropped_overflow,
            batches_failed = stats.batches_failed,
            heartbeats_sent = stats.heartbeats_sent,
            "event forwarder stopped"
        );
    }

    pub fn stats(&self) -> ForwarderStats {
        self.lock_state().stats().clone()
    }

    pub fn pending_len(&self) -> usize {
        self.lock_state().pending_len()
    }

    pub fn batcher_state(&self) -> BatcherState {
        self.lock_state().batcher_state()
    }

    /// Flushes on every interval tick, or as soon as the queue reaches
    /// the batch size. Returns on cancellation without a final flush.
    pub async fn run_flush_loop(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        let interval = self.inner.config.flush_interval;
        info!(?interval, "flush loop started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("flush loop stopping");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
                _ = self.inner.flush_requested.notified() => {
                    debug!("batch size reached, flushing early");
                }
            }
            self.flush().await;
        }

        Ok(())
    }

    pub async fn run_heartbeat_loop(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        let interval = self.inner.config.heartbeat_interval;
        info!(?interval, "heartbeat loop started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let _ = self.send_heartbeat().await;
                }
            }
        }

        Ok(())
    }

    pub async fn run_zone_refresh_loop(
        &self,
        ctx: CancellationToken,
        directory: Arc<dyn ZoneDirectory>,
        interval: Duration,
    ) -> anyhow::Result<()> {
        info!(?interval, "zone refresh loop started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let _ = self.refresh_zones(directory.as_ref()).await;
                }
            }
        }

        Ok(())
    }

    /// Background loops for the runner: flush always, heartbeat and zone
    /// refresh when configured.
    pub fn into_runner_processes(
        self,
        directory: Option<Arc<dyn ZoneDirectory>>,
    ) -> Vec<(String, ForwarderProcess)> {
        let mut processes: Vec<(String, ForwarderProcess)> = vec![(
            "flush_loop".to_string(),
            Box::new({
                let forwarder = self.clone();
                move |ctx| Box::pin(async move { forwarder.run_flush_loop(ctx).await })
            }),
        )];

        if self.inner.config.heartbeat_enabled {
            processes.push((
                "heartbeat_loop".to_string(),
                Box::new({
                    let forwarder = self.clone();
                    move |ctx| Box::pin(async move { forwarder.run_heartbeat_loop(ctx).await })
                }),
            ));
        }

        if let (Some(interval), Some(directory)) = (self.inner.config.zone_refresh_interval, directory)
        {
            processes.push((
                "zone_refresh_loop".to_string(),
                Box::new({
                    let forwarder = self.clone();
                    move |ctx| {
                        Box::pin(async move {
                            forwarder
                                .run_zone_refresh_loop(ctx, directory, interval)
                                .await
                        })
                    }
                }),
            ));
        }

        processes
    }
}
