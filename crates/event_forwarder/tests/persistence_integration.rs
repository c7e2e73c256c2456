use chrono::{DateTime, Utc};
use common::domain::{
    Correlation, EntityState, ManualClock, MockEnvelopeSink, MockSnapshotStore, PersistenceError,
    RawEvent, SnapshotStore, StateChangedEvent,
};
use event_forwarder::{
    EventForwarder, EventOutcome, ForwarderConfig, JsonFileSnapshotStore, SkipReason,
    ZoneResolver,
};
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    "2024-05-01T12:00:00Z".parse().unwrap()
}

fn sensor(entity_id: &str, value: &str, context: &str) -> RawEvent {
    RawEvent::StateChanged(StateChangedEvent {
        entity_id: entity_id.to_string(),
        old_state: None,
        new_state: Some(EntityState::new(value)),
        correlation: Correlation {
            id: context.to_string(),
            ..Default::default()
        },
    })
}

fn offline_sink() -> Arc<MockEnvelopeSink> {
    let mut sink = MockEnvelopeSink::new();
    sink.expect_deliver().never();
    Arc::new(sink)
}

fn forwarder(store: Arc<dyn SnapshotStore>, clock: Arc<ManualClock>) -> EventForwarder {
    EventForwarder::new(
        ForwarderConfig::default(),
        ZoneResolver::default(),
        offline_sink(),
        store,
        clock,
    )
    .unwrap()
}

#[tokio::test]
async fn test_restart_restores_queue_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hearth_state.json");
    let clock = Arc::new(ManualClock::new(start()));

    let first = forwarder(Arc::new(JsonFileSnapshotStore::new(&path)), clock.clone());
    first.handle_event(sensor("sensor.a", "1", "ctx-a"));
    first.handle_event(sensor("sensor.b", "2", "ctx-b"));
    first.persist().await.unwrap();

    clock.advance(chrono::Duration::seconds(2));
    let second = forwarder(Arc::new(JsonFileSnapshotStore::new(&path)), clock.clone());
    assert_eq!(second.restore().await, 2);

    assert_eq!(
        second.handle_event(sensor("sensor.a", "3", "ctx-new")),
        EventOutcome::Skipped(SkipReason::Debounced)
    );
    clock.advance(chrono::Duration::seconds(10));
    assert_eq!(
        second.handle_event(sensor("sensor.b", "4", "ctx-b")),
        EventOutcome::Skipped(SkipReason::Duplicate)
    );
}

#[tokio::test]
async fn test_save_of_loaded_snapshot_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileSnapshotStore::new(dir.path().join("state.json")));
    let clock = Arc::new(ManualClock::new(start()));
    let original = forwarder(store.clone(), clock.clone());
    original.handle_event(sensor("sensor.a", "1", "ctx-a"));
    original.persist().await.unwrap();
    let saved = store.load().await.unwrap().unwrap();

    let reloaded = forwarder(store.clone(), clock);
    reloaded.restore().await;
    reloaded.persist().await.unwrap();

    assert_eq!(store.load().await.unwrap().unwrap(), saved);
}

#[tokio::test]
async fn test_expired_entries_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileSnapshotStore::new(dir.path().join("state.json")));
    let clock = Arc::new(ManualClock::new(start()));
    let forwarder = forwarder(store.clone(), clock.clone());
    forwarder.handle_event(sensor("sensor.a", "1", "ctx-a"));

    clock.advance(chrono::Duration::hours(2));
    forwarder.persist().await.unwrap();

    let saved = store.load().await.unwrap().unwrap();
    assert_eq!(saved.pending_events.len(), 1);
    assert!(saved.debounce_cache.is_empty());
    assert!(saved.seen_events.is_empty());
    assert_eq!(saved.saved_at, start() + chrono::Duration::hours(2));
}

#[tokio::test]
async fn test_store_failures_fall_back_to_memory_only() {
    let mut store = MockSnapshotStore::new();
    store.expect_load().times(1).returning(|| {
        Err(PersistenceError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )))
    });
    store.expect_save().times(1).returning(|_| {
        Err(PersistenceError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )))
    });
    let forwarder = forwarder(Arc::new(store), Arc::new(ManualClock::new(start())));

    assert_eq!(forwarder.restore().await, 0);
    assert!(forwarder
        .handle_event(sensor("sensor.a", "1", "ctx-a"))
        .is_enqueued());
    assert!(forwarder.persist().await.is_err());
    assert_eq!(forwarder.pending_len(), 1);
}

#[tokio::test]
async fn test_restore_trims_to_queue_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileSnapshotStore::new(dir.path().join("state.json")));
    let clock = Arc::new(ManualClock::new(start()));
    let big = forwarder(store.clone(), clock.clone());
    for n in 0..5 {
        big.handle_event(sensor(&format!("sensor.s{n}"), "1", &format!("ctx-{n}")));
    }
    big.persist().await.unwrap();

    let small = EventForwarder::new(
        ForwarderConfig {
            max_queue_size: 3,
            ..Default::default()
        },
        ZoneResolver::default(),
        offline_sink(),
        store,
        clock,
    )
    .unwrap();

    assert_eq!(small.restore().await, 3);
    assert_eq!(small.stats().dropped_overflow, 2);
}
