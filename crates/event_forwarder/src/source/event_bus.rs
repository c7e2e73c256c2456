use common::domain::{EventCallback, EventPredicate, EventSource, RawEvent, SubscriptionHandle};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

struct Subscriber {
    predicate: EventPredicate,
    callback: EventCallback,
}

type Subscribers = Mutex<BTreeMap<u64, Subscriber>>;

/// In-process event source with a subscriber registry
///
/// Callbacks run synchronously on the publishing task, in subscription
/// order, outside the registry lock.
#[derive(Default)]
pub struct EventBus {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands the event to every subscriber whose predicate accepts it.
    /// Returns how many callbacks ran.
    pub fn publish(&self, event: RawEvent) -> usize {
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|subscriber| (subscriber.predicate)(&event))
            .map(|subscriber| subscriber.callback.clone())
            .collect();

        for callback in &callbacks {
            callback(event.clone());
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventSource for EventBus {
    fn subscribe(&self, predicate: EventPredicate, callback: EventCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    predicate,
                    callback,
                },
            );

        let registry = Arc::downgrade(&self.subscribers);
        SubscriptionHandle::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        })
    }
}
