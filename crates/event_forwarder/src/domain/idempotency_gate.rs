use common::domain::EnvelopeKind;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Table size above which expired keys are swept before the next insert
pub const PRUNE_THRESHOLD: usize = 1000;

/// `kind:correlation_id`
pub fn event_key(kind: EnvelopeKind, correlation_id: &str) -> String {
    format!("{}:{}", kind.as_str(), correlation_id)
}

/// Forwards each event key at most once per TTL window
///
/// Stores expiry times in epoch seconds. A zero TTL disables the gate.
#[derive(Debug, Clone)]
pub struct IdempotencyGate {
    ttl: Duration,
    expiries: HashMap<String, f64>,
}

impl IdempotencyGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            expiries: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// True the first time `key` is seen within the window; records it.
    pub fn is_new(&mut self, key: &str, now: f64) -> bool {
        if !self.is_enabled() {
            return true;
        }
        if let Some(expiry) = self.expiries.get(key) {
            if *expiry > now {
                return false;
            }
        }
        if self.expiries.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }
        self.expiries
            .insert(key.to_string(), now + self.ttl.as_secs_f64());
        true
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }

    /// Drops expired keys, returning how many were removed
    pub fn prune(&mut self, now: f64) -> usize {
        let before = self.expiries.len();
        self.expiries.retain(|_, expiry| *expiry > now);
        before - self.expiries.len()
    }

    /// Unexpired entries, for persistence
    pub fn snapshot(&self, now: f64) -> BTreeMap<String, f64> {
        self.expiries
            .iter()
            .filter(|(_, expiry)| **expiry > now)
            .map(|(key, expiry)| (key.clone(), *expiry))
            .collect()
    }

    pub fn restore(&mut self, entries: BTreeMap<String, f64>) {
        for (key, expiry) in entries {
            let slot = self.expiries.entry(key).or_insert(expiry);
            if *slot < expiry {
                *slot = expiry;
            }
        }
    }
}
