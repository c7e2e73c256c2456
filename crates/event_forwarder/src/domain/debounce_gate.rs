use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Per-entity minimum interval between forwarded state changes
///
/// Timestamps are epoch seconds. Domains without a configured interval
/// (or with a zero interval) are never debounced and leave no record.
#[derive(Debug, Clone, Default)]
pub struct DebounceGate {
    intervals: BTreeMap<String, Duration>,
    last_sent: HashMap<String, f64>,
}

impl DebounceGate {
    pub fn new(intervals: BTreeMap<String, Duration>) -> Self {
        Self {
            intervals,
            last_sent: HashMap::new(),
        }
    }

    pub fn interval_for(&self, domain: &str) -> Duration {
        self.intervals.get(domain).copied().unwrap_or(Duration::ZERO)
    }

    /// Returns true and records `now` when the entity may be forwarded.
    /// A suppressed call does not move the window.
    pub fn should_forward(&mut self, entity_id: &str, domain: &str, now: f64) -> bool {
        let interval = self.interval_for(domain);
        if interval.is_zero() {
            return true;
        }
        if let Some(last) = self.last_sent.get(entity_id) {
            if now - last < interval.as_secs_f64() {
                return false;
            }
        }
        self.last_sent.insert(entity_id.to_string(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    /// Entries sent within `max_age` of `now`, for persistence
    pub fn snapshot(&self, now: f64, max_age: Duration) -> BTreeMap<String, f64> {
        let horizon = now - max_age.as_secs_f64();
        self.last_sent
            .iter()
            .filter(|(_, sent)| **sent > horizon)
            .map(|(entity_id, sent)| (entity_id.clone(), *sent))
            .collect()
    }

    /// Merges persisted entries, keeping the most recent timestamp per entity
    pub fn restore(&mut self, entries: BTreeMap<String, f64>) {
        for (entity_id, sent) in entries {
            let slot = self.last_sent.entry(entity_id).or_insert(sent);
            if *slot < sent {
                *slot = sent;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> DebounceGate {
        DebounceGate::new(
            [("sensor".to_string(), Duration::from_secs(5))]
                .into_iter()
                .collect(),
        )
    }

    #[test]
    fn test_zero_interval_always_forwards_without_recording() {
        let mut gate = gate();

        assert!(gate.should_forward("light.kitchen", "light", 100.0));
        assert!(gate.should_forward("light.kitchen", "light", 100.1));
        assert!(gate.is_empty());
    }

    #[test]
    fn test_suppresses_within_interval() {
        let mut gate = gate();

        assert!(gate.should_forward("sensor.temp", "sensor", 100.0));
        assert!(!gate.should_forward("sensor.temp", "sensor", 104.9));
        assert!(gate.should_forward("sensor.temp", "sensor", 105.0));
        assert!(!gate.should_forward("sensor.temp", "sensor", 109.0));
    }

    #[test]
    fn test_suppressed_call_does_not_extend_window() {
        let mut gate = gate();

        assert!(gate.should_forward("sensor.temp", "sensor", 100.0));
        assert!(!gate.should_forward("sensor.temp", "sensor", 103.0));

        assert!(gate.should_forward("sensor.temp", "sensor", 105.5));
    }

    #[test]
    fn test_entities_are_independent() {
        let mut gate = gate();

        assert!(gate.should_forward("sensor.a", "sensor", 100.0));
        assert!(gate.should_forward("sensor.b", "sensor", 100.1));
    }

    #[test]
    fn test_snapshot_prunes_old_entries_and_restore_round_trips() {
        let mut gate = gate();
        gate.should_forward("sensor.old", "sensor", 0.0);
        gate.should_forward("sensor.new", "sensor", 3_000.0);

        let snapshot = gate.snapshot(4_000.0, Duration::from_secs(3_600));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("sensor.new"), Some(&3_000.0));

        let mut restored = DebounceGate::new(BTreeMap::new());
        restored.restore(snapshot.clone());
        assert_eq!(restored.snapshot(4_000.0, Duration::from_secs(3_600)), snapshot);
    }
}
