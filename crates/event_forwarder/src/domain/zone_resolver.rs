use common::domain::{split_entity_id, RegistrySnapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Domains whose live state may itself name the zone
pub const PRESENCE_DOMAINS: &[&str] = &["person", "device_tracker"];

const GENERIC_PRESENCE_STATES: &[&str] = &["home", "not_home", "away", "unknown", "unavailable"];

/// Read-only entity → zone lookup flattened from the host registries
///
/// Built once from a [`RegistrySnapshot`]; never refreshes itself.
#[derive(Debug, Clone, Default)]
pub struct ZoneResolver {
    zones: HashMap<String, String>,
    entities: BTreeSet<String>,
}

impl ZoneResolver {
    /// Flattens entity → (device →) area chains. An entity's own area wins
    /// over the area of its device.
    pub fn from_registry(snapshot: &RegistrySnapshot) -> Self {
        let device_areas: HashMap<&str, &str> = snapshot
            .devices
            .iter()
            .filter_map(|device| Some((device.id.as_str(), device.area_id.as_deref()?)))
            .collect();

        let mut zones = HashMap::new();
        let mut entities = BTreeSet::new();
        for entry in &snapshot.entities {
            entities.insert(entry.entity_id.clone());
            let area = entry.area_id.as_deref().or_else(|| {
                entry
                    .device_id
                    .as_deref()
                    .and_then(|device_id| device_areas.get(device_id).copied())
            });
            if let Some(area) = area {
                zones.insert(entry.entity_id.clone(), area.to_string());
            }
        }

        Self { zones, entities }
    }

    /// Static zone of an entity
    pub fn resolve(&self, entity_id: &str) -> Option<&str> {
        self.zones.get(entity_id).map(String::as_str)
    }

    /// Zone of an entity given its live state value. Presence entities whose
    /// state names a specific zone (not home/away/unknown) report that zone.
    pub fn resolve_with_state(&self, entity_id: &str, state: Option<&str>) -> Option<String> {
        if let (Some((domain, _)), Some(state)) = (split_entity_id(entity_id), state) {
            if PRESENCE_DOMAINS.contains(&domain) && is_named_zone(state) {
                return Some(state.to_string());
            }
        }
        self.resolve(entity_id).map(str::to_string)
    }

    /// Registered entity count per domain, restricted to `domains`
    pub fn domain_counts(&self, domains: &BTreeSet<String>) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entity_id in &self.entities {
            if let Some((domain, _)) = split_entity_id(entity_id) {
                if domains.contains(domain) {
                    *counts.entry(domain.to_string()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

fn is_named_zone(state: &str) -> bool {
    !state.trim().is_empty()
        && !GENERIC_PRESENCE_STATES
            .iter()
            .any(|generic| generic.eq_ignore_ascii_case(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DeviceEntry, EntityEntry};

    fn entity(entity_id: &str, area_id: Option<&str>, device_id: Option<&str>) -> EntityEntry {
        EntityEntry {
            entity_id: entity_id.to_string(),
            area_id: area_id.map(str::to_string),
            device_id: device_id.map(str::to_string),
        }
    }

    fn registry() -> RegistrySnapshot {
        RegistrySnapshot {
            entities: vec![
                entity("light.kitchen", Some("kitchen"), Some("dev-hub")),
                entity("sensor.hall_temp", None, Some("dev-hall")),
                entity("sensor.orphan", None, Some("dev-missing")),
                entity("person.alex", None, None),
            ],
            devices: vec![
                DeviceEntry {
                    id: "dev-hub".to_string(),
                    area_id: Some("living_room".to_string()),
                },
                DeviceEntry {
                    id: "dev-hall".to_string(),
                    area_id: Some("hallway".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_entity_area_wins_over_device_area() {
        let resolver = ZoneResolver::from_registry(&registry());

        assert_eq!(resolver.resolve("light.kitchen"), Some("kitchen"));
    }

    #[test]
    fn test_device_area_is_inherited() {
        let resolver = ZoneResolver::from_registry(&registry());

        assert_eq!(resolver.resolve("sensor.hall_temp"), Some("hallway"));
        assert_eq!(resolver.resolve("sensor.orphan"), None);
        assert_eq!(resolver.resolve("light.unknown"), None);
    }

    #[test]
    fn test_presence_state_overrides_static_zone() {
        let resolver = ZoneResolver::from_registry(&registry());

        assert_eq!(
            resolver.resolve_with_state("person.alex", Some("Office")),
            Some("Office".to_string())
        );
        assert_eq!(resolver.resolve_with_state("person.alex", Some("not_home")), None);
        assert_eq!(resolver.resolve_with_state("person.alex", Some("Home")), None);
        // Only presence domains read zones from state
        assert_eq!(
            resolver.resolve_with_state("light.kitchen", Some("Office")),
            Some("kitchen".to_string())
        );
    }

    #[test]
    fn test_domain_counts_only_cover_requested_domains() {
        let resolver = ZoneResolver::from_registry(&registry());
        let domains = ["sensor".to_string(), "light".to_string()].into_iter().collect();

        let counts = resolver.domain_counts(&domains);

        assert_eq!(counts.get("sensor"), Some(&2));
        assert_eq!(counts.get("light"), Some(&1));
        assert_eq!(counts.get("person"), None);
        assert_eq!(resolver.entity_count(), 4);
    }
}
