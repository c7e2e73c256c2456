use crate::domain::RedactionOptions;
use regex::{RegexSet, RegexSetBuilder};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub const FRIENDLY_NAME: &str = "friendly_name";

/// Dropped in every domain, even when allowlisted
pub const GLOBAL_REDACTED_KEYS: &[&str] = &[
    "entity_picture",
    "entity_picture_local",
    "media_image_url",
    "media_image_remotely_accessible",
    "latitude",
    "longitude",
    "gps_accuracy",
    "altitude",
    "access_token",
];

/// Key names matching this are dropped regardless of any other rule
pub const SENSITIVE_KEY_PATTERN: &str = "token|key|secret|password";

const DOMAIN_ALLOWLISTS: &[(&str, &[&str])] = &[
    (
        "light",
        &[
            "brightness",
            "color_mode",
            "color_temp",
            "color_temp_kelvin",
            "hs_color",
            "rgb_color",
            "effect",
            "supported_color_modes",
            FRIENDLY_NAME,
        ],
    ),
    ("switch", &[FRIENDLY_NAME]),
    ("input_boolean", &[FRIENDLY_NAME]),
    ("lock", &[FRIENDLY_NAME]),
    ("scene", &[FRIENDLY_NAME]),
    ("script", &[FRIENDLY_NAME]),
    ("binary_sensor", &["device_class", FRIENDLY_NAME]),
    (
        "sensor",
        &["device_class", "state_class", "unit_of_measurement", FRIENDLY_NAME],
    ),
    (
        "climate",
        &[
            "current_temperature",
            "temperature",
            "target_temp_high",
            "target_temp_low",
            "hvac_action",
            "hvac_mode",
            "fan_mode",
            "preset_mode",
            "current_humidity",
            FRIENDLY_NAME,
        ],
    ),
    (
        "cover",
        &[
            "current_position",
            "current_tilt_position",
            "device_class",
            FRIENDLY_NAME,
        ],
    ),
    (
        "fan",
        &[
            "percentage",
            "preset_mode",
            "oscillating",
            "direction",
            FRIENDLY_NAME,
        ],
    ),
    (
        "media_player",
        &[
            "volume_level",
            "is_volume_muted",
            "media_content_type",
            "source",
            "entity_picture",
            FRIENDLY_NAME,
        ],
    ),
    ("person", &["source_type", FRIENDLY_NAME]),
    ("device_tracker", &["source_type", FRIENDLY_NAME]),
    (
        "vacuum",
        &["status", "battery_level", "fan_speed", FRIENDLY_NAME],
    ),
    (
        "alarm_control_panel",
        &["code_format", "changed_by", FRIENDLY_NAME],
    ),
    (
        "weather",
        &[
            "temperature",
            "humidity",
            "pressure",
            "wind_speed",
            FRIENDLY_NAME,
        ],
    ),
];

/// Declared attribute allowlists, keyed by domain
pub fn default_allowlists() -> BTreeMap<String, BTreeSet<String>> {
    DOMAIN_ALLOWLISTS
        .iter()
        .map(|(domain, keys)| {
            (
                domain.to_string(),
                keys.iter().map(|key| key.to_string()).collect(),
            )
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error("invalid redaction pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Allowlist-based attribute redaction
#[derive(Debug, Clone)]
pub struct AttributeProjector {
    allowlists: BTreeMap<String, BTreeSet<String>>,
    keep_friendly_names: bool,
    extra_redacted_keys: BTreeSet<String>,
    sensitive_keys: RegexSet,
}

impl AttributeProjector {
    pub fn new(options: &RedactionOptions) -> Result<Self, ProjectorError> {
        Self::with_allowlists(default_allowlists(), options)
    }

    pub fn with_allowlists(
        allowlists: BTreeMap<String, BTreeSet<String>>,
        options: &RedactionOptions,
    ) -> Result<Self, ProjectorError> {
        let patterns = std::iter::once(SENSITIVE_KEY_PATTERN)
            .chain(options.extra_redacted_patterns.iter().map(String::as_str));
        let sensitive_keys = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            allowlists,
            keep_friendly_names: options.keep_friendly_names,
            extra_redacted_keys: options.extra_redacted_keys.clone(),
            sensitive_keys,
        })
    }

    pub fn has_allowlist(&self, domain: &str) -> bool {
        self.allowlists.contains_key(domain)
    }

    /// Returns the subset of `attributes` that may leave the host
    pub fn project(&self, domain: &str, attributes: &Map<String, Value>) -> Map<String, Value> {
        let Some(allowlist) = self.allowlists.get(domain) else {
            return Map::new();
        };

        attributes
            .iter()
            .filter(|(key, _)| allowlist.contains(key.as_str()) && self.is_releasable(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn is_releasable(&self, key: &str) -> bool {
        if GLOBAL_REDACTED_KEYS.contains(&key) {
            return false;
        }
        if key == FRIENDLY_NAME && !self.keep_friendly_names {
            return false;
        }
        if self.extra_redacted_keys.contains(key) {
            return false;
        }
        !self.sensitive_keys.is_match(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn projector(options: RedactionOptions) -> AttributeProjector {
        AttributeProjector::new(&options).unwrap()
    }

    #[test]
    fn test_keeps_only_allowlisted_keys() {
        let projector = projector(RedactionOptions::default());

        let projected = projector.project(
            "light",
            &attrs(json!({"brightness": 180, "friendly_name": "Kitchen", "supported_features": 44})),
        );

        assert_eq!(projected, attrs(json!({"brightness": 180})));
    }

    #[test]
    fn test_unknown_domain_projects_nothing() {
        let projector = projector(RedactionOptions::default());

        let projected = projector.project("camera", &attrs(json!({"brightness": 1})));

        assert!(projected.is_empty());
    }

    #[test]
    fn test_global_redaction_beats_allowlist() {
        let projector = projector(RedactionOptions::default());

        let projected = projector.project(
            "media_player",
            &attrs(json!({"entity_picture": "/api/media_player_proxy/x", "volume_level": 0.4})),
        );

        assert_eq!(projected, attrs(json!({"volume_level": 0.4})));
    }

    #[test]
    fn test_friendly_name_opt_in() {
        let projector = projector(RedactionOptions {
            keep_friendly_names: true,
            ..Default::default()
        });

        let projected = projector.project("switch", &attrs(json!({"friendly_name": "Porch"})));

        assert_eq!(projected, attrs(json!({"friendly_name": "Porch"})));
    }

    #[test]
    fn test_extra_redacted_keys() {
        let projector = projector(RedactionOptions {
            extra_redacted_keys: ["changed_by".to_string()].into_iter().collect(),
            ..Default::default()
        });

        let projected = projector.project(
            "alarm_control_panel",
            &attrs(json!({"changed_by": "Alice", "code_format": "number"})),
        );

        assert_eq!(projected, attrs(json!({"code_format": "number"})));
    }

    #[test]
    fn test_sensitive_pattern_beats_custom_allowlist() {
        let allowlists = [(
            "lock".to_string(),
            ["API_Key", "UserPassword", "refresh_token", "battery"]
                .iter()
                .map(|key| key.to_string())
                .collect(),
        )]
        .into_iter()
        .collect();
        let projector =
            AttributeProjector::with_allowlists(allowlists, &RedactionOptions::default()).unwrap();

        let projected = projector.project(
            "lock",
            &attrs(json!({"API_Key": "a", "UserPassword": "b", "refresh_token": "c", "battery": 90})),
        );

        assert_eq!(projected, attrs(json!({"battery": 90})));
    }

    #[test]
    fn test_extra_patterns_are_case_insensitive() {
        let projector = projector(RedactionOptions {
            extra_redacted_patterns: vec!["^current_".to_string()],
            ..Default::default()
        });

        let projected = projector.project(
            "cover",
            &attrs(json!({"Current_Position": 10, "current_tilt_position": 5, "device_class": "blind"})),
        );

        assert_eq!(projected, attrs(json!({"device_class": "blind"})));
    }

    #[test]
    fn test_invalid_extra_pattern_is_rejected() {
        let result = AttributeProjector::new(&RedactionOptions {
            extra_redacted_patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        });

        assert!(matches!(result, Err(ProjectorError::InvalidPattern(_))));
    }

    #[test]
    fn test_projection_never_leaks_redacted_keys_in_any_domain() {
        let projector = projector(RedactionOptions::default());
        let raw = attrs(json!({
            "friendly_name": "x",
            "latitude": 1.0,
            "longitude": 2.0,
            "access_token": "t",
            "entity_picture": "p",
            "brightness": 1,
            "temperature": 20
        }));

        for domain in default_allowlists().keys() {
            let projected = projector.project(domain, &raw);
            assert!(!projected.contains_key(FRIENDLY_NAME), "{domain}");
            for key in projected.keys() {
                assert!(!GLOBAL_REDACTED_KEYS.contains(&key.as_str()), "{domain}: {key}");
                assert!(default_allowlists()[domain].contains(key), "{domain}: {key}");
            }
        }
    }
}
