use common::domain::{Correlation, Trigger};

/// Characters of a correlation id kept when full ids are not requested
pub const CORRELATION_ID_PREFIX_LEN: usize = 12;

/// user if a user id is present, else automation if a parent id is present
pub fn classify_trigger(correlation: &Correlation) -> Trigger {
    if is_present(correlation.user_id.as_deref()) {
        Trigger::User
    } else if is_present(correlation.parent_id.as_deref()) {
        Trigger::Automation
    } else {
        Trigger::Unknown
    }
}

/// Shortens a correlation id to its prefix unless `keep_full` is set.
/// Empty ids are omitted.
pub fn redact_correlation_id(id: Option<&str>, keep_full: bool) -> Option<String> {
    let id = id.filter(|id| !id.is_empty())?;
    if keep_full {
        Some(id.to_string())
    } else {
        Some(id.chars().take(CORRELATION_ID_PREFIX_LEN).collect())
    }
}

fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlation(user_id: Option<&str>, parent_id: Option<&str>) -> Correlation {
        Correlation {
            id: "01HXYZABCDEFGHJKMNPQ".to_string(),
            user_id: user_id.map(str::to_string),
            parent_id: parent_id.map(str::to_string),
        }
    }

    #[test]
    fn test_user_wins_over_parent() {
        assert_eq!(
            classify_trigger(&correlation(Some("u1"), Some("p1"))),
            Trigger::User
        );
        assert_eq!(
            classify_trigger(&correlation(None, Some("p1"))),
            Trigger::Automation
        );
        assert_eq!(classify_trigger(&correlation(None, None)), Trigger::Unknown);
        assert_eq!(classify_trigger(&correlation(Some(""), None)), Trigger::Unknown);
    }

    #[test]
    fn test_correlation_id_truncation() {
        assert_eq!(
            redact_correlation_id(Some("01HXYZABCDEFGHJKMNPQ"), false),
            Some("01HXYZABCDEF".to_string())
        );
        assert_eq!(
            redact_correlation_id(Some("01HXYZABCDEFGHJKMNPQ"), true),
            Some("01HXYZABCDEFGHJKMNPQ".to_string())
        );
        assert_eq!(redact_correlation_id(Some("short"), false), Some("short".to_string()));
        assert_eq!(redact_correlation_id(Some(""), false), None);
        assert_eq!(redact_correlation_id(None, true), None);
    }
}
