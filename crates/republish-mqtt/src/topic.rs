// Topic filter matching and validation (MQTT 3.1.1 §4.7).

use crate::error::Error;

/// Whether `topic` is selected by the subscription `filter`.
///
/// `+` matches exactly one level, `#` matches the parent level and any
/// number of levels below it. Topics starting with `$` never match a
/// leading wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) | (None, None) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            _ => return false,
        }
    }
}

/// Validate a subscription filter.
pub fn validate_filter(filter: &str) -> Result<(), Error> {
    check_common(filter)?;

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != last) {
            return Err(invalid(filter, "'#' must be the whole, final level"));
        }
        if level.contains('+') && *level != "+" {
            return Err(invalid(filter, "'+' must occupy a whole level"));
        }
    }
    Ok(())
}

/// Validate a concrete topic name used for publishing.
pub fn validate_topic_name(topic: &str) -> Result<(), Error> {
    check_common(topic)?;
    if topic.contains(['+', '#']) {
        return Err(invalid(topic, "wildcards are not allowed in topic names"));
    }
    Ok(())
}

fn check_common(topic: &str) -> Result<(), Error> {
    if topic.is_empty() {
        return Err(invalid(topic, "must not be empty"));
    }
    if topic.contains('\0') {
        return Err(invalid(topic, "must not contain NUL"));
    }
    if topic.len() > usize::from(u16::MAX) {
        return Err(invalid(topic, "longer than 65535 bytes"));
    }
    Ok(())
}

fn invalid(topic: &str, reason: &'static str) -> Error {
    Error::InvalidTopic {
        topic: topic.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_single_level_wildcard() {
        assert!(topic_matches("a/b/c", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
        assert!(topic_matches("rtl_433/+/events/x", "rtl_433/pi4/events/x"));
        assert!(!topic_matches("rtl_433/+/events/x", "rtl_433/pi4/extra/events/x"));
        assert!(topic_matches("+/+", "a/"));
    }

    #[test]
    fn multi_level_wildcard() {
        let filter = "rtl_433/+/events/#";
        assert!(topic_matches(filter, "rtl_433/pi4/events/Acurite-Tower/12345/temperature_C"));
        assert!(topic_matches(filter, "rtl_433/pi4/events"));
        assert!(!topic_matches(filter, "rtl_433/pi4/devices/12345"));
        assert!(topic_matches("#", "anything/at/all"));
    }

    #[test]
    fn dollar_topics_skip_leading_wildcards() {
        assert!(!topic_matches("#", "$SYS/broker/uptime"));
        assert!(!topic_matches("+/broker/uptime", "$SYS/broker/uptime"));
        assert!(topic_matches("$SYS/#", "$SYS/broker/uptime"));
    }

    #[test]
    fn filter_validation() {
        assert!(validate_filter("rtl_433/+/events/#").is_ok());
        assert!(validate_filter("#").is_ok());
        assert!(validate_filter("a/#/b").is_err());
        assert!(validate_filter("a/b#").is_err());
        assert!(validate_filter("a/b+/c").is_err());
        assert!(validate_filter("").is_err());
    }

    #[test]
    fn topic_name_validation() {
        assert!(validate_topic_name("KTBMES/sensors/config/local_sensors/update").is_ok());
        assert!(validate_topic_name("a/+/b").is_err());
        assert!(validate_topic_name("a/#").is_err());
    }
}
