// Attribute naming and typing rules applied to every decoded value.

use crate::model::AttributeValue;

/// Attributes that are expected to carry numbers.
const NUMERIC_ATTRIBUTES: &[&str] = &[
    "temperature_C",
    "temperature_F",
    "humidity",
    "freq",
    "rssi",
    "snr",
    "noise",
    "pressure_kPa",
];

const KPA_TO_PSI: f64 = 0.145_037_737_730_209;

/// Map raw source names onto registry names.
pub fn attribute_name(raw: &str) -> &str {
    match raw {
        "protocol" => "protocol_id",
        "id" => "device_id",
        other => other,
    }
}

pub fn is_numeric_attribute(name: &str) -> bool {
    NUMERIC_ATTRIBUTES.contains(&name)
}

/// Apply per-attribute typing. The flag is set when a numeric attribute
/// had to be stored as text.
pub fn coerce(attribute: &str, value: AttributeValue) -> (AttributeValue, bool) {
    if attribute == "protocol_id" {
        return (canonical_protocol_id(&value), false);
    }
    if !is_numeric_attribute(attribute) {
        return (value, false);
    }

    match value {
        AttributeValue::Integer(_) | AttributeValue::Float(_) => (value, false),
        AttributeValue::Text(text) => {
            let parsed = AttributeValue::parse_scalar(&text);
            if parsed.is_numeric() {
                (parsed, false)
            } else {
                (AttributeValue::Text(text), true)
            }
        }
        AttributeValue::Bool(b) => (AttributeValue::Text(b.to_string()), true),
    }
}

/// Protocol ids are kept as decimal strings so they key the catalog directly.
pub fn canonical_protocol_id(value: &AttributeValue) -> AttributeValue {
    let text = match value {
        AttributeValue::Integer(n) => n.to_string(),
        AttributeValue::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        AttributeValue::Text(s) => canonical_id_text(s),
        other => other.to_string(),
    };
    AttributeValue::Text(text)
}

/// `" 040"` -> `"40"`; non-numeric ids are only trimmed.
pub fn canonical_id_text(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .parse::<u64>()
        .map_or_else(|_| trimmed.to_owned(), |n| n.to_string())
}

/// Attributes computed from another attribute's update.
pub fn derive(attribute: &str, value: &AttributeValue) -> Option<(&'static str, AttributeValue)> {
    let number = value.as_f64()?;
    match attribute {
        "temperature_C" => Some(("temperature_F", AttributeValue::Float(number * 9.0 / 5.0 + 32.0))),
        "pressure_kPa" => Some(("pressure_psi", AttributeValue::Float(number * KPA_TO_PSI))),
        _ => None,
    }
}
