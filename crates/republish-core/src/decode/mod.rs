// ── Attribute decoder ──
//
// Pure functions turning one inbound message into attribute updates for a
// single device. Two shapes are accepted:
//
//   flat:       <namespace>/<device_id>/<attribute>   payload = scalar text
//   structured: <namespace>/<device_id>               payload = JSON object
//
// A payload whose first non-blank byte is `{` is treated as structured.

pub mod flatten;
pub mod normalize;

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::model::AttributeValue;

/// One attribute value destined for `DeviceRegistry::apply_update`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUpdate {
    pub attribute: String,
    pub value: AttributeValue,
    /// A numeric attribute was stored as text.
    pub coerced: bool,
}

/// Everything one message says about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub device_id: String,
    pub received_at: DateTime<Utc>,
    pub updates: Vec<AttributeUpdate>,
}

/// Decode a message received at `received_at`.
pub fn decode(
    topic: &str,
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<DecodedMessage, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;

    if text.trim_start().starts_with('{') {
        decode_structured(topic, text, received_at)
    } else {
        decode_flat(topic, text, received_at)
    }
}

fn decode_flat(
    topic: &str,
    text: &str,
    received_at: DateTime<Utc>,
) -> Result<DecodedMessage, DecodeError> {
    let levels: Vec<&str> = topic.split('/').collect();
    let [_, .., device_id, attribute] = levels.as_slice() else {
        return Err(DecodeError::TopicTooShort {
            topic: topic.to_owned(),
        });
    };
    if device_id.is_empty() || attribute.is_empty() {
        return Err(DecodeError::EmptyLevel {
            topic: topic.to_owned(),
        });
    }
    if text.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut updates = Vec::with_capacity(2);
    push_update(
        &mut updates,
        normalize::attribute_name(attribute),
        AttributeValue::parse_scalar(text),
    );

    Ok(DecodedMessage {
        device_id: (*device_id).to_owned(),
        received_at,
        updates,
    })
}

fn decode_structured(
    topic: &str,
    text: &str,
    received_at: DateTime<Utc>,
) -> Result<DecodedMessage, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson {
            reason: e.to_string(),
        })?;

    // A top-level `id` field names the device; otherwise the last topic level.
    let device_id = match value.get("id").and_then(AttributeValue::from_json) {
        Some(id) => normalize::canonical_id_text(&id.to_string()),
        None => topic.rsplit('/').next().unwrap_or_default().to_owned(),
    };
    if device_id.is_empty() {
        return Err(DecodeError::EmptyLevel {
            topic: topic.to_owned(),
        });
    }

    let mut updates = Vec::new();
    for (path, leaf) in flatten::flatten(&value) {
        if let Some(value) = AttributeValue::from_json(leaf) {
            push_update(&mut updates, normalize::attribute_name(&path), value);
        }
    }
    if updates.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedMessage {
        device_id,
        received_at,
        updates,
    })
}

fn push_update(updates: &mut Vec<AttributeUpdate>, attribute: &str, value: AttributeValue) {
    let (value, coerced) = normalize::coerce(attribute, value);
    let derived = if coerced {
        None
    } else {
        normalize::derive(attribute, &value)
    };

    updates.push(AttributeUpdate {
        attribute: attribute.to_owned(),
        value,
        coerced,
    });
    if let Some((name, value)) = derived {
        updates.push(AttributeUpdate {
            attribute: name.to_owned(),
            value,
            coerced: false,
        });
    }
}
