use std::fmt;

use serde::{Deserialize, Serialize};

/// Last-known scalar value of one device attribute.
///
/// Equality is by value: a refresh with an equal value is not a change.
/// Numbers compare across `Integer` and `Float`, so `20` equals `20.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Parse a plain-text scalar: integer, then finite float, then
    /// `true`/`false`, else the text itself.
    pub fn parse_scalar(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Self::Integer(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        match trimmed {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(trimmed.to_owned()),
        }
    }

    /// Convert a JSON leaf. Returns `None` for `null` and containers.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }
}

impl PartialEq for AttributeValue {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Float(_), Self::Integer(_) | Self::Float(_))
            | (Self::Integer(_), Self::Float(_)) => self.as_f64() == other.as_f64(),
            _ => false,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scalar_parsing_order() {
        assert!(matches!(AttributeValue::parse_scalar("55"), AttributeValue::Integer(55)));
        assert!(matches!(AttributeValue::parse_scalar(" 20.5 "), AttributeValue::Float(f) if (f - 20.5).abs() < f64::EPSILON));
        assert_eq!(AttributeValue::parse_scalar("true"), AttributeValue::Bool(true));
        assert_eq!(
            AttributeValue::parse_scalar("NaN"),
            AttributeValue::Text("NaN".into())
        );
        assert_eq!(
            AttributeValue::parse_scalar("2026-01-01 10:00:00"),
            AttributeValue::Text("2026-01-01 10:00:00".into())
        );
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(AttributeValue::Integer(20), AttributeValue::Float(20.0));
        assert_eq!(AttributeValue::Float(20.0), AttributeValue::Integer(20));
        assert_ne!(AttributeValue::Integer(20), AttributeValue::Float(20.5));
        assert_ne!(AttributeValue::Integer(1), AttributeValue::Bool(true));
        assert_ne!(AttributeValue::Text("20".into()), AttributeValue::Integer(20));
    }

    #[test]
    fn json_leaves() {
        let v = serde_json::json!({"a": 1, "b": 1.5, "c": null, "d": "x"});
        assert_eq!(AttributeValue::from_json(&v["a"]), Some(AttributeValue::Integer(1)));
        assert_eq!(AttributeValue::from_json(&v["b"]), Some(AttributeValue::Float(1.5)));
        assert_eq!(AttributeValue::from_json(&v["c"]), None);
        assert_eq!(AttributeValue::from_json(&v["d"]), Some(AttributeValue::Text("x".into())));
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            AttributeValue::Float(20.0),
            AttributeValue::Integer(55),
            AttributeValue::Bool(false),
            AttributeValue::Text("ok".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[20.0,55,false,"ok"]"#);
    }
}
