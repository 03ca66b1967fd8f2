use std::fmt;

use serde::{Serialize, Serializer};

/// Routing category assigned by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    /// Listed in the current sensor name table.
    Known,
    /// Classified through the protocol catalog, e.g. `other_weather`.
    Other(String),
    Uncategorized,
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Self::Known => "known",
            Self::Other(label) => label,
            Self::Uncategorized => "uncategorized",
        }
    }

    /// Topic level used by the categorized output layout.
    pub fn route(&self) -> String {
        match self {
            Self::Known => "house_weather_sensors".to_owned(),
            Self::Other(label) => format!("{label}_sensors"),
            Self::Uncategorized => "unknown_other_sensors".to_owned(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Protocol metadata from the description file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub name: String,
    pub description: String,
}

/// Resolver output for one device at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub display_name: String,
    /// Only known devices carry a machine name.
    pub machine_name: Option<String>,
    pub category: Category,
    pub protocol: Option<ProtocolInfo>,
}
