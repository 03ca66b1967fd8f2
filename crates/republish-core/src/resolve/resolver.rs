use std::sync::Arc;

use arc_swap::ArcSwap;

use super::protocols::ProtocolStore;
use crate::model::{Category, ConfigSnapshot, Resolution};

/// Maps device ids to display names and routing categories.
///
/// The sensor table is an `ArcSwap<ConfigSnapshot>`: readers take a
/// wait-free guard, and `swap_snapshot` replaces the whole table with one
/// pointer store, so a lookup sees either the old table or the new one.
pub struct NameResolver {
    snapshot: ArcSwap<ConfigSnapshot>,
    protocols: Arc<ProtocolStore>,
}

impl NameResolver {
    pub fn new(protocols: Arc<ProtocolStore>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ConfigSnapshot::empty()),
            protocols,
        }
    }

    pub fn resolve(&self, device_id: &str, protocol_id: Option<&str>) -> Resolution {
        let snapshot = self.snapshot.load();
        let catalog = self.protocols.catalog();
        let protocol = protocol_id.and_then(|id| catalog.protocol(id)).cloned();

        if let Some(entry) = snapshot.get(device_id) {
            return Resolution {
                display_name: entry.display_name.clone(),
                machine_name: Some(entry.machine_name.clone()),
                category: Category::Known,
                protocol,
            };
        }

        let category = protocol_id
            .and_then(|id| catalog.category(id))
            .map_or(Category::Uncategorized, |label| {
                Category::Other(label.to_owned())
            });

        Resolution {
            display_name: format!("unknown_{device_id}"),
            machine_name: None,
            category,
            protocol,
        }
    }

    /// Replace the sensor table. Returns the previous snapshot.
    pub fn swap_snapshot(&self, snapshot: ConfigSnapshot) -> Arc<ConfigSnapshot> {
        self.snapshot.swap(Arc::new(snapshot))
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    pub fn protocols(&self) -> &Arc<ProtocolStore> {
        &self.protocols
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{SensorNameEntry, SensorTable};
    use crate::resolve::ProtocolCatalog;

    fn resolver() -> NameResolver {
        let catalog = ProtocolCatalog::parse(
            br#"{"weather_sensor_protocol_ids": [40]}"#,
            br#"{"40": {"name": "Acurite-Tower", "protocol_description": "Acurite 592TXR"}}"#,
        )
        .unwrap();
        NameResolver::new(Arc::new(ProtocolStore::from_catalog(catalog)))
    }

    fn table(entries: &[(&str, &str, &str)]) -> SensorTable {
        entries
            .iter()
            .map(|(id, display, machine)| ((*id).to_owned(), SensorNameEntry::new(*display, *machine)))
            .collect()
    }

    #[test]
    fn known_device_uses_table() {
        let resolver = resolver();
        resolver.swap_snapshot(ConfigSnapshot::new(
            table(&[("12345", "Back Porch", "back_porch")]),
            1,
            Utc::now(),
        ));

        let resolution = resolver.resolve("12345", Some("40"));
        assert_eq!(resolution.display_name, "Back Porch");
        assert_eq!(resolution.machine_name.as_deref(), Some("back_porch"));
        assert_eq!(resolution.category, Category::Known);
        assert_eq!(resolution.protocol.unwrap().name, "Acurite-Tower");
    }

    #[test]
    fn unknown_device_falls_back_to_protocol_category() {
        let resolver = resolver();
        let resolution = resolver.resolve("777", Some("40"));
        assert_eq!(resolution.display_name, "unknown_777");
        assert_eq!(resolution.category, Category::Other("other_weather".into()));

        let resolution = resolver.resolve("778", Some("999"));
        assert_eq!(resolution.category, Category::Uncategorized);
        assert!(resolution.protocol.is_none());

        let resolution = resolver.resolve("779", None);
        assert_eq!(resolution.category, Category::Uncategorized);
    }

    #[test]
    fn swap_replaces_whole_table() {
        let resolver = resolver();
        resolver.swap_snapshot(ConfigSnapshot::new(
            table(&[("12345", "Back Porch", "back_porch")]),
            1,
            Utc::now(),
        ));
        let previous = resolver.swap_snapshot(ConfigSnapshot::new(
            table(&[("99", "Garage", "garage")]),
            2,
            Utc::now(),
        ));

        assert_eq!(previous.version(), 1);
        assert_eq!(resolver.snapshot().version(), 2);
        assert_eq!(resolver.resolve("12345", None).category, Category::Uncategorized);
        assert_eq!(resolver.resolve("99", None).display_name, "Garage");
    }
}
