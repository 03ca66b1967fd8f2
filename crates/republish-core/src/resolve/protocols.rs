// ── Protocol catalog ──
//
// File-backed lookup from an rtl_433 protocol id to a category label and
// a name/description pair. The whole catalog is rebuilt from both files
// and swapped in one pointer store; a failed reload keeps the previous one.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use arc_swap::ArcSwap;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::decode::normalize::canonical_id_text;
use crate::model::ProtocolInfo;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

// ── File formats ─────────────────────────────────────────────────────

/// `{"weather_sensor_protocol_ids": [40, "41"], ...}` kept in file order.
struct CategoryFile(Vec<(String, Vec<ProtocolId>)>);

impl<'de> Deserialize<'de> for CategoryFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = CategoryFile;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping category keys to protocol id lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut groups = Vec::new();
                while let Some(group) = map.next_entry::<String, Vec<ProtocolId>>()? {
                    groups.push(group);
                }
                Ok(CategoryFile(groups))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProtocolId {
    Number(u64),
    Text(String),
}

impl ProtocolId {
    fn canonical(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => canonical_id_text(s),
        }
    }
}

#[derive(Deserialize)]
struct DescriptionEntry {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "description")]
    protocol_description: String,
}

/// `weather_sensor_protocol_ids` -> `other_weather`.
pub fn category_label(key: &str) -> String {
    let stem = key.strip_suffix("_protocol_ids").unwrap_or(key);
    let stem = stem.strip_suffix("_ids").unwrap_or(stem);
    let stem = stem.strip_suffix("_sensor").unwrap_or(stem);
    format!("other_{stem}")
}

fn parse_categories(bytes: &[u8]) -> Result<HashMap<String, String>, serde_json::Error> {
    let CategoryFile(groups) = serde_json::from_slice(bytes)?;
    let mut categories = HashMap::new();
    for (key, ids) in groups {
        let label = category_label(&key);
        for id in ids {
            categories.entry(id.canonical()).or_insert_with(|| label.clone());
        }
    }
    Ok(categories)
}

fn parse_descriptions(bytes: &[u8]) -> Result<HashMap<String, ProtocolInfo>, serde_json::Error> {
    let described: HashMap<String, DescriptionEntry> = serde_json::from_slice(bytes)?;
    Ok(described
        .into_iter()
        .map(|(id, entry)| {
            let info = ProtocolInfo {
                name: entry.name,
                description: entry.protocol_description,
            };
            (canonical_id_text(&id), info)
        })
        .collect())
}

// ── Catalog ──────────────────────────────────────────────────────────

/// Immutable protocol lookup tables.
#[derive(Debug, Clone, Default)]
pub struct ProtocolCatalog {
    categories: HashMap<String, String>,
    protocols: HashMap<String, ProtocolInfo>,
}

impl ProtocolCatalog {
    /// Build from the raw bytes of both files. A protocol id listed under
    /// several keys keeps the first one.
    pub fn parse(categories: &[u8], descriptions: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            categories: parse_categories(categories)?,
            protocols: parse_descriptions(descriptions)?,
        })
    }

    pub fn category(&self, protocol_id: &str) -> Option<&str> {
        self.categories.get(protocol_id).map(String::as_str)
    }

    pub fn protocol(&self, protocol_id: &str) -> Option<&ProtocolInfo> {
        self.protocols.get(protocol_id)
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn protocol_count(&self) -> usize {
        self.protocols.len()
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Modification time and length of each file, `None` when missing.
type Fingerprint = [Option<(SystemTime, u64)>; 2];

/// Reloadable holder for the current [`ProtocolCatalog`].
pub struct ProtocolStore {
    files: [PathBuf; 2],
    catalog: ArcSwap<ProtocolCatalog>,
    fingerprint: Mutex<Option<Fingerprint>>,
    /// Per file: has it been read successfully at least once.
    seen: [AtomicBool; 2],
}

impl ProtocolStore {
    pub fn new(categories_file: impl Into<PathBuf>, descriptions_file: impl Into<PathBuf>) -> Self {
        Self {
            files: [categories_file.into(), descriptions_file.into()],
            catalog: ArcSwap::from_pointee(ProtocolCatalog::default()),
            fingerprint: Mutex::new(None),
            seen: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// Fixed catalog with no backing files.
    pub fn from_catalog(catalog: ProtocolCatalog) -> Self {
        let store = Self::new(PathBuf::new(), PathBuf::new());
        store.catalog.store(Arc::new(catalog));
        store
    }

    pub fn catalog(&self) -> Arc<ProtocolCatalog> {
        self.catalog.load_full()
    }

    /// Reload both files if either changed since the last attempt.
    ///
    /// Returns `true` when a new catalog was swapped in. On failure the
    /// previous catalog stays in place and the failing fingerprint is
    /// remembered so the same broken file is not re-parsed every tick.
    pub async fn reload_if_changed(&self) -> bool {
        let current = [stamp(&self.files[0]).await, stamp(&self.files[1]).await];
        {
            let mut last = self.fingerprint.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == Some(current) {
                return false;
            }
            *last = Some(current);
        }

        match self.load().await {
            Ok(catalog) => {
                info!(
                    categories = catalog.category_count(),
                    protocols = catalog.protocol_count(),
                    "protocol catalog loaded"
                );
                self.catalog.store(Arc::new(catalog));
                true
            }
            Err(e) => {
                warn!(error = %e, "protocol catalog reload failed, keeping previous catalog");
                false
            }
        }
    }

    async fn load(&self) -> Result<ProtocolCatalog, CatalogError> {
        let categories = self.read(0).await?;
        let descriptions = self.read(1).await?;

        let catalog = ProtocolCatalog {
            categories: parse_categories(categories.as_deref().unwrap_or(b"{}"))
                .map_err(|source| parse_error(&self.files[0], source))?,
            protocols: parse_descriptions(descriptions.as_deref().unwrap_or(b"{}"))
                .map_err(|source| parse_error(&self.files[1], source))?,
        };

        for (seen, bytes) in self.seen.iter().zip([&categories, &descriptions]) {
            if bytes.is_some() {
                seen.store(true, Ordering::Relaxed);
            }
        }
        Ok(catalog)
    }

    /// `Ok(None)` for a file that is missing and has never been loaded.
    async fn read(&self, index: usize) -> Result<Option<Vec<u8>>, CatalogError> {
        let path = &self.files[index];
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    && !self.seen[index].load(Ordering::Relaxed) =>
            {
                debug!(path = %path.display(), "protocol file not present, using empty table");
                Ok(None)
            }
            Err(source) => Err(CatalogError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

fn parse_error(path: &Path, source: serde_json::Error) -> CatalogError {
    CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    }
}

async fn stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATEGORIES: &str = r#"{
        "weather_sensor_protocol_ids": [40, "41", "19"],
        "pressure_sensor_protocol_ids": ["19", 203]
    }"#;

    const DESCRIPTIONS: &str = r#"{
        "40": {"name": "Acurite-Tower", "protocol_description": "Acurite 592TXR temp/humidity"},
        "203": {"name": "TPMS", "description": "tire pressure"}
    }"#;

    #[test]
    fn labels_from_keys() {
        assert_eq!(category_label("weather_sensor_protocol_ids"), "other_weather");
        assert_eq!(category_label("pressure_sensor_protocol_ids"), "other_pressure");
        assert_eq!(category_label("security"), "other_security");
    }

    #[test]
    fn first_key_wins_in_file_order() {
        let catalog = ProtocolCatalog::parse(CATEGORIES.as_bytes(), DESCRIPTIONS.as_bytes()).unwrap();
        assert_eq!(catalog.category("40"), Some("other_weather"));
        assert_eq!(catalog.category("19"), Some("other_weather"));
        assert_eq!(catalog.category("203"), Some("other_pressure"));
        assert_eq!(catalog.category("999"), None);
        assert_eq!(catalog.protocol("203").unwrap().description, "tire pressure");
        assert_eq!(catalog.protocol("40").unwrap().name, "Acurite-Tower");
    }

    #[tokio::test]
    async fn reload_tracks_changes_and_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let categories = dir.path().join("protocol_categories.json");
        let descriptions = dir.path().join("rtl_433_protocols.json");
        std::fs::write(&categories, CATEGORIES).unwrap();
        std::fs::write(&descriptions, DESCRIPTIONS).unwrap();

        let store = ProtocolStore::new(&categories, &descriptions);
        assert!(store.reload_if_changed().await);
        assert!(!store.reload_if_changed().await, "unchanged files must not reload");
        assert_eq!(store.catalog().category("40"), Some("other_weather"));

        // Broken file: previous catalog retained.
        std::fs::write(&categories, "{ not json").unwrap();
        assert!(!store.reload_if_changed().await);
        assert_eq!(store.catalog().category("40"), Some("other_weather"));

        // Fixed file with different content: swapped.
        std::fs::write(&categories, r#"{"security_protocol_ids": [40]}"#).unwrap();
        assert!(store.reload_if_changed().await);
        assert_eq!(store.catalog().category("40"), Some("other_security"));
        assert_eq!(store.catalog().category("203"), None);

        // Deleted after a successful load: failure, previous catalog kept.
        std::fs::remove_file(&categories).unwrap();
        assert!(!store.reload_if_changed().await);
        assert_eq!(store.catalog().category("40"), Some("other_security"));
    }

    #[tokio::test]
    async fn missing_files_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProtocolStore::new(dir.path().join("a.json"), dir.path().join("b.json"));
        assert!(store.reload_if_changed().await);
        assert_eq!(store.catalog().category_count(), 0);
    }
}
