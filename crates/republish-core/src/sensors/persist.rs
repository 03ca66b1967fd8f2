// ── On-disk sensor table ──
//
// One JSON file plus timestamped backups next to it:
//   local_sensors.json
//   local_sensors.json.backup.20261018_120000.123
//
// Only the config controller touches these files.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tracing::debug;

use super::validate::{encode_sensor_table, parse_sensor_table};
use crate::error::CoreError;
use crate::model::SensorTable;

const BACKUP_MARKER: &str = ".backup.";
const BACKUP_FORMAT: &str = "%Y%m%d_%H%M%S%.3f";
/// Backups written without milliseconds are still recognized.
const LEGACY_BACKUP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub struct SensorFile {
    path: PathBuf,
    max_backups: usize,
    retention: Duration,
}

impl SensorFile {
    pub fn new(path: impl Into<PathBuf>, max_backups: usize, retention: Duration) -> Self {
        Self {
            path: path.into(),
            max_backups,
            retention,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the table. `Ok(None)` if the file does not exist.
    pub async fn load(&self) -> Result<Option<SensorTable>, CoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CoreError::SensorFileRead {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        parse_sensor_table(&bytes)
            .map(Some)
            .map_err(|source| CoreError::SensorFileInvalid {
                path: self.path.clone(),
                source,
            })
    }

    /// Copy the current file to a backup named after `now`.
    /// `Ok(None)` if there is no file to back up.
    ///
    /// An existing backup is never overwritten: when the name for `now` is
    /// taken the stamp moves forward a millisecond at a time.
    pub async fn backup(&self, now: DateTime<Utc>) -> io::Result<Option<PathBuf>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let mut stamp = now;
        let mut target = self.backup_path(stamp);
        while tokio::fs::try_exists(&target).await? {
            stamp += TimeDelta::milliseconds(1);
            target = self.backup_path(stamp);
        }
        tokio::fs::copy(&self.path, &target).await?;
        Ok(Some(target))
    }

    /// Replace the file atomically: write `<file>.tmp`, then rename over.
    pub async fn write(&self, table: &SensorTable) -> io::Result<()> {
        let bytes = encode_sensor_table(table).map_err(io::Error::other)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }

    /// Delete backups beyond `max_backups` (newest kept) and any older than
    /// the retention age. Returns the removed paths.
    pub async fn prune_backups(&self, now: DateTime<Utc>) -> io::Result<Vec<PathBuf>> {
        let mut backups = self.list_backups().await?;
        backups.sort_by(|a, b| b.0.cmp(&a.0));

        let retention = TimeDelta::from_std(self.retention).unwrap_or(TimeDelta::MAX);
        let mut removed = Vec::new();
        for (index, (taken_at, path)) in backups.into_iter().enumerate() {
            let too_many = index >= self.max_backups;
            let too_old = now.signed_duration_since(taken_at) > retention;
            if too_many || too_old {
                tokio::fs::remove_file(&path).await?;
                debug!(path = %path.display(), too_many, too_old, "removed sensor table backup");
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Backups of this file with the time encoded in their names.
    pub async fn list_backups(&self) -> io::Result<Vec<(DateTime<Utc>, PathBuf)>> {
        let Some(prefix) = self.backup_prefix() else {
            return Ok(Vec::new());
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut backups = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(backups),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stamp) = name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
                continue;
            };
            if let Some(taken_at) = parse_backup_stamp(stamp) {
                backups.push((taken_at, entry.path()));
            }
        }
        Ok(backups)
    }

    fn backup_prefix(&self) -> Option<String> {
        let file_name = self.path.file_name()?.to_str()?;
        Some(format!("{file_name}{BACKUP_MARKER}"))
    }

    fn backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(BACKUP_MARKER);
        name.push(now.format(BACKUP_FORMAT).to_string());
        PathBuf::from(name)
    }
}

fn parse_backup_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stamp, BACKUP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, LEGACY_BACKUP_FORMAT))
        .ok()
        .map(|naive| naive.and_utc())
}
