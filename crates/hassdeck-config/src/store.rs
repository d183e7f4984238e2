// ── Persisted dashboard state ──
//
// A directory of `<key>.json` blobs. Reads never fail: a missing or
// malformed blob yields the caller's fallback and a warning. Writes go
// through a temp file and a rename so a crash never leaves half a blob.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use hassdeck_core::{ActivityEntry, Device, DeviceMapping, ensure_remote_device};

use crate::ConfigError;
use crate::defaults::default_devices;

pub const DEVICES_KEY: &str = "devices";
pub const MAPPINGS_KEY: &str = "device_mappings";
pub const LOGS_KEY: &str = "logs";

#[derive(Debug, Clone)]
pub struct KvStore {
    dir: PathBuf,
}

impl KvStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read and decode a blob. `None` when it is absent or unreadable.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "no persisted value");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted value");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "malformed persisted value, using defaults");
                None
            }
        }
    }

    pub fn load_or<T: DeserializeOwned>(&self, key: &str, fallback: impl FnOnce() -> T) -> T {
        self.load(key).unwrap_or_else(fallback)
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
            key: key.into(),
            source,
        })?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(key, path = %path.display(), "persisted");
        Ok(())
    }

    /// Delete a blob. Missing blobs are not an error.
    pub fn remove(&self, key: &str) -> Result<(), ConfigError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ── Typed accessors ──────────────────────────────────────────────

    /// The persisted device list, or the defaults. Always has a remote.
    pub fn load_devices(&self) -> Vec<Device> {
        let mut devices = self.load_or(DEVICES_KEY, default_devices);
        if ensure_remote_device(&mut devices) {
            debug!("appended missing remote device");
        }
        devices
    }

    pub fn load_mapping(&self) -> DeviceMapping {
        self.load_or(MAPPINGS_KEY, DeviceMapping::default)
    }

    /// Persisted activity, newest first.
    pub fn load_activity(&self) -> Vec<ActivityEntry> {
        self.load_or(LOGS_KEY, Vec::new)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hassdeck_core::{DeviceId, EntityId};
    use pretty_assertions::assert_eq;

    use super::*;

    fn store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("state")).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_devices_fall_back_to_defaults() {
        let (_dir, store) = store();
        let devices = store.load_devices();
        assert_eq!(devices, default_devices());
        assert!(devices.iter().any(|d| d.kind == "remote"));
    }

    #[test]
    fn malformed_blob_falls_back() {
        let (_dir, store) = store();
        fs::write(store.path_for(MAPPINGS_KEY), "{ not json").unwrap();
        assert!(store.load_mapping().is_empty());

        fs::write(store.path_for(DEVICES_KEY), "[1, 2").unwrap();
        assert_eq!(store.load_devices(), default_devices());
    }

    #[test]
    fn loaded_list_without_remote_gets_one() {
        let (_dir, store) = store();
        let devices = vec![Device::new(DeviceId(4), "light")];
        store.save(DEVICES_KEY, &devices).unwrap();

        let loaded = store.load_devices();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].kind, "remote");
        assert_eq!(loaded[1].id, DeviceId(5));
    }

    #[test]
    fn mapping_persists() {
        let (_dir, store) = store();
        let mut mapping = DeviceMapping::new();
        mapping.insert(DeviceId(3), EntityId::from("cover.living_room"));
        store.save(MAPPINGS_KEY, &mapping).unwrap();

        assert_eq!(store.load_mapping(), mapping);
        assert!(!store.path_for(MAPPINGS_KEY).with_extension("json.tmp").exists());
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, store) = store();
        store.save(LOGS_KEY, &Vec::<ActivityEntry>::new()).unwrap();
        store.remove(LOGS_KEY).unwrap();
        store.remove(LOGS_KEY).unwrap();
        assert!(store.load_activity().is_empty());
    }
}
