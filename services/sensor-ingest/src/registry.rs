//! Static device catalog, read from a JSON file.
//!
//! Lookups go through an in-memory index that is populated once and then only
//! replaced by an explicit [`DeviceRegistry::reload`]. Listing always reads the
//! file so callers see what is on disk right now.

use std::{
    collections::HashMap,
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use serde_json::Value;
use tokio::{fs, sync::RwLock};

use crate::point::WO_IO_SENSOR;

/// Device families the ingestion pipeline knows how to store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum DeviceType {
    /// SwitchBot indoor/outdoor thermo-hygrometer.
    WoIoSensor,
    Unsupported(String),
}

impl From<String> for DeviceType {
    fn from(value: String) -> Self {
        if value == WO_IO_SENSOR {
            DeviceType::WoIoSensor
        } else {
            DeviceType::Unsupported(value)
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::WoIoSensor => f.write_str(WO_IO_SENSOR),
            DeviceType::Unsupported(other) => f.write_str(other),
        }
    }
}

/// The part of a `device_list.json` entry used for lookups. Entries without
/// these keys (IR remotes carry `remoteType` instead) are left out of the index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_name: String,
    pub device_id: String,
    pub device_type: DeviceType,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Device list file not found")]
    NotFound { path: PathBuf },
    #[error("Invalid JSON in device list file")]
    Malformed(#[source] serde_json::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type DeviceIndex = HashMap<String, DeviceRecord>;

pub struct DeviceRegistry {
    path: PathBuf,
    cache: RwLock<Option<Arc<DeviceIndex>>>,
}

impl DeviceRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used in "not found" messages, e.g. `device_list.json`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Return the lookup index, reading the file on first use only.
    ///
    /// A missing or malformed file is logged and cached as an empty index.
    pub async fn load(&self) -> Arc<DeviceIndex> {
        if let Some(index) = self.cache.read().await.as_ref() {
            return Arc::clone(index);
        }

        let index = match read_catalog(&self.path).await {
            Ok(records) => index_records(records),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to load device list; registry is empty");
                DeviceIndex::new()
            }
        };

        // Two first requests may both read the file; whichever lands first is kept.
        let mut cache = self.cache.write().await;
        let index = cache.get_or_insert_with(|| {
            tracing::info!(path = %self.path.display(), devices = index.len(), "device registry loaded");
            Arc::new(index)
        });
        Arc::clone(index)
    }

    pub async fn get(&self, device_name: &str) -> Option<DeviceRecord> {
        self.load().await.get(device_name).cloned()
    }

    /// Number of devices in the cached index.
    pub async fn len(&self) -> usize {
        self.load().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Read the whole catalog from disk, entries untouched and in file order.
    pub async fn list_all(&self) -> Result<Vec<Value>, RegistryError> {
        read_catalog(&self.path).await
    }

    /// Re-read the file and replace the lookup index. The old index stays in
    /// place when the read fails.
    pub async fn reload(&self) -> Result<usize, RegistryError> {
        let index = index_records(read_catalog(&self.path).await?);
        let count = index.len();
        *self.cache.write().await = Some(Arc::new(index));
        tracing::info!(path = %self.path.display(), devices = count, "device registry reloaded");
        Ok(count)
    }
}

async fn read_catalog(path: &Path) -> Result<Vec<Value>, RegistryError> {
    let bytes = fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => RegistryError::NotFound {
            path: path.to_path_buf(),
        },
        _ => RegistryError::Io(e),
    })?;
    serde_json::from_slice(&bytes).map_err(RegistryError::Malformed)
}

fn index_records(entries: Vec<Value>) -> DeviceIndex {
    let mut index = DeviceIndex::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        let record = match serde_json::from_value::<DeviceRecord>(entry) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(position, error = %e, "skipping device list entry");
                continue;
            }
        };
        if let Some(previous) = index.insert(record.device_name.clone(), record) {
            tracing::warn!(device_name = %previous.device_name, "duplicate deviceName in device list; last entry wins");
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn catalog_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const CATALOG: &str = r#"[
        {"deviceName": "11_thermohygrometer", "deviceId": "D0C84D1E2F3A", "deviceType": "WoIOSensor", "hubDeviceId": "000000000000"},
        {"deviceName": "hub", "deviceId": "AABBCCDDEEFF", "deviceType": "Hub 2"}
    ]"#;

    #[test]
    fn device_type_keeps_unknown_names() {
        assert_eq!(DeviceType::from("WoIOSensor".to_string()), DeviceType::WoIoSensor);
        let other = DeviceType::from("Hub 2".to_string());
        assert_eq!(other, DeviceType::Unsupported("Hub 2".into()));
        assert_eq!(other.to_string(), "Hub 2");
    }

    #[tokio::test]
    async fn get_resolves_known_devices() {
        let file = catalog_file(CATALOG);
        let registry = DeviceRegistry::new(file.path());

        let device = registry.get("11_thermohygrometer").await.unwrap();
        assert_eq!(device.device_id, "D0C84D1E2F3A");
        assert_eq!(device.device_type, DeviceType::WoIoSensor);
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn load_caches_first_read() {
        let file = catalog_file(CATALOG);
        let registry = DeviceRegistry::new(file.path());
        assert_eq!(registry.len().await, 2);

        std::fs::write(file.path(), "[]").unwrap();
        assert_eq!(registry.len().await, 2);
        assert!(registry.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_file_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DeviceRegistry::new(dir.path().join("device_list.json"));
        assert!(registry.is_empty().await);
        assert!(registry.get("anything").await.is_none());
        assert_eq!(registry.file_name(), "device_list.json");
    }

    #[tokio::test]
    async fn malformed_file_yields_empty_registry() {
        let file = catalog_file("{not json");
        let registry = DeviceRegistry::new(file.path());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn list_all_reports_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_list.json");
        let registry = DeviceRegistry::new(&path);
        assert!(matches!(
            registry.list_all().await,
            Err(RegistryError::NotFound { .. })
        ));

        std::fs::write(&path, "[{").unwrap();
        let err = registry.list_all().await.unwrap_err();
        assert!(matches!(err, RegistryError::Malformed(_)));
        assert_eq!(err.to_string(), "Invalid JSON in device list file");
    }

    #[tokio::test]
    async fn list_all_preserves_file_order() {
        let file = catalog_file(CATALOG);
        let registry = DeviceRegistry::new(file.path());
        let names: Vec<_> = registry
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(|d| d["deviceName"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["11_thermohygrometer", "hub"]);
    }

    #[tokio::test]
    async fn entries_without_lookup_keys_are_skipped() {
        let file = catalog_file(
            r#"[
                {"deviceName": "11_thermohygrometer", "deviceId": "D0C84D1E2F3A", "deviceType": "WoIOSensor"},
                {"deviceName": "tv", "deviceId": "02-202301011200-1", "remoteType": "TV"},
                "not an object"
            ]"#,
        );
        let registry = DeviceRegistry::new(file.path());
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("11_thermohygrometer").await.is_some());
        assert!(registry.get("tv").await.is_none());

        let listed = registry.list_all().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[1]["remoteType"], "TV");
    }

    #[tokio::test]
    async fn reload_replaces_index_and_keeps_it_on_failure() {
        let file = catalog_file("[]");
        let registry = DeviceRegistry::new(file.path());
        assert!(registry.is_empty().await);

        std::fs::write(file.path(), CATALOG).unwrap();
        assert_eq!(registry.reload().await.unwrap(), 2);
        assert!(registry.get("hub").await.is_some());

        std::fs::write(file.path(), "garbage").unwrap();
        assert!(registry.reload().await.is_err());
        assert_eq!(registry.len().await, 2);
    }
}
