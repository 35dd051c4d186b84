// # File Device Store
//
// File-based implementation of DeviceStore with crash recovery.
//
// ## Layout
//
// A store is a directory with two files:
//
// - `devices.json`: versioned document, one row per device keyed by identifier
// - `events.jsonl`: append-only log, one event row per line
//
// ```json
// {
//   "version": "1.0",
//   "devices": {
//     "192.168.1.20": {
//       "ip": "192.168.1.20",
//       "current_count": 12,
//       "total_count": 40,
//       "last_seen": "14:02:11 18/10/2026",
//       "registered_at": "09:00:00 01/09/2026"
//     }
//   }
// }
// ```
//
// ## Crash Recovery
//
// - Atomic writes: the device document is written to a temp file, then renamed
// - Automatic backup: the previous document is kept as `devices.backup`
// - Recovery: a corrupted document is restored from the backup on open
//
// ## Out-of-band edits
//
// Operators reset counters by editing `devices.json` directly. Every upsert
// re-reads the document before patching its one row, so such edits survive
// until the next reload pulls them into memory.
//
// ## Write cost
//
// Each upsert re-reads, re-serializes and backs up the whole document, so a
// single contact costs time proportional to the number of known devices.
// Writes sit on the reply path; large fleets will see that in reply latency.
// The event log is append-only and is only scanned line by line on open.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::{DeviceRow, EventRow};
use crate::Error;
use crate::traits::{DeviceRecord, DeviceScan, DeviceStore, EventRecord};

/// Device document format version
const DEVICES_FILE_VERSION: &str = "1.0";

const DEVICES_FILE: &str = "devices.json";
const EVENTS_FILE: &str = "events.jsonl";

/// File-based device store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use pluto_core::state::FileDeviceStore;
/// use pluto_core::traits::{DeviceRecord, DeviceStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileDeviceStore::open("/var/lib/pluto").await?;
///
///     // Atomically written to disk
///     store.upsert_device(&DeviceRecord::new("10.0.0.1", chrono::Utc::now())).await?;
///
///     let scan = store.load_all_devices().await?;
///     assert_eq!(scan.records.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileDeviceStore {
    devices_path: PathBuf,
    events_path: PathBuf,
    /// Serializes read-patch-write cycles on the device document
    devices_lock: Mutex<()>,
    /// Next event id; the lock also serializes appends
    next_event_id: Mutex<u64>,
}

/// Serializable device document
///
/// Rows stay as raw JSON values so one bad row cannot hide the others.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct DevicesFileFormat {
    version: String,
    devices: BTreeMap<String, serde_json::Value>,
}

impl FileDeviceStore {
    /// Open (or create) a file store rooted at `dir`
    ///
    /// This will:
    /// 1. Create the directory if needed
    /// 2. Check the device document, recovering from backup if corrupted
    /// 3. Resume the event id sequence from the existing log
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.exists() {
            fs::create_dir_all(&dir).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create store directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let devices_path = dir.join(DEVICES_FILE);
        let events_path = dir.join(EVENTS_FILE);

        let document = Self::load_document_with_recovery(&devices_path).await?;
        let next_event_id = Self::resume_event_id(&events_path).await?;

        tracing::info!(
            "Device store opened at {} ({} devices, next event id {})",
            dir.display(),
            document.devices.len(),
            next_event_id
        );

        Ok(Self {
            devices_path,
            events_path,
            devices_lock: Mutex::new(()),
            next_event_id: Mutex::new(next_event_id),
        })
    }

    /// Path of the device document
    pub fn devices_path(&self) -> &Path {
        &self.devices_path
    }

    /// Path of the event log
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Load the device document with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load the main document
    /// 2. If it does not parse, try the backup and restore it over the main file
    /// 3. If the backup is missing or also corrupted, start empty
    async fn load_document_with_recovery(path: &Path) -> Result<DevicesFileFormat, Error> {
        match Self::load_document(path).await {
            Ok(document) => Ok(document),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Device document appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty device table.");
                    return Ok(DevicesFileFormat::empty());
                }

                match Self::load_document(&backup_path).await {
                    Ok(document) => {
                        tracing::info!(
                            "Recovered device table from backup: {} devices",
                            document.devices.len()
                        );

                        if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore device document from backup: {}",
                                restore_err
                            );
                        }

                        Ok(document)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty device table.",
                            backup_err
                        );
                        Ok(DevicesFileFormat::empty())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load the device document
    ///
    /// A missing file is an empty table. Parse failures surface as
    /// `Error::Json` so callers can tell corruption from I/O failure.
    async fn load_document(path: &Path) -> Result<DevicesFileFormat, Error> {
        if !path.exists() {
            tracing::debug!("Device document does not exist: {}", path.display());
            return Ok(DevicesFileFormat::empty());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!(
                "Failed to read device document {}: {}",
                path.display(),
                e
            ))
        })?;

        let document: DevicesFileFormat = serde_json::from_str(&content)?;

        if document.version != DEVICES_FILE_VERSION {
            tracing::warn!(
                "Device document version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                DEVICES_FILE_VERSION,
                document.version
            );
        }

        Ok(document)
    }

    /// Read the device document for a write; corruption is an error here
    async fn read_for_write(&self) -> Result<DevicesFileFormat, Error> {
        Self::load_document(&self.devices_path).await.map_err(|e| {
            Error::store(format!(
                "Cannot update {}: {}",
                self.devices_path.display(),
                e
            ))
        })
    }

    /// Write the device document atomically
    async fn write_document(&self, document: &DevicesFileFormat) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| Error::store(format!("Failed to serialize devices: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the previous document as backup
        if self.devices_path.exists() {
            let backup_path = Self::backup_path(&self.devices_path);
            if let Err(e) = fs::copy(&self.devices_path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.devices_path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.devices_path.display(),
                e
            ))
        })?;

        tracing::trace!("Device document written: {}", self.devices_path.display());
        Ok(())
    }

    /// Restore the device document from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored device document from backup");
        Ok(())
    }

    /// Find the id the next appended event should get
    async fn resume_event_id(path: &Path) -> Result<u64, Error> {
        if !path.exists() {
            return Ok(1);
        }

        let read_error =
            |e: std::io::Error| Error::store(format!("Failed to read event log {}: {}", path.display(), e));

        let file = fs::File::open(path).await.map_err(read_error)?;
        let mut lines = BufReader::new(file).lines();

        let mut last_id = 0u64;
        while let Some(line) = lines.next_line().await.map_err(read_error)? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRow>(&line) {
                Ok(row) => last_id = last_id.max(row.id),
                // Keep ids unique even past a damaged line
                Err(_) => last_id += 1,
            }
        }

        Ok(last_id + 1)
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.devices_path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

impl DevicesFileFormat {
    fn empty() -> Self {
        Self {
            version: DEVICES_FILE_VERSION.to_string(),
            devices: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl DeviceStore for FileDeviceStore {
    async fn upsert_device(&self, device: &DeviceRecord) -> Result<(), Error> {
        let _guard = self.devices_lock.lock().await;

        let mut document = self.read_for_write().await?;
        document.version = DEVICES_FILE_VERSION.to_string();
        document.devices.insert(
            device.id.clone(),
            serde_json::to_value(DeviceRow::from_record(device))?,
        );

        self.write_document(&document).await
    }

    async fn load_all_devices(&self) -> Result<DeviceScan, Error> {
        let document = {
            let _guard = self.devices_lock.lock().await;
            Self::load_document(&self.devices_path).await?
        };

        let mut scan = DeviceScan::default();
        for (key, value) in document.devices {
            match serde_json::from_value::<DeviceRow>(value) {
                Ok(row) => {
                    if row.ip != key {
                        tracing::warn!("Device row keyed {} names device {}", key, row.ip);
                    }
                    scan.records.push(row.into_record());
                }
                Err(e) => {
                    tracing::error!("Error scanning device row {}: {}", key, e);
                    scan.failed += 1;
                }
            }
        }

        Ok(scan)
    }

    async fn append_event(&self, event: &EventRecord) -> Result<u64, Error> {
        let mut next_id = self.next_event_id.lock().await;
        let id = *next_id;

        let mut line = serde_json::to_string(&EventRow::from_event(id, event))?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .map_err(|e| {
                Error::store(format!(
                    "Failed to open event log {}: {}",
                    self.events_path.display(),
                    e
                ))
            })?;

        file.write_all(line.as_bytes()).await.map_err(|e| {
            Error::store(format!(
                "Failed to save log for device {}: {}",
                event.device_id, e
            ))
        })?;
        file.flush().await?;

        *next_id += 1;
        Ok(id)
    }

    async fn flush(&self) -> Result<(), Error> {
        let _events = self.next_event_id.lock().await;
        if self.events_path.exists() {
            let file = fs::File::open(&self.events_path).await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
