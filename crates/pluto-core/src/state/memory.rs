// # Memory Device Store
//
// In-memory implementation of DeviceStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// tests and for throwaway runs where counters need not survive.
//
// ## Crash Behavior
//
// - All counters and events are lost on restart/crash
// - Every device re-registers with zeroed counters on its next contact

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DeviceRow, EventRow};
use crate::Error;
use crate::traits::{DeviceRecord, DeviceScan, DeviceStore, EventRecord};

/// In-memory device store
///
/// Cloning shares the same underlying tables, so a test can keep a handle
/// and inspect or edit rows while the engine owns another.
///
/// # Example
///
/// ```rust,no_run
/// use pluto_core::state::MemoryDeviceStore;
/// use pluto_core::traits::{DeviceRecord, DeviceStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryDeviceStore::new();
///     store.upsert_device(&DeviceRecord::new("10.0.0.1", chrono::Utc::now())).await?;
///
///     let scan = store.load_all_devices().await?;
///     assert_eq!(scan.records.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDeviceStore {
    inner: Arc<RwLock<MemoryTables>>,
}

#[derive(Debug, Default)]
struct MemoryTables {
    devices: HashMap<String, DeviceRow>,
    events: Vec<EventRow>,
}

impl MemoryDeviceStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of device rows
    pub async fn len(&self) -> usize {
        self.inner.read().await.devices.len()
    }

    /// Check if the device table is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.devices.is_empty()
    }

    /// Read a raw device row
    pub async fn row(&self, id: &str) -> Option<DeviceRow> {
        self.inner.read().await.devices.get(id).cloned()
    }

    /// Write a raw device row, bypassing the engine
    ///
    /// This is how out-of-band edits (maintenance resets) reach the store.
    pub async fn put_row(&self, row: DeviceRow) {
        self.inner.write().await.devices.insert(row.ip.clone(), row);
    }

    /// Snapshot of the event log, oldest first
    pub async fn events(&self) -> Vec<EventRow> {
        self.inner.read().await.events.clone()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn upsert_device(&self, device: &DeviceRecord) -> Result<(), Error> {
        self.put_row(DeviceRow::from_record(device)).await;
        Ok(())
    }

    async fn load_all_devices(&self) -> Result<DeviceScan, Error> {
        let guard = self.inner.read().await;
        let records = guard
            .devices
            .values()
            .cloned()
            .map(DeviceRow::into_record)
            .collect();
        Ok(DeviceScan { records, failed: 0 })
    }

    async fn append_event(&self, event: &EventRecord) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;
        let id = guard.events.len() as u64 + 1;
        guard.events.push(EventRow::from_event(id, event));
        Ok(id)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::ResponseCode;
    use crate::traits::DeviceAction;
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_store_upsert_replaces_row() {
        let store = MemoryDeviceStore::new();
        assert!(store.is_empty().await);

        let mut device = DeviceRecord::new("192.168.1.1", Utc::now());
        store.upsert_device(&device).await.unwrap();

        device.current_count = 5;
        device.total_count = 10;
        store.upsert_device(&device).await.unwrap();

        assert_eq!(store.len().await, 1);
        let row = store.row("192.168.1.1").await.unwrap();
        assert_eq!(row.current_count, 5);
        assert_eq!(row.total_count, 10);
    }

    #[tokio::test]
    async fn test_memory_store_event_ids_increase() {
        let store = MemoryDeviceStore::new();
        let event = EventRecord::new("a", DeviceAction::Startup, 0, ResponseCode::Normal);

        assert_eq!(store.append_event(&event).await.unwrap(), 1);
        assert_eq!(store.append_event(&event).await.unwrap(), 2);

        let events = store.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].action, "startup");
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_tables() {
        let store = MemoryDeviceStore::new();
        let handle = store.clone();

        store
            .upsert_device(&DeviceRecord::new("a", Utc::now()))
            .await
            .unwrap();

        let scan = handle.load_all_devices().await.unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.failed, 0);
    }
}
