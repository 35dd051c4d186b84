// # Device Store Implementations
//
// This module provides implementations of the DeviceStore trait for
// different persistence strategies, plus the row layout they share.
//
// Both stores keep rows in their persisted shape, timestamps included, so
// a memory-backed test sees exactly the precision and offset handling that a
// file-backed deployment does.

pub mod file;
pub mod memory;

pub use file::FileDeviceStore;
pub use memory::MemoryDeviceStore;

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::time::{format_timestamp, parse_timestamp_or_now};
use crate::traits::{DeviceRecord, DeviceStore, EventRecord};

/// Persisted device row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRow {
    pub ip: String,
    pub current_count: i64,
    pub total_count: i64,
    pub last_seen: String,
    pub registered_at: String,
}

impl DeviceRow {
    pub fn from_record(record: &DeviceRecord) -> Self {
        Self {
            ip: record.id.clone(),
            current_count: record.current_count,
            total_count: record.total_count,
            last_seen: format_timestamp(record.last_seen),
            registered_at: format_timestamp(record.registered_at),
        }
    }

    /// Decode into a record; `registered_at` never ends up after `last_seen`
    pub fn into_record(self) -> DeviceRecord {
        let last_seen = parse_timestamp_or_now(&self.last_seen);
        let registered_at = parse_timestamp_or_now(&self.registered_at).min(last_seen);

        DeviceRecord {
            last_seen,
            registered_at,
            id: self.ip,
            current_count: self.current_count,
            total_count: self.total_count,
        }
    }
}

/// Persisted event log row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: u64,
    pub device_ip: String,
    pub action: String,
    pub count_value: i64,
    pub timestamp: String,
    pub response: i64,
}

impl EventRow {
    pub fn from_event(id: u64, event: &EventRecord) -> Self {
        Self {
            id,
            device_ip: event.device_id.clone(),
            action: event.action.to_string(),
            count_value: event.count_value,
            timestamp: format_timestamp(event.timestamp),
            response: event.response.code(),
        }
    }
}

/// Open the store described by the configuration
///
/// Failure here is a startup error: the service does not run without a store.
pub async fn open_store(config: &StoreConfig) -> crate::Result<Box<dyn DeviceStore>> {
    match config {
        StoreConfig::File { dir } => Ok(Box::new(FileDeviceStore::open(dir).await?)),
        StoreConfig::Memory => Ok(Box::new(MemoryDeviceStore::new())),
    }
}
