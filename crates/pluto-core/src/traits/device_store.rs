// # Device Store Trait
//
// Defines the interface for durable device state.
//
// ## Purpose
//
// The device store keeps two tables:
// - Devices, keyed by identifier, holding both counters and timestamps
// - An append-only event log of every handled contact and its response
//
// The in-memory registry is authoritative while the process runs. The store
// is what survives a restart, and what an operator edits out-of-band (for
// example resetting a device's current count after maintenance) before
// triggering a reload.
//
// ## Implementations
//
// - Memory: for tests and throwaway runs
// - File: JSON document for devices, JSON-lines log for events

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::threshold::ResponseCode;

/// State of a single device
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceRecord {
    /// Stable identifier (the reporting client's IP address)
    pub id: String,
    /// Triggers since the last maintenance
    pub current_count: i64,
    /// Triggers since the device was first seen; never reset
    pub total_count: i64,
    /// Most recent contact
    pub last_seen: DateTime<Utc>,
    /// First contact; immutable after creation
    pub registered_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// Create a device on first contact, with zeroed counters
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            current_count: 0,
            total_count: 0,
            last_seen: now,
            registered_at: now,
        }
    }
}

/// What a device did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Startup,
    Increment(i64),
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAction::Startup => write!(f, "startup"),
            DeviceAction::Increment(amount) => write!(f, "increment+{}", amount),
        }
    }
}

/// One entry of the append-only event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub device_id: String,
    pub action: DeviceAction,
    /// Current count after the action was applied
    pub count_value: i64,
    pub response: ResponseCode,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(
        device_id: impl Into<String>,
        action: DeviceAction,
        count_value: i64,
        response: ResponseCode,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            action,
            count_value,
            response,
            timestamp: Utc::now(),
        }
    }
}

/// Result of a full device table scan
#[derive(Debug, Clone, Default)]
pub struct DeviceScan {
    /// Rows that decoded successfully
    pub records: Vec<DeviceRecord>,
    /// Rows that were present but could not be decoded
    pub failed: usize,
}

/// Trait for device store implementations
///
/// Implementations must be thread-safe: the datagram path writes through to
/// the store while the reload endpoint may be scanning it.
///
/// No method retries internally. A failed write is reported to the caller,
/// which logs it and moves on; the next successful write for the same device
/// carries the full record again.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Insert or fully replace a device row
    async fn upsert_device(&self, device: &DeviceRecord) -> Result<(), crate::Error>;

    /// Scan every device row
    ///
    /// # Returns
    ///
    /// - `Ok(DeviceScan)`: decodable rows plus the count of rows skipped
    /// - `Err(Error)`: the table itself could not be read
    async fn load_all_devices(&self) -> Result<DeviceScan, crate::Error>;

    /// Append an event to the log
    ///
    /// # Returns
    ///
    /// The auto-incremented id assigned to the event
    async fn append_event(&self, event: &EventRecord) -> Result<u64, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
