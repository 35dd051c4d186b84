//! In-memory device registry
//!
//! The registry is the single authority for device state while the process
//! runs. It maps identifiers to [`DeviceRecord`]s in a sharded concurrent map:
//! every mutation of one device happens under that device's shard lock, so
//! read-modify-write cycles never interleave into lost updates, and devices
//! on other shards proceed in parallel.
//!
//! ## Usage
//!
//! ```rust
//! use pluto_core::registry::DeviceRegistry;
//!
//! let registry = DeviceRegistry::new();
//!
//! let (_, created) = registry.get_or_create("10.0.0.1");
//! assert!(created);
//!
//! let outcome = registry.apply_increment("10.0.0.1", 3).unwrap();
//! assert_eq!((outcome.old_count, outcome.new_count), (0, 3));
//! ```

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::traits::DeviceRecord;

/// Outcome of an atomic increment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementOutcome {
    /// Current count before the increment
    pub old_count: i64,
    /// Current count after the increment
    pub new_count: i64,
    /// Copy of the device after the increment, for persistence
    pub device: DeviceRecord,
}

/// What a bulk replace did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    /// Devices not previously in memory
    pub inserted: usize,
    /// Devices whose counters changed
    pub updated: usize,
    /// Devices already matching the store's counters
    pub unchanged: usize,
}

impl ReplaceSummary {
    /// Total records applied
    pub fn applied(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Aggregate view over all devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    /// Devices seen within the active window
    pub active_recent: usize,
    pub below_threshold: usize,
    pub above_threshold: usize,
    pub sum_current: i64,
    pub sum_total: i64,
}

/// Concurrent map from device identifier to device state
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Copy of a device's current state
    pub fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.get(id).map(|device| device.clone())
    }

    /// Return the device, creating it with zeroed counters if absent
    ///
    /// Creation for a given identifier happens at most once, even when many
    /// callers race on the same identifier.
    ///
    /// # Returns
    ///
    /// A copy of the device and whether this call created it
    pub fn get_or_create(&self, id: &str) -> (DeviceRecord, bool) {
        match self.devices.entry(id.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let device = DeviceRecord::new(id, Utc::now());
                entry.insert(device.clone());
                (device, true)
            }
        }
    }

    /// Refresh `last_seen` for an existing device
    ///
    /// Returns `None` without creating anything when the device is unknown.
    pub fn touch(&self, id: &str) -> Option<DeviceRecord> {
        let mut device = self.devices.get_mut(id)?;
        device.last_seen = Utc::now().max(device.registered_at);
        Some(device.clone())
    }

    /// Atomically add `delta` to both counters and refresh `last_seen`
    ///
    /// Returns `None` when the device is unknown; callers create it first.
    /// Counters saturate at the `i64` bounds.
    pub fn apply_increment(&self, id: &str, delta: i64) -> Option<IncrementOutcome> {
        let mut device = self.devices.get_mut(id)?;

        let old_count = device.current_count;
        device.current_count = device.current_count.saturating_add(delta);
        device.total_count = device.total_count.saturating_add(delta);
        device.last_seen = Utc::now().max(device.registered_at);

        Some(IncrementOutcome {
            old_count,
            new_count: device.current_count,
            device: device.clone(),
        })
    }

    /// Overwrite devices with store-provided values
    ///
    /// The store wins for every identifier it returns. Each record is applied
    /// under its own shard lock; devices absent from `records` are untouched
    /// and traffic for other devices keeps flowing during the replace.
    pub fn replace_from_store(&self, records: Vec<DeviceRecord>) -> ReplaceSummary {
        let mut summary = ReplaceSummary::default();

        for record in records {
            match self.devices.entry(record.id.clone()) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get();
                    if existing.current_count != record.current_count
                        || existing.total_count != record.total_count
                    {
                        info!(
                            "Updating device {}: current {}->{}, total {}->{}",
                            record.id,
                            existing.current_count,
                            record.current_count,
                            existing.total_count,
                            record.total_count
                        );
                        summary.updated += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                    entry.insert(record);
                }
                Entry::Vacant(entry) => {
                    debug!(
                        "Loading device {}: current={}, total={}",
                        record.id, record.current_count, record.total_count
                    );
                    entry.insert(record);
                    summary.inserted += 1;
                }
            }
        }

        summary
    }

    /// Aggregate statistics as of now
    pub fn snapshot_stats(&self, threshold: i64, active_window: Duration) -> RegistryStats {
        self.snapshot_stats_at(threshold, active_window, Utc::now())
    }

    /// Aggregate statistics as of `now`
    ///
    /// Walks the map one shard at a time, so the result is only approximately
    /// consistent while devices are being mutated.
    pub fn snapshot_stats_at(
        &self,
        threshold: i64,
        active_window: Duration,
        now: DateTime<Utc>,
    ) -> RegistryStats {
        let mut stats = RegistryStats::default();

        for device in self.devices.iter() {
            stats.total += 1;
            stats.sum_current = stats.sum_current.saturating_add(device.current_count);
            stats.sum_total = stats.sum_total.saturating_add(device.total_count);

            if now.signed_duration_since(device.last_seen) < active_window {
                stats.active_recent += 1;
            }

            if device.current_count < threshold {
                stats.below_threshold += 1;
            } else {
                stats.above_threshold += 1;
            }
        }

        stats
    }
}
