//! Core ingestion engine
//!
//! The PlutoEngine is responsible for:
//! - Turning datagrams into startup or increment contacts
//! - Applying them to the device registry
//! - Deciding the response with the threshold policy
//! - Writing the device and an event row through to the store
//! - Resynchronizing the registry from the store on demand
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ DatagramListener │─── payload + sender ───┐
//! └──────────────────┘                        │
//!                                             ▼
//!                                    ┌──────────────┐      ┌──────────────┐
//!                                    │ PlutoEngine  │◀─────│ reload (HTTP)│
//!                                    └──────────────┘      └──────────────┘
//!                                             │
//!         ┌───────────────────────────┬───────┴───────────────────┐
//!         │                           │                           │
//!         ▼                           ▼                           ▼
//! ┌────────────────┐        ┌─────────────────┐         ┌─────────────┐
//! │ DeviceRegistry │        │ ThresholdEngine │         │ DeviceStore │
//! │ (mutate)       │        │ (classify)      │         │ (write)     │
//! └────────────────┘        └─────────────────┘         └─────────────┘
//! ```
//!
//! ## Contact Flow
//!
//! 1. Parse payload; malformed payloads are dropped without a trace in state
//! 2. Locate or create the device
//! 3. Apply the contact atomically and classify it
//! 4. Upsert the device and append an event (failures are logged only)
//! 5. Return reply bytes when the response is not normal

pub mod stats;

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::PlutoConfig;
use crate::error::Result;
use crate::protocol::{Command, encode_reply, parse_datagram};
use crate::registry::{DeviceRegistry, RegistryStats, ReplaceSummary};
use crate::threshold::{ResponseCode, ThresholdEngine};
use crate::traits::{DeviceAction, DeviceRecord, DeviceStore, EventRecord};

/// Events emitted by the PlutoEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Datagram listener started
    Started { devices_count: usize },

    /// Device seen for the first time
    DeviceRegistered { device_id: String },

    /// Startup contact handled
    StartupHandled {
        device_id: String,
        current_count: i64,
        response: ResponseCode,
    },

    /// Increment applied
    CountUpdated {
        device_id: String,
        old_count: i64,
        new_count: i64,
        total_count: i64,
        response: ResponseCode,
    },

    /// Increment moved the device across the threshold
    ThresholdCrossed {
        device_id: String,
        old_count: i64,
        new_count: i64,
    },

    /// Payload could not be parsed and was dropped
    PayloadRejected { sender: String, reason: String },

    /// A write-through to the store failed
    PersistFailed { device_id: String, error: String },

    /// Registry resynchronized from the store
    ReloadCompleted { processed: usize, failed: usize },

    /// Datagram listener stopped
    Stopped { reason: String },
}

/// Result of pulling the device table into the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadReport {
    /// Rows applied to the registry
    pub processed: usize,
    /// Rows skipped because they could not be decoded
    pub failed: usize,
    /// How the applied rows related to what was in memory
    pub summary: ReplaceSummary,
}

/// Core Pluto engine
///
/// Shared behind an `Arc` by the datagram listener, the reload endpoint and
/// the stats reporter. All methods take `&self`; synchronization lives in the
/// registry and the store.
///
/// ## Durability
///
/// Writes go straight to the store from the handling path, before the reply
/// is produced. A slow store therefore slows replies; a failing store does not
/// stop them. Nothing is retried.
///
/// Contacts for one device are handled one at a time, from the registry
/// update through the store write, so the stored row always ends on the
/// latest count. Different devices never wait on each other.
pub struct PlutoEngine {
    /// Authoritative in-memory device state
    registry: DeviceRegistry,

    /// Durable device table and event log
    store: Arc<dyn DeviceStore>,

    /// Per-device gate held from registry update to store write
    contact_locks: DashMap<String, Arc<Mutex<()>>>,

    /// Process-wide threshold policy
    threshold: ThresholdEngine,

    /// Window for the "active" statistic
    active_window: Duration,

    /// Interval between stats lines
    stats_interval: std::time::Duration,

    /// Receive buffer size for datagrams
    max_datagram_size: usize,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl PlutoEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `store`: device store implementation
    /// - `config`: service configuration (validated here)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Box<dyn DeviceStore>,
        config: &PlutoConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            registry: DeviceRegistry::new(),
            store: Arc::from(store),
            contact_locks: DashMap::new(),
            threshold: ThresholdEngine::new(config.threshold),
            active_window: Duration::seconds(
                i64::try_from(config.engine.active_window_secs).unwrap_or(i64::MAX),
            ),
            stats_interval: std::time::Duration::from_secs(config.engine.stats_interval_secs),
            max_datagram_size: config.udp.max_datagram_size,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The in-memory device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The threshold policy
    pub fn threshold(&self) -> ThresholdEngine {
        self.threshold
    }

    /// The underlying store
    pub fn store(&self) -> &dyn DeviceStore {
        self.store.as_ref()
    }

    pub fn stats_interval(&self) -> std::time::Duration {
        self.stats_interval
    }

    pub fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }

    /// Handle one datagram
    ///
    /// # Parameters
    ///
    /// - `payload`: raw datagram bytes
    /// - `sender`: device identifier (the sender's IP address)
    ///
    /// # Returns
    ///
    /// The reply to send back, or `None` for both "normal" and dropped payloads
    pub async fn handle_datagram(&self, payload: &[u8], sender: &str) -> Option<Vec<u8>> {
        let command = match parse_datagram(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Invalid message from {}: {}", sender, e);
                self.emit_event(EngineEvent::PayloadRejected {
                    sender: sender.to_string(),
                    reason: e.to_string(),
                });
                return None;
            }
        };

        let response = match command {
            Command::Startup => self.handle_startup(sender).await,
            Command::Increment(amount) => self.handle_increment(sender, amount).await,
        };

        encode_reply(response)
    }

    /// Handle a startup contact
    ///
    /// Registers the device if needed, otherwise refreshes its `last_seen`,
    /// and reports whether it already sits at or above the threshold.
    pub async fn handle_startup(&self, device_id: &str) -> ResponseCode {
        let gate = self.contact_lock(device_id);
        let _ordered = gate.lock().await;

        let (created_device, created) = self.registry.get_or_create(device_id);

        let device = if created {
            info!("New device registered: {}", device_id);
            self.emit_event(EngineEvent::DeviceRegistered {
                device_id: device_id.to_string(),
            });
            created_device
        } else {
            let device = self.registry.touch(device_id).unwrap_or(created_device);
            info!(
                "Device startup: {} (current count: {})",
                device_id, device.current_count
            );
            device
        };

        let response = self.threshold.on_startup(device.current_count);

        self.persist(
            &device,
            EventRecord::new(
                device_id,
                DeviceAction::Startup,
                device.current_count,
                response,
            ),
        )
        .await;

        self.emit_event(EngineEvent::StartupHandled {
            device_id: device_id.to_string(),
            current_count: device.current_count,
            response,
        });

        response
    }

    /// Handle an increment contact
    ///
    /// Unknown devices are registered on the fly. The response is
    /// `ThresholdReached` only for the increment that crosses the threshold.
    pub async fn handle_increment(&self, device_id: &str, amount: i64) -> ResponseCode {
        let gate = self.contact_lock(device_id);
        let _ordered = gate.lock().await;

        let (_, created) = self.registry.get_or_create(device_id);
        if created {
            info!("Auto-registered device: {}", device_id);
            self.emit_event(EngineEvent::DeviceRegistered {
                device_id: device_id.to_string(),
            });
        }

        let Some(outcome) = self.registry.apply_increment(device_id, amount) else {
            error!("Device {} vanished before increment", device_id);
            return ResponseCode::Normal;
        };

        let response = self
            .threshold
            .on_increment(outcome.old_count, outcome.new_count);

        if response == ResponseCode::ThresholdReached {
            info!(
                "Device {} crossed threshold: {} -> {}",
                device_id, outcome.old_count, outcome.new_count
            );
            self.emit_event(EngineEvent::ThresholdCrossed {
                device_id: device_id.to_string(),
                old_count: outcome.old_count,
                new_count: outcome.new_count,
            });
        }

        self.persist(
            &outcome.device,
            EventRecord::new(
                device_id,
                DeviceAction::Increment(amount),
                outcome.new_count,
                response,
            ),
        )
        .await;

        info!(
            "Count update {}: {} -> {} (Total: {})",
            device_id, outcome.old_count, outcome.new_count, outcome.device.total_count
        );
        self.emit_event(EngineEvent::CountUpdated {
            device_id: device_id.to_string(),
            old_count: outcome.old_count,
            new_count: outcome.new_count,
            total_count: outcome.device.total_count,
            response,
        });

        response
    }

    /// Load the device table at startup
    pub async fn load_from_store(&self) -> Result<ReloadReport> {
        let report = self.sync_from_store().await?;
        info!("Loaded {} devices from store", report.processed);
        Ok(report)
    }

    /// Resynchronize the registry from the store (administrative reload)
    ///
    /// Store values win for every device the store returns; devices only in
    /// memory are left alone. If the table cannot be read at all, nothing is
    /// applied and the error is returned to the caller.
    pub async fn reload_from_store(&self) -> Result<ReloadReport> {
        info!("Manual device reload triggered");

        let report = match self.sync_from_store().await {
            Ok(report) => report,
            Err(e) => {
                error!("Error reloading devices from store: {}", e);
                return Err(e);
            }
        };

        info!(
            "Device reload completed: {} devices processed, {} errors",
            report.processed, report.failed
        );
        Ok(report)
    }

    async fn sync_from_store(&self) -> Result<ReloadReport> {
        let scan = self.store.load_all_devices().await?;

        let processed = scan.records.len();
        let summary = self.registry.replace_from_store(scan.records);
        debug!(
            "Applied {} store rows: {} new, {} updated, {} unchanged",
            summary.applied(),
            summary.inserted,
            summary.updated,
            summary.unchanged
        );

        self.emit_event(EngineEvent::ReloadCompleted {
            processed,
            failed: scan.failed,
        });

        Ok(ReloadReport {
            processed,
            failed: scan.failed,
            summary,
        })
    }

    /// Aggregate statistics over all devices
    pub fn stats(&self) -> RegistryStats {
        self.registry
            .snapshot_stats(self.threshold.threshold(), self.active_window)
    }

    /// Log one statistics line
    pub fn log_stats(&self) -> RegistryStats {
        let stats = self.stats();
        info!(
            "Stats - Total devices: {}, Active: {}, Below threshold: {}, Above: {}, Total current count: {}, Grand total count: {}",
            stats.total,
            stats.active_recent,
            stats.below_threshold,
            stats.above_threshold,
            stats.sum_current,
            stats.sum_total
        );
        stats
    }

    /// Flush the store before exit
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await?;
        info!("Device store flushed");
        Ok(())
    }

    /// Gate serializing contacts for one device
    fn contact_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.contact_locks.entry(device_id.to_string()).or_default())
    }

    /// Write the device and its event through to the store
    ///
    /// Failures are logged and reported as events; the in-memory state stays
    /// authoritative and the caller still replies.
    async fn persist(&self, device: &DeviceRecord, event: EventRecord) {
        if let Err(e) = self.store.upsert_device(device).await {
            error!("Error saving device {}: {}", device.id, e);
            self.emit_event(EngineEvent::PersistFailed {
                device_id: device.id.clone(),
                error: e.to_string(),
            });
        }

        if let Err(e) = self.store.append_event(&event).await {
            error!("Error saving log for device {}: {}", event.device_id, e);
            self.emit_event(EngineEvent::PersistFailed {
                device_id: event.device_id.clone(),
                error: e.to_string(),
            });
        }
    }

    /// Emit an engine event
    ///
    /// Never waits: when the channel is full or nobody listens, the event is dropped.
    pub(crate) fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
