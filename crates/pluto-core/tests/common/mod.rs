//! Test doubles and common utilities for contract tests
//!
//! This module provides a failure-injecting store and config helpers so the
//! contract tests can exercise the engine without touching disk.

#![allow(dead_code)]

use pluto_core::config::{PlutoConfig, StoreConfig};
use pluto_core::error::{Error, Result};
use pluto_core::traits::{DeviceRecord, DeviceScan, DeviceStore, EventRecord};
use pluto_core::{EngineEvent, MemoryDeviceStore, PlutoEngine};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// A store that delegates to memory but can be told to fail
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryDeviceStore,
    fail_upserts: Arc<AtomicBool>,
    fail_events: Arc<AtomicBool>,
    fail_scans: Arc<AtomicBool>,
    slow_odd_upserts: Arc<AtomicBool>,
    upsert_calls: Arc<AtomicUsize>,
    event_calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memory tables behind this store
    pub fn memory(&self) -> &MemoryDeviceStore {
        &self.inner
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Make upserts of odd counts take a few milliseconds
    ///
    /// Uneven write latency is what reorders writes that are not serialized.
    pub fn slow_odd_upserts(&self, slow: bool) {
        self.slow_odd_upserts.store(slow, Ordering::SeqCst);
    }

    /// Number of upsert attempts, failed ones included
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of event append attempts, failed ones included
    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeviceStore for FlakyStore {
    async fn upsert_device(&self, device: &DeviceRecord) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Error::store("disk full"));
        }
        if self.slow_odd_upserts.load(Ordering::SeqCst) && device.current_count % 2 != 0 {
            tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        }
        self.inner.upsert_device(device).await
    }

    async fn load_all_devices(&self) -> Result<DeviceScan> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(Error::store("table unreadable"));
        }
        self.inner.load_all_devices().await
    }

    async fn append_event(&self, event: &EventRecord) -> Result<u64> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(Error::store("log unavailable"));
        }
        self.inner.append_event(event).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// Minimal valid configuration with the given threshold
pub fn minimal_config(threshold: i64) -> PlutoConfig {
    let mut config = PlutoConfig::new()
        .with_threshold(threshold)
        .with_store(StoreConfig::Memory);
    config.udp.bind_addr = "127.0.0.1".to_string();
    config.udp.port = 0;
    config.admin.enabled = false;
    config.engine.event_channel_capacity = 100;
    config
}

/// Build an engine over a store with the given threshold
pub fn engine_with<S>(store: S, threshold: i64) -> (PlutoEngine, mpsc::Receiver<EngineEvent>)
where
    S: DeviceStore + 'static,
{
    PlutoEngine::new(Box::new(store), &minimal_config(threshold))
        .expect("engine construction succeeds")
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Send a datagram as `sender` and decode the reply as text
pub async fn send(engine: &PlutoEngine, sender: &str, payload: &str) -> Option<String> {
    engine
        .handle_datagram(payload.as_bytes(), sender)
        .await
        .map(|reply| String::from_utf8(reply).expect("replies are ASCII"))
}
