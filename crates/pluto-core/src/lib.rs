// # pluto-core
//
// Core library for the Pluto device counter service.
//
// Devices report trigger counts over a minimal text datagram protocol. The
// service keeps per-device counters, persists them, and tells a device once
// when its count crosses the maintenance threshold.
//
// ## Architecture Overview
//
// - **DeviceRegistry**: Concurrent in-memory map of device state
// - **ThresholdEngine**: Pure, edge-triggered crossing decisions
// - **protocol**: Datagram parsing and reply encoding
// - **DeviceStore**: Trait for the durable device table and event log
// - **PlutoEngine**: Orchestrates datagram → registry → threshold → store → reply
// - **DatagramListener**: UDP loop feeding the engine
//
// ## Design Principles
//
// 1. **Single authority**: the registry decides, the store remembers
// 2. **Write-through**: every handled contact is persisted before replying
// 3. **Lossy by contract**: malformed datagrams are dropped silently, nothing is retried
// 4. **Library-First**: the daemon is a thin wiring layer over this crate

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod threshold;
pub mod time;
pub mod traits;
pub mod transport;

// Re-export core types for convenience
pub use config::{PlutoConfig, StoreConfig};
pub use engine::{EngineEvent, PlutoEngine, ReloadReport};
pub use error::{Error, Result};
pub use registry::{DeviceRegistry, RegistryStats};
pub use state::{FileDeviceStore, MemoryDeviceStore, open_store};
pub use threshold::{ResponseCode, ThresholdEngine};
pub use traits::{DeviceRecord, DeviceStore};
pub use transport::DatagramListener;
