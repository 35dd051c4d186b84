//! Core traits for the Pluto counter service
//!
//! - [`DeviceStore`]: Durable device table plus append-only event log

pub mod device_store;

pub use device_store::{DeviceAction, DeviceRecord, DeviceScan, DeviceStore, EventRecord};
