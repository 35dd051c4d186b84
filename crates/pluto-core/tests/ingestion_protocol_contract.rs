//! Contract Test: Datagram Ingestion
//!
//! This test verifies the request/response behavior devices rely on.
//!
//! Constraints verified:
//! - Replies are sent only on a threshold crossing (or startup above threshold)
//! - A crossing is reported once, not on every later increment
//! - Malformed payloads change nothing and get no reply
//! - Zero-valued increments count as one
//! - Every handled contact leaves one event row
//!
//! If this test fails, devices in the field will misbehave.

mod common;

use common::*;
use pluto_core::{EngineEvent, MemoryDeviceStore, ResponseCode};

const DEVICE: &str = "192.168.1.50";

#[tokio::test]
async fn threshold_five_scenario() {
    let store = MemoryDeviceStore::new();
    let (engine, _rx) = engine_with(store.clone(), 5);

    assert_eq!(send(&engine, DEVICE, "0").await, None);
    assert_eq!(engine.registry().get(DEVICE).unwrap().current_count, 0);

    assert_eq!(send(&engine, DEVICE, "2").await, None);
    assert_eq!(engine.registry().get(DEVICE).unwrap().current_count, 2);

    assert_eq!(send(&engine, DEVICE, "3").await.as_deref(), Some("1"));
    assert_eq!(engine.registry().get(DEVICE).unwrap().current_count, 5);

    assert_eq!(send(&engine, DEVICE, "10").await, None);
    let device = engine.registry().get(DEVICE).unwrap();
    assert_eq!(device.current_count, 15);
    assert_eq!(device.total_count, 15);

    let row = store.row(DEVICE).await.unwrap();
    assert_eq!(row.current_count, 15);
    assert_eq!(row.total_count, 15);
}

#[tokio::test]
async fn startup_on_new_device_creates_zeroed_record() {
    let (engine, mut rx) = engine_with(MemoryDeviceStore::new(), 5);

    assert_eq!(send(&engine, DEVICE, "  0 \n").await, None);

    assert_eq!(engine.registry().len(), 1);
    let device = engine.registry().get(DEVICE).unwrap();
    assert_eq!(device.current_count, 0);
    assert_eq!(device.total_count, 0);
    assert!(device.registered_at <= device.last_seen);

    let events = drain_events(&mut rx);
    let registrations = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::DeviceRegistered { .. }))
        .count();
    assert_eq!(registrations, 1);
}

#[tokio::test]
async fn startup_above_threshold_reports_state_every_time() {
    let (engine, _rx) = engine_with(MemoryDeviceStore::new(), 5);

    send(&engine, DEVICE, "7").await;

    assert_eq!(send(&engine, DEVICE, "0").await.as_deref(), Some("1"));
    assert_eq!(send(&engine, DEVICE, "0").await.as_deref(), Some("1"));

    // Startup does not move counters
    let device = engine.registry().get(DEVICE).unwrap();
    assert_eq!(device.current_count, 7);
    assert_eq!(device.total_count, 7);
}

#[tokio::test]
async fn malformed_payload_changes_nothing() {
    let store = FlakyStore::new();
    let (engine, mut rx) = engine_with(store.clone(), 5);

    for payload in ["hello", "", "   ", "1.5", "12abc", "0x01", "1 1"] {
        assert_eq!(send(&engine, DEVICE, payload).await, None);
    }
    assert_eq!(engine.handle_datagram(&[0xc3, 0x28], DEVICE).await, None);

    assert!(engine.registry().is_empty());
    assert_eq!(store.upsert_calls(), 0);
    assert_eq!(store.event_calls(), 0);

    let events = drain_events(&mut rx);
    assert_eq!(events.len(), 8);
    assert!(
        events
            .iter()
            .all(|e| matches!(e, EngineEvent::PayloadRejected { .. }))
    );
}

#[tokio::test]
async fn zero_increment_is_equivalent_to_one() {
    let (with_zero, _rx) = engine_with(MemoryDeviceStore::new(), 5);
    let (with_one, _rx) = engine_with(MemoryDeviceStore::new(), 5);

    for _ in 0..5 {
        send(&with_zero, DEVICE, "00").await;
        send(&with_one, DEVICE, "1").await;
    }

    let a = with_zero.registry().get(DEVICE).unwrap();
    let b = with_one.registry().get(DEVICE).unwrap();
    assert_eq!(a.current_count, 5);
    assert_eq!(a.current_count, b.current_count);
    assert_eq!(a.total_count, b.total_count);
}

#[tokio::test]
async fn negative_increments_are_applied_literally() {
    let (engine, _rx) = engine_with(MemoryDeviceStore::new(), 5);

    send(&engine, DEVICE, "3").await;
    assert_eq!(send(&engine, DEVICE, "-10").await, None);

    let device = engine.registry().get(DEVICE).unwrap();
    assert_eq!(device.current_count, -7);
    assert_eq!(device.total_count, -7);

    // Climbing back over the threshold is a fresh crossing
    assert_eq!(send(&engine, DEVICE, "12").await.as_deref(), Some("1"));
}

#[tokio::test]
async fn positive_increments_sum_into_both_counters() {
    let (engine, _rx) = engine_with(MemoryDeviceStore::new(), 1_000_000);

    let deltas = [1, 7, 3, 250, 42, 9, 1, 1, 88, 600];
    for delta in deltas {
        send(&engine, DEVICE, &delta.to_string()).await;
    }

    let expected: i64 = deltas.iter().sum();
    let device = engine.registry().get(DEVICE).unwrap();
    assert_eq!(device.current_count, expected);
    assert_eq!(device.total_count, expected);
}

#[tokio::test]
async fn each_device_is_tracked_independently() {
    let (engine, _rx) = engine_with(MemoryDeviceStore::new(), 5);

    send(&engine, "10.0.0.1", "4").await;
    send(&engine, "10.0.0.2", "1").await;
    assert_eq!(send(&engine, "10.0.0.1", "1").await.as_deref(), Some("1"));
    assert_eq!(send(&engine, "10.0.0.2", "1").await, None);

    assert_eq!(engine.registry().get("10.0.0.1").unwrap().current_count, 5);
    assert_eq!(engine.registry().get("10.0.0.2").unwrap().current_count, 2);
}

#[tokio::test]
async fn event_log_records_every_contact() {
    let store = MemoryDeviceStore::new();
    let (engine, _rx) = engine_with(store.clone(), 5);

    send(&engine, DEVICE, "0").await;
    send(&engine, DEVICE, "2").await;
    send(&engine, DEVICE, "0 0").await; // dropped
    send(&engine, DEVICE, "00").await;
    send(&engine, DEVICE, "2").await;

    let events = store.events().await;
    let summary: Vec<(&str, i64, i64)> = events
        .iter()
        .map(|e| (e.action.as_str(), e.count_value, e.response))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("startup", 0, 0),
            ("increment+2", 2, 0),
            ("increment+1", 3, 0),
            ("increment+2", 5, 1),
        ]
    );
    assert!(events.iter().all(|e| e.device_ip == DEVICE));
    assert_eq!(
        events.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
}

#[tokio::test]
async fn crossing_is_announced_on_the_event_channel() {
    let (engine, mut rx) = engine_with(MemoryDeviceStore::new(), 5);

    send(&engine, DEVICE, "9").await;

    let events = drain_events(&mut rx);
    assert!(events.contains(&EngineEvent::ThresholdCrossed {
        device_id: DEVICE.to_string(),
        old_count: 0,
        new_count: 9,
    }));
    assert!(events.contains(&EngineEvent::CountUpdated {
        device_id: DEVICE.to_string(),
        old_count: 0,
        new_count: 9,
        total_count: 9,
        response: ResponseCode::ThresholdReached,
    }));
}
