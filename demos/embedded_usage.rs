//! Minimal embedding example for pluto-core
//!
//! Runs the engine in-process over a memory store, feeds it datagrams
//! directly and walks through a maintenance reset and reload.

use pluto_core::state::MemoryDeviceStore;
use pluto_core::{PlutoConfig, PlutoEngine, Result, StoreConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Embedded pluto-core Example ===\n");

    let store = MemoryDeviceStore::new();
    let config = PlutoConfig::new()
        .with_threshold(5)
        .with_store(StoreConfig::Memory);
    let (engine, _events) = PlutoEngine::new(Box::new(store.clone()), &config)?;

    let device = "192.168.1.50";
    for payload in ["0", "2", "3", "10", "garbage"] {
        let reply = engine.handle_datagram(payload.as_bytes(), device).await;
        println!(
            "{:>8} -> {}",
            payload,
            reply
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_else(|| "(no reply)".to_string())
        );
    }

    // A technician services the device and resets the stored counter
    if let Some(mut row) = store.row(device).await {
        row.current_count = 0;
        store.put_row(row).await;
    }

    let report = engine.reload_from_store().await?;
    println!(
        "\nReloaded {} device(s), {} error(s)",
        report.processed, report.failed
    );

    if let Some(record) = engine.registry().get(device) {
        println!(
            "{}: current {}, lifetime total {}",
            record.id, record.current_count, record.total_count
        );
    }

    engine.log_stats();
    Ok(())
}
