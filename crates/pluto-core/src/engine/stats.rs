//! Periodic statistics reporter
//!
//! Independent of the datagram path: it only reads registry snapshots.

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::PlutoEngine;

/// Log a stats line now and then every `stats_interval` until shutdown
pub async fn run_stats_reporter(engine: &PlutoEngine, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(engine.stats_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.log_stats();
            }
            _ = shutdown.wait_for(|stop| *stop) => {
                debug!("Stats reporter stopped");
                break;
            }
        }
    }
}
