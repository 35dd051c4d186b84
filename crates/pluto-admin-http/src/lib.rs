// # Admin HTTP
//
// This crate exposes the administrative reload trigger over HTTP.
//
// ## Purpose
//
// Operators reset counters directly in the device store after maintenance.
// `POST /reload` pulls the whole device table back into the running
// registry so the change takes effect without a restart.
//
// ## Responses
//
// - `200`: `Device reload completed successfully. Processed: N devices`,
//   with ` (with M errors - check logs)` appended when rows were skipped
// - `500`: `Database query failed: <error>`; the registry is left as it was
// - `405`: any method other than POST

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use pluto_core::{PlutoEngine, ReloadReport, Result};

/// Path of the reload trigger
pub const RELOAD_PATH: &str = "/reload";

/// Build the admin router
pub fn reload_router(engine: Arc<PlutoEngine>) -> Router {
    Router::new()
        .route(RELOAD_PATH, post(reload).fallback(method_not_allowed))
        .with_state(engine)
}

/// Bound admin listener
pub struct AdminServer {
    listener: TcpListener,
}

impl AdminServer {
    /// Bind the admin socket
    ///
    /// The daemon treats a failure here as non-fatal and runs without the
    /// admin surface.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve reload requests until `shutdown` flips to `true` or its sender is dropped
    pub async fn serve(self, engine: Arc<PlutoEngine>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Reload endpoint available at http://{}{}", self.local_addr()?, RELOAD_PATH);

        axum::serve(self.listener, reload_router(engine))
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
                info!("Admin server shutting down");
            })
            .await?;

        Ok(())
    }
}

async fn reload(State(engine): State<Arc<PlutoEngine>>) -> (StatusCode, String) {
    match engine.reload_from_store().await {
        Ok(report) => (StatusCode::OK, success_message(&report)),
        Err(e) => {
            warn!("Reload request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database query failed: {}", e),
            )
        }
    }
}

async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed - use POST")
}

fn success_message(report: &ReloadReport) -> String {
    let mut message = format!(
        "Device reload completed successfully. Processed: {} devices",
        report.processed
    );
    if report.failed > 0 {
        message.push_str(&format!(" (with {} errors - check logs)", report.failed));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_message_without_errors() {
        let report = ReloadReport {
            processed: 3,
            ..Default::default()
        };
        assert_eq!(
            success_message(&report),
            "Device reload completed successfully. Processed: 3 devices"
        );
    }

    #[test]
    fn test_success_message_with_errors() {
        let report = ReloadReport {
            processed: 7,
            failed: 2,
            ..Default::default()
        };
        assert_eq!(
            success_message(&report),
            "Device reload completed successfully. Processed: 7 devices (with 2 errors - check logs)"
        );
    }
}
