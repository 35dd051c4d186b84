//! UDP datagram listener
//!
//! One task reads datagrams in a loop and hands each to the engine in turn.
//! Devices are identified by the sender's IP address; the reply goes back to
//! the full source address. Socket errors are logged and the loop carries on.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, PlutoEngine};
use crate::error::Result;

/// Bound UDP socket serving the datagram protocol
#[derive(Debug)]
pub struct DatagramListener {
    socket: UdpSocket,
}

impl DatagramListener {
    /// Bind the listening socket
    ///
    /// Failing to bind is fatal for the daemon.
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve datagrams until `shutdown` flips to `true` or its sender is dropped
    pub async fn serve(&self, engine: &PlutoEngine, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut buffer = vec![0u8; engine.max_datagram_size()];

        engine.emit_event(EngineEvent::Started {
            devices_count: engine.registry().len(),
        });
        info!(
            "Pluto UDP server listening on {} (threshold: {})",
            self.local_addr()?,
            engine.threshold().threshold()
        );

        loop {
            let (len, peer) = tokio::select! {
                received = self.socket.recv_from(&mut buffer) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Error reading UDP message: {}", e);
                        continue;
                    }
                },
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("Shutdown signal received");
                    engine.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            };

            let sender = peer.ip().to_string();
            debug!("Datagram from {} ({} bytes)", peer, len);

            if let Some(reply) = engine.handle_datagram(&buffer[..len], &sender).await {
                if let Err(e) = self.socket.send_to(&reply, peer).await {
                    warn!("Error sending response to {}: {}", sender, e);
                }
            }
        }

        Ok(())
    }
}
