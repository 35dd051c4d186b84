//! Scripted device for exercising a running plutod
//!
//! Sends a startup datagram, then a series of increments, and prints any
//! reply. A reply of `1` means the service wants the device serviced.
//!
//! ```bash
//! device_simulator --target 127.0.0.1:8080 --steps 2,3,10
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;

/// Scripted Pluto device
#[derive(Parser, Debug)]
#[command(name = "device_simulator")]
#[command(about = "Sends startup and increment datagrams to a Pluto service")]
struct Args {
    /// Service datagram address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    target: SocketAddr,

    /// Comma-separated increments sent after startup
    #[arg(short, long, value_delimiter = ',', default_value = "1,1,1")]
    steps: Vec<i64>,

    /// Milliseconds to wait for a reply to each datagram
    #[arg(long, default_value_t = 500)]
    reply_timeout_ms: u64,

    /// Skip the startup datagram
    #[arg(long)]
    no_startup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind client socket")?;
    let timeout = Duration::from_millis(args.reply_timeout_ms);

    println!("=== Pluto device simulator -> {} ===\n", args.target);

    if !args.no_startup {
        exchange(&socket, args.target, "0", timeout).await?;
    }

    for step in &args.steps {
        exchange(&socket, args.target, &step.to_string(), timeout).await?;
    }

    Ok(())
}

async fn exchange(socket: &UdpSocket, target: SocketAddr, payload: &str, timeout: Duration) -> Result<()> {
    socket
        .send_to(payload.as_bytes(), target)
        .await
        .with_context(|| format!("Failed to send to {}", target))?;

    let mut buf = [0u8; 64];
    match tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => {
            let reply = String::from_utf8_lossy(&buf[..len]);
            println!("sent {:>6}  reply {} (maintenance required)", payload, reply.trim());
        }
        Ok(Err(e)) => println!("sent {:>6}  receive error: {}", payload, e),
        Err(_) => println!("sent {:>6}  no reply", payload),
    }

    Ok(())
}
