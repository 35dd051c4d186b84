// # plutod - Pluto Daemon
//
// This daemon is a THIN integration layer. Counting, threshold decisions,
// persistence and reload semantics all live in pluto-core; nothing here
// touches device state directly.
//
// The plutod daemon is responsible for:
// 1. Parsing flags (with environment fallbacks)
// 2. Initializing logging and the runtime
// 3. Opening the device store and loading known devices
// 4. Starting the datagram listener, the reload endpoint and the stats reporter
// 5. Stopping everything on SIGTERM/SIGINT
//
// ## Configuration
//
// - `--udp-port` / `PLUTO_UDP_PORT`: datagram port (default 8080)
// - `--http-port` / `PLUTO_HTTP_PORT`: reload endpoint port (default 8081)
// - `--maintenance-threshold` / `PLUTO_MAINTENANCE_THRESHOLD`: crossing point (default 5000)
// - `--bind-addr` / `PLUTO_BIND_ADDR`: address both listeners bind to
// - `--store` / `PLUTO_STORE`: `file` or `memory`
// - `--data-dir` / `PLUTO_DATA_DIR`: directory for the file store
// - `--stats-interval-secs` / `PLUTO_STATS_INTERVAL_SECS`: stats line period
// - `--no-admin`: do not serve the reload endpoint
// - `--log-level` / `PLUTO_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export PLUTO_MAINTENANCE_THRESHOLD=2500
// plutod --data-dir /var/lib/pluto
//
// # after resetting a counter in /var/lib/pluto/devices.json
// curl -X POST http://localhost:8081/reload
// ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use pluto_core::engine::stats::run_stats_reporter;
use pluto_core::{DatagramListener, EngineEvent, PlutoConfig, PlutoEngine, StoreConfig, open_store};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum PlutoExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PlutoExitCode> for ExitCode {
    fn from(code: PlutoExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    File,
    Memory,
}

/// Pluto: device trigger counter service
#[derive(Parser, Debug)]
#[command(name = "plutod", version)]
#[command(about = "Counts device triggers over UDP and signals maintenance thresholds")]
struct Args {
    /// UDP port for device datagrams
    #[arg(long, env = "PLUTO_UDP_PORT", default_value_t = 8080)]
    udp_port: u16,

    /// HTTP port for the reload endpoint
    #[arg(long, env = "PLUTO_HTTP_PORT", default_value_t = 8081)]
    http_port: u16,

    /// Count at which a device is told it needs maintenance
    #[arg(long, env = "PLUTO_MAINTENANCE_THRESHOLD", default_value_t = 5000)]
    maintenance_threshold: i64,

    /// Address both listeners bind to
    #[arg(long, env = "PLUTO_BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: String,

    /// Device store backend
    #[arg(long, env = "PLUTO_STORE", value_enum, default_value_t = StoreKind::File)]
    store: StoreKind,

    /// Directory holding the file store
    #[arg(long, env = "PLUTO_DATA_DIR", default_value = "pluto-data")]
    data_dir: String,

    /// Seconds between stats lines
    #[arg(long, env = "PLUTO_STATS_INTERVAL_SECS", default_value_t = 300)]
    stats_interval_secs: u64,

    /// Do not serve the reload endpoint
    #[arg(long)]
    no_admin: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PLUTO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn to_config(&self) -> PlutoConfig {
        let store = match self.store {
            StoreKind::File => StoreConfig::File {
                dir: self.data_dir.clone(),
            },
            StoreKind::Memory => StoreConfig::Memory,
        };

        let mut config = PlutoConfig::new()
            .with_threshold(self.maintenance_threshold)
            .with_store(store);
        config.udp.bind_addr = self.bind_addr.clone();
        config.udp.port = self.udp_port;
        config.admin.bind_addr = self.bind_addr.clone();
        config.admin.port = self.http_port;
        config.admin.enabled = !self.no_admin;
        config.engine.stats_interval_secs = self.stats_interval_secs;
        config
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "PLUTO_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                PlutoExitCode::ConfigError.into()
            } else {
                // --help / --version
                PlutoExitCode::CleanShutdown.into()
            };
        }
    };

    let log_level = match args.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return PlutoExitCode::ConfigError.into();
        }
    };

    let config = args.to_config();
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return PlutoExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PlutoExitCode::ConfigError.into();
    }

    info!("Starting plutod daemon");
    info!(
        "Configuration loaded: threshold {}, store {}",
        config.threshold,
        config.store.type_name()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PlutoExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return PlutoExitCode::ConfigError;
            }
        };

        if let Err(e) = daemon.run().await {
            error!("Daemon error: {:#}", e);
            PlutoExitCode::RuntimeError
        } else {
            PlutoExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Running service: the shared engine and the tasks serving it
struct Daemon {
    engine: Arc<PlutoEngine>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    monitor: JoinHandle<()>,
}

impl Daemon {
    /// Open the store, load devices and start every task
    ///
    /// Store and UDP bind failures abort startup. A failed device load or
    /// admin bind is logged and the daemon runs without it.
    async fn start(config: PlutoConfig) -> Result<Self> {
        let store = open_store(&config.store)
            .await
            .context("Failed to open device store")?;

        let (engine, events) = PlutoEngine::new(store, &config)?;
        let engine = Arc::new(engine);
        let monitor = tokio::spawn(monitor_events(events));

        if let Err(e) = engine.load_from_store().await {
            warn!("Failed to load devices from store: {}", e);
        }

        let listener = DatagramListener::bind(&config.udp.socket_addr())
            .await
            .with_context(|| format!("Failed to bind UDP socket on {}", config.udp.socket_addr()))?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        {
            let engine = Arc::clone(&engine);
            let shutdown_rx = shutdown_rx.clone();
            tasks.push((
                "datagram listener",
                tokio::spawn(async move {
                    if let Err(e) = listener.serve(&engine, shutdown_rx).await {
                        error!("Datagram listener failed: {}", e);
                    }
                }),
            ));
        }

        if config.admin.enabled {
            if let Some(task) = start_admin(&config, &engine, shutdown_rx.clone()).await {
                tasks.push(("reload endpoint", task));
            }
        } else {
            info!("Reload endpoint disabled");
        }

        {
            let engine = Arc::clone(&engine);
            tasks.push((
                "stats reporter",
                tokio::spawn(async move { run_stats_reporter(&engine, shutdown_rx).await }),
            ));
        }

        info!("Daemon initialized successfully");

        Ok(Self {
            engine,
            shutdown,
            tasks,
            monitor,
        })
    }

    /// Serve until a shutdown signal arrives, then stop every task
    async fn run(self) -> Result<()> {
        let signal = wait_for_shutdown().await?;
        info!("Received shutdown signal: {}", signal);
        info!("Shutting down daemon");

        // Receivers may already be gone if a task ended early
        let _ = self.shutdown.send(true);

        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!("Task {} panicked: {}", name, e);
            }
        }

        self.engine.flush().await?;
        self.monitor.abort();

        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(feature = "admin-http")]
async fn start_admin(
    config: &PlutoConfig,
    engine: &Arc<PlutoEngine>,
    shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    use pluto_admin_http::AdminServer;

    let addr = config.admin.socket_addr();
    let server = match AdminServer::bind(&addr).await {
        Ok(server) => server,
        Err(e) => {
            error!("HTTP server error on {}: {}", addr, e);
            return None;
        }
    };

    let engine = Arc::clone(engine);
    Some(tokio::spawn(async move {
        if let Err(e) = server.serve(engine, shutdown).await {
            error!("HTTP server error: {}", e);
        }
    }))
}

#[cfg(not(feature = "admin-http"))]
async fn start_admin(
    _config: &PlutoConfig,
    _engine: &Arc<PlutoEngine>,
    _shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    warn!("Reload endpoint requested but plutod was built without the admin-http feature");
    None
}

/// Drain engine events into the debug log
async fn monitor_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Engine event: {:?}", event);
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// The daemon runs until terminated, so there is no timeout here.
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_defaults() {
        let args = Args::try_parse_from(["plutod"]).unwrap();
        let config = args.to_config();

        assert_eq!(config.udp.port, 8080);
        assert_eq!(config.admin.port, 8081);
        assert_eq!(config.threshold, 5000);
        assert!(config.admin.enabled);
        assert_eq!(
            config.store,
            StoreConfig::File {
                dir: "pluto-data".into()
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "plutod",
            "--udp-port",
            "9000",
            "--maintenance-threshold",
            "25",
            "--store",
            "memory",
            "--no-admin",
        ])
        .unwrap();
        let config = args.to_config();

        assert_eq!(config.udp.port, 9000);
        assert_eq!(config.threshold, 25);
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_zero_threshold_fails_validation() {
        let args = Args::try_parse_from(["plutod", "--maintenance-threshold", "0"]).unwrap();
        assert!(args.to_config().validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let args = Args::try_parse_from(["plutod", "--log-level", "loud"]).unwrap();
        assert!(args.log_level().is_err());

        let args = Args::try_parse_from(["plutod", "--log-level", "DEBUG"]).unwrap();
        assert_eq!(args.log_level().unwrap(), Level::DEBUG);
    }

    #[test]
    fn test_unknown_store_rejected() {
        assert!(Args::try_parse_from(["plutod", "--store", "sqlite"]).is_err());
    }
}
