pub mod channels;       // Inter-component communication channels
pub mod config;         // Configuration management
pub mod coordinator;    // Frame decoding and fan-out
pub mod datalog_writer; // Decoded record log
pub mod error;          // Decode error types
pub mod growatt;        // Growatt datalogger protocol
pub mod metrics;        // Gauges derived from records
pub mod mqtt;           // MQTT client and messaging
pub mod options;        // Command line options parsing
pub mod prelude;        // Common imports and types
pub mod proxy;          // TCP interception

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use crate::coordinator::Coordinator;
use crate::datalog_writer::DatalogWriter;
use crate::mqtt::Mqtt;
use crate::proxy::Proxy;

/// Manages all application components and their lifecycle
#[derive(Clone)]
pub struct Components {
    pub coordinator: Coordinator,
    pub proxy: Proxy,
    pub mqtt: Mqtt,
}

impl Components {
    /// Stops the proxy and coordinator first so nothing new is queued for MQTT
    pub fn stop(&self) {
        info!("Stopping all components...");

        self.proxy.stop();
        self.coordinator.stop();
        self.mqtt.stop();
    }
}

/// Initialise env_logger at the given default level
pub fn init_logging(level: &str) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init()?;

    Ok(())
}

/// Main application entry point
///
/// Starts the proxy, coordinator and MQTT client, then waits for a shutdown
/// signal and stops them in order.
pub async fn app(
    mut shutdown_rx: broadcast::Receiver<()>,
    config: ConfigWrapper,
) -> Result<()> {
    info!("growatt-bridge {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();

    let datalog_writer = match config.datalog_file() {
        Some(path) => Some(DatalogWriter::new(&path)?),
        None => None,
    };

    info!("  Creating Coordinator...");
    let coordinator = Coordinator::new(config.clone(), channels.clone(), datalog_writer);
    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.start().await {
            error!("Coordinator task failed: {}", e);
        }
    });

    info!("  Creating MQTT client...");
    let mqtt = Mqtt::new(config.clone(), channels.clone(), coordinator.shared_stats.clone());
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("MQTT task failed: {}", e);
        }
    });

    info!("  Creating Proxy...");
    let proxy = Proxy::new(config.clone(), channels.clone());
    let listener = proxy.bind().await?;
    let proxy_clone = proxy.clone();
    let proxy_handle = tokio::spawn(async move {
        if let Err(e) = proxy_clone.serve(listener).await {
            error!("Proxy task failed: {}", e);
        }
    });

    info!("Waiting for shutdown signal...");
    let _ = shutdown_rx.recv().await;

    info!("Shutdown signal received, stopping components...");
    let components = Components {
        coordinator,
        proxy,
        mqtt,
    };
    components.stop();

    if let Err(e) = proxy_handle.await {
        error!("Error waiting for proxy task: {}", e);
    }
    if let Err(e) = coordinator_handle.await {
        error!("Error waiting for coordinator task: {}", e);
    }
    if let Err(e) = mqtt_handle.await {
        error!("Error waiting for mqtt task: {}", e);
    }

    if let Ok(stats) = components.coordinator.shared_stats.lock() {
        stats.print_summary();
    }

    info!("Shutdown complete");
    Ok(())
}
