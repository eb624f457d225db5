pub mod channels;       // Inter-component communication channels
pub mod config;         // Configuration management
pub mod coordinator;    // Negotiation engine and message handling
pub mod datalog_writer; // Raw register capture to file
pub mod growatt;        // Growatt dongle protocol implementation
pub mod mqtt;           // MQTT publishing
pub mod options;        // Command line options parsing
pub mod prelude;        // Common imports and types
pub mod pvoutput;       // PVOutput status uploads
pub mod register_cache; // Register value storage
pub mod utils;          // Utility functions

// Get the package version from Cargo.toml
pub const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use std::sync::Arc;

/// Starts all components and runs until the shutdown signal fires.
pub async fn app(mut shutdown_rx: broadcast::Receiver<()>, config: ConfigWrapper) -> Result<()> {
    let channels = Channels::new();
    let register_cache = RegisterCache::new();

    let datalog_writer = match config.datalog_file() {
        Some(path) => Some(datalog_writer::DatalogWriter::new(&path)?),
        None => None,
    };

    let coordinator = Arc::new(Coordinator::new(
        config.clone(),
        channels.clone(),
        register_cache.clone(),
        datalog_writer,
    ));

    let server = growatt::dongle::Server::new(config.clone(), channels.clone(), coordinator.clone());
    let server_clone = server.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server_clone.start().await {
            error!("dongle server failed: {}", e);
        }
    });

    let mqtt = mqtt::Mqtt::new(config.clone(), channels.clone(), coordinator.stats.clone());
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("mqtt task failed: {}", e);
        }
    });

    let pvoutput = pvoutput::PvOutput::new(config.clone(), channels.clone(), register_cache.clone());
    let pvoutput_clone = pvoutput.clone();
    let pvoutput_handle = tokio::spawn(async move {
        if let Err(e) = pvoutput_clone.start().await {
            error!("pvoutput task failed: {}", e);
        }
    });

    info!("startup complete, waiting for dongle connections");
    let _ = shutdown_rx.recv().await;

    info!("shutdown signal received, stopping components");
    server.stop();
    mqtt.stop();

    let _ = server_handle.await;
    let _ = mqtt_handle.await;
    let _ = pvoutput_handle.await;

    if let Ok(stats) = coordinator.stats.lock() {
        stats.print_summary();
    }

    info!("shutdown complete");
    Ok(())
}
