//! PacketLens command-line entry point
//!
//! Captures live traffic or replays a capture file, classifies every frame
//! and keeps the records in memory until exit, optionally exporting them.
//!
//! # Usage
//!
//! ```text
//! packetlens [--config <file>] capture [--interface <name>] [--export <file>]
//! packetlens [--config <file>] replay <file> [--export <file>]
//! packetlens interfaces
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/default.toml, config/{RUN_MODE}.toml)
//! 2. The file given with `--config`
//! 3. Environment variables (prefixed with PACKETLENS__)

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use packetlens_pipeline::{AppConfig, LoggingConfig, PacketService};
use packetlens_storage::{ExportFormat, InMemoryRecordStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "packetlens", version, about = "Capture, classify and query network packets")]
struct Cli {
    /// Configuration file layered over config/default and config/{RUN_MODE}
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture live traffic until Ctrl+C or SIGTERM
    Capture {
        /// Interface to capture on (defaults to capture.interface)
        #[arg(short, long)]
        interface: Option<String>,

        /// Write the record log to this file on exit (.csv or .json)
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Replay a pcap or pcapng capture file
    Replay {
        file: PathBuf,

        /// Write the record log to this file when done (.csv or .json)
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List interfaces that can be captured on
    Interfaces,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!(
        service = "packetlens",
        version = env!("CARGO_PKG_VERSION"),
        "Starting PacketLens"
    );

    // Validate configuration
    config.validate()?;

    if config.metrics.enabled {
        init_metrics(config.metrics.port)?;
    }

    let store = Arc::new(InMemoryRecordStore::from_config(&config.storage));
    let service = Arc::new(PacketService::new(&config, store));

    match cli.command {
        Command::Interfaces => {
            for name in service.list_interfaces() {
                println!("{}", name);
            }
        }
        Command::Replay { file, export } => {
            let summary = service
                .replay_capture_file(&file)
                .await
                .with_context(|| format!("Failed to replay {}", file.display()))?;

            info!(
                file = %file.display(),
                frames_read = summary.frames_read,
                records_stored = summary.records_stored,
                "Replay finished"
            );

            log_final_stats(&service).await;
            if let Some(path) = export {
                export_records(&service, &path).await?;
            }
        }
        Command::Capture { interface, export } => {
            let interface = interface
                .or_else(|| config.capture.interface.clone())
                .ok_or_else(|| anyhow!("No interface given; pass --interface or set capture.interface"))?;

            run_capture(service.clone(), &interface, config.pipeline.status_interval()).await?;

            log_final_stats(&service).await;
            if let Some(path) = export {
                export_records(&service, &path).await?;
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("packetlens={}", level).parse()?)
        .add_directive(format!("packetlens_pipeline={}", level).parse()?)
        .add_directive(format!("packetlens_ingest={}", level).parse()?)
        .add_directive(format!("packetlens_storage={}", level).parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);
    let location = config.include_location;

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_file(location).with_line_number(location))
            .init();
    } else {
        subscriber
            .with(fmt::layer().pretty().with_file(location).with_line_number(location))
            .init();
    }

    Ok(())
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Capture until a shutdown signal arrives or the capture worker stops.
async fn run_capture(service: Arc<PacketService>, interface: &str, interval: Duration) -> Result<()> {
    service
        .start_capture(interface)
        .await
        .with_context(|| format!("Failed to start capture on {}", interface))?;

    let monitor = tokio::spawn(run_status_monitor(service.clone(), interval));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Initiating graceful shutdown...");
        }
        _ = monitor => {
            warn!("Capture ended before shutdown was requested");
        }
    }

    service.stop_capture().await.context("Failed to stop capture")?;

    if let Some(last_error) = service.capture_status().last_error {
        error!(error = %last_error, "Capture worker reported an error");
    }

    Ok(())
}

/// Log pipeline status periodically; returns once capture is no longer running.
async fn run_status_monitor(service: Arc<PacketService>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let status = service.capture_status();
        if !status.capturing {
            return;
        }

        info!(
            interface = status.interface.as_deref().unwrap_or_default(),
            packets_captured = status.packets_captured,
            packets_analyzed = status.packets_analyzed,
            packets_dropped = status.packets_dropped,
            decode_errors = status.decode_errors,
            store_failures = status.store_failures,
            "Capture status"
        );

        if status.packets_dropped > 0 {
            warn!(
                packets_dropped = status.packets_dropped,
                "Frames dropped; consider raising pipeline.queue_size"
            );
        }
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Log final statistics on shutdown.
async fn log_final_stats(service: &PacketService) {
    info!("=== Final Statistics ===");

    let status = service.capture_status();
    info!(
        packets_captured = status.packets_captured,
        packets_analyzed = status.packets_analyzed,
        packets_dropped = status.packets_dropped,
        decode_errors = status.decode_errors,
        store_failures = status.store_failures,
        "Pipeline final stats"
    );

    match service.statistics().await {
        Ok(stats) => info!(
            total = stats.total,
            suspicious = stats.suspicious_count,
            malicious = stats.malicious_count,
            unique_source_ips = stats.unique_source_ips,
            unique_destination_ips = stats.unique_destination_ips,
            "Record log final stats"
        ),
        Err(e) => error!(error = %e, "Failed to compute final statistics"),
    }
}

/// Export format implied by a file extension; anything but `.csv` is JSON.
fn export_format_for(path: &Path) -> ExportFormat {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(ExportFormat::Json, ExportFormat::from_name)
}

async fn export_records(service: &PacketService, path: &Path) -> Result<()> {
    let format = match export_format_for(path) {
        ExportFormat::Csv => "csv",
        ExportFormat::Json => "json",
    };

    let exported = service.export(format).await.context("Failed to export records")?;
    tokio::fs::write(path, &exported.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(
        path = %path.display(),
        format = format,
        bytes = exported.bytes.len(),
        "Records exported"
    );

    Ok(())
}
