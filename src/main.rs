//! Scan gate - QR code in/out counting station
//!
//! Counts items moving in and out of a storage location from per-frame decode
//! results, debouncing repeated sightings, and mirrors the totals to a remote
//! store.
//!
//! Module structure:
//! - `domain/` - Core types (Code, TrackingMode, frames, commands)
//! - `io/` - External interfaces (decoder feed, operator console, report sinks)
//! - `services/` - Business logic (DetectionTracker, Station, ReportWorker)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use scan_gate::infra::{Config, Metrics};
use scan_gate::io::operator::spawn_operator_console;
use scan_gate::io::{
    create_report_channel, start_decoder_feed, DecoderFeedConfig, FirebaseSink, LogSink,
    ReportSink,
};
use scan_gate::services::{ReportWorker, Station};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Scan gate - QR code in/out counting station
#[derive(Parser, Debug)]
#[command(name = "scan-gate", version = env!("GIT_HASH"), about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

/// Pending reports get this long to flush after the station stops
const REPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn init_logging(json: bool) {
    // Default: INFO, use RUST_LOG=debug for per-observation visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_sink(config: &Config) -> Arc<dyn ReportSink> {
    if !config.firebase_enabled() {
        info!("firebase_disabled: reports go to the log");
        return Arc::new(LogSink);
    }

    match FirebaseSink::new(
        config.firebase_database_url(),
        config.firebase_auth_token(),
        Duration::from_millis(config.firebase_timeout_ms()),
    ) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            // Counting keeps working without the remote store
            error!(error = format!("{e:#}"), "firebase_unavailable: reports go to the log");
            Arc::new(LogSink)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    info!(revision = %env!("GIT_HASH"), "scan-gate starting");

    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        min_detection_gap_ms = %config.min_detection_gap_ms(),
        display_window_ms = %config.display_window_ms(),
        new_object_gap_ms = %config.new_object_gap_ms(),
        default_mode = %config.default_mode(),
        decoder_enabled = %config.decoder_enabled(),
        decoder_port = %config.decoder_port(),
        firebase_enabled = %config.firebase_enabled(),
        report_queue_size = %config.report_queue_size(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = scan_gate::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = format!("{e:#}"), "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Report channel and worker (network I/O stays off the station loop)
    let (report_sender, report_rx) =
        create_report_channel(config.report_queue_size(), metrics.clone());
    let worker = ReportWorker::new(build_sink(&config), report_rx, metrics.clone());
    let worker_handle = tokio::spawn(worker.run());

    // Station input: decoder frames and operator commands (bounded for backpressure)
    let (input_tx, input_rx) = mpsc::channel(1000);

    let feed_config = DecoderFeedConfig {
        bind_address: config.decoder_bind_address().to_string(),
        port: config.decoder_port(),
        enabled: config.decoder_enabled(),
    };
    let feed_tx = input_tx.clone();
    let feed_metrics = metrics.clone();
    let feed_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_decoder_feed(feed_config, feed_tx, feed_metrics, feed_shutdown).await
        {
            error!(error = format!("{e:#}"), "Decoder feed error");
        }
    });

    if args.no_console {
        drop(input_tx);
    } else if let Err(e) = spawn_operator_console(input_tx) {
        warn!(error = %e, "operator_console_unavailable");
    }

    // Handle shutdown on Ctrl+C
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = signal_tx.send(true);
    });

    // Run station - consumes frames and commands until quit or shutdown
    let mut station = Station::new(&config, metrics.clone(), Some(report_sender));
    let summary = station.run(input_rx, shutdown_rx).await;

    // Stop listeners, then let the worker drain once the last sender is gone
    let _ = shutdown_tx.send(true);
    drop(station);
    if tokio::time::timeout(REPORT_DRAIN_TIMEOUT, worker_handle).await.is_err() {
        warn!(
            failed = %metrics.reports_failed(),
            dropped = %metrics.reports_dropped(),
            "report_worker_drain_timeout"
        );
    }

    summary.log();
    info!("scan-gate shutdown complete");
    Ok(())
}
