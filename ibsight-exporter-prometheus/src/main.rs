//! Prometheus exporter for InfiniBand port counters.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use ibsight_common::SysFs;
use ibsight_exporter_prometheus::{ExporterConfig, HttpServer, ScrapeCollector};

/// Prometheus exporter for InfiniBand port counters.
#[derive(Parser, Debug)]
#[command(name = "ibsight-exporter-prometheus")]
#[command(about = "Export InfiniBand port counters as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Sysfs mount point (overrides config).
    #[arg(long)]
    sysfs_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Apply CLI overrides
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(root) = args.sysfs_root {
        config.sysfs.root = root;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    ibsight_common::init_tracing(&config.logging)?;

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let sysfs = SysFs::new(config.sysfs.root.clone());
    info!(
        listen = %config.prometheus.listen,
        sysfs_root = %sysfs.root().display(),
        "Starting IBSight InfiniBand exporter"
    );

    let collector = Arc::new(ScrapeCollector::new(
        Arc::new(sysfs),
        &config.collection,
        Duration::from_millis(config.sysfs.read_timeout_ms),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );
    let mut http_task = tokio::spawn(http_server.run(shutdown_rx));

    // Wait for a shutdown signal, or for the server to stop on its own
    tokio::select! {
        result = &mut http_task => {
            let result = result.map_err(|e| anyhow::anyhow!("HTTP task failed: {}", e))?;
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
                return Err(e);
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for the server to drain
    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = collector.stats();
    info!(
        scrapes = stats.scrapes,
        reads_succeeded = stats.reads_succeeded,
        reads_failed = stats.reads_failed,
        read_timeouts = stats.read_timeouts,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}
