//! Sentinel Monitor
//!
//! Runs the monitoring core against its own process until Ctrl-C or a fixed
//! run time, then prints an export of the dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Sentinel Monitor                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ MetricsStore │───▶│ Orchestrator │───▶│   Trends /   │       │
//! │  │  (runtime    │    │  (3 tasks)   │    │   Alerts /   │       │
//! │  │   refresh)   │    │              │    │   Realtime   │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentinel_monitor::config::{parse_duration, MonitorSettings};
use sentinel_monitor::error::Result;
use sentinel_monitor::monitoring::{
    AlertEvaluator, ExportFormat, HealthMonitor, MetricsStore, Orchestrator, SnapshotSource,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Sentinel Monitor - metrics, alerts and trends for a test runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Interval between trend samples (e.g. "5s")
    #[arg(long, env = "TREND_INTERVAL", value_parser = parse_duration)]
    trend_interval: Option<Duration>,

    /// Interval between alert evaluations (e.g. "30s")
    #[arg(long, env = "ALERT_INTERVAL", value_parser = parse_duration)]
    alert_interval: Option<Duration>,

    /// Interval between real-time refreshes (e.g. "1s")
    #[arg(long, env = "REALTIME_INTERVAL", value_parser = parse_duration)]
    realtime_interval: Option<Duration>,

    /// Maximum points kept per trend series
    #[arg(long, env = "MAX_DATA_POINTS")]
    max_data_points: Option<usize>,

    /// Output format printed on shutdown (json, prometheus)
    #[arg(long, env = "EXPORT_FORMAT")]
    export_format: Option<ExportFormat>,

    /// Stop after this long instead of waiting for Ctrl-C
    #[arg(long, env = "RUN_FOR", value_parser = parse_duration)]
    run_for: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let mut settings = match &args.config {
        Some(path) => MonitorSettings::from_yaml_file(path)?,
        None => MonitorSettings::default(),
    };
    apply_overrides(&mut settings, &args);

    info!("Starting Sentinel Monitor");
    info!("  Trend interval: {:?}", settings.dashboard.trend_interval);
    info!("  Alert interval: {:?}", settings.dashboard.alert_interval);
    info!("  Realtime interval: {:?}", settings.dashboard.realtime_interval);
    info!("  Max data points: {}", settings.dashboard.max_data_points);

    let shutdown = CancellationToken::new();

    let store = Arc::new(MetricsStore::new(settings.monitoring.clone()));
    let refresh = tokio::spawn(store.clone().run_runtime_refresh(shutdown.child_token()));

    let evaluator = match settings.alert_rules.take() {
        Some(rules) => AlertEvaluator::with_rules(rules),
        None => AlertEvaluator::with_rules(sentinel_monitor::monitoring::default_rules(
            &settings.monitoring.thresholds,
        )),
    };
    info!("  Alert rules: {}", evaluator.rules().len());

    let source: Arc<dyn SnapshotSource> = store.clone();
    let orchestrator = Orchestrator::new(settings.dashboard.clone(), Some(source))
        .with_alert_evaluator(Arc::new(evaluator))
        .with_parent_token(&shutdown);
    orchestrator.start()?;

    match args.run_for {
        Some(run_for) => {
            info!("Running for {:?}", run_for);
            tokio::select! {
                _ = tokio::time::sleep(run_for) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }

    info!("Shutting down");
    shutdown.cancel();
    orchestrator.stop().await?;
    if let Err(e) = refresh.await {
        warn!("Runtime refresh task failed: {}", e);
    }

    let health = HealthMonitor::new().check(&store.snapshot());
    info!(status = %health.status, "Final health check");

    let output = orchestrator.export_dashboard(settings.monitoring.export_format)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.write_all(b"\n")?;

    info!("Sentinel Monitor shutdown complete");
    Ok(())
}

fn apply_overrides(settings: &mut MonitorSettings, args: &Args) {
    let dashboard = &mut settings.dashboard;
    if let Some(interval) = args.trend_interval {
        dashboard.trend_interval = interval;
    }
    if let Some(interval) = args.alert_interval {
        dashboard.alert_interval = interval;
    }
    if let Some(interval) = args.realtime_interval {
        dashboard.realtime_interval = interval;
    }
    if let Some(points) = args.max_data_points {
        dashboard.max_data_points = points;
    }
    if let Some(format) = args.export_format {
        settings.monitoring.export_format = format;
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
