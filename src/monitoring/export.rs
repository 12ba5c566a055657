//! Metrics Export
//!
//! JSON and Prometheus text exposition of metrics snapshots.

use std::str::FromStr;

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use serde::{Deserialize, Serialize};

use super::alerts::{Alert, Severity};
use super::snapshot::MetricsSnapshot;
use crate::error::{Error, Result};

/// Prefix applied to every exported Prometheus metric
pub const METRIC_NAMESPACE: &str = "sentinel";

/// Supported export formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// Prometheus text exposition format
    Prometheus,
}

impl ExportFormat {
    /// MIME type of the exported payload
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Prometheus => "text/plain; version=0.0.4",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "prometheus" | "prom" => Ok(ExportFormat::Prometheus),
            other => Err(Error::Config(format!("unknown export format: {}", other))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Prometheus => write!(f, "prometheus"),
        }
    }
}

/// Serialize any value as pretty JSON
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Serialize a snapshot as pretty JSON, rejecting NaN and infinite values
pub fn snapshot_to_json(snapshot: &MetricsSnapshot) -> Result<Vec<u8>> {
    ensure_finite(snapshot)?;
    to_json(snapshot)
}

/// Fail if any floating-point field of the snapshot has no JSON form
pub fn ensure_finite(snapshot: &MetricsSnapshot) -> Result<()> {
    check_finite("error_rate_percent", snapshot.error_rate_percent)?;
    check_finite("runtime.cpu_usage_percent", snapshot.runtime.cpu_usage_percent)?;
    for (name, value) in &snapshot.custom_gauges {
        check_finite(name, *value)?;
    }
    Ok(())
}

/// JSON has no NaN or infinity; serde_json would silently write `null`
pub(crate) fn check_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        return Ok(());
    }
    Err(Error::Serialization(<serde_json::Error as serde::ser::Error>::custom(
        format!("non-finite value for {}: {}", field, value),
    )))
}

/// Render a snapshot in Prometheus text format
pub fn to_prometheus(snapshot: &MetricsSnapshot) -> Result<Vec<u8>> {
    to_prometheus_with_alerts(snapshot, &[])
}

/// Render a snapshot plus per-severity active alert counts
pub fn to_prometheus_with_alerts(snapshot: &MetricsSnapshot, alerts: &[Alert]) -> Result<Vec<u8>> {
    let registry = Registry::new_custom(Some(METRIC_NAMESPACE.to_string()), None)?;

    // Test execution
    counter(&registry, "tests_executed_total", "Total test executions", snapshot.tests_executed)?;
    counter(&registry, "tests_succeeded_total", "Total passed tests", snapshot.tests_succeeded)?;
    counter(&registry, "tests_failed_total", "Total failed tests", snapshot.tests_failed)?;
    counter(&registry, "tests_skipped_total", "Total skipped tests", snapshot.tests_skipped)?;
    gauge(
        &registry,
        "average_test_time_seconds",
        "Average test duration",
        snapshot.average_test_time.as_secs_f64(),
    )?;

    // File watching
    counter(
        &registry,
        "file_changes_total",
        "Detected file changes",
        snapshot.file_changes_detected,
    )?;
    counter(&registry, "watch_cycles_total", "Completed watch cycles", snapshot.watch_cycles)?;
    int_gauge(&registry, "files_watched", "Files currently watched", snapshot.files_watched)?;

    // Cache
    counter(&registry, "cache_hits_total", "Cache hits", snapshot.cache_hits)?;
    counter(&registry, "cache_misses_total", "Cache misses", snapshot.cache_misses)?;

    // Errors
    counter(&registry, "errors_total", "Recorded errors", snapshot.errors_total)?;
    gauge(
        &registry,
        "error_rate_percent",
        "Errors per executed test, in percent",
        snapshot.error_rate_percent,
    )?;
    let by_type = IntCounterVec::new(
        Opts::new("errors_by_type_total", "Recorded errors by type"),
        &["type"],
    )?;
    for (error_type, count) in &snapshot.errors_by_type {
        by_type.with_label_values(&[error_type.as_str()]).inc_by(*count);
    }
    registry.register(Box::new(by_type))?;

    // Runtime
    int_gauge(
        &registry,
        "memory_usage_bytes",
        "Resident memory of the process",
        snapshot.runtime.memory_usage_bytes,
    )?;
    gauge(
        &registry,
        "cpu_usage_percent",
        "Process CPU usage",
        snapshot.runtime.cpu_usage_percent,
    )?;
    int_gauge(
        &registry,
        "tasks",
        "Live async tasks",
        snapshot.runtime.task_count as u64,
    )?;
    gauge(
        &registry,
        "uptime_seconds",
        "Time since the metrics store was created",
        snapshot.runtime.uptime.as_secs_f64(),
    )?;

    // Custom
    let counters = IntGaugeVec::new(Opts::new("custom_counter", "Custom counters"), &["name"])?;
    for (name, value) in &snapshot.custom_counters {
        counters.with_label_values(&[name.as_str()]).set(*value);
    }
    registry.register(Box::new(counters))?;

    let gauges = GaugeVec::new(Opts::new("custom_gauge", "Custom gauges"), &["name"])?;
    for (name, value) in &snapshot.custom_gauges {
        gauges.with_label_values(&[name.as_str()]).set(*value);
    }
    registry.register(Box::new(gauges))?;

    let timers = GaugeVec::new(
        Opts::new("custom_timer_seconds", "Custom timers"),
        &["name"],
    )?;
    for (name, value) in &snapshot.custom_timers {
        timers
            .with_label_values(&[name.as_str()])
            .set(value.as_secs_f64());
    }
    registry.register(Box::new(timers))?;

    // Alerts
    if !alerts.is_empty() {
        let active = IntGaugeVec::new(
            Opts::new("active_alerts", "Firing alerts by severity"),
            &["severity"],
        )?;
        for severity in [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            let count = alerts.iter().filter(|a| a.severity == severity).count();
            active
                .with_label_values(&[severity.as_str()])
                .set(count as i64);
        }
        registry.register(Box::new(active))?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

fn counter(registry: &Registry, name: &str, help: &str, value: u64) -> Result<()> {
    let metric = IntCounter::new(name, help)?;
    metric.inc_by(value);
    registry.register(Box::new(metric))?;
    Ok(())
}

fn int_gauge(registry: &Registry, name: &str, help: &str, value: u64) -> Result<()> {
    let metric = IntGauge::new(name, help)?;
    metric.set(i64::try_from(value).unwrap_or(i64::MAX));
    registry.register(Box::new(metric))?;
    Ok(())
}

fn gauge(registry: &Registry, name: &str, help: &str, value: f64) -> Result<()> {
    let metric = Gauge::new(name, help)?;
    metric.set(value);
    registry.register(Box::new(metric))?;
    Ok(())
}
