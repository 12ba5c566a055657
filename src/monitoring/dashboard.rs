//! Dashboard View
//!
//! Read-side aggregation of a snapshot, the active alerts and the trend
//! history into one serializable document.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::alerts::{Alert, Severity};
use super::export::check_finite;
use super::health::HealthStatus;
use super::snapshot::MetricsSnapshot;
use super::trends::{series, TimeSeriesPoint, TrendDirection, TrendStore};
use crate::error::Result;

/// High-level system overview
#[derive(Debug, Clone, Serialize)]
pub struct OverviewMetrics {
    /// Unhealthy with any critical alert, degraded with any other alert
    pub system_status: HealthStatus,
    pub uptime_seconds: u64,
    pub total_tests: u64,
    pub success_rate: f64,
    pub average_test_time_ms: f64,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub memory_usage_mb: u64,
    pub cpu_usage_percent: f64,
    pub task_count: usize,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    pub total_executions: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub test_success_trend: TrendDirection,
    pub error_trend: TrendDirection,
    /// Derived from memory usage; lower is better
    pub performance_trend: TrendDirection,
    pub charts: HashMap<String, Vec<TimeSeriesPoint>>,
}

/// Everything a dashboard needs in one document
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub overview: OverviewMetrics,
    pub performance: PerformanceMetrics,
    pub tests: TestSummary,
    pub trends: TrendSummary,
    pub alerts: Vec<Alert>,
    pub generated_at: DateTime<Utc>,
}

impl DashboardView {
    /// Assemble a view from its sources
    pub fn build(snapshot: &MetricsSnapshot, alerts: Vec<Alert>, trends: &TrendStore) -> Self {
        let critical_alerts = alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();
        let system_status = if critical_alerts > 0 {
            HealthStatus::Unhealthy
        } else if !alerts.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            overview: OverviewMetrics {
                system_status,
                uptime_seconds: snapshot.runtime.uptime.as_secs(),
                total_tests: snapshot.tests_executed,
                success_rate: snapshot.success_rate(),
                average_test_time_ms: snapshot.average_test_time.as_secs_f64() * 1000.0,
                active_alerts: alerts.len(),
                critical_alerts,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            performance: PerformanceMetrics {
                memory_usage_mb: snapshot.runtime.memory_usage_bytes / 1024 / 1024,
                cpu_usage_percent: snapshot.runtime.cpu_usage_percent,
                task_count: snapshot.runtime.task_count,
                cache_hit_rate: snapshot.cache_hit_rate(),
                error_rate: snapshot.error_rate_percent,
            },
            tests: TestSummary {
                total_executions: snapshot.tests_executed,
                passed: snapshot.tests_succeeded,
                failed: snapshot.tests_failed,
                skipped: snapshot.tests_skipped,
            },
            trends: TrendSummary {
                test_success_trend: trends.trend_direction(series::TEST_SUCCESS_RATE, true),
                error_trend: trends.trend_direction(series::ERROR_RATE, false),
                performance_trend: trends.trend_direction(series::MEMORY_USAGE, false),
                charts: trends.all_series(),
            },
            alerts,
            generated_at: Utc::now(),
        }
    }

    /// Fail if any number in the view cannot be written as JSON
    pub fn ensure_finite(&self) -> Result<()> {
        check_finite("overview.success_rate", self.overview.success_rate)?;
        check_finite("performance.cpu_usage_percent", self.performance.cpu_usage_percent)?;
        check_finite("performance.cache_hit_rate", self.performance.cache_hit_rate)?;
        check_finite("performance.error_rate", self.performance.error_rate)?;
        for (name, points) in &self.trends.charts {
            for point in points {
                check_finite(name, point.value)?;
            }
        }
        for alert in &self.alerts {
            check_finite(&alert.name, alert.value)?;
        }
        Ok(())
    }
}
