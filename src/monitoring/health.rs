//! Health Checks
//!
//! Named checks over a metrics snapshot, aggregated into one report.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::snapshot::MetricsSnapshot;

/// Resident memory above which the default `memory` check fails
pub const MEMORY_LIMIT_BYTES: u64 = 1024 * 1024 * 1024;

/// Live task count above which the default `tasks` check fails
pub const TASK_LIMIT: usize = 1000;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is healthy
    Healthy,
    /// Service is degraded but operational
    Degraded,
    /// Service is unhealthy
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Outcome of a health check function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Warn(String),
    Fail(String),
}

/// Health check function over a snapshot
pub type HealthCheckFn = Box<dyn Fn(&MetricsSnapshot) -> CheckOutcome + Send + Sync>;

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
    /// Time spent running the check
    pub latency_us: u64,
}

/// Aggregated health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status among all checks
    pub status: HealthStatus,
    pub checks: BTreeMap<String, HealthCheckResult>,
    pub last_check: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
}

/// Registry of named health checks
pub struct HealthMonitor {
    checks: RwLock<BTreeMap<String, HealthCheckFn>>,
}

impl HealthMonitor {
    /// Create a monitor with the default `memory` and `tasks` checks
    pub fn new() -> Self {
        let monitor = Self::empty();

        monitor.add_check("memory", |snapshot| {
            let used = snapshot.runtime.memory_usage_bytes;
            if used > MEMORY_LIMIT_BYTES {
                CheckOutcome::Fail(format!("memory usage too high: {} bytes", used))
            } else {
                CheckOutcome::Pass
            }
        });

        monitor.add_check("tasks", |snapshot| {
            let count = snapshot.runtime.task_count;
            if count > TASK_LIMIT {
                CheckOutcome::Fail(format!("too many live tasks: {}", count))
            } else {
                CheckOutcome::Pass
            }
        });

        monitor
    }

    /// Create a monitor with no checks
    pub fn empty() -> Self {
        Self {
            checks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register or replace a check
    pub fn add_check<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn(&MetricsSnapshot) -> CheckOutcome + Send + Sync + 'static,
    {
        self.checks.write().insert(name.into(), Box::new(check));
    }

    /// Run every check against `snapshot`
    pub fn check(&self, snapshot: &MetricsSnapshot) -> HealthReport {
        let checks: BTreeMap<String, HealthCheckResult> = self
            .checks
            .read()
            .iter()
            .map(|(name, check)| {
                let start = Instant::now();
                let outcome = check(snapshot);
                let latency_us = elapsed_us(start.elapsed());

                let (status, message) = match outcome {
                    CheckOutcome::Pass => (HealthStatus::Healthy, "OK".to_string()),
                    CheckOutcome::Warn(msg) => (HealthStatus::Degraded, msg),
                    CheckOutcome::Fail(msg) => (HealthStatus::Unhealthy, msg),
                };
                (
                    name.clone(),
                    HealthCheckResult {
                        status,
                        message,
                        latency_us,
                    },
                )
            })
            .collect();

        let status = checks
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthReport {
            status,
            checks,
            last_check: Utc::now(),
            uptime_seconds: snapshot.runtime.uptime.as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::RuntimeStats;

    fn snapshot_with_runtime(memory: u64, tasks: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            runtime: RuntimeStats {
                memory_usage_bytes: memory,
                task_count: tasks,
                uptime: Duration::from_secs(60),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_health_status_ordering() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded < HealthStatus::Unhealthy);
        assert!(HealthStatus::Degraded.is_operational());
        assert!(!HealthStatus::Unhealthy.is_operational());
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_default_checks_pass() {
        let monitor = HealthMonitor::new();
        let report = monitor.check(&snapshot_with_runtime(1024, 3));

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.checks["memory"].message, "OK");
        assert_eq!(report.uptime_seconds, 60);
    }

    #[test]
    fn test_memory_check_fails() {
        let monitor = HealthMonitor::new();
        let report = monitor.check(&snapshot_with_runtime(MEMORY_LIMIT_BYTES + 1, 3));

        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.checks["memory"].status, HealthStatus::Unhealthy);
        assert_eq!(report.checks["tasks"].status, HealthStatus::Healthy);
    }

    #[test]
    fn test_worst_status_wins() {
        let monitor = HealthMonitor::empty();
        monitor.add_check("ok", |_| CheckOutcome::Pass);
        monitor.add_check("flaky", |s| {
            if s.tests_failed > 0 {
                CheckOutcome::Warn("failures present".to_string())
            } else {
                CheckOutcome::Pass
            }
        });

        let snapshot = MetricsSnapshot {
            tests_failed: 2,
            ..Default::default()
        };
        let report = monitor.check(&snapshot);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.checks["flaky"].message, "failures present");
    }

    #[test]
    fn test_empty_monitor_is_healthy() {
        let report = HealthMonitor::empty().check(&MetricsSnapshot::default());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.checks.is_empty());
    }

    #[test]
    fn test_serialization() {
        let report = HealthMonitor::new().check(&MetricsSnapshot::default());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"healthy\""));

        let back: HealthReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, HealthStatus::Healthy);
    }
}
