//! Test Runner Observability
//!
//! In-process metrics, alerting and trend tracking for a test runner.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           Sentinel Monitor                               │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │   record_*  ──▶  ┌────────────────┐   snapshot()                         │
//! │                  │ MetricsStore   │ ─────────────┐                       │
//! │                  │ (RwLock)       │              │                       │
//! │                  └────────────────┘              ▼                       │
//! │                                      ┌─────────────────────┐             │
//! │                                      │    Orchestrator     │             │
//! │                                      │ trend │ alert │ rt  │             │
//! │                                      └─────────────────────┘             │
//! │                    ┌─────────────┬───────────┴──────────┐                │
//! │                    ▼             ▼                      ▼                │
//! │            ┌─────────────┐ ┌───────────────┐ ┌────────────────────┐      │
//! │            │ TrendStore  │ │AlertEvaluator │ │SnapshotBroadcaster │      │
//! │            └─────────────┘ └───────────────┘ └────────────────────┘      │
//! │                    └─────────────┴──────────┬───────────┘                │
//! │                                             ▼                            │
//! │                                     DashboardView / export               │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

mod alerts;
mod dashboard;
mod export;
mod health;
mod orchestrator;
mod realtime;
mod runtime;
mod snapshot;
mod store;
mod trends;

#[cfg(test)]
mod proptest;

pub use alerts::{
    default_rules, Alert, AlertEvaluator, AlertRule, AlertStatus, ComparisonOp, MetricId,
    Severity, UnknownMetric,
};
pub use dashboard::{DashboardView, OverviewMetrics, PerformanceMetrics, TestSummary, TrendSummary};
pub use export::{to_json, to_prometheus, to_prometheus_with_alerts, ExportFormat, METRIC_NAMESPACE};
pub use health::{
    CheckOutcome, HealthCheckFn, HealthCheckResult, HealthMonitor, HealthReport, HealthStatus,
    MEMORY_LIMIT_BYTES, TASK_LIMIT,
};
pub use orchestrator::{Orchestrator, OrchestratorState, SnapshotSource};
pub use realtime::{realtime_values, SnapshotBroadcaster, Subscriber};
pub use runtime::RuntimeProbe;
pub use snapshot::{MetricsSnapshot, RuntimeStats, TestResult, TestStatus};
pub use store::MetricsStore;
pub use trends::{series, TimeSeriesPoint, TrendDirection, TrendStore};
