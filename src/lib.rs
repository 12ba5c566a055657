//! Sentinel Monitor - Test Runner Observability
//!
//! In-process metrics, threshold alerting and trend history for a test
//! runner. Writers record test executions, cache lookups, file changes and
//! errors into a [`MetricsStore`]; an [`Orchestrator`] periodically pulls
//! snapshots from it to feed trend series, alert rules and a real-time view.
//!
//! # Architecture
//!
//! ```text
//! record_* → MetricsStore → Orchestrator → { TrendStore, AlertEvaluator, SnapshotBroadcaster }
//! ```
//!
//! # Modules
//!
//! - [`config`] - Configuration structs and YAML loading
//! - [`error`] - Error types
//! - [`monitoring`] - Metrics store, alerts, trends and the orchestrator

pub mod config;
pub mod error;
pub mod monitoring;

pub use config::{AlertThresholds, DashboardConfig, MonitorSettings, MonitoringConfig};
pub use error::{Error, Result};
pub use monitoring::{
    Alert, AlertEvaluator, AlertRule, DashboardView, ExportFormat, HealthMonitor, MetricsSnapshot,
    MetricsStore, Orchestrator, OrchestratorState, SnapshotSource, TestResult, TestStatus,
    TrendStore,
};
