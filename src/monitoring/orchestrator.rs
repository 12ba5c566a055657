//! Monitoring Orchestrator
//!
//! Drives three independent periodic tasks off a shared snapshot source:
//!
//! - **trend**: appends derived rates and runtime usage to the [`TrendStore`]
//! - **alert**: re-evaluates every rule in the [`AlertEvaluator`]
//! - **realtime**: refreshes the [`SnapshotBroadcaster`] key/value view
//!
//! Each task owns its own interval and exits on the next `select!` after the
//! cancellation token fires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};

use super::alerts::{Alert, AlertEvaluator};
use super::dashboard::DashboardView;
use super::export::{self, ExportFormat};
use super::realtime::{realtime_values, SnapshotBroadcaster};
use super::snapshot::MetricsSnapshot;
use super::store::MetricsStore;
use super::trends::{series, TrendStore};
use crate::config::{effective_interval, DashboardConfig};
use crate::error::{Error, Result};

/// Anything that can hand out a point-in-time metrics snapshot.
///
/// Returning `None` means the source is currently unavailable; the
/// orchestrator skips that cycle.
pub trait SnapshotSource: Send + Sync {
    fn current_snapshot(&self) -> Option<MetricsSnapshot>;
}

impl SnapshotSource for MetricsStore {
    fn current_snapshot(&self) -> Option<MetricsSnapshot> {
        Some(self.snapshot())
    }
}

/// Lifecycle of an [`Orchestrator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running,
    Stopped,
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorState::Idle => write!(f, "idle"),
            OrchestratorState::Running => write!(f, "running"),
            OrchestratorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Periodic driver for trends, alerts and the real-time view
pub struct Orchestrator {
    config: DashboardConfig,
    source: Option<Arc<dyn SnapshotSource>>,
    alerts: Arc<AlertEvaluator>,
    trends: Arc<TrendStore>,
    realtime: Arc<RwLock<SnapshotBroadcaster>>,
    state: Mutex<OrchestratorState>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an orchestrator with the default alert rules and a trend store
    /// sized from `config.max_data_points`
    pub fn new(config: DashboardConfig, source: Option<Arc<dyn SnapshotSource>>) -> Self {
        let trends = Arc::new(TrendStore::new(config.max_data_points));
        Self {
            config,
            source,
            alerts: Arc::new(AlertEvaluator::new()),
            trends,
            realtime: Arc::new(RwLock::new(SnapshotBroadcaster::new())),
            state: Mutex::new(OrchestratorState::Idle),
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Use a shared alert evaluator
    pub fn with_alert_evaluator(mut self, alerts: Arc<AlertEvaluator>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Use a shared trend store
    pub fn with_trend_store(mut self, trends: Arc<TrendStore>) -> Self {
        self.trends = trends;
        self
    }

    /// Stop when `parent` is cancelled as well as on [`stop`](Self::stop)
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.token = parent.child_token();
        self
    }

    /// Task intervals and toggles
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Current lifecycle state. A running orchestrator whose token has been
    /// cancelled reports `Stopped`.
    pub fn state(&self) -> OrchestratorState {
        let state = *self.state.lock();
        if state == OrchestratorState::Running && self.token.is_cancelled() {
            OrchestratorState::Stopped
        } else {
            state
        }
    }

    /// Evaluator run by the alert task
    pub fn alert_evaluator(&self) -> &Arc<AlertEvaluator> {
        &self.alerts
    }

    /// Series filled by the trend task
    pub fn trend_store(&self) -> &Arc<TrendStore> {
        &self.trends
    }

    /// Copy of the real-time view and its timestamp
    pub fn realtime_snapshot(&self) -> (HashMap<String, Value>, DateTime<Utc>) {
        let realtime = self.realtime.read();
        (realtime.current().clone(), realtime.last_update())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the periodic tasks on the current tokio runtime
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != OrchestratorState::Idle {
            return Err(Error::InvalidState {
                operation: "start",
                state: state.to_string(),
            });
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("no tokio runtime: {}", e)))?;

        let mut tasks = self.tasks.lock();

        let (source, trends) = (self.source.clone(), self.trends.clone());
        tasks.push(handle.spawn(run_periodic(
            "trend",
            self.config.trend_interval,
            self.token.clone(),
            move || collect_trends(source.as_deref(), &trends),
        )));

        let (source, alerts) = (self.source.clone(), self.alerts.clone());
        let enabled = self.config.enable_alerts;
        tasks.push(handle.spawn(run_periodic(
            "alert",
            self.config.alert_interval,
            self.token.clone(),
            move || {
                if enabled {
                    evaluate_alerts(source.as_deref(), &alerts);
                }
            },
        )));

        let (source, realtime) = (self.source.clone(), self.realtime.clone());
        let enabled = self.config.enable_real_time;
        tasks.push(handle.spawn(run_periodic(
            "realtime",
            self.config.realtime_interval,
            self.token.clone(),
            move || {
                if enabled {
                    refresh_realtime(source.as_deref(), &realtime);
                }
            },
        )));

        *state = OrchestratorState::Running;
        info!(
            trend_interval_ms = self.config.trend_interval.as_millis() as u64,
            alert_interval_ms = self.config.alert_interval.as_millis() as u64,
            realtime_interval_ms = self.config.realtime_interval.as_millis() as u64,
            has_source = self.source.is_some(),
            "Monitoring orchestrator started"
        );
        Ok(())
    }

    /// Cancel the periodic tasks and wait for them to finish.
    ///
    /// Stopping twice is a no-op. Fails if any task panicked.
    pub async fn stop(&self) -> Result<()> {
        self.token.cancel();
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        *self.state.lock() = OrchestratorState::Stopped;

        let mut panicked = 0usize;
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Monitoring task failed");
                panicked += 1;
            }
        }

        if panicked > 0 {
            return Err(Error::Internal(format!(
                "{} monitoring task(s) panicked",
                panicked
            )));
        }

        info!("Monitoring orchestrator stopped");
        Ok(())
    }

    // =========================================================================
    // Manual Cycles
    // =========================================================================

    /// Run one trend collection cycle immediately
    pub fn collect_trends_now(&self) {
        collect_trends(self.source.as_deref(), &self.trends);
    }

    /// Run one alert evaluation cycle immediately
    pub fn evaluate_alerts_now(&self) {
        evaluate_alerts(self.source.as_deref(), &self.alerts);
    }

    /// Run one real-time refresh immediately
    pub fn refresh_realtime_now(&self) {
        refresh_realtime(self.source.as_deref(), &self.realtime);
    }

    // =========================================================================
    // Dashboard
    // =========================================================================

    /// Current snapshot, or an empty one when the source is unavailable
    fn snapshot_or_default(&self) -> MetricsSnapshot {
        self.source
            .as_deref()
            .and_then(|s| s.current_snapshot())
            .unwrap_or_default()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active()
    }

    /// Aggregate the current state into a dashboard view
    pub fn dashboard(&self) -> DashboardView {
        DashboardView::build(&self.snapshot_or_default(), self.alerts.active(), &self.trends)
    }

    /// Serialize the dashboard. Prometheus output carries the snapshot
    /// metrics plus active alert counts.
    pub fn export_dashboard(&self, format: ExportFormat) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Json => {
                let view = self.dashboard();
                view.ensure_finite()?;
                export::to_json(&view)
            }
            ExportFormat::Prometheus => {
                export::to_prometheus_with_alerts(&self.snapshot_or_default(), &self.alerts.active())
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// =============================================================================
// Periodic Tasks
// =============================================================================

async fn run_periodic<F>(name: &'static str, interval: Duration, token: CancellationToken, mut cycle: F)
where
    F: FnMut() + Send + 'static,
{
    let period = effective_interval(interval);
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(task = name, interval_ms = period.as_millis() as u64, "Monitoring task started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => cycle(),
        }
    }

    debug!(task = name, "Monitoring task stopped");
}

fn pull(source: Option<&dyn SnapshotSource>, task: &'static str) -> Option<MetricsSnapshot> {
    let snapshot = source.and_then(|s| s.current_snapshot());
    if snapshot.is_none() {
        trace!(task, "Snapshot source unavailable, skipping cycle");
    }
    snapshot
}

fn collect_trends(source: Option<&dyn SnapshotSource>, trends: &TrendStore) {
    let Some(snapshot) = pull(source, "trend") else {
        return;
    };
    let now = Utc::now();

    if snapshot.tests_executed > 0 {
        trends.add_point(series::TEST_SUCCESS_RATE, snapshot.success_rate(), now);
    }
    trends.add_point(series::ERROR_RATE, snapshot.error_rate_percent, now);
    trends.add_point(
        series::MEMORY_USAGE,
        snapshot.runtime.memory_usage_bytes as f64,
        now,
    );
    trends.add_point(series::CPU_USAGE, snapshot.runtime.cpu_usage_percent, now);
    if snapshot.cache_operations() > 0 {
        trends.add_point(series::CACHE_HIT_RATE, snapshot.cache_hit_rate(), now);
    }
}

fn evaluate_alerts(source: Option<&dyn SnapshotSource>, alerts: &AlertEvaluator) {
    if let Some(snapshot) = pull(source, "alert") {
        alerts.evaluate(&snapshot);
    }
}

fn refresh_realtime(source: Option<&dyn SnapshotSource>, realtime: &RwLock<SnapshotBroadcaster>) {
    if let Some(snapshot) = pull(source, "realtime") {
        let values = realtime_values(&snapshot);
        realtime.write().update(values);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::{AlertRule, ComparisonOp, Severity};
    use crate::monitoring::snapshot::TestResult;
    use assert_matches::assert_matches;
    use tokio_test::{assert_err, assert_ok};

    struct Unavailable;

    impl SnapshotSource for Unavailable {
        fn current_snapshot(&self) -> Option<MetricsSnapshot> {
            None
        }
    }

    fn fast_config() -> DashboardConfig {
        DashboardConfig {
            trend_interval: Duration::from_millis(10),
            alert_interval: Duration::from_millis(10),
            realtime_interval: Duration::from_millis(10),
            max_data_points: 100,
            enable_real_time: true,
            enable_alerts: true,
        }
    }

    fn store_with_results() -> Arc<MetricsStore> {
        let store = Arc::new(MetricsStore::default());
        store.record_test_execution(Some(&TestResult::passed("a")), Duration::from_millis(5));
        store.record_test_execution(Some(&TestResult::failed("b")), Duration::from_millis(5));
        store
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let orchestrator = Orchestrator::new(fast_config(), None);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);

        orchestrator.start().unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Running);
        assert_matches!(
            orchestrator.start(),
            Err(Error::InvalidState { operation: "start", .. })
        );

        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
        assert_matches!(orchestrator.start(), Err(Error::InvalidState { .. }));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let orchestrator = Orchestrator::new(fast_config(), None);
        assert_matches!(orchestrator.start(), Err(Error::Internal(_)));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let orchestrator = Orchestrator::new(fast_config(), None);
        assert_ok!(orchestrator.start());
        assert_ok!(orchestrator.stop().await);
        assert_ok!(orchestrator.stop().await);
        assert_err!(orchestrator.start());
    }

    #[tokio::test]
    async fn test_stop_exits_within_one_tick() {
        let config = DashboardConfig {
            trend_interval: Duration::from_millis(200),
            alert_interval: Duration::from_millis(200),
            realtime_interval: Duration::from_millis(200),
            ..fast_config()
        };
        let orchestrator = Orchestrator::new(config, Some(store_with_results()));
        orchestrator.start().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_millis(200), orchestrator.stop())
            .await
            .expect("stop should finish within one tick")
            .unwrap();
    }

    #[tokio::test]
    async fn test_huge_intervals_do_not_panic() {
        let config = DashboardConfig {
            trend_interval: Duration::from_secs(u64::MAX),
            alert_interval: Duration::MAX,
            realtime_interval: Duration::from_secs(u64::MAX),
            ..fast_config()
        };
        let orchestrator = Orchestrator::new(config, Some(store_with_results()));
        assert_ok!(orchestrator.start());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_ok!(orchestrator.stop().await);
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    }

    #[tokio::test]
    async fn test_parent_token_stops_tasks() {
        let parent = CancellationToken::new();
        let orchestrator =
            Orchestrator::new(fast_config(), Some(store_with_results())).with_parent_token(&parent);
        orchestrator.start().unwrap();

        parent.cancel();
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tasks_feed_components() {
        let store = store_with_results();
        let orchestrator = Orchestrator::new(fast_config(), Some(store.clone()));
        orchestrator.alert_evaluator().set_rules(vec![AlertRule::new(
            "has_failures",
            "tests_failed",
            ComparisonOp::Gt,
            0.0,
            Severity::High,
        )]);

        orchestrator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.stop().await.unwrap();

        let trends = orchestrator.trend_store();
        assert!(trends.len(series::TEST_SUCCESS_RATE) >= 1);
        assert!(trends.len(series::ERROR_RATE) >= 1);
        assert!(trends.len(series::MEMORY_USAGE) >= 1);
        assert_eq!(trends.series(series::TEST_SUCCESS_RATE)[0].value, 50.0);
        // no cache operations recorded
        assert_eq!(trends.len(series::CACHE_HIT_RATE), 0);

        assert_eq!(orchestrator.active_alerts().len(), 1);

        let (values, _) = orchestrator.realtime_snapshot();
        assert_eq!(values["tests_executed"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_unavailable_source_skips_cycles() {
        let orchestrator = Orchestrator::new(fast_config(), Some(Arc::new(Unavailable)));
        orchestrator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        orchestrator.stop().await.unwrap();

        assert!(orchestrator.trend_store().metric_names().is_empty());
        assert_eq!(orchestrator.active_alerts().len(), 0);
        assert!(orchestrator.realtime_snapshot().0.is_empty());
    }

    #[test]
    fn test_missing_source_skips_manual_cycles() {
        let orchestrator = Orchestrator::new(fast_config(), None);
        orchestrator.collect_trends_now();
        orchestrator.evaluate_alerts_now();
        orchestrator.refresh_realtime_now();

        assert!(orchestrator.trend_store().metric_names().is_empty());
        assert!(orchestrator.realtime_snapshot().0.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_tasks_do_nothing() {
        let config = DashboardConfig {
            enable_alerts: false,
            enable_real_time: false,
            ..fast_config()
        };
        let orchestrator = Orchestrator::new(config, Some(store_with_results()));
        orchestrator.alert_evaluator().set_rules(vec![AlertRule::new(
            "any",
            "tests_executed",
            ComparisonOp::Gt,
            0.0,
            Severity::Low,
        )]);

        orchestrator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        orchestrator.stop().await.unwrap();

        assert_eq!(orchestrator.active_alerts().len(), 0);
        assert!(orchestrator.realtime_snapshot().0.is_empty());
        assert!(orchestrator.trend_store().len(series::ERROR_RATE) >= 1);
    }

    #[test]
    fn test_cache_hit_rate_trend() {
        let store = Arc::new(MetricsStore::default());
        store.record_cache_operation(true);
        store.record_cache_operation(false);

        let orchestrator = Orchestrator::new(fast_config(), Some(store));
        orchestrator.collect_trends_now();

        let trends = orchestrator.trend_store();
        assert_eq!(trends.series(series::CACHE_HIT_RATE)[0].value, 50.0);
        // no tests executed yet
        assert_eq!(trends.len(series::TEST_SUCCESS_RATE), 0);
    }

    #[test]
    fn test_dashboard_without_source() {
        let orchestrator = Orchestrator::new(fast_config(), None);
        let view = orchestrator.dashboard();
        assert_eq!(view.overview.total_tests, 0);

        let json = orchestrator.export_dashboard(ExportFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert!(parsed["overview"].is_object());
    }

    #[test]
    fn test_export_dashboard_rejects_non_finite() {
        struct Overloaded;

        impl SnapshotSource for Overloaded {
            fn current_snapshot(&self) -> Option<MetricsSnapshot> {
                let mut snapshot = MetricsSnapshot::default();
                snapshot.runtime.cpu_usage_percent = f64::NAN;
                Some(snapshot)
            }
        }

        let orchestrator = Orchestrator::new(fast_config(), Some(Arc::new(Overloaded)));
        assert_matches!(
            orchestrator.export_dashboard(ExportFormat::Json),
            Err(Error::Serialization(_))
        );
    }

    #[test]
    fn test_export_dashboard_prometheus() {
        let orchestrator = Orchestrator::new(fast_config(), Some(store_with_results()));
        orchestrator.alert_evaluator().set_rules(vec![AlertRule::new(
            "has_failures",
            "tests_failed",
            ComparisonOp::Gt,
            0.0,
            Severity::Critical,
        )]);
        orchestrator.evaluate_alerts_now();

        let text = String::from_utf8(orchestrator.export_dashboard(ExportFormat::Prometheus).unwrap())
            .unwrap();
        assert!(text.contains("sentinel_tests_executed_total 2"));
        assert!(text.contains("sentinel_active_alerts{severity=\"CRITICAL\"} 1"));
    }
}
