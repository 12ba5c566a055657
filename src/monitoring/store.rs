//! Metrics Store
//!
//! Lock-guarded aggregate of test-execution, cache, error and custom metrics.
//!
//! Every writer takes the write half of a single readers-writer lock, so a
//! snapshot never observes a half-applied record. Derived values (average
//! test time, error rate) are recomputed inside the same critical section as
//! the write that changes their inputs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::export::{self, ExportFormat};
use super::runtime::RuntimeProbe;
use super::snapshot::{MetricsSnapshot, TestResult, TestStatus};
use crate::config::{effective_interval, MonitoringConfig};
use crate::error::Result;

/// Concurrency-safe metrics aggregate
pub struct MetricsStore {
    /// Configuration
    config: MonitoringConfig,
    /// Aggregate state
    state: RwLock<MetricsSnapshot>,
    /// Process sampler
    probe: RuntimeProbe,
}

impl MetricsStore {
    /// Create a new metrics store
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            state: RwLock::new(MetricsSnapshot::default()),
            probe: RuntimeProbe::new(),
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(MonitoringConfig::default())
    }

    /// Get configuration
    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// Record one test execution.
    ///
    /// A missing result still counts as an execution and adds its duration,
    /// but bumps no status counter.
    pub fn record_test_execution(&self, result: Option<&TestResult>, duration: Duration) {
        let mut state = self.state.write();

        state.total_execution_time = state.total_execution_time.saturating_add(duration);
        state.tests_executed = state.tests_executed.saturating_add(1);

        if let Some(result) = result {
            match result.status {
                TestStatus::Passed => state.tests_succeeded += 1,
                TestStatus::Failed => state.tests_failed += 1,
                TestStatus::Skipped => state.tests_skipped += 1,
                TestStatus::Unknown => {}
            }
        }

        recompute_derived(&mut state);
        state.last_update = Some(Utc::now());
    }

    /// Record a detected file change
    pub fn record_file_change(&self, change_type: &str) {
        let mut state = self.state.write();
        state.file_changes_detected += 1;
        state.last_update = Some(Utc::now());
        drop(state);

        debug!(change_type, "File change recorded");
    }

    /// Record one completed watch cycle
    pub fn record_watch_cycle(&self) {
        let mut state = self.state.write();
        state.watch_cycles += 1;
        state.last_update = Some(Utc::now());
    }

    /// Set the number of files currently watched
    pub fn set_files_watched(&self, count: u64) {
        let mut state = self.state.write();
        state.files_watched = count;
        state.last_update = Some(Utc::now());
    }

    /// Record a cache lookup
    pub fn record_cache_operation(&self, hit: bool) {
        let mut state = self.state.write();
        if hit {
            state.cache_hits += 1;
        } else {
            state.cache_misses += 1;
        }
        state.last_update = Some(Utc::now());
    }

    /// Record an error of the given type
    pub fn record_error(&self, error_type: &str, err: &dyn std::error::Error) {
        let mut state = self.state.write();
        state.errors_total += 1;
        *state.errors_by_type.entry(error_type.to_string()).or_insert(0) += 1;
        recompute_derived(&mut state);
        state.last_update = Some(Utc::now());
        drop(state);

        debug!(error_type, error = %err, "Error recorded");
    }

    /// Add `delta` to a custom counter, creating it at zero
    pub fn increment_custom_counter(&self, name: &str, delta: i64) {
        let mut state = self.state.write();
        let counter = state.custom_counters.entry(name.to_string()).or_insert(0);
        *counter = counter.saturating_add(delta);
        state.last_update = Some(Utc::now());
    }

    /// Set a custom gauge
    pub fn set_custom_gauge(&self, name: &str, value: f64) {
        let mut state = self.state.write();
        state.custom_gauges.insert(name.to_string(), value);
        state.last_update = Some(Utc::now());
    }

    /// Set a custom timer, replacing any previous value
    pub fn record_custom_timer(&self, name: &str, duration: Duration) {
        let mut state = self.state.write();
        state.custom_timers.insert(name.to_string(), duration);
        state.last_update = Some(Utc::now());
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        *self.state.write() = MetricsSnapshot::default();
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Get an independently-owned copy of the current metrics.
    ///
    /// Runtime stats are sampled fresh after the read lock is released.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = {
            let state = self.state.read();
            MetricsSnapshot {
                tests_executed: state.tests_executed,
                tests_succeeded: state.tests_succeeded,
                tests_failed: state.tests_failed,
                tests_skipped: state.tests_skipped,
                total_execution_time: state.total_execution_time,
                average_test_time: state.average_test_time,
                files_watched: state.files_watched,
                file_changes_detected: state.file_changes_detected,
                watch_cycles: state.watch_cycles,
                cache_hits: state.cache_hits,
                cache_misses: state.cache_misses,
                errors_total: state.errors_total,
                errors_by_type: state.errors_by_type.clone(),
                error_rate_percent: state.error_rate_percent,
                custom_counters: state.custom_counters.clone(),
                custom_gauges: state.custom_gauges.clone(),
                custom_timers: state.custom_timers.clone(),
                runtime: state.runtime,
                last_update: state.last_update,
            }
        };

        snapshot.runtime = self.probe.sample();
        snapshot
    }

    /// Export the current metrics
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        let snapshot = self.snapshot();
        match format {
            ExportFormat::Json => export::snapshot_to_json(&snapshot),
            ExportFormat::Prometheus => export::to_prometheus(&snapshot),
        }
    }

    // =========================================================================
    // Runtime Refresh
    // =========================================================================

    /// Store a fresh runtime sample
    pub fn refresh_runtime(&self) {
        let sample = self.probe.sample();
        self.state.write().runtime = sample;
    }

    /// Periodically refresh runtime stats until `token` is cancelled
    #[instrument(skip_all)]
    pub async fn run_runtime_refresh(self: Arc<Self>, token: CancellationToken) {
        if !self.config.enabled {
            info!("Monitoring disabled, runtime refresh not started");
            return;
        }

        let period = effective_interval(self.config.runtime_refresh_interval);
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = period.as_millis() as u64, "Runtime refresh started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => self.refresh_runtime(),
            }
        }

        info!("Runtime refresh stopped");
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::default_config()
    }
}

fn recompute_derived(state: &mut MetricsSnapshot) {
    if state.tests_executed == 0 {
        state.average_test_time = Duration::ZERO;
        state.error_rate_percent = 0.0;
        return;
    }

    state.average_test_time = state
        .total_execution_time
        .checked_div(u32::try_from(state.tests_executed).unwrap_or(u32::MAX))
        .unwrap_or(Duration::ZERO);
    state.error_rate_percent =
        state.errors_total as f64 / state.tests_executed as f64 * 100.0;
}

// =============================================================================
// Tests
// =============================================================================
