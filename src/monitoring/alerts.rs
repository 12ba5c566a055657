//! Alert Evaluation
//!
//! Threshold rules over a metrics snapshot.
//!
//! Every call to [`AlertEvaluator::evaluate`] rebuilds the active set from
//! nothing: an alert exists exactly as long as its rule matches the latest
//! snapshot. There is no hysteresis and no RESOLVED transition, and the
//! rule's `duration` is carried but not consulted.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::snapshot::MetricsSnapshot;
use crate::config::{deserialize_duration, AlertThresholds};

// =============================================================================
// Metric Identifiers
// =============================================================================

/// Metrics that alert rules can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricId {
    ErrorRate,
    MemoryUsage,
    CpuUsage,
    TestsExecuted,
    TestsSucceeded,
    TestsFailed,
    TestsSkipped,
    TaskCount,
    CacheHitRate,
    AverageTestTimeMs,
}

impl MetricId {
    /// Every known metric
    pub const ALL: [MetricId; 10] = [
        MetricId::ErrorRate,
        MetricId::MemoryUsage,
        MetricId::CpuUsage,
        MetricId::TestsExecuted,
        MetricId::TestsSucceeded,
        MetricId::TestsFailed,
        MetricId::TestsSkipped,
        MetricId::TaskCount,
        MetricId::CacheHitRate,
        MetricId::AverageTestTimeMs,
    ];

    /// Wire name used in rules
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::ErrorRate => "error_rate",
            MetricId::MemoryUsage => "memory_usage",
            MetricId::CpuUsage => "cpu_usage",
            MetricId::TestsExecuted => "tests_executed",
            MetricId::TestsSucceeded => "tests_succeeded",
            MetricId::TestsFailed => "tests_failed",
            MetricId::TestsSkipped => "tests_skipped",
            MetricId::TaskCount => "task_count",
            MetricId::CacheHitRate => "cache_hit_rate",
            MetricId::AverageTestTimeMs => "average_test_time_ms",
        }
    }

    /// Read this metric from a snapshot
    pub fn value(&self, snapshot: &MetricsSnapshot) -> f64 {
        match self {
            MetricId::ErrorRate => snapshot.error_rate_percent,
            MetricId::MemoryUsage => snapshot.runtime.memory_usage_bytes as f64,
            MetricId::CpuUsage => snapshot.runtime.cpu_usage_percent,
            MetricId::TestsExecuted => snapshot.tests_executed as f64,
            MetricId::TestsSucceeded => snapshot.tests_succeeded as f64,
            MetricId::TestsFailed => snapshot.tests_failed as f64,
            MetricId::TestsSkipped => snapshot.tests_skipped as f64,
            MetricId::TaskCount => snapshot.runtime.task_count as f64,
            MetricId::CacheHitRate => snapshot.cache_hit_rate(),
            MetricId::AverageTestTimeMs => snapshot.average_test_time.as_secs_f64() * 1000.0,
        }
    }
}

/// Returned when a rule names a metric outside [`MetricId::ALL`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMetric(pub String);

impl std::fmt::Display for UnknownMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown metric: {}", self.0)
    }
}

impl std::error::Error for UnknownMetric {}

impl FromStr for MetricId {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older rule files name the live task gauge this way
        if s == "goroutine_count" {
            return Ok(MetricId::TaskCount);
        }
        MetricId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

impl std::fmt::Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Comparison applied as `value <op> threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
}

impl ComparisonOp {
    /// Apply the comparison
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOp::Gt => value > threshold,
            ComparisonOp::Lt => value < threshold,
            ComparisonOp::Gte => value >= threshold,
            ComparisonOp::Lte => value <= threshold,
            ComparisonOp::Eq => value == threshold,
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Upper-case label used in exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative threshold condition over a named metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Rule name, copied onto alerts it produces
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Metric key, see [`MetricId`]
    pub metric: String,

    pub operator: ComparisonOp,

    pub threshold: f64,

    /// Minimum breach duration; not used by the evaluator
    #[serde(
        default,
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration: Duration,

    pub severity: Severity,

    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl AlertRule {
    /// Create a rule with no description, duration or labels
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        operator: ComparisonOp,
        threshold: f64,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            metric: metric.into(),
            operator,
            threshold,
            duration: Duration::ZERO,
            severity,
            labels: HashMap::new(),
        }
    }

    /// Set the human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set how long the condition should hold; stored but not consulted
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Add a label copied onto every alert the rule fires
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Resolve the metric key, `None` for unknown names
    pub fn metric_id(&self) -> Option<MetricId> {
        self.metric.parse().ok()
    }
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{}ms", d.as_millis()))
}

/// Built-in rules derived from configured thresholds
pub fn default_rules(thresholds: &AlertThresholds) -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "high_error_rate",
            MetricId::ErrorRate.as_str(),
            ComparisonOp::Gt,
            thresholds.error_rate_percent,
            Severity::High,
        )
        .with_description("Error rate is above threshold")
        .with_duration(Duration::from_secs(300))
        .with_label("component", "test_runner"),
        AlertRule::new(
            "high_memory_usage",
            MetricId::MemoryUsage.as_str(),
            ComparisonOp::Gt,
            thresholds.memory_usage_mb as f64 * 1024.0 * 1024.0,
            Severity::Medium,
        )
        .with_description("Memory usage is above threshold")
        .with_duration(Duration::from_secs(120))
        .with_label("component", "system"),
    ]
}

// =============================================================================
// Alerts
// =============================================================================

/// Alert lifecycle status; evaluation only ever produces `Firing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Firing,
}

/// A firing alert produced by one evaluation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub start_time: DateTime<Utc>,
    /// Metric value that breached the threshold
    pub value: f64,
    pub threshold: f64,
    pub labels: HashMap<String, String>,
}

// =============================================================================
// Evaluator
// =============================================================================

/// Holds alert rules and the active-alert set of the last evaluation
pub struct AlertEvaluator {
    rules: RwLock<Vec<AlertRule>>,
    active: RwLock<HashMap<String, Alert>>,
}

impl AlertEvaluator {
    /// Create an evaluator seeded with the default rules
    pub fn new() -> Self {
        Self::with_rules(default_rules(&AlertThresholds::default()))
    }

    /// Create an evaluator with the given rules
    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the whole rule set
    pub fn set_rules(&self, rules: Vec<AlertRule>) {
        *self.rules.write() = rules;
    }

    /// Append a rule
    pub fn add_rule(&self, rule: AlertRule) {
        self.rules.write().push(rule);
    }

    /// Current rules
    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().clone()
    }

    /// Recompute the active set from `snapshot`, replacing the previous one.
    ///
    /// Rules naming an unknown metric are skipped.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) {
        let now = Utc::now();
        let mut fired = HashMap::new();

        for rule in self.rules.read().iter() {
            let Some(metric) = rule.metric_id() else {
                debug!(rule = %rule.name, metric = %rule.metric, "Skipping rule with unknown metric");
                continue;
            };

            let value = metric.value(snapshot);
            if !rule.operator.compare(value, rule.threshold) {
                continue;
            }

            let alert = Alert {
                id: Uuid::new_v4().to_string(),
                name: rule.name.clone(),
                description: rule.description.clone(),
                severity: rule.severity,
                status: AlertStatus::Firing,
                start_time: now,
                value,
                threshold: rule.threshold,
                labels: rule.labels.clone(),
            };
            warn!(
                alert = %alert.name,
                severity = %alert.severity,
                value,
                threshold = rule.threshold,
                "Alert firing"
            );
            fired.insert(alert.id.clone(), alert);
        }

        *self.active.write() = fired;
    }

    /// Currently firing alerts, in no particular order
    pub fn active(&self) -> Vec<Alert> {
        self.active.read().values().cloned().collect()
    }

    /// Firing alerts with CRITICAL severity
    pub fn critical(&self) -> Vec<Alert> {
        self.active
            .read()
            .values()
            .filter(|a| a.severity == Severity::Critical)
            .cloned()
            .collect()
    }

    /// Number of firing alerts
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
