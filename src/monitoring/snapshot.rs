//! Metrics Snapshot
//!
//! Input records and the point-in-time copy of the aggregate handed to readers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Test Results
// =============================================================================

/// Outcome of a single test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test passed
    Passed,
    /// Test failed
    Failed,
    /// Test was skipped
    Skipped,
    /// Status could not be determined
    Unknown,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Skipped => write!(f, "skipped"),
            TestStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A finished test as reported by the runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Package the test belongs to
    pub package: String,
    /// Outcome
    pub status: TestStatus,
}

impl TestResult {
    /// Create a new test result
    pub fn new(name: impl Into<String>, package: impl Into<String>, status: TestStatus) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            status,
        }
    }

    /// Passed result with no package
    pub fn passed(name: impl Into<String>) -> Self {
        Self::new(name, "", TestStatus::Passed)
    }

    /// Failed result with no package
    pub fn failed(name: impl Into<String>) -> Self {
        Self::new(name, "", TestStatus::Failed)
    }

    /// Skipped result with no package
    pub fn skipped(name: impl Into<String>) -> Self {
        Self::new(name, "", TestStatus::Skipped)
    }
}

// =============================================================================
// Runtime Stats
// =============================================================================

/// Live process statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Resident memory of the process in bytes
    pub memory_usage_bytes: u64,

    /// Process CPU usage in percent
    pub cpu_usage_percent: f64,

    /// Number of live async tasks on the current runtime
    pub task_count: usize,

    /// Time since the store was created
    #[serde(rename = "uptime_ms", with = "duration_ms")]
    pub uptime: Duration,
}

// =============================================================================
// Metrics Snapshot
// =============================================================================

/// Independently-owned copy of the aggregate metrics state.
///
/// Derived fields obey:
/// - `average_test_time == total_execution_time / tests_executed`, zero when
///   nothing has executed
/// - `error_rate_percent == errors_total / tests_executed * 100`, zero when
///   nothing has executed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    // Test execution
    pub tests_executed: u64,
    pub tests_succeeded: u64,
    pub tests_failed: u64,
    pub tests_skipped: u64,
    #[serde(rename = "total_execution_time_ms", with = "duration_ms")]
    pub total_execution_time: Duration,
    #[serde(rename = "average_test_time_ms", with = "duration_ms")]
    pub average_test_time: Duration,

    // File watching
    pub files_watched: u64,
    pub file_changes_detected: u64,
    pub watch_cycles: u64,

    // Cache
    pub cache_hits: u64,
    pub cache_misses: u64,

    // Errors
    pub errors_total: u64,
    pub errors_by_type: HashMap<String, u64>,
    pub error_rate_percent: f64,

    // Custom
    pub custom_counters: HashMap<String, i64>,
    pub custom_gauges: HashMap<String, f64>,
    #[serde(with = "duration_ms_map")]
    pub custom_timers: HashMap<String, Duration>,

    /// Runtime introspection taken when the snapshot was produced
    pub runtime: RuntimeStats,

    /// Time of the last recorded write
    pub last_update: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Percentage of executed tests that passed, zero when nothing ran
    pub fn success_rate(&self) -> f64 {
        if self.tests_executed == 0 {
            return 0.0;
        }
        self.tests_succeeded as f64 / self.tests_executed as f64 * 100.0
    }

    /// Total cache lookups
    pub fn cache_operations(&self) -> u64 {
        self.cache_hits + self.cache_misses
    }

    /// Cache hit percentage, zero when there were no lookups
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_operations();
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64 * 100.0
    }
}

// =============================================================================
// Serde Helpers
// =============================================================================

/// Durations as fractional milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).map_err(serde::de::Error::custom)
    }
}

/// Maps of durations as fractional milliseconds.
pub(crate) mod duration_ms_map {
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = s.serialize_map(Some(map.len()))?;
        for (k, v) in map {
            out.serialize_entry(k, &(v.as_secs_f64() * 1000.0))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<HashMap<String, Duration>, D::Error> {
        let raw = HashMap::<String, f64>::deserialize(d)?;
        raw.into_iter()
            .map(|(k, ms)| {
                Duration::try_from_secs_f64(ms.max(0.0) / 1000.0)
                    .map(|d| (k, d))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(TestStatus::Passed.to_string(), "passed");
        assert_eq!(TestStatus::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_rates_with_no_data() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.success_rate(), 0.0);
        assert_eq!(snapshot.cache_hit_rate(), 0.0);
    }

    #[test]
    fn test_rates() {
        let snapshot = MetricsSnapshot {
            tests_executed: 4,
            tests_succeeded: 3,
            cache_hits: 1,
            cache_misses: 3,
            ..Default::default()
        };
        assert_eq!(snapshot.success_rate(), 75.0);
        assert_eq!(snapshot.cache_hit_rate(), 25.0);
    }

    #[test]
    fn test_empty_maps_serialize_as_objects() {
        let json = serde_json::to_value(MetricsSnapshot::default()).unwrap();
        assert_eq!(json["errors_by_type"], serde_json::json!({}));
        assert_eq!(json["custom_counters"], serde_json::json!({}));
        assert_eq!(json["custom_gauges"], serde_json::json!({}));
        assert_eq!(json["custom_timers"], serde_json::json!({}));
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let mut snapshot = MetricsSnapshot {
            average_test_time: Duration::from_millis(10),
            ..Default::default()
        };
        snapshot
            .custom_timers
            .insert("compile".to_string(), Duration::from_micros(1500));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["average_test_time_ms"], serde_json::json!(10.0));
        assert_eq!(json["custom_timers"]["compile"], serde_json::json!(1.5));

        let back: MetricsSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.average_test_time, Duration::from_millis(10));
    }
}
