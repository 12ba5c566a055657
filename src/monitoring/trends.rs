//! Trend Store
//!
//! Per-metric history of timestamped samples, each series bounded to a fixed
//! number of points with strict FIFO eviction. Points keep insertion order;
//! timestamps are stored as given and never used for reordering.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Series recorded by the orchestrator's trend task
pub mod series {
    pub const TEST_SUCCESS_RATE: &str = "test_success_rate";
    pub const ERROR_RATE: &str = "error_rate";
    pub const MEMORY_USAGE: &str = "memory_usage";
    pub const CPU_USAGE: &str = "cpu_usage";
    pub const CACHE_HIT_RATE: &str = "cache_hit_rate";
}

/// Relative change between the older and newer half of a series below which
/// the series counts as stable
const STABLE_BAND: f64 = 0.05;

/// A single sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Direction a series is moving in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

/// Capacity-bounded time series keyed by metric name
pub struct TrendStore {
    max_points: usize,
    series: RwLock<HashMap<String, VecDeque<TimeSeriesPoint>>>,
}

impl TrendStore {
    /// Create a store keeping at most `max_points` per series.
    ///
    /// With `max_points == 0` every [`add_point`](Self::add_point) is dropped.
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Configured capacity per series
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Append a point, evicting the oldest when over capacity
    pub fn add_point(&self, metric: &str, value: f64, timestamp: DateTime<Utc>) {
        if self.max_points == 0 {
            return;
        }

        let mut series = self.series.write();
        let points = series
            .entry(metric.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.max_points.min(64)));

        points.push_back(TimeSeriesPoint { timestamp, value });
        while points.len() > self.max_points {
            points.pop_front();
        }
    }

    /// Points for `metric`, oldest first; empty for unknown metrics
    pub fn series(&self, metric: &str) -> Vec<TimeSeriesPoint> {
        self.series
            .read()
            .get(metric)
            .map(|points| points.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of points held for `metric`
    pub fn len(&self, metric: &str) -> usize {
        self.series.read().get(metric).map_or(0, VecDeque::len)
    }

    /// Names of all series, sorted
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of every series
    pub fn all_series(&self) -> HashMap<String, Vec<TimeSeriesPoint>> {
        self.series
            .read()
            .iter()
            .map(|(name, points)| (name.clone(), points.iter().copied().collect()))
            .collect()
    }

    /// Compare the mean of the older half of a series against the newer half.
    ///
    /// `higher_is_better` sets the polarity: for a success rate a rising mean
    /// is an improvement, for an error rate it is a degradation. Series with
    /// fewer than two points are stable.
    pub fn trend_direction(&self, metric: &str, higher_is_better: bool) -> TrendDirection {
        let series = self.series.read();
        let Some(points) = series.get(metric) else {
            return TrendDirection::Stable;
        };
        if points.len() < 2 {
            return TrendDirection::Stable;
        }

        let mid = points.len() / 2;
        let older = mean(points.iter().take(mid));
        let newer = mean(points.iter().skip(mid));

        let scale = older.abs().max(f64::EPSILON);
        let change = (newer - older) / scale;
        if change.abs() <= STABLE_BAND {
            return TrendDirection::Stable;
        }

        match (change > 0.0, higher_is_better) {
            (true, true) | (false, false) => TrendDirection::Improving,
            _ => TrendDirection::Degrading,
        }
    }
}

fn mean<'a>(points: impl Iterator<Item = &'a TimeSeriesPoint>) -> f64 {
    let (sum, n) = points.fold((0.0, 0usize), |(sum, n), p| (sum + p.value, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
