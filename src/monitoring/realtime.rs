//! Real-Time Snapshot
//!
//! Holds the last key/value view of the metrics for polling consumers.
//! The broadcaster does no locking of its own; the orchestrator owns it
//! behind a lock and is the only writer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::snapshot::MetricsSnapshot;

/// A registered consumer of real-time updates.
///
/// Push delivery is not implemented; the registry exists so a transport can
/// be attached later without changing the snapshot shape.
#[derive(Debug, Clone, Serialize)]
pub struct Subscriber {
    pub id: String,
    pub last_ping: DateTime<Utc>,
    /// Metric keys the subscriber is interested in
    pub subscribed: Vec<String>,
}

/// Last materialized real-time view
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotBroadcaster {
    current: HashMap<String, Value>,
    last_update: DateTime<Utc>,
    subscribers: HashMap<String, Vec<Subscriber>>,
}

impl SnapshotBroadcaster {
    /// Empty view with no subscribers
    pub fn new() -> Self {
        Self {
            current: HashMap::new(),
            last_update: Utc::now(),
            subscribers: HashMap::new(),
        }
    }

    /// Replace the whole view and stamp it with the current time
    pub fn update(&mut self, values: HashMap<String, Value>) {
        self.current = values;
        self.last_update = Utc::now();
    }

    /// Current view
    pub fn current(&self) -> &HashMap<String, Value> {
        &self.current
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Registered subscribers across all metric keys
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.values().map(Vec::len).sum()
    }
}

impl Default for SnapshotBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Key/value view published on each real-time refresh
pub fn realtime_values(snapshot: &MetricsSnapshot) -> HashMap<String, Value> {
    HashMap::from([
        ("tests_executed".to_string(), json!(snapshot.tests_executed)),
        ("tests_succeeded".to_string(), json!(snapshot.tests_succeeded)),
        ("tests_failed".to_string(), json!(snapshot.tests_failed)),
        (
            "memory_usage".to_string(),
            json!(snapshot.runtime.memory_usage_bytes),
        ),
        (
            "cpu_usage".to_string(),
            json!(snapshot.runtime.cpu_usage_percent),
        ),
        ("error_rate".to_string(), json!(snapshot.error_rate_percent)),
    ])
}
