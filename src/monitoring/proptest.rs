//! Property-Based Tests for the Monitoring Core
//!
//! # Test Properties
//!
//! 1. **FIFO Bound**: a series holds exactly the last `capacity` points
//! 2. **Average**: average test time is the total divided by executions
//! 3. **Error Rate**: errors per execution, independent of recording order
//! 4. **Determinism**: the same snapshot fires the same set of rule names

#![cfg(test)]

use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;

use super::alerts::{AlertEvaluator, AlertRule, ComparisonOp, MetricId, Severity};
use super::snapshot::{MetricsSnapshot, RuntimeStats, TestResult};
use super::store::MetricsStore;
use super::trends::TrendStore;

// =============================================================================
// Property Strategies
// =============================================================================

fn operator_strategy() -> impl Strategy<Value = ComparisonOp> {
    prop_oneof![
        Just(ComparisonOp::Gt),
        Just(ComparisonOp::Lt),
        Just(ComparisonOp::Gte),
        Just(ComparisonOp::Lte),
        Just(ComparisonOp::Eq),
    ]
}

/// Rules over known metrics plus the occasional unknown name
fn rule_strategy() -> impl Strategy<Value = AlertRule> {
    let metric = prop_oneof![
        4 => (0..MetricId::ALL.len()).prop_map(|i| MetricId::ALL[i].as_str().to_string()),
        1 => "[a-z]{3,8}_bogus",
    ];
    (metric, operator_strategy(), 0u32..200, "[a-z]{1,6}").prop_map(
        |(metric, op, threshold, name)| {
            AlertRule::new(name, metric, op, threshold as f64, Severity::Medium)
        },
    )
}

fn snapshot_strategy() -> impl Strategy<Value = MetricsSnapshot> {
    (0u64..100, 0u64..100, 0u64..100, 0u32..150, 0u64..4096).prop_map(
        |(executed, failed, errors, rate, memory)| MetricsSnapshot {
            tests_executed: executed,
            tests_failed: failed.min(executed),
            tests_succeeded: executed - failed.min(executed),
            errors_total: errors,
            error_rate_percent: rate as f64,
            runtime: RuntimeStats {
                memory_usage_bytes: memory,
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

fn firing_names(evaluator: &AlertEvaluator) -> Vec<String> {
    let mut names: Vec<String> = evaluator.active().into_iter().map(|a| a.name).collect();
    names.sort();
    names
}

// =============================================================================
// Trend Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: after any sequence of appends the series is the suffix of
    /// length min(capacity, appended).
    #[test]
    fn prop_fifo_keeps_last_capacity(
        capacity in 0usize..20,
        values in prop::collection::vec(-1000.0f64..1000.0, 0..60),
    ) {
        let store = TrendStore::new(capacity);
        for v in &values {
            store.add_point("m", *v, Utc::now());
        }

        let kept: Vec<f64> = store.series("m").iter().map(|p| p.value).collect();
        let expected_len = capacity.min(values.len());
        prop_assert_eq!(kept.len(), expected_len);
        prop_assert_eq!(&kept[..], &values[values.len() - expected_len..]);
    }
}

// =============================================================================
// Store Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: average test time equals total / executions, zero when empty.
    #[test]
    fn prop_average_is_total_over_count(
        durations in prop::collection::vec(0u64..10_000, 0..40),
    ) {
        let store = MetricsStore::default();
        for ms in &durations {
            store.record_test_execution(Some(&TestResult::passed("t")), Duration::from_millis(*ms));
        }

        let snapshot = store.snapshot();
        let total: Duration = durations.iter().map(|ms| Duration::from_millis(*ms)).sum();
        prop_assert_eq!(snapshot.total_execution_time, total);
        if durations.is_empty() {
            prop_assert_eq!(snapshot.average_test_time, Duration::ZERO);
        } else {
            prop_assert_eq!(snapshot.average_test_time, total / durations.len() as u32);
        }
    }

    /// Property: error rate is errors / executions * 100 whatever the
    /// interleaving, zero with no executions.
    #[test]
    fn prop_error_rate_independent_of_order(
        ops in prop::collection::vec(any::<bool>(), 0..60),
    ) {
        let store = MetricsStore::default();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        for is_test in &ops {
            if *is_test {
                store.record_test_execution(None, Duration::from_millis(1));
            } else {
                store.record_error("io", &err);
            }
        }

        let tests = ops.iter().filter(|t| **t).count() as u64;
        let errors = ops.len() as u64 - tests;
        let snapshot = store.snapshot();
        prop_assert_eq!(snapshot.tests_executed, tests);
        prop_assert_eq!(snapshot.errors_total, errors);

        let expected = if tests == 0 { 0.0 } else { errors as f64 / tests as f64 * 100.0 };
        prop_assert_eq!(snapshot.error_rate_percent, expected);
    }
}

// =============================================================================
// Alert Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: evaluating the same snapshot twice yields the same names,
    /// and rules over unknown metrics never fire.
    #[test]
    fn prop_firing_set_is_deterministic(
        rules in prop::collection::vec(rule_strategy(), 0..12),
        snapshot in snapshot_strategy(),
    ) {
        let evaluator = AlertEvaluator::with_rules(rules.clone());

        evaluator.evaluate(&snapshot);
        let first = firing_names(&evaluator);
        evaluator.evaluate(&snapshot);
        let second = firing_names(&evaluator);
        prop_assert_eq!(&first, &second);

        let mut expected: Vec<String> = rules
            .iter()
            .filter(|r| match r.metric_id() {
                Some(id) => r.operator.compare(id.value(&snapshot), r.threshold),
                None => false,
            })
            .map(|r| r.name.clone())
            .collect();
        expected.sort();
        prop_assert_eq!(first, expected);
    }
}
