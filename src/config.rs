//! Monitor configuration
//!
//! Plain config structs with sensible defaults. They can be loaded from a
//! YAML file and are then overridden field by field from the command line.
//!
//! ```yaml
//! monitoring:
//!   runtime_refresh_interval: 30s
//!   export_format: prometheus
//!   thresholds:
//!     error_rate_percent: 5.0
//!     memory_usage_mb: 500
//! dashboard:
//!   trend_interval: 5s
//!   alert_interval: 30s
//!   realtime_interval: 1s
//!   max_data_points: 1000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::monitoring::{AlertRule, ExportFormat};

/// Interval used whenever a configured interval is zero.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Longest interval a periodic task will wait between ticks.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 3600);

// =============================================================================
// Monitoring Configuration
// =============================================================================

/// Configuration for the metrics store and its runtime refresher
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Enable metrics collection
    pub enabled: bool,

    /// Interval between runtime stat refreshes
    #[serde(deserialize_with = "deserialize_duration")]
    pub runtime_refresh_interval: Duration,

    /// Default export format
    pub export_format: ExportFormat,

    /// Thresholds used to seed the default alert rules
    pub thresholds: AlertThresholds,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runtime_refresh_interval: Duration::from_secs(30),
            export_format: ExportFormat::Json,
            thresholds: AlertThresholds::default(),
        }
    }
}

/// Thresholds for the built-in alert rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Error rate percentage above which `high_error_rate` fires
    pub error_rate_percent: f64,

    /// Resident memory in MiB above which `high_memory_usage` fires
    pub memory_usage_mb: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            error_rate_percent: 5.0,
            memory_usage_mb: 500,
        }
    }
}

// =============================================================================
// Dashboard Configuration
// =============================================================================

/// Configuration for the orchestrator's periodic tasks
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Interval between trend samples
    #[serde(deserialize_with = "deserialize_duration")]
    pub trend_interval: Duration,

    /// Interval between alert evaluations
    #[serde(deserialize_with = "deserialize_duration")]
    pub alert_interval: Duration,

    /// Interval between real-time snapshot refreshes
    #[serde(deserialize_with = "deserialize_duration")]
    pub realtime_interval: Duration,

    /// Maximum points kept per trend series (0 disables trend storage)
    pub max_data_points: usize,

    /// Refresh the real-time snapshot
    pub enable_real_time: bool,

    /// Evaluate alert rules
    pub enable_alerts: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            trend_interval: Duration::from_secs(5),
            alert_interval: Duration::from_secs(30),
            realtime_interval: Duration::from_secs(1),
            max_data_points: 1000,
            enable_real_time: true,
            enable_alerts: true,
        }
    }
}

// =============================================================================
// Settings File
// =============================================================================

/// Top-level settings as loaded from a YAML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Metrics store settings
    pub monitoring: MonitoringConfig,

    /// Orchestrator settings
    pub dashboard: DashboardConfig,

    /// Replaces the default alert rules when present
    pub alert_rules: Option<Vec<AlertRule>>,
}

impl MonitorSettings {
    /// Parse settings from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }
}

/// Replace a zero interval with [`FALLBACK_INTERVAL`] and clamp long ones
/// to [`MAX_INTERVAL`].
pub fn effective_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        FALLBACK_INTERVAL
    } else {
        interval.min(MAX_INTERVAL)
    }
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a duration string like "500ms", "30s", "5m", "1h" or "1h30m".
///
/// A bare number is read as seconds. Zero is accepted; callers that need a
/// positive interval go through [`effective_interval`].
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let unit = match c {
            'm' | 'M' if chars.peek().is_some_and(|n| *n == 's' || *n == 'S') => {
                chars.next();
                Duration::from_millis(1)
            }
            'h' | 'H' => Duration::from_secs(3600),
            'm' | 'M' => Duration::from_secs(60),
            's' | 'S' => Duration::from_secs(1),
            'd' | 'D' => Duration::from_secs(86400),
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total = accumulate(total, unit, num, s)?;
    }

    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total = accumulate(total, Duration::from_secs(1), num, s)?;
    }

    Ok(total)
}

/// `total + unit * count`, failing instead of wrapping or truncating
fn accumulate(total: Duration, unit: Duration, count: u64, input: &str) -> Result<Duration> {
    u32::try_from(count)
        .ok()
        .and_then(|count| unit.checked_mul(count))
        .and_then(|component| total.checked_add(component))
        .ok_or_else(|| Error::DurationParse(format!("duration out of range: {}", input)))
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
    }
}
