//! Runtime Probe
//!
//! Samples process memory, CPU usage and the live async task count.

use std::time::Instant;

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::debug;

use super::snapshot::RuntimeStats;

/// Samples live runtime statistics for the current process
pub struct RuntimeProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
}

impl RuntimeProbe {
    /// Create a new probe; uptime is measured from this call
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!("Process introspection unavailable: {}", e);
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            start_time: Instant::now(),
        }
    }

    /// Take a fresh sample.
    ///
    /// Memory and CPU fall back to zero when the platform does not expose
    /// process information. CPU usage needs two refreshes to be meaningful,
    /// so the first sample reports zero.
    pub fn sample(&self) -> RuntimeStats {
        let (memory_usage_bytes, cpu_usage_percent) = self
            .pid
            .and_then(|pid| {
                let mut system = self.system.lock();
                if !system.refresh_process(pid) {
                    return None;
                }
                system
                    .process(pid)
                    .map(|p| (p.memory(), f64::from(p.cpu_usage())))
            })
            .unwrap_or((0, 0.0));

        RuntimeStats {
            memory_usage_bytes,
            cpu_usage_percent,
            task_count: live_task_count(),
            uptime: self.start_time.elapsed(),
        }
    }
}

impl Default for RuntimeProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Live tasks on the ambient tokio runtime, zero outside of one
fn live_task_count() -> usize {
    tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks())
        .unwrap_or(0)
}
