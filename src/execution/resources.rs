//! Resource limits for task containers.

use serde::{Deserialize, Serialize};

/// Optional resource ceilings applied to every task container.
///
/// Unset fields leave the Docker default in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in megabytes.
    pub memory_mb: Option<u64>,
    /// CPU cores available (e.g., 0.5, 1.0, 2.0).
    pub cpus: Option<f64>,
    /// Maximum number of processes allowed.
    pub pids: Option<i64>,
}

impl ResourceLimits {
    pub fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    pub fn with_cpus(mut self, cpus: f64) -> Self {
        self.cpus = Some(cpus);
        self
    }

    pub fn with_pids(mut self, pids: i64) -> Self {
        self.pids = Some(pids);
        self
    }

    /// Returns memory limit in bytes.
    ///
    /// `None` when unset or when the value does not fit Docker's `i64`.
    pub fn memory_bytes(&self) -> Option<i64> {
        self.memory_mb
            .and_then(|mb| mb.checked_mul(1024 * 1024))
            .and_then(|bytes| i64::try_from(bytes).ok())
    }

    /// Returns CPU period in microseconds (fixed at 100ms).
    pub fn cpu_period(&self) -> Option<i64> {
        self.cpus.map(|_| 100_000)
    }

    /// Returns CPU quota based on cores allocated.
    ///
    /// quota = period * cores, so 1.0 core = 100000.
    pub fn cpu_quota(&self) -> Option<i64> {
        self.cpus.map(|cores| (100_000_f64 * cores) as i64)
    }
}
