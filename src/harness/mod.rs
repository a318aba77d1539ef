//! Task orchestration.
//!
//! [`Harness`] takes each task through
//! `Loaded -> ContainerReady -> AgentRunning -> Validating -> Completed -> CleanedUp`,
//! records a [`RunResult`] per task and a [`RunSummary`] per batch.
//!
//! # Usage
//!
//! ```rust,ignore
//! use setupbench_runner::harness::Harness;
//!
//! let harness = Harness::new(runtime, agent, config, metrics);
//! let summary = harness.run_batch(&tasks).await?;
//! println!("{}/{} passed", summary.successful_tasks, summary.total_tasks);
//! ```

pub mod lifecycle;
pub mod report;
pub mod result;
pub mod runner;

pub use lifecycle::{Lifecycle, LifecycleEntry, TaskState, TransitionError};
pub use report::{read_results, write_result, write_summary};
pub use result::{CategoryStats, RunResult, RunSummary};
pub use runner::Harness;

/// Truncates `s` to at most `max` bytes on a char boundary.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}

/// Unique container name for one execution of `instance_id`.
pub fn container_name(instance_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("setupbench-{}-{}", instance_id, &suffix[..8])
}
