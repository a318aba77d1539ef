//! Per-task results and batch summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::LifecycleEntry;
use crate::agent::TokenUsage;
use crate::error::{ErrorKind, TaskError};
use crate::task::Task;
use crate::trajectory::{LogPaths, ToolStats};

/// Outcome of one task, persisted as `results/<instance_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub instance_id: String,
    pub task_type: String,
    pub base_image: String,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Tool calls the agent made.
    pub total_steps: u32,
    pub bash_calls: u32,
    pub read_calls: u32,
    pub write_calls: u32,
    pub edit_calls: u32,
    pub tool_errors: u32,
    pub messages: u32,
    pub total_tokens: u64,
    pub tokens: TokenUsage,
    pub wall_time_seconds: f64,
    pub validation_output: Option<String>,
    pub validation_exit_code: Option<i64>,
    #[serde(default)]
    pub agent_image: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    pub lifecycle: Vec<LifecycleEntry>,
    pub logs: Option<LogPaths>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub cleanup_error: Option<String>,
}

impl RunResult {
    /// An empty, unsuccessful result for `task`.
    pub fn pending(task: &Task) -> Self {
        let now = Utc::now();
        Self {
            instance_id: task.instance_id.clone(),
            task_type: task.category.to_string(),
            base_image: task.base_image.clone(),
            success: false,
            error_kind: None,
            error: None,
            total_steps: 0,
            bash_calls: 0,
            read_calls: 0,
            write_calls: 0,
            edit_calls: 0,
            tool_errors: 0,
            messages: 0,
            total_tokens: 0,
            tokens: TokenUsage::default(),
            wall_time_seconds: 0.0,
            validation_output: None,
            validation_exit_code: None,
            agent_image: None,
            container: None,
            lifecycle: Vec::new(),
            logs: None,
            started_at: now,
            completed_at: now,
            cleanup_error: None,
        }
    }

    pub fn apply_stats(&mut self, stats: &ToolStats) {
        self.total_steps = stats.total_tool_calls;
        self.bash_calls = stats.bash_calls;
        self.read_calls = stats.read_calls;
        self.write_calls = stats.write_calls;
        self.edit_calls = stats.edit_calls;
        self.tool_errors = stats.tool_errors;
        self.messages = stats.messages;
    }

    pub fn apply_usage(&mut self, usage: TokenUsage) {
        self.tokens = usage;
        self.total_tokens = usage.total();
    }

    /// Marks the task failed with `err`.
    pub fn fail(&mut self, err: &TaskError) {
        self.success = false;
        self.error_kind = Some(err.kind());
        self.error = Some(err.to_string());
    }
}

/// Success counts for one task category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: usize,
    pub successful: usize,
    pub success_rate: f64,
}

/// Aggregate over a batch, persisted as `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    /// Percentage, 0 to 100.
    pub success_rate: f64,
    pub avg_tokens: f64,
    pub avg_steps: f64,
    pub avg_time_seconds: f64,
    pub errors_by_kind: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, CategoryStats>,
    pub results: Vec<RunResult>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl RunSummary {
    /// Aggregates `results`. Averages are taken over all tasks.
    pub fn from_results(results: Vec<RunResult>) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };

        let mut errors_by_kind = BTreeMap::new();
        let mut by_category: BTreeMap<String, CategoryStats> = BTreeMap::new();
        for result in &results {
            if let Some(kind) = result.error_kind {
                *errors_by_kind.entry(kind.to_string()).or_insert(0) += 1;
            }
            let stats = by_category.entry(result.task_type.clone()).or_default();
            stats.total += 1;
            if result.success {
                stats.successful += 1;
            }
        }
        for stats in by_category.values_mut() {
            stats.success_rate = percent(stats.successful, stats.total);
        }

        Self {
            timestamp: Utc::now(),
            total_tasks: total,
            successful_tasks: successful,
            failed_tasks: total - successful,
            success_rate: percent(successful, total),
            avg_tokens: mean(results.iter().map(|r| r.total_tokens as f64).sum()),
            avg_steps: mean(results.iter().map(|r| r.total_steps as f64).sum()),
            avg_time_seconds: mean(results.iter().map(|r| r.wall_time_seconds).sum()),
            errors_by_kind,
            by_category,
            results,
        }
    }
}
