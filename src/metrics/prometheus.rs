//! Prometheus metrics for harness runs.

use std::path::Path;

use prometheus::{CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

use crate::agent::{AgentEvent, TokenUsage};
use crate::error::ReportError;

/// Metrics for one harness process.
///
/// Owns its own [`Registry`], so several harnesses (or tests) in one process
/// never collide on metric names.
#[derive(Clone)]
pub struct HarnessMetrics {
    registry: Registry,
    tasks_total: CounterVec,
    task_duration: HistogramVec,
    tool_calls_total: CounterVec,
    tokens_total: CounterVec,
    active_containers: Gauge,
}

impl HarnessMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_total = CounterVec::new(
            Opts::new("setupbench_tasks_total", "Total number of tasks completed"),
            &["status", "category"],
        )?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new(
                "setupbench_task_duration_seconds",
                "Task wall time in seconds, container start to cleanup",
            )
            .buckets(vec![30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0]),
            &["category"],
        )?;

        let tool_calls_total = CounterVec::new(
            Opts::new("setupbench_tool_calls_total", "Agent tool calls"),
            &["tool"],
        )?;

        let tokens_total = CounterVec::new(
            Opts::new("setupbench_tokens_total", "Tokens used by the agent"),
            &["type"],
        )?;

        let active_containers = Gauge::new(
            "setupbench_active_containers",
            "Number of task containers currently running",
        )?;

        registry.register(Box::new(tasks_total.clone()))?;
        registry.register(Box::new(task_duration.clone()))?;
        registry.register(Box::new(tool_calls_total.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(active_containers.clone()))?;

        Ok(Self {
            registry,
            tasks_total,
            task_duration,
            tool_calls_total,
            tokens_total,
            active_containers,
        })
    }

    pub fn observe_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::ToolCall { name, .. } => {
                self.tool_calls_total.with_label_values(&[name.as_str()]).inc();
            }
            AgentEvent::Finished(outcome) => self.observe_usage(&outcome.usage),
            _ => {}
        }
    }

    fn observe_usage(&self, usage: &TokenUsage) {
        let by_type = [
            ("input", usage.input_tokens),
            ("output", usage.output_tokens),
            ("cache_creation", usage.cache_creation_input_tokens),
            ("cache_read", usage.cache_read_input_tokens),
        ];
        for (kind, count) in by_type {
            self.tokens_total.with_label_values(&[kind]).inc_by(count as f64);
        }
    }

    /// Records a finished task.
    pub fn observe_task(&self, category: &str, success: bool, wall_time_secs: f64) {
        let status = if success { "success" } else { "failure" };
        self.tasks_total.with_label_values(&[status, category]).inc();
        self.task_duration
            .with_label_values(&[category])
            .observe(wall_time_secs);
    }

    pub fn container_started(&self) {
        self.active_containers.inc();
    }

    pub fn container_removed(&self) {
        self.active_containers.dec();
    }

    pub fn active_containers(&self) -> f64 {
        self.active_containers.get()
    }

    /// Encodes every metric in the Prometheus text format.
    pub fn export_text(&self) -> Result<String, ReportError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        let text = self.export_text()?;
        tokio::fs::write(path, text)
            .await
            .map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl std::fmt::Debug for HarnessMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessMetrics")
            .field("active_containers", &self.active_containers.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentOutcome, FinishReason};

    #[test]
    fn test_independent_registries() {
        assert!(HarnessMetrics::new().is_ok());
        assert!(HarnessMetrics::new().is_ok());
    }

    #[test]
    fn test_export_contains_observations() {
        let metrics = HarnessMetrics::new().unwrap();
        metrics.observe_event(&AgentEvent::ToolCall {
            id: "1".to_string(),
            name: "Bash".to_string(),
            input: serde_json::json!({}),
        });
        metrics.observe_event(&AgentEvent::Finished(AgentOutcome {
            reason: FinishReason::Completed,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
                ..Default::default()
            },
            num_turns: 1,
            duration_ms: None,
            result_text: None,
        }));
        metrics.observe_task("database_setup", true, 42.0);

        let text = metrics.export_text().unwrap();
        assert!(text.contains(r#"setupbench_tool_calls_total{tool="Bash"} 1"#));
        assert!(text.contains(r#"setupbench_tokens_total{type="input"} 100"#));
        assert!(text.contains(r#"setupbench_tasks_total{category="database_setup",status="success"} 1"#));
        assert!(text.contains("setupbench_task_duration_seconds_count"));
    }

    #[test]
    fn test_active_containers_gauge() {
        let metrics = HarnessMetrics::new().unwrap();
        metrics.container_started();
        metrics.container_started();
        metrics.container_removed();
        assert_eq!(metrics.active_containers(), 1.0);
    }

    #[tokio::test]
    async fn test_write_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.prom");
        let metrics = HarnessMetrics::new().unwrap();
        metrics.container_started();

        metrics.write_to(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("setupbench_active_containers 1"));
    }
}
