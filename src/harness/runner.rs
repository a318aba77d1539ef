//! Harness orchestrator.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, warn, Level};

use super::lifecycle::{Lifecycle, TaskState};
use super::report::{write_result, write_summary};
use super::result::{RunResult, RunSummary};
use super::{container_name, truncate};
use crate::agent::{
    render_system_prompt, AgentAdapter, AgentEvent, AgentInvoker, AgentRequest, EventSink,
    TokenUsage,
};
use crate::config::HarnessConfig;
use crate::docker::WORKSPACE_MOUNT;
use crate::error::{LogError, ReportError, TaskError};
use crate::execution::{ContainerRuntime, ContainerSpec, RuntimeHandle};
use crate::metrics::HarnessMetrics;
use crate::task::{prepare_workspace, Task};
use crate::trajectory::TaskRecorder;
use crate::validation::Validator;

/// Longest validation output stored in a result.
const MAX_VALIDATION_OUTPUT: usize = 10_000;

/// Fans agent events out to the task's log files and the metrics registry.
struct TaskSink<'a> {
    recorder: &'a mut TaskRecorder,
    metrics: &'a HarnessMetrics,
    usage: Option<TokenUsage>,
}

#[async_trait]
impl EventSink for TaskSink<'_> {
    async fn record(&mut self, event: &AgentEvent) -> Result<(), LogError> {
        self.metrics.observe_event(event);
        if let AgentEvent::Finished(outcome) = event {
            self.usage = Some(outcome.usage);
        }
        self.recorder.record(event).await
    }
}

/// Runs tasks end to end.
///
/// Each task gets its own workspace, container, and log directory. The
/// container is removed exactly once whenever it was started, whatever
/// happened in between.
pub struct Harness<R: ContainerRuntime, A: AgentAdapter> {
    runtime: R,
    invoker: AgentInvoker<A>,
    validator: Validator,
    config: HarnessConfig,
    metrics: Arc<HarnessMetrics>,
}

impl<R: ContainerRuntime, A: AgentAdapter> Harness<R, A> {
    pub fn new(runtime: R, agent: A, config: HarnessConfig, metrics: Arc<HarnessMetrics>) -> Self {
        let invoker = AgentInvoker::new(agent, config.agent_timeout, config.max_steps);
        let validator = Validator::new(config.validation_timeout);
        Self {
            runtime,
            invoker,
            validator,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn metrics(&self) -> &HarnessMetrics {
        &self.metrics
    }

    /// Runs `tasks` with bounded concurrency.
    ///
    /// Results come back in input order. `summary.json` and `metrics.prom`
    /// are written once every task has finished.
    pub async fn run_batch(&self, tasks: &[Task]) -> Result<RunSummary, ReportError> {
        info!(
            tasks = tasks.len(),
            concurrency = self.config.concurrency,
            output = %self.config.output_dir.display(),
            "Starting batch"
        );

        let results: Vec<RunResult> = stream::iter(tasks.iter().map(|task| self.run_task(task)))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let summary = RunSummary::from_results(results);
        write_summary(&self.config.summary_path(), &summary).await?;
        self.metrics.write_to(&self.config.metrics_path()).await?;

        info!(
            total = summary.total_tasks,
            successful = summary.successful_tasks,
            success_rate = summary.success_rate,
            "Batch complete"
        );
        Ok(summary)
    }

    /// Runs one task. Never fails: every problem ends up in the result.
    pub async fn run_task(&self, task: &Task) -> RunResult {
        let started = Instant::now();
        let mut result = RunResult::pending(task);
        let mut lifecycle = Lifecycle::new();
        let mut container: Option<R::Handle> = None;
        info!(task_id = %task.instance_id, base_image = %task.base_image, "Task loaded");

        let (mut recorder, outcome) =
            match TaskRecorder::create(&self.config.logs_dir(), &task.instance_id).await {
                Ok(mut recorder) => {
                    let outcome = self
                        .execute(task, &mut lifecycle, &mut result, &mut recorder, &mut container)
                        .await;
                    (Some(recorder), outcome)
                }
                Err(e) => (
                    None,
                    Err(TaskError::Workspace(format!(
                        "failed to create log directory: {}",
                        e
                    ))),
                ),
            };

        match outcome {
            Ok(success) => result.success = success,
            Err(e) => {
                warn!(task_id = %task.instance_id, kind = %e.kind(), error = %e, "Task failed");
                result.fail(&e);
            }
        }
        self.transition(
            &task.instance_id,
            &mut lifecycle,
            TaskState::Completed {
                success: result.success,
            },
        );

        if let Some(handle) = container.take() {
            let name = handle.name().to_string();
            if let Err(e) = self.runtime.remove(handle).await {
                warn!(task_id = %task.instance_id, container = %name, error = %e, "Container cleanup failed");
                result.cleanup_error = Some(e.to_string());
            }
            self.metrics.container_removed();
        }
        self.transition(&task.instance_id, &mut lifecycle, TaskState::CleanedUp);

        result.wall_time_seconds = started.elapsed().as_secs_f64();
        result.completed_at = Utc::now();
        result.lifecycle = lifecycle.into_entries();

        if let Some(recorder) = recorder.as_mut() {
            result.apply_stats(&recorder.stats());
            result.logs = Some(recorder.paths().clone());
            let (level, message) = match &result.error {
                None if result.success => (Level::INFO, "Task succeeded".to_string()),
                None => (Level::WARN, "Task failed validation".to_string()),
                Some(error) => (Level::ERROR, format!("Task failed: {}", error)),
            };
            note(recorder, level, &message).await;
        }

        self.metrics
            .observe_task(&result.task_type, result.success, result.wall_time_seconds);
        if let Err(e) = write_result(&self.config.results_dir(), &result).await {
            warn!(task_id = %task.instance_id, error = %e, "Failed to write result");
        }

        info!(
            task_id = %task.instance_id,
            success = result.success,
            steps = result.total_steps,
            tokens = result.total_tokens,
            wall_time_secs = result.wall_time_seconds,
            "Task finished"
        );
        result
    }

    /// Everything between `Loaded` and `Completed`. Returns the validation
    /// verdict. A started container is left in `container` for cleanup.
    async fn execute(
        &self,
        task: &Task,
        lifecycle: &mut Lifecycle,
        result: &mut RunResult,
        recorder: &mut TaskRecorder,
        container: &mut Option<R::Handle>,
    ) -> Result<bool, TaskError> {
        let id = task.instance_id.as_str();

        let root = self.config.workspaces_dir();
        let fixtures = self.config.fixtures_for(id);
        let task_id = id.to_string();
        let workspace = tokio::task::spawn_blocking(move || {
            prepare_workspace(&root, &task_id, fixtures.as_deref())
        })
        .await
        .map_err(|e| TaskError::Workspace(e.to_string()))?
        .map_err(|e| TaskError::Workspace(e.to_string()))?;

        let image = self
            .runtime
            .ensure_agent_image(&task.base_image)
            .await
            .map_err(|e| TaskError::ImageUnavailable(e.to_string()))?;
        result.agent_image = Some(image.clone());
        note(recorder, Level::INFO, &format!("Using agent image {}", image)).await;

        let spec = ContainerSpec::new(container_name(id), image, id, workspace)
            .with_limits(self.config.limits.clone());
        let handle = self
            .runtime
            .start(spec)
            .await
            .map_err(|e| TaskError::ContainerStart(e.to_string()))?;
        self.metrics.container_started();
        result.container = Some(handle.name().to_string());
        note(recorder, Level::INFO, &format!("Container {} started", handle.name())).await;
        let handle = container.insert(handle);
        self.transition(id, lifecycle, TaskState::ContainerReady);

        self.transition(id, lifecycle, TaskState::AgentRunning);
        let request = AgentRequest {
            task_id: id.to_string(),
            prompt: task.problem_statement.clone(),
            system_prompt: render_system_prompt(task, WORKSPACE_MOUNT)?,
            max_steps: self.config.max_steps,
            working_dir: WORKSPACE_MOUNT.to_string(),
        };
        let mut sink = TaskSink {
            recorder: &mut *recorder,
            metrics: &self.metrics,
            usage: None,
        };
        let run = self.invoker.invoke(&request, &*handle, &mut sink).await;
        if let Some(usage) = sink.usage {
            result.apply_usage(usage);
        }
        if let Err(e) = run {
            note(recorder, Level::ERROR, &format!("Agent stopped: {}", e)).await;
            return Err(e.into());
        }

        self.transition(id, lifecycle, TaskState::Validating);
        note(
            recorder,
            Level::INFO,
            &format!("Validating with: {}", task.success_command),
        )
        .await;
        let outcome = self.validator.validate(&*handle, task).await?;
        result.validation_output = Some(truncate(&outcome.output, MAX_VALIDATION_OUTPUT));
        result.validation_exit_code = Some(outcome.exit_code);
        note(
            recorder,
            Level::INFO,
            &format!(
                "Validation exit code {}, success={}",
                outcome.exit_code, outcome.success
            ),
        )
        .await;

        Ok(outcome.success)
    }

    fn transition(&self, task_id: &str, lifecycle: &mut Lifecycle, next: TaskState) {
        let from = lifecycle.current();
        match lifecycle.advance(next) {
            Ok(()) => info!(task_id = %task_id, from = %from, to = %next, "Task state changed"),
            Err(e) => warn!(task_id = %task_id, error = %e, "Ignoring lifecycle transition"),
        }
    }
}

async fn note(recorder: &mut TaskRecorder, level: Level, message: &str) {
    if let Err(e) = recorder.log(level, message).await {
        warn!(error = %e, "Failed to write agent log");
    }
}
