//! Budgeted agent driver.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::events::{AgentEvent, AgentOutcome, EventSink, FinishReason, TokenUsage};
use super::{AgentAdapter, AgentRequest};
use crate::error::AgentError;
use crate::execution::CommandExec;

/// Summary of a finished agent invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    pub usage: TokenUsage,
    pub tool_calls: u32,
    pub messages: u32,
    pub num_turns: u32,
    pub duration: Duration,
    pub outcome: Option<AgentOutcome>,
}

/// Runs an [`AgentAdapter`] under a wall-clock timeout and a step budget.
pub struct AgentInvoker<A> {
    adapter: A,
    timeout: Duration,
    max_steps: u32,
}

impl<A: AgentAdapter> AgentInvoker<A> {
    pub fn new(adapter: A, timeout: Duration, max_steps: u32) -> Self {
        Self {
            adapter,
            timeout,
            max_steps,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Drives the agent to completion.
    ///
    /// Every event is forwarded to `sink` before budgets are checked, so the
    /// call that broke the budget is still logged. Sink failures are logged
    /// and otherwise ignored.
    ///
    /// # Errors
    ///
    /// - `TimeoutExceeded` when the wall-clock budget runs out. The agent's
    ///   stream is dropped; the caller is responsible for tearing down the
    ///   container it ran in.
    /// - `StepLimitExceeded` when more than `max_steps` tool calls are seen
    ///   or the agent reports it ran out of turns.
    /// - `Invocation` / `MalformedOutput` / `Exec` for everything else.
    pub async fn invoke(
        &self,
        request: &AgentRequest,
        exec: &dyn CommandExec,
        sink: &mut dyn EventSink,
    ) -> Result<AgentRun, AgentError> {
        let started = Instant::now();
        info!(
            task_id = %request.task_id,
            agent = %self.adapter.name(),
            timeout_secs = self.timeout.as_secs(),
            max_steps = self.max_steps,
            "Starting agent"
        );

        match tokio::time::timeout(self.timeout, self.drive(request, exec, sink)).await {
            Ok(Ok(mut run)) => {
                run.duration = started.elapsed();
                info!(
                    task_id = %request.task_id,
                    tool_calls = run.tool_calls,
                    tokens = run.usage.total(),
                    elapsed_secs = run.duration.as_secs_f64(),
                    "Agent finished"
                );
                Ok(run)
            }
            Ok(Err(e)) => {
                warn!(task_id = %request.task_id, error = %e, "Agent failed");
                Err(e)
            }
            Err(_) => {
                warn!(task_id = %request.task_id, "Agent timed out after {:?}", self.timeout);
                Err(AgentError::TimeoutExceeded {
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }

    async fn drive(
        &self,
        request: &AgentRequest,
        exec: &dyn CommandExec,
        sink: &mut dyn EventSink,
    ) -> Result<AgentRun, AgentError> {
        let mut events = self.adapter.events(request, exec);
        let mut run = AgentRun::default();

        while let Some(event) = events.next().await {
            let event = event?;
            if let Err(e) = sink.record(&event).await {
                warn!(task_id = %request.task_id, error = %e, "Failed to record agent event");
            }

            match event {
                AgentEvent::ToolCall { ref name, .. } => {
                    run.tool_calls += 1;
                    debug!(task_id = %request.task_id, tool = %name, step = run.tool_calls, "Tool call");
                    if run.tool_calls > self.max_steps {
                        return Err(AgentError::StepLimitExceeded {
                            limit: self.max_steps,
                            reason: format!("{} tool calls", run.tool_calls),
                        });
                    }
                }
                AgentEvent::Message { .. } => run.messages += 1,
                AgentEvent::Finished(outcome) => {
                    run.usage = outcome.usage;
                    run.num_turns = outcome.num_turns;
                    return match outcome.reason.clone() {
                        FinishReason::Completed => {
                            run.outcome = Some(outcome);
                            Ok(run)
                        }
                        FinishReason::MaxTurns => Err(AgentError::StepLimitExceeded {
                            limit: self.max_steps,
                            reason: format!("agent stopped after {} turns", outcome.num_turns),
                        }),
                        FinishReason::Error(message) => Err(AgentError::Invocation(message)),
                    };
                }
                AgentEvent::Started { .. } | AgentEvent::ToolResult { .. } => {}
            }
        }

        Err(AgentError::Invocation(
            "agent event stream ended without a result".to_string(),
        ))
    }
}
