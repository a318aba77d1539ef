//! Coding agent invocation.
//!
//! An [`AgentAdapter`] knows how to start a particular agent inside a
//! container and how to read its progress back as [`AgentEvent`]s. The
//! [`AgentInvoker`] drives any adapter under a wall-clock and step budget
//! and forwards every event to an [`EventSink`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use setupbench_runner::agent::{AgentInvoker, AgentRequest, ClaudeCodeAgent, ClaudeCodeOptions};
//!
//! let agent = ClaudeCodeAgent::new(credential, ClaudeCodeOptions::default());
//! let invoker = AgentInvoker::new(agent, Duration::from_secs(7200), 100);
//! let run = invoker.invoke(&request, &container, &mut recorder).await?;
//! println!("{} tool calls, {} tokens", run.tool_calls, run.usage.total());
//! ```

pub mod claude_code;
pub mod events;
pub mod invoker;
pub mod prompt;

use std::pin::Pin;

use futures::Stream;

use crate::error::AgentError;
use crate::execution::CommandExec;

pub use claude_code::{ClaudeCodeAgent, ClaudeCodeOptions, StreamJsonParser};
pub use events::{
    AgentEvent, AgentOutcome, EventSink, FinishReason, MessageRole, TokenUsage,
};
pub use invoker::{AgentInvoker, AgentRun};
pub use prompt::render_system_prompt;

pub type AgentEventStream<'a> =
    Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send + 'a>>;

/// Input for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub task_id: String,
    /// The task's problem statement.
    pub prompt: String,
    pub system_prompt: String,
    /// Turn budget handed to the agent itself.
    pub max_steps: u32,
    /// Directory the agent starts in, inside the container.
    pub working_dir: String,
}

/// A coding agent that can be run through a [`CommandExec`].
pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Starts the agent and streams its events.
    ///
    /// The stream ends after a [`AgentEvent::Finished`] or an error. All
    /// side effects happen through `exec`.
    fn events<'a>(
        &'a self,
        request: &'a AgentRequest,
        exec: &'a dyn CommandExec,
    ) -> AgentEventStream<'a>;
}
