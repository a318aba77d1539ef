//! Typed agent events.
//!
//! Agents report progress as a stream of [`AgentEvent`]s. Consumers (the
//! per-task recorder, metrics) implement [`EventSink`] and never see how
//! the agent itself was driven.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Token usage reported by the agent backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    /// All tokens, cached ones included.
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Why the agent stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Completed,
    /// The agent ran out of turns before finishing.
    MaxTurns,
    Error(String),
}

/// Final report of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub reason: FinishReason,
    pub usage: TokenUsage,
    pub num_turns: u32,
    pub duration_ms: Option<u64>,
    pub result_text: Option<String>,
}

/// One thing the agent did or said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Started {
        session_id: Option<String>,
        model: Option<String>,
    },
    Message {
        role: MessageRole,
        content: String,
    },
    /// Emitted before a tool runs.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Emitted after a tool ran.
    ToolResult {
        id: String,
        name: Option<String>,
        output: String,
        is_error: bool,
    },
    Finished(AgentOutcome),
}

/// Consumer of agent events.
#[async_trait]
pub trait EventSink: Send {
    async fn record(&mut self, event: &AgentEvent) -> Result<(), LogError>;
}

/// Sink that keeps every event in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CollectingSink {
    pub events: Vec<AgentEvent>,
}

#[cfg(test)]
#[async_trait]
impl EventSink for CollectingSink {
    async fn record(&mut self, event: &AgentEvent) -> Result<(), LogError> {
        self.events.push(event.clone());
        Ok(())
    }
}
