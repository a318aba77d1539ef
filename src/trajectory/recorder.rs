//! Append-only per-task log writer.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::Level;

use super::types::{LogPaths, MessageLogEntry, ToolEventType, ToolLogEntry, ToolStats};
use crate::agent::{AgentEvent, EventSink, FinishReason};
use crate::error::LogError;

/// Longest tool output kept in `agent.log`. `tools.jsonl` keeps it whole.
const AGENT_LOG_PREVIEW: usize = 500;

/// Writes `agent.log`, `tools.jsonl` and `messages.jsonl` for one task.
///
/// Every line is flushed as soon as it is written, so logs survive a task
/// that is killed by its timeout.
pub struct TaskRecorder {
    paths: LogPaths,
    agent_log: File,
    tools: File,
    messages: File,
    stats: ToolStats,
    tool_names: HashMap<String, String>,
}

impl TaskRecorder {
    /// Creates `<logs_root>/<task_id>/` and truncates its log files.
    pub async fn create(logs_root: &Path, task_id: &str) -> Result<Self, LogError> {
        let dir = logs_root.join(task_id);
        fs::create_dir_all(&dir).await?;
        let paths = LogPaths::in_dir(&dir);

        Ok(Self {
            agent_log: File::create(&paths.agent_log).await?,
            tools: File::create(&paths.tools).await?,
            messages: File::create(&paths.messages).await?,
            paths,
            stats: ToolStats::default(),
            tool_names: HashMap::new(),
        })
    }

    pub fn paths(&self) -> &LogPaths {
        &self.paths
    }

    pub fn stats(&self) -> ToolStats {
        self.stats
    }

    /// Appends `[timestamp] [LEVEL] message` to `agent.log`.
    pub async fn log(&mut self, level: Level, message: &str) -> Result<(), LogError> {
        let line = format!("[{}] [{}] {}\n", Utc::now().to_rfc3339(), level, message);
        self.agent_log.write_all(line.as_bytes()).await?;
        self.agent_log.flush().await?;
        Ok(())
    }

    async fn append_json<T: Serialize>(file: &mut File, entry: &T) -> Result<(), LogError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn record_tool(&mut self, entry: ToolLogEntry) -> Result<(), LogError> {
        Self::append_json(&mut self.tools, &entry).await
    }
}

#[async_trait]
impl EventSink for TaskRecorder {
    async fn record(&mut self, event: &AgentEvent) -> Result<(), LogError> {
        match event {
            AgentEvent::Started { session_id, model } => {
                let message = format!(
                    "Agent session started (session={}, model={})",
                    session_id.as_deref().unwrap_or("unknown"),
                    model.as_deref().unwrap_or("default")
                );
                self.log(Level::INFO, &message).await
            }
            AgentEvent::Message { role, content } => {
                self.stats.messages += 1;
                let entry = MessageLogEntry {
                    timestamp: Utc::now(),
                    role: *role,
                    content: content.clone(),
                };
                Self::append_json(&mut self.messages, &entry).await
            }
            AgentEvent::ToolCall { id, name, input } => {
                self.stats.record_call(name);
                self.tool_names.insert(id.clone(), name.clone());
                self.log(Level::INFO, &format!("Tool call: {} {}", name, input)).await?;
                self.record_tool(ToolLogEntry {
                    timestamp: Utc::now(),
                    event_type: ToolEventType::PreTool,
                    tool_name: name.clone(),
                    tool_use_id: id.clone(),
                    tool_input: Some(input.clone()),
                    tool_output: None,
                    is_error: false,
                })
                .await
            }
            AgentEvent::ToolResult {
                id,
                name,
                output,
                is_error,
            } => {
                let tool_name = name
                    .clone()
                    .or_else(|| self.tool_names.get(id).cloned())
                    .unwrap_or_else(|| "unknown".to_string());
                if *is_error {
                    self.stats.tool_errors += 1;
                    let message = format!(
                        "Tool {} failed: {}",
                        tool_name,
                        crate::harness::truncate(output, AGENT_LOG_PREVIEW)
                    );
                    self.log(Level::WARN, &message).await?;
                }
                self.record_tool(ToolLogEntry {
                    timestamp: Utc::now(),
                    event_type: ToolEventType::PostTool,
                    tool_name,
                    tool_use_id: id.clone(),
                    tool_input: None,
                    tool_output: Some(output.clone()),
                    is_error: *is_error,
                })
                .await
            }
            AgentEvent::Finished(outcome) => {
                let (level, status) = match &outcome.reason {
                    FinishReason::Completed => (Level::INFO, "completed".to_string()),
                    FinishReason::MaxTurns => (Level::WARN, "ran out of turns".to_string()),
                    FinishReason::Error(message) => (Level::ERROR, format!("failed: {}", message)),
                };
                let message = format!(
                    "Agent {} after {} turns ({} tokens)",
                    status,
                    outcome.num_turns,
                    outcome.usage.total()
                );
                self.log(level, &message).await
            }
        }
    }
}
