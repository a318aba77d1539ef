//! Records written to a task's log directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::MessageRole;

/// File names inside `logs/<instance_id>/`.
pub const AGENT_LOG_FILE: &str = "agent.log";
pub const TOOLS_LOG_FILE: &str = "tools.jsonl";
pub const MESSAGES_LOG_FILE: &str = "messages.jsonl";

/// Which side of a tool call an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventType {
    PreTool,
    PostTool,
}

/// One line of `tools.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: ToolEventType,
    pub tool_name: String,
    pub tool_use_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

/// One line of `messages.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
}

/// Per-task tool usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStats {
    pub total_tool_calls: u32,
    pub bash_calls: u32,
    pub read_calls: u32,
    pub write_calls: u32,
    pub edit_calls: u32,
    pub other_calls: u32,
    pub tool_errors: u32,
    pub messages: u32,
}

impl ToolStats {
    pub fn record_call(&mut self, tool_name: &str) {
        self.total_tool_calls += 1;
        match tool_name {
            "Bash" => self.bash_calls += 1,
            "Read" => self.read_calls += 1,
            "Write" => self.write_calls += 1,
            "Edit" | "MultiEdit" => self.edit_calls += 1,
            _ => self.other_calls += 1,
        }
    }
}

/// Locations of a task's log files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPaths {
    pub dir: PathBuf,
    pub agent_log: PathBuf,
    pub tools: PathBuf,
    pub messages: PathBuf,
}

impl LogPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            agent_log: dir.join(AGENT_LOG_FILE),
            tools: dir.join(TOOLS_LOG_FILE),
            messages: dir.join(MESSAGES_LOG_FILE),
        }
    }
}
