//! Per-task trajectory logs.
//!
//! Each task gets `logs/<instance_id>/` holding:
//!
//! - `agent.log`: human readable, `[timestamp] [LEVEL] message`
//! - `tools.jsonl`: one [`ToolLogEntry`] per `pre_tool` / `post_tool` event
//! - `messages.jsonl`: one [`MessageLogEntry`] per agent or user message
//!
//! [`TaskRecorder`] is an [`EventSink`](crate::agent::EventSink), so the
//! agent invoker writes these files directly as events arrive.

pub mod recorder;
pub mod types;

pub use recorder::TaskRecorder;
pub use types::{
    LogPaths, MessageLogEntry, ToolEventType, ToolLogEntry, ToolStats, AGENT_LOG_FILE,
    MESSAGES_LOG_FILE, TOOLS_LOG_FILE,
};
