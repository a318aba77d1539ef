//! Claude Code CLI adapter.
//!
//! Runs `claude -p` inside the task container with
//! `--output-format stream-json` and turns its JSON-lines output into
//! [`AgentEvent`]s.

use std::collections::HashMap;

use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use super::events::{AgentEvent, AgentOutcome, FinishReason, MessageRole, TokenUsage};
use super::{AgentAdapter, AgentEventStream, AgentRequest};
use crate::config::ApiCredential;
use crate::docker::launcher_path;
use crate::error::AgentError;
use crate::execution::{CommandExec, ExecChunk, ExecRequest, LineBuffer};

/// Upper bound on stderr kept for error messages.
const STDERR_TAIL_LIMIT: usize = 4000;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamLine {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Assistant {
        message: StreamMessage,
    },
    User {
        message: StreamMessage,
    },
    Result(ResultLine),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResultLine {
    #[serde(default)]
    subtype: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    num_turns: u32,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    usage: TokenUsage,
}

/// Flattens tool result content, which is either a string or a list of
/// text blocks.
fn tool_result_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Incremental parser for `stream-json` output.
#[derive(Debug, Default)]
pub struct StreamJsonParser {
    tool_names: HashMap<String, String>,
}

impl StreamJsonParser {
    /// Parses one output line into zero or more events.
    ///
    /// Blank lines yield nothing; anything that is not a JSON object of a
    /// known shape is an error.
    pub fn parse_line(&mut self, line: &str) -> Result<Vec<AgentEvent>, AgentError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }

        let parsed: StreamLine =
            serde_json::from_str(line).map_err(|e| AgentError::MalformedOutput {
                line: crate::harness::truncate(line, 200),
                reason: e.to_string(),
            })?;

        let events = match parsed {
            StreamLine::System {
                subtype,
                session_id,
                model,
            } => {
                if subtype.as_deref() == Some("init") {
                    vec![AgentEvent::Started { session_id, model }]
                } else {
                    Vec::new()
                }
            }
            StreamLine::Assistant { message } => self.content_events(MessageRole::Assistant, message),
            StreamLine::User { message } => self.content_events(MessageRole::User, message),
            StreamLine::Result(result) => vec![AgentEvent::Finished(Self::outcome(result))],
            StreamLine::Other => Vec::new(),
        };
        Ok(events)
    }

    fn content_events(&mut self, role: MessageRole, message: StreamMessage) -> Vec<AgentEvent> {
        let blocks = match message.content {
            MessageContent::Text(text) => {
                return vec![AgentEvent::Message {
                    role,
                    content: text,
                }];
            }
            MessageContent::Blocks(blocks) => blocks,
        };

        let mut events = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text } => {
                    if !text.trim().is_empty() {
                        events.push(AgentEvent::Message {
                            role,
                            content: text,
                        });
                    }
                }
                ContentBlock::ToolUse { id, name, input } => {
                    self.tool_names.insert(id.clone(), name.clone());
                    events.push(AgentEvent::ToolCall { id, name, input });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let name = self.tool_names.get(&tool_use_id).cloned();
                    events.push(AgentEvent::ToolResult {
                        id: tool_use_id,
                        name,
                        output: tool_result_text(&content),
                        is_error,
                    });
                }
                ContentBlock::Other => {}
            }
        }
        events
    }

    fn outcome(result: ResultLine) -> AgentOutcome {
        let reason = match result.subtype.as_str() {
            "error_max_turns" => FinishReason::MaxTurns,
            "success" if !result.is_error => FinishReason::Completed,
            other => FinishReason::Error(
                result
                    .result
                    .clone()
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| format!("agent reported '{other}'")),
            ),
        };
        AgentOutcome {
            reason,
            usage: result.usage,
            num_turns: result.num_turns,
            duration_ms: result.duration_ms,
            result_text: result.result,
        }
    }
}

/// Options for the Claude Code CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCodeOptions {
    /// Launcher path inside the agent image.
    pub executable: String,
    pub allowed_tools: Vec<String>,
    pub model: Option<String>,
}

impl Default for ClaudeCodeOptions {
    fn default() -> Self {
        Self {
            executable: launcher_path(),
            allowed_tools: crate::config::DEFAULT_ALLOWED_TOOLS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            model: None,
        }
    }
}

/// Drives the Claude Code CLI inside a container.
#[derive(Debug, Clone)]
pub struct ClaudeCodeAgent {
    credential: ApiCredential,
    options: ClaudeCodeOptions,
}

impl ClaudeCodeAgent {
    pub fn new(credential: ApiCredential, options: ClaudeCodeOptions) -> Self {
        Self {
            credential,
            options,
        }
    }

    /// Builds the exec request for one invocation.
    ///
    /// The credential goes into this exec's environment only.
    pub fn exec_request(&self, request: &AgentRequest) -> ExecRequest {
        let mut cmd = vec![
            self.options.executable.clone(),
            "-p".to_string(),
            request.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--append-system-prompt".to_string(),
            request.system_prompt.clone(),
            "--allowedTools".to_string(),
            self.options.allowed_tools.join(","),
            "--max-turns".to_string(),
            request.max_steps.to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        if let Some(model) = &self.options.model {
            cmd.push("--model".to_string());
            cmd.push(model.clone());
        }

        ExecRequest::new(cmd)
            .with_env(vec![
                self.credential.env_entry(),
                // Allows the permission bypass when running as root.
                "IS_SANDBOX=1".to_string(),
                "DISABLE_AUTOUPDATER=1".to_string(),
            ])
            .with_working_dir(request.working_dir.clone())
    }
}

impl AgentAdapter for ClaudeCodeAgent {
    fn name(&self) -> &str {
        "claude-code"
    }

    fn events<'a>(
        &'a self,
        request: &'a AgentRequest,
        exec: &'a dyn CommandExec,
    ) -> AgentEventStream<'a> {
        let exec_request = self.exec_request(request);

        Box::pin(async_stream::stream! {
            let mut output = exec.exec_stream(exec_request);
            let mut lines = LineBuffer::default();
            let mut parser = StreamJsonParser::default();
            let mut stderr_tail = String::new();
            let mut exit_code = None;
            let mut finished = false;

            while let Some(chunk) = output.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(AgentError::Exec(e));
                        return;
                    }
                };
                let completed = match chunk {
                    ExecChunk::Stdout(bytes) => lines.push(&bytes),
                    ExecChunk::Stderr(bytes) => {
                        stderr_tail.push_str(&String::from_utf8_lossy(&bytes));
                        if stderr_tail.len() > STDERR_TAIL_LIMIT {
                            let cut = stderr_tail.len() - STDERR_TAIL_LIMIT;
                            let cut = (cut..stderr_tail.len())
                                .find(|i| stderr_tail.is_char_boundary(*i))
                                .unwrap_or(stderr_tail.len());
                            stderr_tail.drain(..cut);
                        }
                        Vec::new()
                    }
                    ExecChunk::Exit(code) => {
                        exit_code = Some(code);
                        Vec::new()
                    }
                };
                for line in completed {
                    match parser.parse_line(&line) {
                        Ok(events) => {
                            for event in events {
                                finished |= matches!(event, AgentEvent::Finished(_));
                                yield Ok(event);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if let Some(rest) = lines.finish() {
                match parser.parse_line(&rest) {
                    Ok(events) => {
                        for event in events {
                            finished |= matches!(event, AgentEvent::Finished(_));
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            if !finished {
                debug!(?exit_code, "Agent output ended without a result line");
                let stderr = stderr_tail.trim();
                yield Err(AgentError::Invocation(format!(
                    "agent exited with code {} before reporting a result{}",
                    exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
                    if stderr.is_empty() { String::new() } else { format!(": {stderr}") }
                )));
            }
        })
    }
}
