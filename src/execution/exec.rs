//! Command execution boundary.
//!
//! The agent invoker and the validator only see [`CommandExec`]. Whether a
//! command runs through the Docker exec API or somewhere else is hidden
//! behind it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::DockerError;

/// One command to run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecRequest {
    /// Argument vector; no shell is implied.
    pub cmd: Vec<String>,
    /// `KEY=value` entries added for this command only.
    pub env: Vec<String>,
    pub working_dir: Option<String>,
}

impl ExecRequest {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// A piece of output from a running command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// Always the last item of a successful stream.
    Exit(i64),
}

pub type ExecStream = Pin<Box<dyn Stream<Item = Result<ExecChunk, DockerError>> + Send>>;

/// Result of executing a command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code of the command, `-1` when none was reported.
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end_matches('\n'), self.stderr),
        }
    }
}

/// Runs commands in one isolated execution context.
#[async_trait]
pub trait CommandExec: Send + Sync {
    /// Starts `request` and streams its output.
    fn exec_stream(&self, request: ExecRequest) -> ExecStream;

    /// Runs `request` to completion and collects its output.
    async fn exec(&self, request: ExecRequest) -> Result<ExecResult, DockerError> {
        collect_output(self.exec_stream(request)).await
    }
}

/// Drains an [`ExecStream`] into an [`ExecResult`].
pub async fn collect_output(mut stream: ExecStream) -> Result<ExecResult, DockerError> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = -1;

    while let Some(chunk) = stream.next().await {
        match chunk? {
            ExecChunk::Stdout(bytes) => stdout.extend_from_slice(&bytes),
            ExecChunk::Stderr(bytes) => stderr.extend_from_slice(&bytes),
            ExecChunk::Exit(code) => exit_code = code,
        }
    }

    Ok(ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Splits a byte stream into complete lines.
///
/// Chunk boundaries from the exec API do not line up with newlines, so
/// partial lines are buffered until their terminator arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Appends `bytes` and returns every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Returns the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}
