//! Error types for setupbench-runner.
//!
//! Defines the error types for each subsystem:
//! - Task descriptor loading
//! - Process configuration (credentials, limits)
//! - Docker container and image management
//! - Agent invocation
//! - Per-task log recording and report writing
//!
//! [`TaskError`] is the task-level taxonomy. Every failure inside a single
//! task run is converted into one of its variants and recorded in the run
//! result instead of aborting the batch.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading task descriptors.
#[derive(Debug, Error)]
pub enum TaskLoadError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed task descriptor in '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid task '{id}': {reason}")]
    InvalidTask { id: String, reason: String },

    #[error("Duplicate instance_id '{id}' (first seen in '{first}', again in '{second}')")]
    DuplicateId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Unsupported task file extension: '{0}'")]
    UnsupportedFormat(PathBuf),

    #[error("No task descriptors found under '{0}'")]
    NoTasks(PathBuf),
}

/// Fatal configuration errors detected at process start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API credential missing: set {0} or pass --api-key")]
    MissingCredential(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Image '{0}' is not available")]
    ImageNotFound(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Invalid Dockerfile: {0}")]
    InvalidDockerfile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while driving the coding agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent invocation failed: {0}")]
    Invocation(String),

    #[error("Malformed agent output ({reason}): {line}")]
    MalformedOutput { line: String, reason: String },

    #[error("Agent exceeded wall-clock budget of {seconds}s")]
    TimeoutExceeded { seconds: u64 },

    #[error("Agent exceeded step budget of {limit}: {reason}")]
    StepLimitExceeded { limit: u32, reason: String },

    #[error("Failed to render system prompt: {0}")]
    Prompt(String),

    #[error("Agent exec failed: {0}")]
    Exec(#[from] DockerError),
}

/// Errors raised while writing per-task logs.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while writing or reading result files.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metrics export error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Machine-readable kind of a task-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ImageUnavailable,
    ContainerStartError,
    AgentInvocationError,
    TimeoutExceeded,
    StepLimitExceeded,
    ValidationExecutionError,
    WorkspaceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageUnavailable => "image_unavailable",
            Self::ContainerStartError => "container_start_error",
            Self::AgentInvocationError => "agent_invocation_error",
            Self::TimeoutExceeded => "timeout_exceeded",
            Self::StepLimitExceeded => "step_limit_exceeded",
            Self::ValidationExecutionError => "validation_execution_error",
            Self::WorkspaceError => "workspace_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure inside one task run.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Agent image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("Container failed to start: {0}")]
    ContainerStart(String),

    #[error("Agent invocation error: {0}")]
    AgentInvocation(String),

    #[error("Agent timed out after {seconds}s")]
    TimeoutExceeded { seconds: u64 },

    #[error("Agent exceeded step limit of {limit}: {reason}")]
    StepLimitExceeded { limit: u32, reason: String },

    #[error("Validation command could not be executed: {0}")]
    ValidationExecution(String),

    #[error("Workspace preparation failed: {0}")]
    Workspace(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ImageUnavailable(_) => ErrorKind::ImageUnavailable,
            Self::ContainerStart(_) => ErrorKind::ContainerStartError,
            Self::AgentInvocation(_) => ErrorKind::AgentInvocationError,
            Self::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            Self::StepLimitExceeded { .. } => ErrorKind::StepLimitExceeded,
            Self::ValidationExecution(_) => ErrorKind::ValidationExecutionError,
            Self::Workspace(_) => ErrorKind::WorkspaceError,
        }
    }
}

impl From<AgentError> for TaskError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::TimeoutExceeded { seconds } => Self::TimeoutExceeded { seconds },
            AgentError::StepLimitExceeded { limit, reason } => {
                Self::StepLimitExceeded { limit, reason }
            }
            other => Self::AgentInvocation(other.to_string()),
        }
    }
}
