//! setupbench-runner: a harness for SetupBench environment-setup tasks.
//!
//! Each task is run in its own Docker container derived from the task's
//! base image. A coding agent (Claude Code) works inside the container, then
//! the task's success command is run in a new login shell to decide whether
//! the environment was set up durably.

pub mod agent;
pub mod cli;
pub mod config;
pub mod docker;
pub mod error;
pub mod execution;
pub mod harness;
pub mod metrics;
pub mod task;
pub mod trajectory;
pub mod validation;

// Re-export commonly used error types
pub use error::{
    AgentError, ConfigError, DockerError, ErrorKind, LogError, ReportError, TaskError,
    TaskLoadError,
};
