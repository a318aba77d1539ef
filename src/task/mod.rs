//! Task descriptors.
//!
//! A [`Task`] is one environment-setup problem: a base image, a natural
//! language problem statement, and a shell command that decides afterwards
//! whether the environment was set up correctly. Tasks are immutable once
//! loaded.

pub mod loader;
pub mod workspace;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TaskLoadError;

pub use loader::{discover_task_files, load_tasks, parse_tasks, TaskFormat};
pub use workspace::{copy_dir_recursive, prepare_workspace};

/// Longest accepted `instance_id`. Ids end up in container names and paths.
pub const MAX_INSTANCE_ID_LEN: usize = 128;

fn is_safe_instance_id(id: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(id))
}

/// Category tag of a task.
///
/// The category decides how validation output is classified, see
/// [`crate::validation::SuccessCriterion`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskCategory {
    DatabaseSetup,
    BackgroundService,
    RepoSetup,
    DependencyResolution,
    Other(String),
}

impl TaskCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DatabaseSetup => "database_setup",
            Self::BackgroundService => "background_service",
            Self::RepoSetup => "repo_setup",
            Self::DependencyResolution => "dependency_resolution",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for TaskCategory {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "database_setup" => Self::DatabaseSetup,
            "background_service" => Self::BackgroundService,
            "repo_setup" => Self::RepoSetup,
            "dependency_resolution" => Self::DependencyResolution,
            _ => Self::Other(value),
        }
    }
}

impl From<TaskCategory> for String {
    fn from(value: TaskCategory) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One benchmark task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub instance_id: String,
    pub problem_statement: String,
    pub success_command: String,
    pub base_image: String,
    #[serde(rename = "task_type", alias = "category")]
    pub category: TaskCategory,
}

impl Task {
    /// Checks that every field is usable before any container work starts.
    pub fn validate(&self) -> Result<(), TaskLoadError> {
        let invalid = |reason: &str| TaskLoadError::InvalidTask {
            id: self.instance_id.clone(),
            reason: reason.to_string(),
        };

        if self.instance_id.len() > MAX_INSTANCE_ID_LEN {
            return Err(invalid("instance_id is too long"));
        }
        if !is_safe_instance_id(&self.instance_id) {
            return Err(invalid(
                "instance_id must start with an alphanumeric character and contain only [A-Za-z0-9._-]",
            ));
        }
        if self.problem_statement.trim().is_empty() {
            return Err(invalid("problem_statement is empty"));
        }
        if self.success_command.trim().is_empty() {
            return Err(invalid("success_command is empty"));
        }
        if self.base_image.trim().is_empty() || self.base_image.chars().any(char::is_whitespace) {
            return Err(invalid("base_image must be a single non-empty image reference"));
        }
        Ok(())
    }
}
