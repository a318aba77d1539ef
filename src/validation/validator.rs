//! Fresh-shell validation of a task's success command.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::docker::WORKSPACE_MOUNT;
use crate::error::TaskError;
use crate::execution::{CommandExec, ExecRequest, ExecResult};
use crate::task::{Task, TaskCategory};

/// Literal marker that success commands print on success.
pub const SUCCESS_MARKER: &str = "Setup successful";

/// `$0` of the validation shells.
const SHELL_NAME: &str = "setupbench-validate";

/// Starts a login shell for `$1` while keeping the exec's inherited `PATH`.
///
/// Debian's `/etc/profile` resets `PATH` for root, which would hide entries
/// the base image sets with `ENV PATH` (`/usr/local/go/bin` and friends).
/// The inherited value is appended after the profiles ran, so profile
/// changes still come first.
const LOGIN_WITH_IMAGE_PATH: &str = r#"export SETUPBENCH_IMAGE_PATH="$PATH"
exec /bin/bash --login -c 'PATH="$PATH${SETUPBENCH_IMAGE_PATH:+:$SETUPBENCH_IMAGE_PATH}"; unset SETUPBENCH_IMAGE_PATH; eval "$1"' "$0" "$1""#;

/// How validation output is turned into pass/fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SuccessCriterion {
    /// Pass iff the command exits with status 0.
    ExitCode,
    /// Pass iff combined output contains the marker.
    Marker(String),
}

impl SuccessCriterion {
    pub fn for_category(category: &TaskCategory) -> Self {
        match category {
            TaskCategory::DependencyResolution => Self::ExitCode,
            _ => Self::Marker(SUCCESS_MARKER.to_string()),
        }
    }

    pub fn classify(&self, result: &ExecResult) -> bool {
        match self {
            Self::ExitCode => result.exit_code == 0,
            Self::Marker(marker) => {
                result.stdout.contains(marker.as_str()) || result.stderr.contains(marker.as_str())
            }
        }
    }
}

/// Outcome of running a validation command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub exit_code: i64,
    /// Stdout followed by stderr, trailing whitespace removed.
    pub output: String,
    pub criterion: SuccessCriterion,
    pub duration_secs: f64,
}

/// Runs validation commands in new login shells.
#[derive(Debug, Clone)]
pub struct Validator {
    timeout: Duration,
    working_dir: String,
}

impl Validator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: WORKSPACE_MOUNT.to_string(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// The exec request for `command`.
    ///
    /// A new `bash --login` process with an empty extra environment. Login
    /// shells read `/etc/profile`, `/etc/profile.d/*` and the user's profile,
    /// so durably persisted settings are visible and nothing else is. The
    /// container's own `PATH` is kept behind whatever the profiles set.
    pub fn request(&self, command: &str) -> ExecRequest {
        ExecRequest::new(["/bin/bash", "-c", LOGIN_WITH_IMAGE_PATH, SHELL_NAME, command])
            .with_working_dir(self.working_dir.clone())
    }

    /// Runs `task`'s success command and classifies the result.
    ///
    /// # Errors
    ///
    /// `ValidationExecution` when the command cannot be run or does not
    /// finish within the timeout. A command that runs and reports failure
    /// is `Ok` with `success == false`.
    pub async fn validate(
        &self,
        exec: &dyn CommandExec,
        task: &Task,
    ) -> Result<ValidationOutcome, TaskError> {
        let criterion = SuccessCriterion::for_category(&task.category);
        let started = Instant::now();

        let result = tokio::time::timeout(self.timeout, exec.exec(self.request(&task.success_command)))
            .await
            .map_err(|_| {
                TaskError::ValidationExecution(format!(
                    "validation command timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| TaskError::ValidationExecution(e.to_string()))?;

        let success = criterion.classify(&result);
        let outcome = ValidationOutcome {
            success,
            exit_code: result.exit_code,
            output: result.combined_output().trim_end().to_string(),
            criterion,
            duration_secs: started.elapsed().as_secs_f64(),
        };

        if success {
            info!(task_id = %task.instance_id, exit_code = outcome.exit_code, "Validation passed");
        } else {
            warn!(task_id = %task.instance_id, exit_code = outcome.exit_code, "Validation failed");
        }
        Ok(outcome)
    }
}
