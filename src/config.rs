//! Process-wide configuration.
//!
//! Everything here is resolved once at startup and handed to the components
//! that need it at construction time. Nothing is looked up from the
//! environment after that point.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::execution::ResourceLimits;

/// Environment variable holding the agent backend credential.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Default wall-clock budget for one agent invocation (2 hours).
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 7200;

/// Default number of agent tool calls per task.
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// Default budget for the validation command.
pub const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 120;

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "./setupbench-results";

/// Tools the agent may use.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &["Bash", "Read", "Write", "Edit"];

/// API credential for the agent backend.
///
/// `Debug` never prints the secret.
#[derive(Clone)]
pub struct ApiCredential(String);

impl ApiCredential {
    /// Wraps a credential value, rejecting blank strings.
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ConfigError::MissingCredential(API_KEY_ENV.to_string()));
        }
        Ok(Self(value))
    }

    /// Resolves the credential from an explicit value or, failing that, from
    /// [`API_KEY_ENV`].
    pub fn resolve(explicit: Option<String>) -> Result<Self, ConfigError> {
        match explicit {
            Some(value) => Self::new(value),
            None => std::env::var(API_KEY_ENV)
                .map_err(|_| ConfigError::MissingCredential(API_KEY_ENV.to_string()))
                .and_then(Self::new),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `KEY=value` form for a container exec environment.
    pub fn env_entry(&self) -> String {
        format!("{}={}", API_KEY_ENV, self.0)
    }
}

impl std::fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiCredential(***)")
    }
}

/// How agent images are produced.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Repository part of every agent image tag.
    pub repository: String,
    /// npm package providing the agent CLI.
    pub agent_package: String,
    /// Image used to install the agent package.
    pub node_image: String,
    /// Rebuild even when a matching image already exists.
    pub force_rebuild: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            repository: "setupbench-agent".to_string(),
            agent_package: "@anthropic-ai/claude-code".to_string(),
            node_image: "node:20-bookworm-slim".to_string(),
            force_rebuild: false,
        }
    }
}

/// Configuration for a harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Root of all persisted output.
    pub output_dir: PathBuf,
    /// Wall-clock budget for one agent invocation.
    pub agent_timeout: Duration,
    /// Maximum agent tool calls per task.
    pub max_steps: u32,
    /// Budget for the validation command.
    pub validation_timeout: Duration,
    /// Number of tasks in flight at once.
    pub concurrency: usize,
    /// Agent model override.
    pub model: Option<String>,
    /// Directory with per-task fixtures (`<dir>/<instance_id>/`).
    pub fixtures_dir: Option<PathBuf>,
    pub allowed_tools: Vec<String>,
    pub image: ImageConfig,
    pub limits: ResourceLimits,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            agent_timeout: Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS),
            max_steps: DEFAULT_MAX_STEPS,
            validation_timeout: Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS),
            concurrency: 1,
            model: None,
            fixtures_dir: None,
            allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect(),
            image: ImageConfig::default(),
            limits: ResourceLimits::default(),
        }
    }
}

impl HarnessConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// Sets the concurrency limit. Zero is clamped to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_fixtures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixtures_dir = Some(dir.into());
        self
    }

    pub fn with_image_config(mut self, image: ImageConfig) -> Self {
        self.image = image;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Checks values that clap cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_steps".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.agent_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "agent_timeout".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.validation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "validation_timeout".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(memory_mb) = self.limits.memory_mb {
            if memory_mb == 0 || self.limits.memory_bytes().is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "memory_mb".to_string(),
                    reason: format!("{memory_mb} MB is out of range"),
                });
            }
        }
        if let Some(pids) = self.limits.pids {
            if pids <= 0 {
                return Err(ConfigError::InvalidValue {
                    field: "pids".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        if let Some(cpus) = self.limits.cpus {
            if cpus <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "cpus".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join("results")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.output_dir.join("workspaces")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("summary.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.output_dir.join("metrics.prom")
    }

    pub fn fixtures_for(&self, instance_id: &str) -> Option<PathBuf> {
        self.fixtures_dir
            .as_deref()
            .map(|dir: &Path| dir.join(instance_id))
            .filter(|dir| dir.is_dir())
    }
}
