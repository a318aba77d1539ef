//! Per-task state machine.
//!
//! ```text
//! Loaded -> ContainerReady -> AgentRunning -> Validating -> Completed -> CleanedUp
//!    \____________\_______________\____________________________^
//! ```
//!
//! Any state before `Completed` may jump straight to `Completed` on failure.
//! Nothing moves backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Loaded,
    ContainerReady,
    AgentRunning,
    Validating,
    Completed { success: bool },
    CleanedUp,
}

impl TaskState {
    fn rank(&self) -> u8 {
        match self {
            Self::Loaded => 0,
            Self::ContainerReady => 1,
            Self::AgentRunning => 2,
            Self::Validating => 3,
            Self::Completed { .. } => 4,
            Self::CleanedUp => 5,
        }
    }

    pub fn can_transition_to(&self, next: &TaskState) -> bool {
        match next {
            Self::Completed { .. } => self.rank() < next.rank(),
            _ => next.rank() == self.rank() + 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CleanedUp)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::ContainerReady => write!(f, "container_ready"),
            Self::AgentRunning => write!(f, "agent_running"),
            Self::Validating => write!(f, "validating"),
            Self::Completed { success: true } => write!(f, "completed(success)"),
            Self::Completed { success: false } => write!(f, "completed(failure)"),
            Self::CleanedUp => write!(f, "cleaned_up"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid lifecycle transition {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskState,
    pub to: TaskState,
}

/// A state and when it was entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEntry {
    #[serde(flatten)]
    pub state: TaskState,
    pub at: DateTime<Utc>,
}

/// Timestamped trace of a task's states.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    entries: Vec<LifecycleEntry>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            entries: vec![LifecycleEntry {
                state: TaskState::Loaded,
                at: Utc::now(),
            }],
        }
    }

    pub fn current(&self) -> TaskState {
        self.entries
            .last()
            .map(|e| e.state)
            .unwrap_or(TaskState::Loaded)
    }

    pub fn advance(&mut self, next: TaskState) -> Result<(), TransitionError> {
        let current = self.current();
        if !current.can_transition_to(&next) {
            return Err(TransitionError {
                from: current,
                to: next,
            });
        }
        self.entries.push(LifecycleEntry {
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn entries(&self) -> &[LifecycleEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LifecycleEntry> {
        self.entries
    }
}
