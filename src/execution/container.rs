//! Handles to running task containers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::docker_client::DockerClient;
use crate::execution::exec::{CommandExec, ExecRequest, ExecStream};
use crate::execution::runtime::RuntimeHandle;

/// Status of a managed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Running,
    Removed,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Removed => write!(f, "removed"),
        }
    }
}

/// Exclusive handle to one started container.
///
/// There is no `Clone`: the handle is moved into
/// [`ContainerRuntime::remove`](crate::execution::ContainerRuntime::remove),
/// which is the only way to tear the container down.
#[derive(Debug)]
pub struct ContainerHandle {
    client: DockerClient,
    id: String,
    name: String,
    image: String,
    started_at: DateTime<Utc>,
    status: ContainerStatus,
}

impl ContainerHandle {
    pub(crate) fn new(client: DockerClient, id: String, name: String, image: String) -> Self {
        Self {
            client,
            id,
            name,
            image,
            started_at: Utc::now(),
            status: ContainerStatus::Running,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> ContainerStatus {
        self.status
    }

    pub(crate) fn client(&self) -> &DockerClient {
        &self.client
    }

    pub(crate) fn mark_removed(&mut self) {
        self.status = ContainerStatus::Removed;
    }
}

#[async_trait]
impl CommandExec for ContainerHandle {
    fn exec_stream(&self, request: ExecRequest) -> ExecStream {
        self.client.exec_stream(&self.id, request)
    }
}

impl RuntimeHandle for ContainerHandle {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.status != ContainerStatus::Removed {
            tracing::warn!(
                container = %self.name,
                "Container handle dropped without removal; container may leak"
            );
        }
    }
}
