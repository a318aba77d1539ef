//! Container runtime abstraction.
//!
//! [`ContainerRuntime`] is what the orchestrator talks to. [`DockerRuntime`]
//! is the production implementation on top of bollard.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::docker::{AgentImageBuilder, WORKSPACE_MOUNT};
use crate::error::DockerError;
use crate::execution::container::ContainerHandle;
use crate::execution::docker_client::{ContainerConfig, DockerClient};
use crate::execution::exec::CommandExec;
use crate::execution::resources::ResourceLimits;

/// Seconds a container gets to stop before it is killed.
const STOP_GRACE_SECS: i64 = 5;

/// A started container, usable for command execution.
pub trait RuntimeHandle: CommandExec {
    fn name(&self) -> &str;
}

/// Everything needed to start one task container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub task_id: String,
    /// Host directory mounted read-write at [`ContainerSpec::mount_point`].
    pub workspace: PathBuf,
    pub mount_point: String,
    pub limits: ResourceLimits,
}

impl ContainerSpec {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        task_id: impl Into<String>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            task_id: task_id.into(),
            workspace: workspace.into(),
            mount_point: WORKSPACE_MOUNT.to_string(),
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Bind mount in Docker's `host:container:mode` form.
    pub fn bind(&self) -> String {
        format!("{}:{}:rw", self.workspace.display(), self.mount_point)
    }
}

/// Builds agent images and manages task containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    type Handle: RuntimeHandle + 'static;

    /// Returns the agent image for `base_image`, building or reusing it.
    async fn ensure_agent_image(&self, base_image: &str) -> Result<String, DockerError>;

    /// Creates and starts a container.
    async fn start(&self, spec: ContainerSpec) -> Result<Self::Handle, DockerError>;

    /// Stops and removes the container. Consumes the handle.
    async fn remove(&self, handle: Self::Handle) -> Result<(), DockerError>;
}

/// Docker-backed runtime.
pub struct DockerRuntime {
    client: DockerClient,
    images: AgentImageBuilder,
}

impl DockerRuntime {
    pub fn new(client: DockerClient, images: AgentImageBuilder) -> Self {
        Self { client, images }
    }

    pub fn images(&self) -> &AgentImageBuilder {
        &self.images
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    type Handle = ContainerHandle;

    async fn ensure_agent_image(&self, base_image: &str) -> Result<String, DockerError> {
        self.images.ensure(base_image).await
    }

    async fn start(&self, spec: ContainerSpec) -> Result<ContainerHandle, DockerError> {
        let config = ContainerConfig::new(&spec.name, &spec.image)
            .with_cmd(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "tail -f /dev/null".to_string(),
            ])
            .with_working_dir(&spec.mount_point)
            .with_volumes(vec![spec.bind()])
            .with_limits(spec.limits.clone())
            .with_label("setupbench.task", &spec.task_id);

        let id = self.client.create_container(config).await?;
        if let Err(e) = self.client.start_container(&id).await {
            // No handle is returned, so the created container is removed here.
            if let Err(cleanup) = self.client.remove_container(&id, true).await {
                debug!(container = %spec.name, error = %cleanup, "Failed to remove unstarted container");
            }
            return Err(e);
        }

        info!(container = %spec.name, image = %spec.image, "Container started");
        Ok(ContainerHandle::new(
            self.client.clone(),
            id,
            spec.name,
            spec.image,
        ))
    }

    async fn remove(&self, mut handle: ContainerHandle) -> Result<(), DockerError> {
        if let Err(e) = handle.client().stop_container(handle.id(), STOP_GRACE_SECS).await {
            debug!(container = %handle.name(), error = %e, "Stop failed, forcing removal");
        }
        handle.client().remove_container(handle.id(), true).await?;
        handle.mark_removed();
        info!(container = %handle.name(), "Container removed");
        Ok(())
    }
}
