//! Docker API wrapper using the bollard crate.
//!
//! This module provides the Docker operations the harness needs: agent image
//! builds, container lifecycle, and streaming exec.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::debug;

use crate::error::DockerError;
use crate::execution::exec::{ExecChunk, ExecRequest, ExecStream};
use crate::execution::resources::ResourceLimits;

/// Configuration for creating a new container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Unique container name.
    pub name: String,
    /// Docker image to use.
    pub image: String,
    /// Command to run in the container.
    pub cmd: Option<Vec<String>>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Resource limits for the container.
    pub limits: ResourceLimits,
    /// Volume mounts (host:container format).
    pub volumes: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl ContainerConfig {
    /// Creates a new container configuration with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: None,
            working_dir: None,
            limits: ResourceLimits::default(),
            volumes: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Sets explicit resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the command to run in the container.
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds volume mounts.
    pub fn with_volumes(mut self, volumes: Vec<String>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Docker client wrapper for container operations.
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl std::fmt::Debug for DockerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DockerClient")
    }
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Verifies the daemon answers before any task work starts.
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| DockerError::DaemonUnavailable(format!("Ping failed: {e}")))?;
        Ok(())
    }

    /// Creates a new container with the given configuration.
    ///
    /// # Returns
    ///
    /// The container ID on success.
    pub async fn create_container(&self, config: ContainerConfig) -> Result<String, DockerError> {
        let host_config = HostConfig {
            memory: config.limits.memory_bytes(),
            cpu_period: config.limits.cpu_period(),
            cpu_quota: config.limits.cpu_quota(),
            pids_limit: config.limits.pids,
            binds: if config.volumes.is_empty() {
                None
            } else {
                Some(config.volumes.clone())
            },
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            working_dir: config.working_dir.clone(),
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            host_config: Some(host_config),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Starts a container by ID.
    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    /// Stops a container, sending SIGKILL after `grace_secs`.
    pub async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), DockerError> {
        let options = StopContainerOptions { t: grace_secs };

        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to stop container: {e}")))?;

        Ok(())
    }

    /// Removes a container by ID, together with its anonymous volumes.
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| {
                if e.to_string().contains("No such container") {
                    DockerError::ContainerNotFound { id: id.to_string() }
                } else {
                    DockerError::RunFailed(format!("Failed to remove container: {e}"))
                }
            })?;

        Ok(())
    }

    /// Starts a command inside a running container and streams its output.
    ///
    /// Every exec is a new process: nothing carries over from earlier execs
    /// except what they wrote to the container's filesystem.
    pub fn exec_stream(&self, id: &str, request: ExecRequest) -> ExecStream {
        let docker = self.docker.clone();
        let id = id.to_string();

        Box::pin(async_stream::stream! {
            let exec_options = CreateExecOptions {
                cmd: Some(request.cmd),
                env: if request.env.is_empty() { None } else { Some(request.env) },
                working_dir: request.working_dir,
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                tty: Some(false),
                ..Default::default()
            };

            let exec = match docker.create_exec(&id, exec_options).await {
                Ok(exec) => exec,
                Err(e) => {
                    yield Err(DockerError::RunFailed(format!("Failed to create exec: {e}")));
                    return;
                }
            };

            match docker.start_exec(&exec.id, None).await {
                Ok(StartExecResults::Attached { mut output, .. }) => {
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(LogOutput::StdOut { message }) => {
                                yield Ok(ExecChunk::Stdout(message.to_vec()));
                            }
                            Ok(LogOutput::StdErr { message }) => {
                                yield Ok(ExecChunk::Stderr(message.to_vec()));
                            }
                            Ok(_) => {}
                            Err(e) => {
                                yield Err(DockerError::RunFailed(format!("Error reading output: {e}")));
                                return;
                            }
                        }
                    }
                }
                Ok(StartExecResults::Detached) => {}
                Err(e) => {
                    yield Err(DockerError::RunFailed(format!("Failed to start exec: {e}")));
                    return;
                }
            }

            match docker.inspect_exec(&exec.id).await {
                Ok(info) => yield Ok(ExecChunk::Exit(info.exit_code.unwrap_or(-1))),
                Err(e) => yield Err(DockerError::RunFailed(format!("Failed to inspect exec: {e}"))),
            }
        })
    }

    /// Pulls a Docker image from a registry.
    ///
    /// # Arguments
    ///
    /// * `image` - Image name with optional tag (e.g., "ubuntu:22.04")
    pub async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| DockerError::ImageNotFound(format!("{image}: {e}")))?;
        }

        Ok(())
    }

    /// Checks if an image exists locally.
    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    /// Builds `tag` from an in-memory tar build context.
    pub async fn build_image(
        &self,
        context: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> Result<(), DockerError> {
        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(context.into()));

        while let Some(result) = stream.next().await {
            let info =
                result.map_err(|e| DockerError::BuildFailed(format!("{tag}: {e}")))?;
            if let Some(error) = info.error {
                return Err(DockerError::BuildFailed(format!("{tag}: {error}")));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(image = %tag, "{}", line);
                }
            }
        }

        Ok(())
    }
}
