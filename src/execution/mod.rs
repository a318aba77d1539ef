//! Container execution layer.
//!
//! This module provides the Docker execution layer using the bollard crate:
//! container lifecycle, resource limits, and the [`CommandExec`] boundary
//! that the agent invoker and the validator run commands through.
//!
//! # Architecture
//!
//! ```text
//! ensure_agent_image → start → exec (agent) → exec (validation) → remove
//! ```
//!
//! # Example
//!
//! ```ignore
//! use setupbench_runner::config::ImageConfig;
//! use setupbench_runner::docker::AgentImageBuilder;
//! use setupbench_runner::execution::{
//!     CommandExec, ContainerRuntime, ContainerSpec, DockerClient, DockerRuntime, ExecRequest,
//! };
//!
//! let client = DockerClient::new()?;
//! let images = AgentImageBuilder::new(client.clone(), ImageConfig::default());
//! let runtime = DockerRuntime::new(client, images);
//!
//! let image = runtime.ensure_agent_image("ubuntu:22.04").await?;
//! let handle = runtime
//!     .start(ContainerSpec::new("setupbench-demo", image, "demo", "/tmp/demo"))
//!     .await?;
//! let result = handle.exec(ExecRequest::new(["uname", "-a"])).await?;
//! runtime.remove(handle).await?;
//! ```

pub mod container;
pub mod docker_client;
pub mod exec;
pub mod resources;
pub mod runtime;

pub use container::{ContainerHandle, ContainerStatus};
pub use docker_client::{ContainerConfig, DockerClient};
pub use exec::{
    collect_output, CommandExec, ExecChunk, ExecRequest, ExecResult, ExecStream, LineBuffer,
};
pub use resources::ResourceLimits;
pub use runtime::{ContainerRuntime, ContainerSpec, DockerRuntime, RuntimeHandle};
