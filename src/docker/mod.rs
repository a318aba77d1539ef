//! Agent image generation.
//!
//! Each task names a base image. Before its container starts, the harness
//! derives an "agent image" from it (base image + Node.js runtime + agent
//! CLI) and caches the result so tasks sharing a base image reuse it.

pub mod dockerfile;
pub mod image;

pub use dockerfile::{
    is_valid_image_reference, launcher_path, AgentDockerfile, AGENT_PREFIX, WORKSPACE_MOUNT,
};
pub use image::{agent_image_tag, build_context, sanitize_tag_component, AgentImageBuilder};
