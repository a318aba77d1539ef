//! Agent image naming, build context, and the per-process image cache.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

use crate::config::ImageConfig;
use crate::docker::dockerfile::{AgentDockerfile, DOCKERFILE_NAME, LAUNCHER_NAME};
use crate::error::DockerError;
use crate::execution::DockerClient;

/// Longest sanitized base-image component kept in a tag.
const MAX_TAG_BASE_LEN: usize = 100;

/// Turns a base image reference into something usable inside a tag.
///
/// `ubuntu:22.04` becomes `ubuntu-22.04`, `ghcr.io/org/img:1` becomes
/// `ghcr.io-org-img-1`.
pub fn sanitize_tag_component(base_image: &str) -> String {
    let mut sanitized: String = base_image
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    sanitized.truncate(MAX_TAG_BASE_LEN);
    let trimmed = sanitized.trim_start_matches(['.', '-']);
    if trimmed.is_empty() {
        "base".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Tag of the agent image for `base_image`.
///
/// The tag carries a short hash of the Dockerfile, so a change to the
/// agent layer never reuses a stale image.
pub fn agent_image_tag(repository: &str, base_image: &str, dockerfile: &str) -> String {
    let digest = Sha256::digest(dockerfile.as_bytes());
    let short = &hex::encode(digest)[..8];
    format!("{repository}:{}-{short}", sanitize_tag_component(base_image))
}

/// Packs the Dockerfile and launcher into an in-memory tar archive.
pub fn build_context(dockerfile: &str, launcher: &str) -> Result<Vec<u8>, DockerError> {
    let mut archive = tar::Builder::new(Vec::new());

    for (name, content, mode) in [
        (DOCKERFILE_NAME, dockerfile, 0o644),
        (LAUNCHER_NAME, launcher, 0o755),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        archive.append_data(&mut header, name, content.as_bytes())?;
    }

    Ok(archive.into_inner()?)
}

/// Produces agent images, building each one at most once per process.
///
/// Concurrent tasks that share a base image wait on the same build.
pub struct AgentImageBuilder {
    client: DockerClient,
    config: ImageConfig,
    cache: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl AgentImageBuilder {
    pub fn new(client: DockerClient, config: ImageConfig) -> Self {
        Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn dockerfile_for(&self, base_image: &str) -> AgentDockerfile {
        AgentDockerfile::new(
            base_image,
            self.config.node_image.clone(),
            self.config.agent_package.clone(),
        )
    }

    /// Returns the agent image tag for `base_image`, building it if needed.
    pub async fn ensure(&self, base_image: &str) -> Result<String, DockerError> {
        let cell = {
            let mut cache = self.cache.lock().await;
            cache.entry(base_image.to_string()).or_default().clone()
        };

        cell.get_or_try_init(|| self.build_or_reuse(base_image))
            .await
            .cloned()
    }

    async fn build_or_reuse(&self, base_image: &str) -> Result<String, DockerError> {
        let spec = self.dockerfile_for(base_image);
        let dockerfile = spec.build()?;
        let tag = agent_image_tag(&self.config.repository, base_image, &dockerfile);

        if !self.config.force_rebuild && self.client.image_exists(&tag).await {
            info!(image = %tag, base = %base_image, "Reusing agent image");
            return Ok(tag);
        }

        if !self.client.image_exists(base_image).await {
            info!(base = %base_image, "Pulling base image");
            self.client.pull_image(base_image).await?;
        }

        info!(image = %tag, base = %base_image, "Building agent image");
        let context = build_context(&dockerfile, &spec.launcher_script())?;
        self.client
            .build_image(context, DOCKERFILE_NAME, &tag)
            .await?;
        info!(image = %tag, "Agent image ready");

        Ok(tag)
    }
}
