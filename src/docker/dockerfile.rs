//! Dockerfile generation for agent images.
//!
//! An agent image is the task's base image plus a self-contained Node.js
//! runtime and the agent CLI. The runtime is installed in a separate build
//! stage and copied under [`AGENT_PREFIX`], which is kept off
//! the default `PATH`: anything the task's validation command can find must
//! have been installed by the agent, not by the harness.

use crate::error::DockerError;

/// Directory inside the agent image holding the agent runtime.
pub const AGENT_PREFIX: &str = "/opt/setupbench-agent";

/// Name of the agent launcher inside the build context.
pub const LAUNCHER_NAME: &str = "claude";

/// Name of the Dockerfile inside the build context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Mount point of the task workspace inside every container.
pub const WORKSPACE_MOUNT: &str = "/testbed";

/// Absolute path of the agent launcher inside the agent image.
pub fn launcher_path() -> String {
    format!("{AGENT_PREFIX}/bin/{LAUNCHER_NAME}")
}

/// Checks that an image reference can be embedded in a `FROM` line.
///
/// References may only contain alphanumeric characters and `.-_/:@`, which
/// covers registry hosts, ports, tags, and digests.
pub fn is_valid_image_reference(image: &str) -> bool {
    if image.is_empty() || image.starts_with(['-', ':', '@', '/']) {
        return false;
    }
    image
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | ':' | '@'))
}

/// Checks that an npm package spec is safe to pass to `npm install`.
pub fn is_valid_package_spec(package: &str) -> bool {
    if package.is_empty() || package.starts_with('-') {
        return false;
    }
    package
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '/' | '-' | '_' | '.' | '^' | '~'))
}

/// Builder for the agent image Dockerfile.
#[derive(Debug, Clone)]
pub struct AgentDockerfile {
    base_image: String,
    node_image: String,
    agent_package: String,
}

impl AgentDockerfile {
    pub fn new(
        base_image: impl Into<String>,
        node_image: impl Into<String>,
        agent_package: impl Into<String>,
    ) -> Self {
        Self {
            base_image: base_image.into(),
            node_image: node_image.into(),
            agent_package: agent_package.into(),
        }
    }

    /// Renders the Dockerfile.
    pub fn build(&self) -> Result<String, DockerError> {
        for image in [&self.base_image, &self.node_image] {
            if !is_valid_image_reference(image) {
                return Err(DockerError::InvalidDockerfile(format!(
                    "invalid image reference '{image}'"
                )));
            }
        }
        if !is_valid_package_spec(&self.agent_package) {
            return Err(DockerError::InvalidDockerfile(format!(
                "invalid agent package '{}'",
                self.agent_package
            )));
        }

        let lines = vec![
            format!("FROM {} AS agent-runtime", self.node_image),
            format!(
                "RUN npm install -g --no-audit --no-fund --prefix {AGENT_PREFIX} {}",
                self.agent_package
            ),
            String::new(),
            format!("FROM {}", self.base_image),
            format!("LABEL setupbench.base-image=\"{}\"", self.base_image),
            format!("COPY --from=agent-runtime /usr/local/bin/node {AGENT_PREFIX}/node/bin/node"),
            format!("COPY --from=agent-runtime {AGENT_PREFIX}/lib {AGENT_PREFIX}/lib"),
            format!("COPY {LAUNCHER_NAME} {}", launcher_path()),
            format!("WORKDIR {WORKSPACE_MOUNT}"),
        ];

        Ok(lines.join("\n") + "\n")
    }

    /// Shell script that starts the agent CLI with the bundled Node runtime.
    pub fn launcher_script(&self) -> String {
        let package_dir = match self.agent_package.rfind('@') {
            Some(idx) if idx > 0 => &self.agent_package[..idx],
            _ => self.agent_package.as_str(),
        };
        format!(
            "#!/bin/sh\nexec {AGENT_PREFIX}/node/bin/node {AGENT_PREFIX}/lib/node_modules/{package_dir}/cli.js \"$@\"\n"
        )
    }
}
