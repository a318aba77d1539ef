//! Test doubles for running the harness without Docker.
//!
//! [`HostRuntime`] treats a task's workspace directory as its "container":
//! commands run as host processes with a cleared environment, `HOME` set to
//! the workspace, and `/testbed` rewritten to the workspace path.
//! [`ScriptedAgent`] replays shell steps in one long-lived shell started
//! through the exec boundary, the way an agent's Bash tool keeps a session.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use setupbench_runner::agent::{
    AgentAdapter, AgentEvent, AgentEventStream, AgentOutcome, AgentRequest, FinishReason,
    TokenUsage,
};
use setupbench_runner::docker::{sanitize_tag_component, WORKSPACE_MOUNT};
use setupbench_runner::execution::{
    CommandExec, ContainerRuntime, ContainerSpec, ExecChunk, ExecRequest, ExecStream,
    RuntimeHandle,
};
use setupbench_runner::task::{Task, TaskCategory};
use setupbench_runner::{AgentError, DockerError};

const HOST_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

pub fn task(id: &str, category: TaskCategory, success_command: &str) -> Task {
    Task {
        instance_id: id.to_string(),
        problem_statement: format!("Set up the environment for {id}"),
        success_command: success_command.to_string(),
        base_image: "ubuntu:22.04".to_string(),
        category,
    }
}

/// Marker line closing one step's output inside an agent session.
const STEP_END: &str = "__setupbench_step_end__";

/// A workspace directory standing in for a container.
pub struct HostHandle {
    name: String,
    workspace: PathBuf,
    /// `PATH` every exec starts with, like an image's `ENV PATH`.
    path: String,
}

impl HostHandle {
    pub fn new(name: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            workspace: workspace.into(),
            path: HOST_PATH.to_string(),
        }
    }

    /// Puts `dir` in front of the base `PATH` of every exec.
    pub fn with_image_path(mut self, dir: &Path) -> Self {
        self.path = format!("{}:{}", dir.display(), HOST_PATH);
        self
    }

    fn map_path(&self, value: &str) -> String {
        value.replace(WORKSPACE_MOUNT, &self.workspace.to_string_lossy())
    }
}

#[async_trait]
impl CommandExec for HostHandle {
    fn exec_stream(&self, request: ExecRequest) -> ExecStream {
        let argv: Vec<String> = request.cmd.iter().map(|a| self.map_path(a)).collect();
        let cwd = request
            .working_dir
            .as_deref()
            .map(|d| PathBuf::from(self.map_path(d)))
            .unwrap_or_else(|| self.workspace.clone());
        let home = self.workspace.clone();
        let path = self.path.clone();

        Box::pin(async_stream::stream! {
            let Some((program, args)) = argv.split_first() else {
                yield Err(DockerError::RunFailed("empty command".to_string()));
                return;
            };
            let mut command = tokio::process::Command::new(program);
            command
                .args(args)
                .env_clear()
                .env("PATH", &path)
                .env("HOME", &home)
                .current_dir(&cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            for entry in &request.env {
                if let Some((key, value)) = entry.split_once('=') {
                    command.env(key, value);
                }
            }

            match command.output().await {
                Ok(output) => {
                    yield Ok(ExecChunk::Stdout(output.stdout));
                    yield Ok(ExecChunk::Stderr(output.stderr));
                    yield Ok(ExecChunk::Exit(output.status.code().unwrap_or(-1) as i64));
                }
                Err(e) => yield Err(DockerError::Io(e)),
            }
        })
    }
}

impl RuntimeHandle for HostHandle {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Runtime that counts starts and removals and can be told to fail.
#[derive(Default)]
pub struct HostRuntime {
    pub fail_image: bool,
    pub fail_start: bool,
    pub fail_remove: bool,
    /// Extra base `PATH` entry for every container.
    pub image_path: Option<PathBuf>,
    pub(crate) starts: AtomicUsize,
    pub(crate) removals: AtomicUsize,
    pub(crate) running: AtomicUsize,
    pub(crate) peak_running: AtomicUsize,
    pub(crate) started: Mutex<Vec<String>>,
}

impl HostRuntime {
    /// Most containers that were running at the same time.
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    pub fn started_names(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for HostRuntime {
    type Handle = HostHandle;

    async fn ensure_agent_image(&self, base_image: &str) -> Result<String, DockerError> {
        if self.fail_image {
            return Err(DockerError::ImageNotFound(base_image.to_string()));
        }
        Ok(format!("host-agent:{}", sanitize_tag_component(base_image)))
    }

    async fn start(&self, spec: ContainerSpec) -> Result<HostHandle, DockerError> {
        if self.fail_start {
            return Err(DockerError::RunFailed(format!("cannot start {}", spec.name)));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);
        self.started.lock().unwrap().push(spec.name.clone());

        let handle = HostHandle::new(spec.name, spec.workspace);
        Ok(match &self.image_path {
            Some(dir) => handle.with_image_path(dir),
            None => handle,
        })
    }

    async fn remove(&self, _handle: HostHandle) -> Result<(), DockerError> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.fail_remove {
            return Err(DockerError::ContainerNotFound {
                id: "already-gone".to_string(),
            });
        }
        Ok(())
    }
}

/// One thing the scripted agent does.
#[derive(Debug, Clone)]
pub enum Step {
    /// A Bash tool call, run in the agent's shell session.
    Shell(String),
    /// Never returns. Steps after it are not run.
    Hang,
}

pub fn shell(command: &str) -> Step {
    Step::Shell(command.to_string())
}

/// Agent that replays shell steps and then reports `finish`.
///
/// With `finish: None` the stream ends without a result.
pub struct ScriptedAgent {
    pub steps: Vec<Step>,
    pub finish: Option<FinishReason>,
}

impl ScriptedAgent {
    pub fn completing(steps: Vec<Step>) -> Self {
        Self {
            steps,
            finish: Some(FinishReason::Completed),
        }
    }
}

impl AgentAdapter for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn events<'a>(
        &'a self,
        request: &'a AgentRequest,
        exec: &'a dyn CommandExec,
    ) -> AgentEventStream<'a> {
        let commands: Vec<&str> = self
            .steps
            .iter()
            .map_while(|step| match step {
                Step::Shell(command) => Some(command.as_str()),
                Step::Hang => None,
            })
            .collect();
        let hangs = commands.len() < self.steps.len();

        Box::pin(async_stream::stream! {
            yield Ok(AgentEvent::Started {
                session_id: Some("scripted".to_string()),
                model: None,
            });

            if !commands.is_empty() {
                let session = ExecRequest::new(["/bin/bash", "-c", session_script(&commands).as_str()])
                    .with_working_dir(request.working_dir.clone());
                let outputs = match exec.exec(session).await {
                    Ok(result) => split_steps(&result.stdout, commands.len()),
                    Err(e) => {
                        yield Err(AgentError::Exec(e));
                        return;
                    }
                };

                for (i, (command, output)) in commands.iter().zip(outputs).enumerate() {
                    let id = format!("toolu_{i}");
                    yield Ok(AgentEvent::ToolCall {
                        id: id.clone(),
                        name: "Bash".to_string(),
                        input: serde_json::json!({ "command": command }),
                    });
                    let (output, is_error) = match output {
                        Some((text, code)) => (text, code != 0),
                        None => ("shell session ended".to_string(), true),
                    };
                    yield Ok(AgentEvent::ToolResult {
                        id,
                        name: Some("Bash".to_string()),
                        output,
                        is_error,
                    });
                }
            }

            if hangs {
                futures::future::pending::<()>().await;
            }

            if let Some(reason) = &self.finish {
                yield Ok(AgentEvent::Finished(AgentOutcome {
                    reason: reason.clone(),
                    usage: TokenUsage {
                        input_tokens: 100,
                        output_tokens: 50,
                        cache_creation_input_tokens: 10,
                        cache_read_input_tokens: 5,
                    },
                    num_turns: self.steps.len() as u32 + 1,
                    duration_ms: None,
                    result_text: Some("done".to_string()),
                }));
            }
        })
    }
}

/// One shell script running every command in the same process.
///
/// Each command runs as a brace group, so `export`, `cd` and shell
/// variables carry over to later commands, followed by a marker line with
/// its exit status.
fn session_script(commands: &[&str]) -> String {
    let mut script = String::new();
    for (i, command) in commands.iter().enumerate() {
        script.push_str(&format!(
            "{{\n{command}\n}} 2>&1\nprintf '\\n{STEP_END} {i} %s\\n' \"$?\"\n"
        ));
    }
    script
}

/// Splits session output into `(output, exit_code)` per command.
///
/// Commands whose marker never appeared map to `None`.
fn split_steps(stdout: &str, count: usize) -> Vec<Option<(String, i32)>> {
    let mut steps = vec![None; count];
    let mut current = Vec::new();
    for line in stdout.lines() {
        let marker = line
            .strip_prefix(STEP_END)
            .and_then(|rest| rest.trim().split_once(' '))
            .and_then(|(i, code)| Some((i.parse::<usize>().ok()?, code.parse::<i32>().ok()?)));
        match marker {
            Some((i, code)) if i < count => {
                steps[i] = Some((current.join("\n").trim_end().to_string(), code));
                current.clear();
            }
            _ => current.push(line),
        }
    }
    steps
}
