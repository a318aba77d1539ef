//! End-to-end harness tests against host processes.
//!
//! Every task's "container" is its workspace directory on the host, so these
//! tests exercise the real orchestrator, recorder, validator and reports
//! without a Docker daemon.

mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use setupbench_runner::agent::FinishReason;
use setupbench_runner::config::HarnessConfig;
use setupbench_runner::execution::{ContainerRuntime, ContainerSpec};
use setupbench_runner::harness::{Harness, RunResult, TaskState};
use setupbench_runner::metrics::HarnessMetrics;
use setupbench_runner::task::{prepare_workspace, TaskCategory};
use setupbench_runner::validation::Validator;
use setupbench_runner::ErrorKind;
use tempfile::TempDir;

use support::{shell, task, HostRuntime, ScriptedAgent, Step};

const MARKER_CHECK_FLAG: &str =
    r#"test -n "$SETUPBENCH_FLAG" && echo 'Setup successful' || echo 'Setup failed'"#;

fn config(dir: &TempDir) -> HarnessConfig {
    HarnessConfig::new(dir.path().join("out"))
        .with_agent_timeout(Duration::from_secs(30))
        .with_validation_timeout(Duration::from_secs(30))
}

fn harness(
    runtime: HostRuntime,
    agent: ScriptedAgent,
    config: HarnessConfig,
) -> Harness<HostRuntime, ScriptedAgent> {
    let metrics = Arc::new(HarnessMetrics::new().unwrap());
    Harness::new(runtime, agent, config, metrics)
}

fn states(result: &RunResult) -> Vec<TaskState> {
    result.lifecycle.iter().map(|e| e.state).collect()
}

/// Outputs of every post-tool entry in a task's `tools.jsonl`.
fn tool_outputs(output_dir: &Path, id: &str) -> Vec<String> {
    let tools = std::fs::read_to_string(output_dir.join("logs").join(id).join("tools.jsonl")).unwrap();
    tools
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
        .filter(|entry| entry["event_type"] == "post_tool")
        .map(|entry| entry["tool_output"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_variable_exported_in_agent_shell_is_not_visible() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let output = config.output_dir.clone();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(vec![
            shell("export SETUPBENCH_FLAG=1"),
            shell(r#"echo "flag=$SETUPBENCH_FLAG""#),
            shell(MARKER_CHECK_FLAG),
        ]),
        config,
    );

    let result = harness
        .run_task(&task("export-only", TaskCategory::RepoSetup, MARKER_CHECK_FLAG))
        .await;

    // The agent's own session keeps the export across tool calls.
    let outputs = tool_outputs(&output, "export-only");
    assert_eq!(outputs[1], "flag=1");
    assert_eq!(outputs[2], "Setup successful");

    assert!(!result.success);
    assert_eq!(result.error_kind, None);
    assert_eq!(result.validation_output.as_deref(), Some("Setup failed"));
    assert_eq!(result.total_steps, 3);
    assert_eq!(harness.runtime().removals(), 1);
}

#[tokio::test]
async fn test_image_path_survives_login_profile() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let toolchain = dir.path().join("toolchain").join("bin");
    std::fs::create_dir_all(&toolchain).unwrap();
    let tool = toolchain.join("setupbench-go");
    std::fs::write(&tool, "#!/bin/sh\necho go1.21\n").unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = config(&dir);
    let output = config.output_dir.clone();
    let harness = harness(
        HostRuntime {
            image_path: Some(toolchain),
            ..Default::default()
        },
        ScriptedAgent::completing(vec![shell("setupbench-go")]),
        config,
    );

    let result = harness
        .run_task(&task(
            "image-path",
            TaskCategory::DependencyResolution,
            "setupbench-go",
        ))
        .await;

    assert_eq!(tool_outputs(&output, "image-path"), vec!["go1.21"]);
    assert!(result.success, "validation output: {:?}", result.validation_output);
    assert_eq!(result.validation_exit_code, Some(0));
    assert_eq!(result.validation_output.as_deref(), Some("go1.21"));
}

#[tokio::test]
async fn test_path_persisted_to_profile_is_visible() {
    let dir = TempDir::new().unwrap();
    let install_tool = r#"mkdir -p "$HOME/tools" && printf '#!/bin/sh\necho tool-ok\n' > "$HOME/tools/setupbench-tool" && chmod +x "$HOME/tools/setupbench-tool""#;
    let persist_path = r#"echo 'export PATH="$HOME/tools:$PATH"' >> "$HOME/.bash_profile""#;
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(vec![shell(install_tool), shell(persist_path)]),
        config(&dir),
    );

    let result = harness
        .run_task(&task(
            "persisted-path",
            TaskCategory::DependencyResolution,
            "setupbench-tool",
        ))
        .await;

    assert!(result.success, "validation output: {:?}", result.validation_output);
    assert_eq!(result.validation_exit_code, Some(0));
    assert_eq!(result.bash_calls, 2);
    assert_eq!(
        states(&result),
        vec![
            TaskState::Loaded,
            TaskState::ContainerReady,
            TaskState::AgentRunning,
            TaskState::Validating,
            TaskState::Completed { success: true },
            TaskState::CleanedUp,
        ]
    );
    assert_eq!(harness.runtime().removals(), 1);
}

#[tokio::test]
async fn test_marker_classification() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(Vec::new()),
        config(&dir),
    );

    let passing = harness
        .run_task(&task(
            "grep-hit",
            TaskCategory::RepoSetup,
            "echo hi | grep -q hi && echo 'Setup successful' || echo 'Setup failed'",
        ))
        .await;
    let failing = harness
        .run_task(&task(
            "grep-miss",
            TaskCategory::RepoSetup,
            "echo hi | grep -q bye && echo 'Setup successful' || echo 'Setup failed'",
        ))
        .await;

    assert!(passing.success);
    assert!(!failing.success);
    assert_eq!(failing.validation_output.as_deref(), Some("Setup failed"));
    assert_eq!(failing.error_kind, None);
    assert_eq!(
        failing.lifecycle.last().map(|e| e.state),
        Some(TaskState::CleanedUp)
    );
}

#[tokio::test]
async fn test_agent_timeout_removes_container() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(vec![shell("echo working"), Step::Hang]),
        config(&dir).with_agent_timeout(Duration::from_secs(1)),
    );

    let result = harness
        .run_task(&task("slow", TaskCategory::BackgroundService, "true"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::TimeoutExceeded));
    assert_eq!(result.validation_output, None);
    assert!(!states(&result).contains(&TaskState::Validating));
    assert_eq!(harness.runtime().starts(), 1);
    assert_eq!(harness.runtime().removals(), 1);
    assert_eq!(harness.metrics().active_containers(), 0.0);
}

#[tokio::test]
async fn test_step_limit() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(vec![shell("true"), shell("true"), shell("true")]),
        config(&dir).with_max_steps(2),
    );

    let result = harness
        .run_task(&task("chatty", TaskCategory::RepoSetup, "true"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::StepLimitExceeded));
    assert_eq!(result.total_steps, 3);
    assert_eq!(harness.runtime().removals(), 1);
}

#[tokio::test]
async fn test_agent_out_of_turns_is_step_limit() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent {
            steps: vec![shell("true")],
            finish: Some(FinishReason::MaxTurns),
        },
        config(&dir),
    );

    let result = harness
        .run_task(&task("turns", TaskCategory::RepoSetup, "true"))
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::StepLimitExceeded));
    assert_eq!(result.total_tokens, 165);
    assert_eq!(harness.runtime().removals(), 1);
}

#[tokio::test]
async fn test_image_failure_never_starts_container() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime {
            fail_image: true,
            ..Default::default()
        },
        ScriptedAgent::completing(Vec::new()),
        config(&dir),
    );

    let result = harness
        .run_task(&task("no-image", TaskCategory::DatabaseSetup, "true"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ImageUnavailable));
    assert_eq!(harness.runtime().starts(), 0);
    assert_eq!(harness.runtime().removals(), 0);
    assert_eq!(
        states(&result),
        vec![
            TaskState::Loaded,
            TaskState::Completed { success: false },
            TaskState::CleanedUp,
        ]
    );
}

#[tokio::test]
async fn test_container_start_failure() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime {
            fail_start: true,
            ..Default::default()
        },
        ScriptedAgent::completing(Vec::new()),
        config(&dir),
    );

    let result = harness
        .run_task(&task("no-start", TaskCategory::DatabaseSetup, "true"))
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::ContainerStartError));
    assert_eq!(harness.runtime().removals(), 0);
}

#[tokio::test]
async fn test_agent_without_result_is_invocation_error() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent {
            steps: vec![shell("true")],
            finish: None,
        },
        config(&dir),
    );

    let result = harness
        .run_task(&task("silent", TaskCategory::RepoSetup, "true"))
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::AgentInvocationError));
    assert_eq!(harness.runtime().removals(), 1);
}

#[tokio::test]
async fn test_validation_timeout_is_execution_error() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(Vec::new()),
        config(&dir).with_validation_timeout(Duration::from_secs(1)),
    );

    let result = harness
        .run_task(&task("stuck-check", TaskCategory::RepoSetup, "sleep 30"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ValidationExecutionError));
    assert!(states(&result).contains(&TaskState::Validating));
    assert_eq!(harness.runtime().removals(), 1);
}

#[tokio::test]
async fn test_cleanup_failure_is_recorded_not_fatal() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime {
            fail_remove: true,
            ..Default::default()
        },
        ScriptedAgent::completing(Vec::new()),
        config(&dir),
    );

    let result = harness
        .run_task(&task(
            "sticky",
            TaskCategory::RepoSetup,
            "echo 'Setup successful'",
        ))
        .await;

    assert!(result.success);
    assert!(result.cleanup_error.is_some());
    assert_eq!(harness.runtime().removals(), 1);
}

#[tokio::test]
async fn test_fixtures_are_copied_into_workspace() {
    let dir = TempDir::new().unwrap();
    let fixtures = dir.path().join("fixtures");
    std::fs::create_dir_all(fixtures.join("with-fixture")).unwrap();
    std::fs::write(fixtures.join("with-fixture/seed.txt"), "seed").unwrap();

    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(Vec::new()),
        config(&dir).with_fixtures_dir(&fixtures),
    );

    let result = harness
        .run_task(&task(
            "with-fixture",
            TaskCategory::RepoSetup,
            "test -f /testbed/seed.txt && echo 'Setup successful' || echo 'Setup failed'",
        ))
        .await;

    assert!(result.success, "validation output: {:?}", result.validation_output);
}

#[tokio::test]
async fn test_batch_preserves_order_and_writes_reports() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).with_concurrency(2);
    let output = config.output_dir.clone();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(vec![shell("echo step")]),
        config,
    );

    let tasks = vec![
        task("batch-a", TaskCategory::RepoSetup, "echo 'Setup successful'"),
        task("batch-b", TaskCategory::DatabaseSetup, "echo 'Setup failed'"),
        task("batch-c", TaskCategory::DependencyResolution, "true"),
    ];
    let summary = harness.run_batch(&tasks).await.unwrap();

    let ids: Vec<_> = summary.results.iter().map(|r| r.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["batch-a", "batch-b", "batch-c"]);
    assert_eq!(summary.total_tasks, 3);
    assert_eq!(summary.successful_tasks, 2);
    assert!((summary.avg_steps - 1.0).abs() < f64::EPSILON);

    assert!(output.join("summary.json").is_file());
    assert!(output.join("metrics.prom").is_file());
    for id in ids {
        assert!(output.join("results").join(format!("{id}.json")).is_file());
        let logs = output.join("logs").join(id);
        assert!(logs.join("agent.log").is_file());
        let tools = std::fs::read_to_string(logs.join("tools.jsonl")).unwrap();
        assert_eq!(tools.lines().count(), 2);
    }

    let names = harness.runtime().started_names();
    assert_eq!(names.len(), 3);
    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 3);
    assert_eq!(harness.runtime().removals(), 3);
}

#[tokio::test]
async fn test_batch_respects_concurrency_limit() {
    let dir = TempDir::new().unwrap();
    let harness = harness(
        HostRuntime::default(),
        ScriptedAgent::completing(vec![shell("sleep 0.5")]),
        config(&dir).with_concurrency(2),
    );

    let tasks: Vec<_> = (0..5)
        .map(|i| task(&format!("pool-{i}"), TaskCategory::DependencyResolution, "true"))
        .collect();
    let summary = harness.run_batch(&tasks).await.unwrap();

    assert_eq!(summary.successful_tasks, 5);
    assert_eq!(harness.runtime().starts(), 5);
    assert_eq!(harness.runtime().peak_running(), 2);
    assert_eq!(harness.runtime().removals(), 5);
}

#[tokio::test]
async fn test_validation_rerun_is_stable() {
    let dir = TempDir::new().unwrap();
    let workspace = prepare_workspace(dir.path(), "rerun", None).unwrap();
    let runtime = HostRuntime::default();
    let handle = runtime
        .start(ContainerSpec::new("rerun", "host-agent:ubuntu-22.04", "rerun", &workspace))
        .await
        .unwrap();
    std::fs::write(workspace.join("state"), "ready").unwrap();

    let check = task(
        "rerun",
        TaskCategory::BackgroundService,
        "grep -q ready /testbed/state && echo 'Setup successful' || echo 'Setup failed'",
    );
    let validator = Validator::new(Duration::from_secs(30));
    let first = validator.validate(&handle, &check).await.unwrap();
    let second = validator.validate(&handle, &check).await.unwrap();

    assert!(first.success);
    assert_eq!(first.success, second.success);
    assert_eq!(first.output, second.output);
    runtime.remove(handle).await.unwrap();
}
