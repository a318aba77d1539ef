//! CLI command definitions for setupbench.
//!
//! `run` executes tasks end to end, `build-image` pre-builds agent images,
//! and `summarize` rebuilds a summary from existing result files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::agent::{ClaudeCodeAgent, ClaudeCodeOptions};
use crate::config::{
    ApiCredential, HarnessConfig, ImageConfig, API_KEY_ENV, DEFAULT_AGENT_TIMEOUT_SECS,
    DEFAULT_MAX_STEPS, DEFAULT_OUTPUT_DIR, DEFAULT_VALIDATION_TIMEOUT_SECS,
};
use crate::docker::AgentImageBuilder;
use crate::execution::{DockerClient, DockerRuntime, ResourceLimits};
use crate::harness::{read_results, write_summary, Harness, RunSummary};
use crate::metrics::HarnessMetrics;
use crate::task::load_tasks;

/// Run SetupBench tasks against a coding agent in Docker.
#[derive(Parser)]
#[command(name = "setupbench")]
#[command(about = "Run SetupBench environment-setup tasks against Claude Code in Docker")]
#[command(version)]
#[command(
    long_about = "setupbench runs environment-setup tasks: each task gets a fresh container built from its base image, an agent that works inside it, and a validation command run in a new login shell.\n\nExample usage:\n  setupbench run tasks/ --output ./setupbench-results --concurrency 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run tasks from a file or directory of task descriptors.
    Run(RunArgs),

    /// Build (or reuse) agent images for the given base images.
    BuildImage(BuildImageArgs),

    /// Rebuild summary.json from the result files of an earlier run.
    Summarize(SummarizeArgs),
}

/// Arguments for `setupbench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Task file (.json, .jsonl, .yaml) or directory of task files.
    pub tasks: PathBuf,

    /// Output directory for workspaces, logs, results and the summary.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Number of tasks to run at once.
    #[arg(short = 'c', long, default_value = "1")]
    pub concurrency: usize,

    /// Only run the first N tasks.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Agent wall-clock timeout per task, in seconds.
    #[arg(long, default_value_t = DEFAULT_AGENT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Maximum agent tool calls per task.
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: u32,

    /// Validation command timeout, in seconds.
    #[arg(long, default_value_t = DEFAULT_VALIDATION_TIMEOUT_SECS)]
    pub validation_timeout: u64,

    /// Model passed to the agent.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Directory with per-task fixtures, copied from <DIR>/<instance_id>/.
    #[arg(long)]
    pub fixtures_dir: Option<PathBuf>,

    /// Rebuild agent images even if they already exist.
    #[arg(long)]
    pub force_rebuild: bool,

    /// Container memory limit in MB.
    #[arg(long)]
    pub memory_mb: Option<u64>,

    /// Container CPU limit.
    #[arg(long)]
    pub cpus: Option<f64>,

    /// Container process limit.
    #[arg(long)]
    pub pids: Option<i64>,

    /// API key for the agent backend.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output JSON to stdout instead of a human-readable summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `setupbench build-image`.
#[derive(Parser, Debug)]
pub struct BuildImageArgs {
    /// Base images to build agent images for.
    #[arg(required = true)]
    pub base_images: Vec<String>,

    /// Rebuild even if the image already exists.
    #[arg(long)]
    pub force: bool,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `setupbench summarize`.
#[derive(Parser, Debug)]
pub struct SummarizeArgs {
    /// Output directory of an earlier `run`.
    pub output: PathBuf,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_tasks_command(args).await?,
        Commands::BuildImage(args) => run_build_image_command(args).await?,
        Commands::Summarize(args) => run_summarize_command(args).await?,
    }
    Ok(())
}

fn harness_config(args: &RunArgs) -> HarnessConfig {
    let mut limits = ResourceLimits::default();
    if let Some(memory_mb) = args.memory_mb {
        limits = limits.with_memory_mb(memory_mb);
    }
    if let Some(cpus) = args.cpus {
        limits = limits.with_cpus(cpus);
    }
    if let Some(pids) = args.pids {
        limits = limits.with_pids(pids);
    }

    let mut config = HarnessConfig::new(&args.output)
        .with_concurrency(args.concurrency)
        .with_agent_timeout(Duration::from_secs(args.timeout))
        .with_max_steps(args.max_steps)
        .with_validation_timeout(Duration::from_secs(args.validation_timeout))
        .with_image_config(ImageConfig {
            force_rebuild: args.force_rebuild,
            ..ImageConfig::default()
        })
        .with_limits(limits);
    if let Some(model) = &args.model {
        config = config.with_model(model);
    }
    if let Some(dir) = &args.fixtures_dir {
        config = config.with_fixtures_dir(dir);
    }
    config
}

async fn connect_docker() -> anyhow::Result<DockerClient> {
    let client = DockerClient::new()?;
    client.ping().await?;
    Ok(client)
}

async fn run_tasks_command(args: RunArgs) -> anyhow::Result<()> {
    let credential = ApiCredential::resolve(args.api_key.clone())?;
    let config = harness_config(&args);
    config.validate()?;

    let tasks = load_tasks(&args.tasks, args.limit)?;
    let client = connect_docker().await?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let images = AgentImageBuilder::new(client.clone(), config.image.clone());
    let runtime = DockerRuntime::new(client, images);
    let agent = ClaudeCodeAgent::new(
        credential,
        ClaudeCodeOptions {
            allowed_tools: config.allowed_tools.clone(),
            model: config.model.clone(),
            ..ClaudeCodeOptions::default()
        },
    );
    let metrics = Arc::new(HarnessMetrics::new()?);

    info!(
        tasks = tasks.len(),
        output = %config.output_dir.display(),
        "Running SetupBench tasks"
    );
    let harness = Harness::new(runtime, agent, config, metrics);
    let summary = harness.run_batch(&tasks).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, harness.config().output_dir.as_path());
    }
    Ok(())
}

#[derive(Serialize)]
struct BuiltImage {
    base_image: String,
    agent_image: Option<String>,
    error: Option<String>,
}

async fn run_build_image_command(args: BuildImageArgs) -> anyhow::Result<()> {
    let client = connect_docker().await?;
    let builder = AgentImageBuilder::new(
        client,
        ImageConfig {
            force_rebuild: args.force,
            ..ImageConfig::default()
        },
    );

    let mut built = Vec::with_capacity(args.base_images.len());
    for base in &args.base_images {
        match builder.ensure(base).await {
            Ok(tag) => built.push(BuiltImage {
                base_image: base.clone(),
                agent_image: Some(tag),
                error: None,
            }),
            Err(e) => {
                warn!(base = %base, error = %e, "Agent image build failed");
                built.push(BuiltImage {
                    base_image: base.clone(),
                    agent_image: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&built)?);
    } else {
        for image in &built {
            match (&image.agent_image, &image.error) {
                (Some(tag), _) => println!("  {} -> {}", image.base_image, tag),
                (None, Some(err)) => println!("  {} FAILED: {}", image.base_image, err),
                (None, None) => {}
            }
        }
    }

    let failed = built.iter().filter(|i| i.error.is_some()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} agent images failed to build", failed, built.len());
    }
    Ok(())
}

async fn run_summarize_command(args: SummarizeArgs) -> anyhow::Result<()> {
    let config = HarnessConfig::new(&args.output);
    let results = read_results(&config.results_dir()).await?;
    if results.is_empty() {
        anyhow::bail!("No result files found in {}", config.results_dir().display());
    }

    let summary = RunSummary::from_results(results);
    write_summary(&config.summary_path(), &summary).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, &args.output);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, output_dir: &Path) {
    println!("\n=== SetupBench Results ===");
    println!(
        "Success rate:   {}/{} ({:.1}%)",
        summary.successful_tasks, summary.total_tasks, summary.success_rate
    );
    println!("Avg tokens:     {:.1}K", summary.avg_tokens / 1000.0);
    println!("Avg steps:      {:.1}", summary.avg_steps);
    println!("Avg time:       {:.1}s", summary.avg_time_seconds);

    if !summary.errors_by_kind.is_empty() {
        println!("Errors:");
        for (kind, count) in &summary.errors_by_kind {
            println!("  {:<28}{}", kind, count);
        }
    }

    if !summary.by_category.is_empty() {
        println!("By category:");
        for (category, stats) in &summary.by_category {
            println!(
                "  {:<28}{}/{} ({:.1}%)",
                category, stats.successful, stats.total, stats.success_rate
            );
        }
    }
    println!();

    for r in &summary.results {
        let status = if r.success { "PASS" } else { "FAIL" };
        println!(
            "  {} [{}] steps={} tokens={} time={:.1}s",
            r.instance_id, status, r.total_steps, r.total_tokens, r.wall_time_seconds
        );
        if let Some(err) = &r.error {
            println!("    error: {err}");
        }
    }
    println!("\nSummary: {}", output_dir.join("summary.json").display());
}
