use std::collections::BTreeSet;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;

use foreman::action::executor::ActionExecutor;
use foreman::action::handlers::SandboxCtx;
use foreman::action::policy::{ActionPolicy, PolicyConfig};
use foreman::action::registry::{SupervisorRegistry, WorkerRegistry};
use foreman::agent::logging::RunLogger;
use foreman::agent::model::HttpModelClient;
use foreman::agent::supervisor::Supervisor;
use foreman::agent::worker::Worker;
use foreman::agent::AgentOutcome;
use foreman::cli::{Cli, Commands};
use foreman::config::AppConfig;
use foreman::harness::{CommandPackager, HeadlessBuildRunner, SubagentRunner};

/// Packaging (PyInstaller and friends) is much slower than sandbox commands,
/// so it gets its own ceiling.
const PACKAGING_TIMEOUT_SECS: u64 = 600;

/// Builds a fresh Worker, complete with its own model client, executor, and
/// script context, for every delegation from the Supervisor.
struct WorkerSpawner {
    config: AppConfig,
    policy: ActionPolicy,
    ctx: SandboxCtx,
    logger: RunLogger,
    api_key: String,
}

impl SubagentRunner for WorkerSpawner {
    async fn run_instruction(&mut self, instruction: &str) -> (bool, String) {
        let builder = HeadlessBuildRunner::new(
            self.config.python_bin.as_str(),
            self.ctx.root.clone(),
            self.config.build_grace_secs,
        );
        let registry = match WorkerRegistry::new(self.ctx.clone(), builder) {
            Ok(registry) => registry,
            Err(err) => return (false, format!("Failed to build worker registry: {err}")),
        };
        let executor = ActionExecutor::new(self.policy.clone(), registry);
        let client = HttpModelClient::new(
            self.config.base_url.as_str(),
            self.api_key.as_str(),
            self.config.model.as_str(),
        );
        let mut worker = Worker::new(
            client,
            executor,
            self.logger.clone(),
            self.config.entry_point.as_str(),
            self.config.worker_max_iterations,
        );
        let outcome = worker.run(instruction).await;
        (outcome.success, outcome.summary)
    }
}

fn sandbox_ctx(config: &AppConfig, policy: &ActionPolicy) -> SandboxCtx {
    SandboxCtx {
        root: policy.root_dir().to_path_buf(),
        command_timeout_sec: config.command_timeout_sec,
        max_output_chars: config.max_output_chars,
        python_bin: config.python_bin.clone(),
        entry_point: config.entry_point.clone(),
    }
}

fn record_outcome(logger: &RunLogger, task: &str, agent: &str, outcome: &AgentOutcome) {
    let mut metadata = serde_json::Map::new();
    metadata.insert("task".into(), Value::from(task));
    metadata.insert("agent".into(), Value::from(agent));
    metadata.insert("success".into(), Value::from(outcome.success));
    metadata.insert("iterations".into(), Value::from(outcome.iterations));
    metadata.insert("summary".into(), Value::from(outcome.summary.as_str()));
    logger.save_metadata(&metadata);
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("Foreman starting");

    let config = foreman::config::load_config(&cli)?;
    tracing::info!(
        model = %config.model,
        workspace = %config.workspace.display(),
        "Config loaded"
    );

    let api_key = std::env::var(&config.api_key_env).map_err(|_| {
        anyhow::anyhow!(
            "API key not found: set the {} environment variable",
            config.api_key_env
        )
    })?;

    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: config.workspace.clone(),
        allowed_commands: config.allowed_commands.iter().cloned().collect::<BTreeSet<_>>(),
        command_timeout_sec: config.command_timeout_sec,
        max_read_bytes: config.max_read_bytes,
        max_write_bytes: config.max_write_bytes,
        allow_shell: config.allow_shell,
        max_output_chars: config.max_output_chars,
    })?;

    let logger = RunLogger::new(&config.runs_dir, config.retention_days)?;
    tracing::info!(run_dir = %logger.run_dir().display(), "Run directory created");

    let ctx = sandbox_ctx(&config, &policy);

    let outcome = match &cli.command {
        Commands::Run { task, .. } => {
            let spawner = WorkerSpawner {
                config: config.clone(),
                policy: policy.clone(),
                ctx: ctx.clone(),
                logger: logger.clone(),
                api_key: api_key.clone(),
            };
            let packager = CommandPackager::new(
                config.packaging_cmd.clone(),
                policy.root_dir().to_path_buf(),
                PACKAGING_TIMEOUT_SECS,
            );
            let registry = SupervisorRegistry::new(ctx, spawner, packager)?;
            let executor = ActionExecutor::new(policy, registry);
            let client = HttpModelClient::new(
                config.base_url.as_str(),
                api_key.as_str(),
                config.model.as_str(),
            );
            let mut supervisor = Supervisor::new(
                client,
                executor,
                logger.clone(),
                config.supervisor_max_iterations,
                config.package_retry_budget,
            );
            let outcome = supervisor.run(task).await;
            record_outcome(&logger, task, "supervisor", &outcome);
            outcome
        }
        Commands::Worker { task, .. } => {
            let builder = HeadlessBuildRunner::new(
                config.python_bin.as_str(),
                policy.root_dir().to_path_buf(),
                config.build_grace_secs,
            );
            let registry = WorkerRegistry::new(ctx, builder)?;
            let executor = ActionExecutor::new(policy, registry);
            let client = HttpModelClient::new(
                config.base_url.as_str(),
                api_key.as_str(),
                config.model.as_str(),
            );
            let mut worker = Worker::new(
                client,
                executor,
                logger.clone(),
                config.entry_point.as_str(),
                config.worker_max_iterations,
            );
            let outcome = worker.run(task).await;
            record_outcome(&logger, task, "worker", &outcome);
            outcome
        }
    };

    if outcome.success {
        tracing::info!(iterations = outcome.iterations, "Run finished: {}", outcome.summary);
        println!("Success after {} iterations: {}", outcome.iterations, outcome.summary);
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(iterations = outcome.iterations, "Run failed: {}", outcome.summary);
        println!("Failed after {} iterations: {}", outcome.iterations, outcome.summary);
        Ok(ExitCode::FAILURE)
    }
}
