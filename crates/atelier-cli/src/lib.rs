//! Atelier CLI - drives one chat turn against a local project.

mod cli_args;
mod console_sink;
mod provider_registration;

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use atelier_config::Config;
use atelier_core::{ChatTurn, RunnerContext, TurnError, TurnRequest};
use atelier_runtime::{
    DevServerRegistry, LocalCommandRunner, LocalProjectFs, UnconfiguredDatabase,
};

pub use cli_args::Cli;
use console_sink::ConsoleSink;
use provider_registration::register_providers;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(provider_ref) = &cli.provider {
        config = config.with_provider_override(provider_ref)?;
    }

    let project_root = cli
        .project
        .clone()
        .unwrap_or_else(|| config.project.root.clone().into());
    std::fs::create_dir_all(&project_root)
        .with_context(|| format!("failed to create project directory {:?}", project_root))?;
    debug!("Using project root {:?}", project_root);

    let prompt = match cli.prompt {
        Some(prompt) => prompt,
        None => {
            // No prompt argument: read one from stdin
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read prompt from stdin")?;
            buffer.trim().to_string()
        }
    };
    if prompt.is_empty() {
        anyhow::bail!("no prompt given");
    }

    let providers = Arc::new(register_providers(&config)?);
    let sink = Arc::new(ConsoleSink);

    let runner_ctx = RunnerContext {
        fs: Arc::new(LocalProjectFs::new(project_root)),
        commands: Arc::new(LocalCommandRunner::new()),
        dev_servers: Arc::new(DevServerRegistry::new()),
        database: Arc::new(UnconfiguredDatabase),
        alerts: sink.clone(),
        output: sink.clone(),
        migrations_dir: config.project.migrations_dir.clone(),
    };

    let mut turn = ChatTurn::new(providers, runner_ctx, sink, config.chat.clone());

    let request = TurnRequest {
        message_id: uuid::Uuid::new_v4().to_string(),
        prompt,
        history: Vec::new(),
    };

    match turn.run(request).await {
        Ok(outcome) => {
            debug!(
                "Turn complete: {} segments, {} total tokens",
                outcome.segments, outcome.usage.total_tokens
            );
            Ok(())
        }
        Err(TurnError::Cancelled) => {
            eprintln!("Turn cancelled.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
