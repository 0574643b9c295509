mod configuration;
mod error;
mod render;

use std::process::ExitCode;

use anyhow::{Context, Result};
use bashpilot::agent::{Agent, TaskOutcome};
use bashpilot::harmony::render_conversation;
use bashpilot::providers::openai::OpenAiProvider;
use clap::Parser;
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::configuration::Settings;
use crate::render::Renderer;

const DEMO_TASKS: [&str; 3] = [
    "Check what folders are available in this directory",
    "Find all Python files and count how many there are",
    "Show me the first 5 lines of README.md",
];
const DEMO_MAX_ITERATIONS: usize = 3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Task for the agent, e.g. `bashpilot list the largest files here`. Runs a few demo tasks when omitted.
    task: Vec<String>,

    /// Model calls allowed per task
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Directory commands run in
    #[arg(short, long)]
    working_dir: Option<String>,

    /// Seconds before a command is killed
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    /// Only print final answers and failures
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn is_demo(&self) -> bool {
        self.task.is_empty()
    }

    fn tasks(&self) -> Vec<String> {
        if self.is_demo() {
            DEMO_TASKS.iter().map(|task| task.to_string()).collect()
        } else {
            vec![self.task.join(" ")]
        }
    }

    /// Command line options win over every other source
    fn apply(&self, settings: &mut Settings) {
        if let Some(max_iterations) = self.max_iterations {
            settings.agent.max_iterations = max_iterations;
        } else if self.is_demo() {
            settings.agent.max_iterations = DEMO_MAX_ITERATIONS;
        }
        if let Some(model) = &self.model {
            settings.provider.model = model.clone();
        }
        if let Some(dir) = &self.working_dir {
            settings.agent.working_dir = Some(dir.clone());
        }
        if let Some(secs) = self.command_timeout {
            settings.agent.command_timeout = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut settings = Settings::new().context("Failed to load settings")?;
    cli.apply(&mut settings);

    let runner = settings.agent.runner().context("Invalid agent settings")?;
    let agent_config = settings.agent.agent_config();
    let provider_config = settings.provider.clone().into_config();
    tracing::info!(
        host = %provider_config.host,
        model = %provider_config.model,
        max_iterations = agent_config.max_iterations,
        "loaded settings"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(watch_interrupts(cancel.clone()));

    let tasks = cli.tasks();
    let mut renderer = Renderer::new(cli.quiet);
    let mut aborted = Vec::new();

    for (index, task) in tasks.iter().enumerate() {
        renderer.task_banner(index + 1, tasks.len(), task);

        let provider = OpenAiProvider::new(provider_config.clone())
            .context("Failed to create model client")?;
        let (events, mut received) = mpsc::unbounded_channel();
        let agent = Agent::new(Box::new(provider), runner.clone(), agent_config.clone())
            .with_events(events)
            .with_cancellation(cancel.clone());

        let outcome: TaskOutcome = {
            let run = agent.run(task);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    outcome = &mut run => break outcome,
                    Some(event) = received.recv() => renderer.render(&event),
                }
            }
        };
        while let Ok(event) = received.try_recv() {
            renderer.render(&event);
        }
        renderer.finish();

        tracing::debug!(
            transcript = %render_conversation(outcome.conversation.messages()),
            "task transcript"
        );
        if let Some(reason) = outcome.abort_reason() {
            aborted.push((task.clone(), reason.to_string()));
        }
        if index + 1 < tasks.len() && !cli.quiet {
            println!("\n");
        }
    }

    if !aborted.is_empty() {
        eprintln!();
        for (task, reason) in &aborted {
            eprintln!("{} {}: {}", style("✗").red().bold(), task, reason);
        }
    }
    Ok(exit_code(&aborted))
}

/// Failure when any task was aborted
fn exit_code(aborted: &[(String, String)]) -> ExitCode {
    if aborted.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// First Ctrl-C stops after the current iteration, a second one exits
async fn watch_interrupts(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::warn!("interrupted, stopping after the current step");
    eprintln!(
        "\n{}",
        style("Interrupted: finishing the current step (Ctrl-C again to quit)").yellow()
    );
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}
