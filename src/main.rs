use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod ai;
mod checkpoint;
mod cli;
mod error;
mod git;
mod prompt;
mod workflow;

use ai::providers::ProviderRegistry;
use checkpoint::CheckpointStore;
use cli::args::Cli;
use error::GeetoError;
use git::SystemGit;
use prompt::ConsolePrompter;
use workflow::{RunOptions, Workflow};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging goes to stderr so it never interleaves with the prompts.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => match err.downcast_ref::<GeetoError>() {
            // Cancelling is a normal way out, not a failure.
            Some(GeetoError::Cancelled) => {
                println!("Cancelled.");
                0
            }
            Some(geeto_err) => {
                eprintln!("{geeto_err}");
                geeto_err.exit_code()
            }
            None => {
                eprintln!("error: {err:#}");
                1
            }
        },
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let repo_root = cli::paths::resolve_repo_root()?;

    let git = SystemGit::new(repo_root.clone());
    let store = CheckpointStore::new(&repo_root);
    let registry = ProviderRegistry::new();
    let prompter = ConsolePrompter::new();

    let workflow = Workflow::new(&git, &prompter, &store, &registry);
    workflow
        .run(RunOptions {
            fresh: cli.fresh,
            start_floor: cli.step.map(|s| s.floor()),
            stage_all: cli.stage_all,
        })
        .await
}
