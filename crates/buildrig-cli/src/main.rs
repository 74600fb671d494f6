// buildrig CLI entry point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use buildrig_config::SettingsManager;

mod commands;
mod logging;

use commands::{run::RunArgs, tree::TreeArgs, wait::WaitArgs};

/// Supervise build tools and dev servers for tests
#[derive(Parser, Debug)]
#[command(name = "buildrig")]
#[command(about = "Spawn, watch and tear down build tooling processes")]
struct Cli {
    /// Settings file (default: ./buildrig.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Spawn a command, wait until it is ready, then supervise it until exit
    Run(RunArgs),
    /// Poll a condition until it holds
    Wait(WaitArgs),
    /// Print a process and all of its descendants
    Tree(TreeArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let manager = match cli.config {
        Some(path) => SettingsManager::with_path(path),
        None => SettingsManager::new(),
    };
    let settings = manager.load()?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &settings).await,
        Commands::Wait(args) => commands::wait::execute(args, &settings).await,
        Commands::Tree(args) => commands::tree::execute(args),
    }
}
