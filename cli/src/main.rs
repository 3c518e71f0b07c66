//! CLI for callspan
//!
//! Commands:
//! - replay: Run a recorded host script through the engine
//! - show: Print a saved session report

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "callspan")]
#[command(about = "callspan - call profiler and span tracer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded host script and report the session
    Replay(commands::replay::ReplayArgs),

    /// Print a saved session report (JSON or binary)
    Show(commands::show::ShowArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(args) => {
            init_tracing(args.verbose);
            commands::replay::run(args)
        }
        Commands::Show(args) => {
            init_tracing(false);
            commands::show::run(args)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
