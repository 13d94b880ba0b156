//! eqdif - simulate polynomial differential equation systems
//!
//! # Usage
//!
//! ```bash
//! eqdif presets
//! eqdif show --preset prey-predator
//! eqdif step --preset prey-predator --method rk4 --count 10 --output prey.snapshot
//! eqdif run --input prey.snapshot --fps 30 --duration-ms 2000 --pause-ms 500
//! ```
//!
//! Set `RUST_LOG=debug` to see every simulated value vector.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::process;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use commands::{RunArgs, SourceArgs, StepArgs};

#[derive(Parser, Debug)]
#[command(name = "eqdif")]
#[command(about = "Simulate systems of polynomial differential equations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the built-in systems
    Presets,
    /// Print the variables, ranges and equations of a system
    Show(SourceArgs),
    /// Advance a system synchronously
    Step(StepArgs),
    /// Run a system in the background for a while
    Run(RunArgs),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Presets => commands::list_presets(),
        Commands::Show(source) => commands::show(source),
        Commands::Step(args) => commands::step(args),
        Commands::Run(args) => commands::run(args),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}
