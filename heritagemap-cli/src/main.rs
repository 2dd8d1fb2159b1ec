//! HeritageMap CLI - Command-line interface
//!
//! Manages the configuration file and runs map sessions, either against a
//! WebSocket-connected map surface (`run`) or fully offline (`simulate`).

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use commands::run::RunArgs;
use commands::simulate::SimulateArgs;

#[derive(Parser)]
#[command(name = "heritagemap")]
#[command(version = heritagemap::VERSION)]
#[command(about = "Keep a moving position, nearby heritage sites and a map surface in sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or complete the configuration file
    Init {
        /// Overwrite existing values with the defaults
        #[arg(long)]
        force: bool,
    },

    /// View or modify configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Serve a map surface over WebSocket and replay a track
    Run(RunArgs),

    /// Replay a track against a local sites file and print the map
    Simulate(SimulateArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { force } => commands::init::run(force),
        Commands::Config(command) => commands::config::run(command),
        Commands::Run(args) => commands::run::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(e.exit_code());
    }
}
