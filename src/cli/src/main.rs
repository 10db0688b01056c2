//! Canopy CLI - validate, inspect and exercise permission configurations.
//!
//! Provides commands to check a hierarchy/policy definition, look at one
//! entity type, and run memberships and subjects through the decision engine.

mod commands;
mod output;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{decide, inspect, validate};
use output::OutputFormat;

/// Canopy - entity-hierarchy-aware permission decisions
#[derive(Parser)]
#[command(
    name = "canopy",
    author = "Aezi <aezi.zhu@icloud.com>",
    version = "0.1.0",
    about = "Canopy - entity-hierarchy-aware permission decisions",
    long_about = "CLI tool for validating hierarchy and policy definitions and for running permission decisions against them.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the hierarchy and policies and summarize them
    Validate(validate::ValidateArgs),

    /// Show one entity type and its policies
    Inspect(inspect::InspectArgs),

    /// Decide permissions for subjects given memberships
    Decide(decide::DecideArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;
    let verbosity = cli.verbose;

    let result = match cli.command {
        Commands::Validate(args) => validate::execute(args, verbosity, format),
        Commands::Inspect(args) => inspect::execute(args, verbosity, format),
        Commands::Decide(args) => decide::execute(args, verbosity, format),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
