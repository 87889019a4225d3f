//! Flowcheck CLI - Main Entry Point
//!
//! Runs, lists, validates and exports browser flows.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{export, list, run, validate};

/// Flowcheck - scripted browser flows with a pass/fail verdict
#[derive(Parser)]
#[command(name = "flowcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to ./flowcheck.yaml when present)
    #[arg(long, global = true, env = "FLOWCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run flows and report a verdict for each
    Run(run::RunArgs),

    /// List flows
    List(list::ListArgs),

    /// Parse and check flows without running them
    Validate(validate::ValidateArgs),

    /// Render a flow as a standalone Playwright script
    Export(export::ExportArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let code = match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::List(args) => list::execute(args, cli.format),
        Commands::Validate(args) => validate::execute(args, cli.format),
        Commands::Export(args) => export::execute(args, config),
    };

    match code {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    }
}
