//! Talos - task context caching and integrity engine
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use talos::cli::{Cli, Commands};
use talos::config::ConfigManager;
use talos::error::TalosResult;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> TalosResult<()> {
    let cli = Cli::parse();

    let manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = manager.load().await?;

    // Logging: 0 = warn (or info with general.verbose), 1 = info, 2+ = debug
    let filter = match (cli.verbose, config.general.verbose) {
        (0, false) => EnvFilter::new("talos=warn"),
        (0, true) | (1, _) => EnvFilter::new("talos=info"),
        _ => EnvFilter::new("talos=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time();
    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Init(args) => talos::cli::commands::init(args, &config).await,
        Commands::Show(args) => talos::cli::commands::show(args, &config).await,
        Commands::List(args) => talos::cli::commands::list(args, &config).await,
        Commands::Evidence(args) => talos::cli::commands::evidence(args, &config).await,
        Commands::Qa(args) => talos::cli::commands::qa(args, &config).await,
        Commands::Drift(args) => talos::cli::commands::drift(args, &config).await,
        Commands::Quarantine(args) => talos::cli::commands::quarantine(args, &config).await,
        Commands::Migrate(args) => talos::cli::commands::migrate(args, &config).await,
        Commands::Config(args) => talos::cli::commands::config(args, &config, &manager).await,
        Commands::Status => talos::cli::commands::status(&config).await,
    }
}
