//! Drift command - compare a bundle against the live working tree

use crate::cli::args::{DriftArgs, OutputFormat};
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::{TalosError, TalosResult};
use crate::model::DriftStatus;
use console::style;

/// Execute the drift command
pub async fn execute(args: DriftArgs, config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;
    let report = facade.verify_drift(&args.task_id).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => {
            let status = match report.status {
                DriftStatus::Clean => style("clean").green().bold(),
                DriftStatus::Drifted => style("drifted").red().bold(),
                DriftStatus::Unknown => style("unknown").yellow().bold(),
            };
            println!("{} {}", style(&args.task_id).bold(), status);
            println!("  baseline commit: {}", report.baseline_commit);
            if !report.current_commit.is_empty() {
                println!("  current commit:  {}", report.current_commit);
            }
            if !report.changed_paths.is_empty() {
                println!("  changed paths:");
                for path in &report.changed_paths {
                    println!("    {}", path.display());
                }
            }
        }
    }

    if report.status.is_blocking() {
        return Err(TalosError::Internal(format!(
            "drift status is {:?}",
            report.status
        )));
    }
    Ok(())
}
