//! Quarantine command - list and release quarantined bundles

use crate::cli::args::{QuarantineAction, QuarantineArgs};
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::TalosResult;
use console::style;

/// Execute the quarantine command
pub async fn execute(args: QuarantineArgs, config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;

    match args.action {
        QuarantineAction::List => {
            let entries = facade.quarantined().await?;
            if entries.is_empty() {
                println!("{}", style("No quarantined bundles").dim());
                return Ok(());
            }

            for entry in &entries {
                println!(
                    "{} quarantined {}",
                    style(&entry.task_id).bold().red(),
                    entry.quarantined_at.format("%Y-%m-%d %H:%M")
                );
                println!("  reason:  {}", entry.reason);
                println!("  release: {}", entry.release_conditions);
            }
            Ok(())
        }
        QuarantineAction::Release {
            task_id,
            justification,
        } => {
            let entry = facade.release_quarantine(&task_id, &justification).await?;
            println!(
                "{} {} (was quarantined for: {})",
                style("Released").green().bold(),
                entry.task_id,
                entry.reason
            );
            Ok(())
        }
    }
}
