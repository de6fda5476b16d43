//! Status command - summarize the bundle store

use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::TalosResult;
use console::style;

/// Execute the status command
pub async fn execute(config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;
    let status = facade.status().await?;

    println!("{}", style("Talos Store Status").bold().cyan());
    println!();
    println!("  store root:      {}", status.store_root.display());
    println!("  schema version:  {}", status.schema_version);
    println!("  bundles:         {}", status.bundle_count);

    if status.quarantined_count > 0 {
        println!(
            "  quarantined:     {}",
            style(status.quarantined_count).red().bold()
        );
    } else {
        println!("  quarantined:     0");
    }

    if status.open_exceptions > 0 {
        println!(
            "  open exceptions: {}",
            style(status.open_exceptions).yellow().bold()
        );
        println!();
        for record in facade.open_exceptions().await? {
            println!(
                "  {} [{}] {} - {}",
                style(&record.task_id).bold(),
                record.stage,
                record.error_code,
                record.recorded_at.format("%Y-%m-%d %H:%M")
            );
        }
    } else {
        println!("  open exceptions: 0");
    }

    Ok(())
}
