//! Migrate command - persist a bundle at the current schema version

use crate::cli::args::MigrateArgs;
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::TalosResult;
use crate::model::SCHEMA_VERSION;
use console::style;

/// Execute the migrate command
pub async fn execute(args: MigrateArgs, config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;
    let target = args.target.unwrap_or(SCHEMA_VERSION);
    let from = facade.migrate(&args.task_id, target).await?;

    if from == target {
        println!(
            "{} already at schema v{target}",
            style(&args.task_id).bold()
        );
    } else {
        println!(
            "{} {} from schema v{from} to v{target}",
            style("Migrated").green().bold(),
            style(&args.task_id).bold()
        );
    }
    Ok(())
}
