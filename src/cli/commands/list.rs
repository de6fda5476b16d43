//! List command - enumerate stored bundles

use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::TalosResult;
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;
    let ids = facade.list_bundles().await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ids)?),
        OutputFormat::Plain => {
            if ids.is_empty() {
                println!("{}", style("No bundles stored").dim());
                return Ok(());
            }
            for id in &ids {
                println!("{id}");
            }
            println!();
            println!("{} bundle(s)", ids.len());
        }
    }

    Ok(())
}
