//! Init command - create the context bundle for a unit of work

use crate::cli::args::InitArgs;
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::{TalosError, TalosResult};
use crate::model::WorkDescriptor;
use console::style;
use tokio::fs;

/// Execute the init command
pub async fn execute(args: InitArgs, config: &Config) -> TalosResult<()> {
    let requirements_text = if args.from_file {
        fs::read_to_string(&args.requirements)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", args.requirements), e))?
    } else {
        args.requirements
    };

    let descriptor = WorkDescriptor {
        task_id: args.task_id,
        requirements_text,
        plan_steps: args.plan_steps,
        standards_refs: args.standards_refs,
        source_paths: args.source_paths,
    };

    let facade = open_facade(config).await?;
    let bundle = facade.init_context(&descriptor).await?;

    let commit = &bundle.snapshot.source_commit;
    println!(
        "{} bundle {} at commit {}",
        style("Created").green().bold(),
        style(&bundle.task_id).bold(),
        &commit[..commit.len().min(12)]
    );
    println!("  plan steps:         {}", bundle.snapshot.plan_steps.len());
    println!(
        "  standards excerpts: {}",
        bundle.snapshot.standards_excerpts.len()
    );
    println!("  source paths:       {}", bundle.snapshot.source_paths.len());

    Ok(())
}
