//! Show command - display a stored bundle

use crate::cli::args::{OutputFormat, ShowArgs};
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::TalosResult;
use crate::model::TaskContextBundle;
use console::style;

/// Execute the show command
pub async fn execute(args: ShowArgs, config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;
    let bundle = facade.get_context(&args.task_id).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&bundle)?),
        OutputFormat::Plain => print_plain(&bundle),
    }

    Ok(())
}

fn print_plain(bundle: &TaskContextBundle) {
    println!("{}", style(&bundle.task_id).bold().cyan());
    println!("  created:       {}", bundle.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  version token: {}", bundle.version_token);
    println!("  source commit: {}", bundle.snapshot.source_commit);

    println!();
    println!("{}", style("Plan:").bold());
    for (i, step) in bundle.snapshot.plan_steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }

    if !bundle.snapshot.standards_excerpts.is_empty() {
        println!();
        println!("{}", style("Standards:").bold());
        for excerpt in &bundle.snapshot.standards_excerpts {
            println!(
                "  {}#{} ({})",
                excerpt.path.display(),
                excerpt.heading,
                &excerpt.content_hash[..12.min(excerpt.content_hash.len())]
            );
        }
    }

    println!();
    println!("{}", style("State:").bold());
    println!("  evidence artifacts: {}", bundle.evidence.len());
    println!("  qa results:         {}", bundle.qa_results.len());
    println!("  drift reports:      {}", bundle.drift_reports.len());

    if let Some(report) = bundle.drift_reports.last() {
        let status = match report.status {
            crate::model::DriftStatus::Clean => style("clean").green(),
            crate::model::DriftStatus::Drifted => style("drifted").red(),
            crate::model::DriftStatus::Unknown => style("unknown").yellow(),
        };
        println!(
            "  last drift check:   {} at {}",
            status,
            report.checked_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
