//! QA command - run validation commands and manage the baseline

use crate::cli::args::{QaAction, QaArgs};
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::{TalosError, TalosResult};
use crate::facade::CacheFacade;
use crate::model::{QaStatus, ValidationCommand};
use crate::qa::format_drift_report;
use console::style;
use std::path::Path;
use tokio::fs;

/// Execute the qa command
pub async fn execute(args: QaArgs, config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;

    match args.action {
        QaAction::Run { task_id, commands } => run(&facade, &task_id, &commands).await,
        QaAction::Baseline { task_id } => baseline(&facade, &task_id).await,
        QaAction::Drift { task_id } => drift(&facade, &task_id).await,
    }
}

async fn run(facade: &CacheFacade, task_id: &str, commands_file: &Path) -> TalosResult<()> {
    let text = fs::read_to_string(commands_file)
        .await
        .map_err(|e| TalosError::io(format!("reading {}", commands_file.display()), e))?;
    let commands: Vec<ValidationCommand> = serde_json::from_str(&text)?;

    let results = facade.run_validation(task_id, &commands).await?;

    let mut failed = 0;
    for result in &results {
        let status = match result.status {
            QaStatus::Pass => style("pass").green(),
            QaStatus::Fail => style("fail").red(),
            QaStatus::Timeout => style("timeout").red(),
            QaStatus::Skipped => style("skipped").dim(),
        };
        println!(
            "{:<30} {:<8} {:>8}ms",
            result.command_ref, status, result.duration_ms
        );
        if result.status != QaStatus::Pass {
            failed += 1;
            if let Some(excerpt) = &result.redacted_excerpt {
                for line in excerpt.lines().take(10) {
                    println!("    {}", style(line).dim());
                }
            }
        }
    }

    println!();
    if failed == 0 {
        println!("{}", style("All validation commands passed").green().bold());
    } else {
        println!(
            "{}",
            style(format!("{failed} command(s) did not pass")).red().bold()
        );
    }
    Ok(())
}

async fn baseline(facade: &CacheFacade, task_id: &str) -> TalosResult<()> {
    let baseline = facade.set_qa_baseline(task_id).await?;
    println!(
        "{} baseline with {} result(s)",
        style("Recorded").green().bold(),
        baseline.results.len()
    );
    Ok(())
}

async fn drift(facade: &CacheFacade, task_id: &str) -> TalosResult<()> {
    let report = facade.qa_drift(task_id).await?;
    print!("{}", format_drift_report(&report));

    if report.has_drift() {
        return Err(TalosError::Internal("QA drift detected".to_string()));
    }
    Ok(())
}
