//! Evidence command - attach, list and verify artifacts

use crate::cli::args::{EvidenceAction, EvidenceArgs, OutputFormat};
use crate::cli::commands::open_facade;
use crate::config::Config;
use crate::error::{TalosError, TalosResult};
use crate::evidence::EvidenceSource;
use crate::facade::CacheFacade;
use crate::model::{ArtifactKind, EvidenceArtifact};
use console::style;
use std::path::Path;

/// Execute the evidence command
pub async fn execute(args: EvidenceArgs, config: &Config) -> TalosResult<()> {
    let facade = open_facade(config).await?;

    match args.action {
        EvidenceAction::Attach {
            task_id,
            path,
            kind,
        } => attach(&facade, &task_id, &path, &kind).await,
        EvidenceAction::List { task_id, format } => list(&facade, &task_id, format).await,
        EvidenceAction::Verify {
            task_id,
            artifact_id,
        } => verify(&facade, &task_id, artifact_id.as_deref()).await,
    }
}

async fn attach(
    facade: &CacheFacade,
    task_id: &str,
    path: &Path,
    kind: &str,
) -> TalosResult<()> {
    let kind = ArtifactKind::parse(kind).ok_or_else(|| TalosError::PathInvalid {
        path: path.to_path_buf(),
        reason: format!("unknown artifact kind: {kind}"),
    })?;

    let artifact = facade
        .attach_evidence(task_id, kind, EvidenceSource::Path(path))
        .await?;

    println!(
        "{} {} ({}, {} bytes)",
        style("Attached").green().bold(),
        artifact.artifact_id,
        artifact.kind,
        artifact.size_bytes
    );
    println!("  sha256: {}", artifact.sha256);
    Ok(())
}

async fn list(facade: &CacheFacade, task_id: &str, format: OutputFormat) -> TalosResult<()> {
    let artifacts = facade.list_evidence(task_id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&artifacts)?),
        OutputFormat::Plain => {
            if artifacts.is_empty() {
                println!("{}", style("No evidence attached").dim());
                return Ok(());
            }
            print_table(&artifacts);
        }
    }
    Ok(())
}

fn print_table(artifacts: &[EvidenceArtifact]) {
    println!(
        "{:<38} {:<10} {:>12} {:<20}",
        style("ID").bold(),
        style("KIND").bold(),
        style("SIZE").bold(),
        style("ATTACHED").bold()
    );
    println!("{}", "-".repeat(82));

    for artifact in artifacts {
        println!(
            "{:<38} {:<10} {:>12} {:<20}",
            artifact.artifact_id,
            artifact.kind.as_str(),
            artifact.size_bytes,
            artifact.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("{} artifact(s)", artifacts.len());
}

async fn verify(
    facade: &CacheFacade,
    task_id: &str,
    artifact_id: Option<&str>,
) -> TalosResult<()> {
    let artifacts = facade.list_evidence(task_id).await?;

    let targets: Vec<&EvidenceArtifact> = match artifact_id {
        Some(id) => {
            let artifact = artifacts
                .iter()
                .find(|a| a.artifact_id == id)
                .ok_or_else(|| TalosError::ArtifactNotFound(id.to_string()))?;
            vec![artifact]
        }
        None => artifacts.iter().collect(),
    };

    let mut corrupt = 0;
    for artifact in targets {
        let intact = facade.verify_evidence(task_id, &artifact.artifact_id).await?;
        if intact {
            println!("{} {}", style("ok").green(), artifact.artifact_id);
        } else {
            corrupt += 1;
            println!("{} {}", style("CORRUPT").red().bold(), artifact.artifact_id);
        }
    }

    if corrupt > 0 {
        return Err(TalosError::Internal(format!(
            "{corrupt} corrupt artifact(s)"
        )));
    }
    Ok(())
}
