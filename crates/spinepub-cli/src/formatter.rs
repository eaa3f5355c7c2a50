use std::process::ExitCode;

use spinepub::{Spine, UnpublishReport};

use crate::commands::CommandResult;
use crate::error::CliError;

pub enum OutputFormat {
    Text,
    Json,
}

/// Renders a `CommandResult` as text or JSON and converts it into an exit code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => print_json(&result)?,
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) {
    match result {
        CommandResult::Published { outcome } => {
            println!(
                "Published activity {} in repository {} (version: {})",
                outcome.activity_id,
                outcome.repository_id,
                outcome.version.as_deref().unwrap_or("unknown")
            );
            for container in &outcome.content.content_containers {
                println!(
                    "  - {}.{} ({}, {} elements)",
                    container.id, container.published_as, container.kind, container.element_count
                );
            }
            println!("  assessments: {}", outcome.content.assessments.len());
        }
        CommandResult::Unpublished {
            repository_id,
            activity_id,
            report,
        } => print_unpublish(*repository_id, *activity_id, report),
        CommandResult::DetailsPublished {
            repository_id,
            version,
            published_at,
        } => {
            println!(
                "Published details of repository {repository_id} (version: {}, at {})",
                version.as_deref().unwrap_or("unknown"),
                published_at.as_deref().unwrap_or("unknown")
            );
        }
        CommandResult::Content {
            activity_id,
            signed,
            content,
        } => {
            let mode = if *signed { "signed" } else { "raw" };
            println!("Content of activity {activity_id} ({mode}):");
            for container in &content.containers {
                println!(
                    "  - {} [{}] {} elements",
                    container.file_name(),
                    container.kind,
                    container.elements.len()
                );
            }
            println!("  assessments: {}", content.assessments.len());
        }
        CommandResult::Spine { spine } => print_spine(spine),
        CommandResult::Catalog { entries } => {
            println!("Repositories ({}):", entries.len());
            for entry in entries {
                let published = entry
                    .published_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("  - {} {} (published: {published})", entry.id, entry.name);
            }
        }
        CommandResult::Schema { schema, .. } => {
            // Schemas are only useful as JSON.
            match serde_json::to_string_pretty(schema) {
                Ok(text) => println!("{text}"),
                Err(err) => eprintln!("failed to render schema: {err}"),
            }
        }
    }
}

fn print_unpublish(repository_id: i64, activity_id: i64, report: &UnpublishReport) {
    if report.removed.is_empty() {
        println!("Activity {activity_id} is not published in repository {repository_id}");
        return;
    }
    println!(
        "Unpublished activity {activity_id} from repository {repository_id} ({} nodes removed)",
        report.removed.len()
    );
    for key in &report.deleted_files {
        println!("  [DEL] {key}");
    }
    for failed in &report.failed_files {
        println!("  [ERR] {}: {}", failed.key, failed.error);
    }
}

fn print_spine(spine: &Spine) {
    println!(
        "Spine of repository {} '{}' (version: {}, {} nodes)",
        spine.id,
        spine.name,
        spine.version.as_deref().unwrap_or("unpublished"),
        spine.structure.len()
    );
    for node in &spine.structure {
        let parent = node
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let containers = node.content_containers.as_ref().map_or(0, Vec::len);
        println!(
            "  - {} {} (parent: {parent}, containers: {containers})",
            node.id, node.kind
        );
    }
}

fn print_json(result: &CommandResult) -> Result<(), CliError> {
    let payload = serde_json::to_string(result)?;
    println!("{payload}");
    Ok(())
}
