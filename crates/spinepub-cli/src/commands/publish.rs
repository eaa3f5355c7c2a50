use clap::{Arg, ArgMatches, Command};
use spinepub::LiveStore;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;
use crate::util::parse_id;

pub fn publish_command() -> Command {
    Command::new("publish")
        .about("Publish an activity, its content, and any missing predecessors")
        .arg(
            Arg::new("activity-id")
                .required(true)
                .value_name("ACTIVITY_ID")
                .help("Id of the activity to publish"),
        )
}

pub fn unpublish_command() -> Command {
    Command::new("unpublish")
        .about("Remove an activity and its descendants from the published spine")
        .arg(
            Arg::new("activity-id")
                .required(true)
                .value_name("ACTIVITY_ID")
                .help("Id of the activity to unpublish"),
        )
}

pub fn details_command() -> Command {
    Command::new("details")
        .about("Republish repository-level attributes without touching its structure")
        .arg(
            Arg::new("repository-id")
                .required(true)
                .value_name("REPOSITORY_ID")
                .help("Id of the repository"),
        )
}

pub async fn run_publish(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let activity_id = parse_id(matches, "activity-id")?;
    let activity = session.store.activity(activity_id).await?;
    let outcome = session.publisher.publish_activity(&activity).await?;
    Ok(CommandResult::Published { outcome })
}

pub async fn run_unpublish(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let activity_id = parse_id(matches, "activity-id")?;
    let activity = session.store.activity(activity_id).await?;
    let repository = session.store.repository(activity.repository_id).await?;
    let report = session
        .publisher
        .unpublish_activity(&repository, &activity)
        .await?;
    Ok(CommandResult::Unpublished {
        repository_id: repository.id,
        activity_id,
        report,
    })
}

pub async fn run_details(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let repository_id = parse_id(matches, "repository-id")?;
    let repository = session.store.repository(repository_id).await?;
    let spine = session.publisher.publish_repository_details(&repository).await?;
    Ok(CommandResult::DetailsPublished {
        repository_id,
        version: spine.version,
        published_at: spine.published_at.map(|at| at.to_rfc3339()),
    })
}
