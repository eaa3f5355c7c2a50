use clap::{Arg, ArgAction, ArgMatches, Command};
use spinepub::LiveStore;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;
use crate::util::parse_id;

pub fn command() -> Command {
    Command::new("content")
        .about("Fetch an activity's publishable content without writing it")
        .arg(
            Arg::new("activity-id")
                .required(true)
                .value_name("ACTIVITY_ID")
                .help("Id of the activity"),
        )
        .arg(
            Arg::new("signed")
                .long("signed")
                .action(ArgAction::SetTrue)
                .help("Resolve stored asset keys to servable URLs"),
        )
}

pub async fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let activity_id = parse_id(matches, "activity-id")?;
    let signed = matches.get_flag("signed");
    let activity = session.store.activity(activity_id).await?;
    let repository = session.store.repository(activity.repository_id).await?;
    let content = session
        .publisher
        .fetch_activity_content(&repository, &activity, signed)
        .await?;
    Ok(CommandResult::Content {
        activity_id,
        signed,
        content,
    })
}
