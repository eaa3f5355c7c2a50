use clap::{Arg, ArgMatches, Command};
use spinepub::{CatalogEntry, LiveStore, Spine};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::util::parse_id;

const SPINE_DOCUMENT: &str = "spine";
const CATALOG_DOCUMENT: &str = "catalog";

pub fn spine_command() -> Command {
    Command::new("spine")
        .about("Show the published spine of a repository")
        .arg(
            Arg::new("repository-id")
                .required(true)
                .value_name("REPOSITORY_ID")
                .help("Id of the repository"),
        )
}

pub fn catalog_command() -> Command {
    Command::new("catalog").about("List every published repository")
}

pub fn schema_command() -> Command {
    Command::new("schema")
        .about("Print the JSON Schema of a published document")
        .arg(
            Arg::new("document")
                .required(true)
                .value_parser([SPINE_DOCUMENT, CATALOG_DOCUMENT])
                .help("Document to describe"),
        )
}

pub async fn run_spine(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let repository_id = parse_id(matches, "repository-id")?;
    let repository = session.store.repository(repository_id).await?;
    let spine = session.publisher.spines().load(&repository).await?;
    Ok(CommandResult::Spine { spine })
}

pub async fn run_catalog(session: &CliSession) -> Result<CommandResult, CliError> {
    let entries = session.publisher.spines().catalog().await?;
    Ok(CommandResult::Catalog { entries })
}

/// Needs no session: schemas describe the types, not stored data.
pub fn run_schema(matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let document = matches
        .get_one::<String>("document")
        .cloned()
        .ok_or_else(|| CliError::new("missing document", ExitStatus::Usage))?;
    let schema = match document.as_str() {
        SPINE_DOCUMENT => schemars::schema_for!(Spine),
        CATALOG_DOCUMENT => schemars::schema_for!(Vec<CatalogEntry>),
        other => {
            return Err(CliError::new(
                format!("unknown document '{other}'"),
                ExitStatus::Usage,
            ));
        }
    };
    Ok(CommandResult::Schema {
        document,
        schema: serde_json::to_value(schema)?,
    })
}
