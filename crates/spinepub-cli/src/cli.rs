use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use crate::commands::{self, CommandResult};
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::formatter::{OutputFormat, emit_result};
use crate::util::Verbosity;

const NAME: &str = "spinepub";

pub fn run() -> ExitCode {
    init_tracing();
    match run_cli(std::env::args()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses arguments, bootstraps the session, and dispatches to a command.
/// Returns a `sysexits`-compatible exit code.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let command = build_cli();
    let matches = command.try_get_matches_from(args)?;

    let verbosity = Verbosity {
        json: matches.get_flag("json"),
        verbose: matches.get_flag("verbose"),
    };
    let output = if verbosity.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    if let Some(("schema", sub)) = matches.subcommand() {
        return emit_result(commands::inspect::run_schema(sub)?, output);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(execute(&matches, verbosity))?;
    emit_result(result, output)
}

async fn execute(matches: &ArgMatches, verbosity: Verbosity) -> Result<CommandResult, CliError> {
    let config_path = matches.get_one::<String>("config").cloned();
    let data_path = matches.get_one::<String>("data").cloned();
    let session = CliSession::bootstrap(config_path, data_path, verbosity).await?;
    if session.verbosity.verbose {
        tracing::info!(
            layout = ?session.config.layout,
            assets_path = %session.config.assets_path,
            storage_root = %session.config.storage.root.display(),
            public_path = %session.config.storage.public_path,
            data = %session.data_path.display(),
            "resolved publisher configuration"
        );
    }

    let result = dispatch(&session, matches).await?;
    if result.mutates_live_data() {
        session.persist()?;
    }
    Ok(result)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Publish course repositories as static, versioned spines")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Publisher configuration file (YAML). Environment variables override it."),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .value_name("PATH")
                .global(true)
                .help("Live content snapshot (JSON). Defaults to ./live.json."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit JSON instead of human-readable text."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log the resolved configuration before running the command."),
        )
        .subcommand_required(true)
        .subcommand(commands::publish::publish_command())
        .subcommand(commands::publish::unpublish_command())
        .subcommand(commands::publish::details_command())
        .subcommand(commands::content::command())
        .subcommand(commands::inspect::spine_command())
        .subcommand(commands::inspect::catalog_command())
        .subcommand(commands::inspect::schema_command())
}

async fn dispatch(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    match matches.subcommand() {
        Some(("publish", sub)) => commands::publish::run_publish(session, sub).await,
        Some(("unpublish", sub)) => commands::publish::run_unpublish(session, sub).await,
        Some(("details", sub)) => commands::publish::run_details(session, sub).await,
        Some(("content", sub)) => commands::content::run(session, sub).await,
        Some(("spine", sub)) => commands::inspect::run_spine(session, sub).await,
        Some(("catalog", _)) => commands::inspect::run_catalog(session).await,
        _ => Err(CliError::new("missing command", ExitStatus::Usage)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        build_cli().debug_assert();
    }
}
