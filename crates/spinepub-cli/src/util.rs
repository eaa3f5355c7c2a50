use clap::ArgMatches;

use crate::error::{CliError, ExitStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

/// Reads a required positional id argument.
pub fn parse_id(matches: &ArgMatches, name: &str) -> Result<i64, CliError> {
    let raw = matches
        .get_one::<String>(name)
        .ok_or_else(|| CliError::new(format!("missing {name}"), ExitStatus::Usage))?;
    raw.trim().parse::<i64>().map_err(|_| {
        CliError::new(
            format!("{name} must be an integer, got '{raw}'"),
            ExitStatus::Usage,
        )
    })
}

#[cfg(test)]
mod tests {
    use clap::{Arg, Command};

    use super::*;

    #[test]
    fn ids_must_be_integers() {
        let command = Command::new("t").arg(Arg::new("activity-id").required(true));
        let matches = command.clone().try_get_matches_from(["t", "42"]).unwrap();
        assert_eq!(parse_id(&matches, "activity-id").unwrap(), 42);

        let matches = command.try_get_matches_from(["t", "abc"]).unwrap();
        let err = parse_id(&matches, "activity-id").unwrap_err();
        assert_eq!(err.status(), ExitStatus::Usage);
    }
}
