use std::fmt;
use std::process::ExitCode;

use clap::error::ErrorKind as ClapErrorKind;
use spinepub::{IntegrityError, PublishError};

/// Process exit statuses, valued per `sysexits.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Ok = 0,
    /// `EX_USAGE`
    Usage = 64,
    /// `EX_DATAERR`: live content failed an integrity check.
    Data = 65,
    /// `EX_SOFTWARE`
    Software = 70,
    /// `EX_OSERR`: storage or filesystem failure, including partial cleanup.
    Io = 71,
    /// `EX_CONFIG`
    Config = 78,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug)]
pub struct CliError {
    message: String,
    status: ExitStatus,
}

impl CliError {
    pub fn new(message: impl Into<String>, status: ExitStatus) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    /// Help and version output already printed by clap.
    fn silent() -> Self {
        Self::new(String::new(), ExitStatus::Ok)
    }

    pub fn status(&self) -> ExitStatus {
        self.status
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status.code())
    }

    pub fn print(&self) {
        if !self.message.is_empty() {
            eprintln!("error: {}", self.message);
        }
    }
}

fn integrity_status(err: &IntegrityError) -> ExitStatus {
    match err {
        IntegrityError::Context { source, .. } => integrity_status(source),
        // A repository naming a schema nobody registered is a setup problem.
        IntegrityError::UnknownSchema(_) => ExitStatus::Config,
        _ => ExitStatus::Data,
    }
}

impl From<PublishError> for CliError {
    fn from(err: PublishError) -> Self {
        let status = match &err {
            PublishError::Integrity(integrity) => integrity_status(integrity),
            PublishError::Config(_) => ExitStatus::Config,
            PublishError::Storage(_) | PublishError::Io(_) => ExitStatus::Io,
            PublishError::Store(_) | PublishError::Serialization(_) => ExitStatus::Software,
        };
        CliError::new(err.to_string(), status)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> Self {
        match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                let _ = err.print();
                CliError::silent()
            }
            _ => CliError::new(err.to_string(), ExitStatus::Usage),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::new(err.to_string(), ExitStatus::Io)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::new(format!("failed to encode output: {err}"), ExitStatus::Software)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}
