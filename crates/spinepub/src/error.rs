use std::fmt;

use thiserror::Error;

/// Data-integrity failures. These abort the publish call that hit them.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("invalid primitive {element}: composite elements cannot be embedded")]
    InvalidPrimitive { element: String },
    #[error("malformed element in {element}: {reason}")]
    MalformedElement { element: String, reason: String },
    #[error("element {element} has no imsmanifest.xml asset")]
    MissingManifest { element: String },
    #[error("manifest {key} is not stored")]
    ManifestNotFound { key: String },
    #[error("malformed manifest {key}: {reason}")]
    MalformedManifest { key: String, reason: String },
    #[error("element {element} has no package root")]
    MissingPackageRoot { element: String },
    #[error("element {element} carries an undecodable data URI: {reason}")]
    InvalidDataUri { element: String, reason: String },
    #[error("unknown repository {0}")]
    UnknownRepository(i64),
    #[error("unknown activity {0}")]
    UnknownActivity(i64),
    #[error("unknown schema {0}")]
    UnknownSchema(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<IntegrityError>,
    },
}

/// High-level error type shared across the publishing components.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("live store error: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PublishError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl PublishError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            PublishError::Integrity(err) => PublishError::Integrity(IntegrityError::Context {
                context: ctx.to_string(),
                source: Box::new(err),
            }),
            PublishError::Storage(msg) => PublishError::Storage(format!("{ctx}: {msg}")),
            PublishError::Store(msg) => PublishError::Store(format!("{ctx}: {msg}")),
            PublishError::Config(msg) => PublishError::Config(format!("{ctx}: {msg}")),
            PublishError::Serialization(msg) => {
                PublishError::Serialization(format!("{ctx}: {msg}"))
            }
            PublishError::Io(err) => PublishError::Io(err),
        }
    }

    /// True when the failure stems from bad content rather than infrastructure.
    pub fn is_integrity(&self) -> bool {
        matches!(self, PublishError::Integrity(_))
    }
}

pub type Result<T, E = PublishError> = std::result::Result<T, E>;
