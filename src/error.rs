use thiserror::Error;

use crate::service::CombinedExitStatus;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors produced while launching one child process.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service '{name}' has already been started")]
    AlreadyStarted { name: String },

    #[error("service '{name}' was stopped before it could start")]
    StoppedBeforeStart { name: String },

    #[error("failed to prepare launch files for '{name}': {source}")]
    Prepare {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The supervised pair terminated before or instead of becoming ready.
    #[error("backend exited:\n{0}")]
    BackendExited(CombinedExitStatus),

    /// The wallet API was queried before the wallet reported its port.
    #[error("wallet API is not available yet")]
    ApiNotReady,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
