use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModulinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Connect callback failed: {0}")]
    Connect(anyhow::Error),

    #[error("Server error: {0}")]
    Server(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Link name cannot be empty (position {0})")]
    EmptyLinkName(usize),

    #[error("Unknown link '{name}' in chain '{chain}'")]
    UnknownLink { chain: String, name: String },

    #[error("No host handle attached to this instance")]
    MissingHost,
}

/// Failures raised by links and utility combinators.
///
/// The variant name becomes `error.name` when captured into a context.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("{0}")]
    Validation(String),

    #[error("Link '{link}' timed out after {}ms", .after.as_millis())]
    Timeout { link: String, after: Duration },

    #[error("All {attempts} attempts of '{link}' failed: {last}")]
    RetriesExhausted {
        link: String,
        attempts: u32,
        last: String,
    },

    #[error("No links to race in '{0}'")]
    EmptyRace(String),

    #[error("{0}")]
    Failed(String),
}

impl LinkError {
    pub fn kind(&self) -> &'static str {
        match self {
            LinkError::Validation(_) => "ValidationError",
            LinkError::Timeout { .. } => "TimeoutError",
            LinkError::RetriesExhausted { .. } => "RetryError",
            LinkError::EmptyRace(_) => "RaceError",
            LinkError::Failed(_) => "Error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ModulinkError>;
