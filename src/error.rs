//! Custom error types for sifter

use thiserror::Error;

/// Main error type for sifter operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Probe batch timed out after {0}s")]
    ProbeBatchTimeout(u64),

    #[error("No probe result for URL: {0}")]
    MissingProbeResult(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Task has not been linked to any URLs")]
    UnlinkedTask,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Not initialized: run 'sifter init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for sifter
pub type Result<T> = std::result::Result<T, Error>;
