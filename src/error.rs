//! Error types for outreach-ops.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Configuration-related errors. Always fatal for the current invocation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Roster is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Row store and cursor store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record {record} is out of range (roster has {len} records)")]
    RecordOutOfRange { record: usize, len: usize },
}

/// Failures talking to an outbound or inbound transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{transport} send failed: {reason}")]
    SendFailed { transport: String, reason: String },

    #[error("{transport} fetch failed: {reason}")]
    FetchFailed { transport: String, reason: String },

    #[error("Authentication failed for {transport}: {reason}")]
    AuthFailed { transport: String, reason: String },

    #[error("Rate limited by {transport}")]
    RateLimited { transport: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{transport} is disabled: {reason}")]
    Disabled { transport: String, reason: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Errors a chat command can produce. Every variant becomes a reply to the requester.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unauthorized: <@{user}> cannot run `{command}`.")]
    Unauthorized { command: String, user: String },

    #[error("Unknown command `{0}`.")]
    UnknownCommand(String),

    #[error("{reason}. Usage: {usage}")]
    Parse { reason: String, usage: String },

    #[error("Channel {0} is not a permitted command channel")]
    ChannelNotPermitted(String),
}

/// Result type alias for outreach-ops.
pub type Result<T> = std::result::Result<T, Error>;
