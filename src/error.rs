use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the ipsift library.
#[derive(Error, Debug)]
pub enum IpsiftError {
    /// Configuration rejected before a run started.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// Candidate source could not be read.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Remote store exchange failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// Malformed record token.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Other error cases.
    #[error("other: {0}")]
    Other(String),
}

/// Minimal validation failures for a [`crate::config::RunConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker url must not be empty")]
    MissingUrl,
    #[error("invalid worker url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("worker api key must not be empty")]
    MissingApiKey,
    #[error("{field} must be at least 1")]
    ZeroValue { field: &'static str },
    #[error("{field} must be a positive number of seconds, at most {max}")]
    InvalidTimeout { field: &'static str, max: u64 },
}

/// Failure to obtain a candidate list. Recoverable: the run aborts, the process does not.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("unknown ip source '{0}'")]
    UnknownSource(String),
    #[error("fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("fetch {url}: http status {status}")]
    Status { url: String, status: u16 },
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors talking to the remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rejected by store: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

/// Record token that does not match `<ipv4>:<port>#<latency>ms`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid record token '{token}': {reason}")]
pub struct TokenError {
    pub token: String,
    pub reason: &'static str,
}
