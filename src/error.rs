//! Error types shared by the relay library.

use std::time::Duration;

use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Failure to obtain any response from the vendor API.
///
/// None of these carry a status code or body; a response that arrived but is
/// unusable is not an error at this layer.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
}

/// Errors raised by the single-row snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No successful fetch has been persisted yet.
    #[error("no snapshot stored")]
    NotFound,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload is not valid UTF-8")]
    Encoding,

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
