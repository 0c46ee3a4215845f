//! Error types for each stage of an ingestion run.
//!
//! Errors fall into two groups. The fatal ones ([`IngestError`] and what it
//! wraps) abort the run and surface to the caller. Everything else is
//! recovered where it happens: a failed image becomes a record without an
//! image, a failed write is logged and the loop moves on, a malformed entry is
//! skipped.

use thiserror::Error;

/// Status codes that are worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Failure of a single HTTP GET, before or after retries.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx response.
    #[error("HTTP error: status {0}")]
    Status(u16),
    /// The request did not complete within the client timeout.
    #[error("request timed out")]
    Timeout,
    /// The connection could not be established, or was closed or reset
    /// before the response was fully read.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other transport error (redirect loop, undecodable body, bad request).
    #[error("request failed: {0}")]
    Network(String),
    /// A transient failure persisted through every attempt.
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Server-side statuses, timeouts and connection failures are transient.
    /// Client errors and everything else fail immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(code) => RETRYABLE_STATUSES.contains(code),
            FetchError::Timeout | FetchError::Connect(_) => true,
            FetchError::Network(_) | FetchError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_connect() || e.is_request() || e.is_body() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// The feed could not be loaded. Always fatal for the run.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed unreachable: {0}")]
    Fetch(#[from] FetchError),
    #[error("feed parse error: {0}")]
    Parse(String),
}

/// Record store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid table name: {0:?}")]
    InvalidIdentifier(String),
    #[error("invalid page cursor: {0}")]
    BadCursor(String),
    #[error("table {0:?} does not exist")]
    MissingTable(String),
}

/// Object store failures.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("failed to put object {key}: {message}")]
    Put { key: String, message: String },
}

/// A feed entry that cannot be turned into a record.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry id {id:?} is not a valid URL: {source}")]
    InvalidId {
        id: String,
        #[source]
        source: url::ParseError,
    },
    #[error("entry id {id:?} has no `p` query parameter")]
    MissingKey { id: String },
}

/// Run-level failures that abort ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not read watermark: {0}")]
    Watermark(#[source] StoreError),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}` (flag, environment variable or config file)")]
    Missing(&'static str),
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
