use thiserror::Error;

use crate::core::task::TaskId;

/// Failure reported by the remote task store or the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("store unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("not authorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The stored `updated_at` moved since the caller last saw the task.
    #[error("task {0} was modified by another client")]
    Conflict(TaskId),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether repeating the same request could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Unavailable { .. }
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            408 | 429 | 500..=599 => Self::Unavailable { status, message },
            _ => Self::Rejected { status, message },
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Client-side rejection of a value before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("progress {0} is outside 0..=100")]
    ProgressOutOfRange(i64),

    #[error("unknown priority {0:?}, expected high, medium or low")]
    UnknownPriority(String),

    #[error("update contains no fields")]
    EmptyPatch,
}

/// Error returned by every [`TaskSync`](crate::sync::TaskSync) operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("task {0} is not in the local cache, refresh first")]
    NotCached(TaskId),
}

/// Failure talking to the language-model endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoachError {
    #[error("no coach API key configured")]
    MissingKey,

    #[error("coach request failed: {0}")]
    Request(String),

    #[error("coach API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("coach returned no text")]
    EmptyResponse,
}

impl From<reqwest::Error> for CoachError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Failure reading or writing secrets in the desktop keyring.
#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("keyring unavailable: {0}")]
    Unavailable(String),

    #[error("keyring operation failed: {0}")]
    Operation(String),

    #[error("stored secret is not valid UTF-8")]
    InvalidSecret,
}

/// Failure loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("missing setting {0}")]
    Missing(&'static str),
}

/// Failure starting a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        Self::Sync(SyncError::Store(e))
    }
}
