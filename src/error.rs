use thiserror::Error;

use crate::common::Notification;

/// Failures reported by a backend adapter.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("Sqlite Error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Decode Error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("table `{0}` has no insert feed")]
    UnsupportedTable(&'static str),
    #[error("local store lock poisoned")]
    Poisoned,
    #[error("no async runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

/// What went wrong in a chat operation, as far as the view cares.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("profile `{0}` not found")]
    NotFound(String),
    #[error("backend request failed: {0}")]
    TransientIo(#[source] BackendError),
    #[error("rejected: {0}")]
    ValidationRejected(&'static str),
}

impl From<BackendError> for ChatError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotAuthenticated => ChatError::NotAuthenticated,
            other => ChatError::TransientIo(other),
        }
    }
}

impl ChatError {
    /// The toast to show for this error, if any. Only transient backend
    /// failures are surfaced; the rest are handled by redirect or fallback.
    pub fn notification(&self, action: &str) -> Option<Notification> {
        match self {
            ChatError::TransientIo(_) => Some(Notification::error(format!("Failed to {action}"))),
            ChatError::NotAuthenticated
            | ChatError::NotFound(_)
            | ChatError::ValidationRejected(_) => None,
        }
    }
}
