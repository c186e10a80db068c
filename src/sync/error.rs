use thiserror::Error;

use crate::remote::RemoteError;

/// Why a sync cycle failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Not signed in. Set sync.user_id in config or sign in first.")]
    NotSignedIn,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Local storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Whether running the cycle again may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::NotSignedIn)
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        if e.is_network() {
            SyncError::Network(e.to_string())
        } else {
            SyncError::Remote(e.to_string())
        }
    }
}
