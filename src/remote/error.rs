use thiserror::Error;

/// Errors raised by a [`RemoteStore`](super::RemoteStore) or while coding its documents.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Sync not configured. Add server_url, api_key and user_id to config.")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected the API key")]
    Unauthorized,

    #[error("Server error ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode remote document: {0}")]
    Decode(String),

    #[error("Failed to encode document: {0}")]
    Encode(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Batch of {size} documents exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Chunk {chunk} of {chunks} failed: {source}")]
    ChunkFailed {
        chunk: usize,
        chunks: usize,
        #[source]
        source: Box<RemoteError>,
    },
}

impl RemoteError {
    /// Whether the failure came from the transport rather than the server's answer.
    pub fn is_network(&self) -> bool {
        match self {
            RemoteError::Network(_) => true,
            RemoteError::ChunkFailed { source, .. } => source.is_network(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_failure_reports_position() {
        let err = RemoteError::ChunkFailed {
            chunk: 2,
            chunks: 3,
            source: Box::new(RemoteError::Network("connection reset".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Chunk 2 of 3 failed: Network error: connection reset"
        );
        assert!(err.is_network());
    }

    #[test]
    fn test_rejection_is_not_network() {
        let err = RemoteError::Rejected {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!err.is_network());
        assert!(!RemoteError::Unauthorized.is_network());
    }
}
