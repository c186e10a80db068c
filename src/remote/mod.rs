//! Remote side of sync: the document store contract and typed access to it.

mod error;
mod http;
mod record;

pub use error::RemoteError;
pub use http::HttpRemoteStore;
pub use record::RemoteRecord;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Measurement, Reading, ReadingKind};

/// Largest number of documents one atomic commit may carry.
pub const MAX_BATCH_SIZE: usize = 500;

/// Encoded JSON size a commit is kept under, unless a single document is larger.
pub const MAX_BATCH_BYTES: usize = 1024 * 1024;

/// A per-user, per-kind document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upserts `documents` by id in one atomic write.
    ///
    /// Callers keep batches at or below [`MAX_BATCH_SIZE`].
    async fn commit(
        &self,
        user_id: &str,
        kind: ReadingKind,
        documents: Vec<serde_json::Value>,
    ) -> Result<(), RemoteError>;

    /// All documents whose `updatedAt` is strictly greater than `since`.
    async fn query_changed(
        &self,
        user_id: &str,
        kind: ReadingKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<serde_json::Value>, RemoteError>;
}

/// Request body for a batch commit.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub documents: Vec<serde_json::Value>,
}

/// Response body for a batch commit.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub committed: usize,
}

/// Response body for a changed-since query.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub documents: Vec<serde_json::Value>,
}

/// Typed view of one reading kind's collection in a [`RemoteStore`].
pub struct RemoteCollection<M> {
    store: Arc<dyn RemoteStore>,
    _measurement: PhantomData<fn() -> M>,
}

impl<M> Clone for RemoteCollection<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _measurement: PhantomData,
        }
    }
}

impl<M: Measurement> RemoteCollection<M> {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            _measurement: PhantomData,
        }
    }

    /// Upserts readings in chunks, returning the number of commits.
    ///
    /// A chunk holds at most [`MAX_BATCH_SIZE`] documents and at most
    /// [`MAX_BATCH_BYTES`] of JSON. Stops at the first failing chunk. Chunks
    /// committed before it stay committed.
    pub async fn push_batch(
        &self,
        user_id: &str,
        readings: &[Reading<M>],
    ) -> Result<usize, RemoteError> {
        if readings.is_empty() {
            return Ok(0);
        }

        let documents = readings
            .iter()
            .map(|r| r.to_remote().to_document())
            .collect::<Result<Vec<_>, _>>()?;
        let batches = split_batches(documents);

        let chunks = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            let size = batch.len();
            self.store
                .commit(user_id, M::KIND, batch)
                .await
                .map_err(|e| RemoteError::ChunkFailed {
                    chunk: index + 1,
                    chunks,
                    source: Box::new(e),
                })?;

            debug!(
                kind = %M::KIND,
                chunk = index + 1,
                chunks,
                size,
                "Committed chunk"
            );
        }

        Ok(chunks)
    }

    pub async fn pull_changed(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteRecord<M>>, RemoteError> {
        let documents = self.store.query_changed(user_id, M::KIND, since).await?;
        documents
            .into_iter()
            .map(RemoteRecord::from_document)
            .collect()
    }
}

/// Groups documents into commits, preserving order.
fn split_batches(documents: Vec<serde_json::Value>) -> Vec<Vec<serde_json::Value>> {
    let mut batches = Vec::new();
    let mut current: Vec<serde_json::Value> = Vec::new();
    let mut current_bytes = 0;

    for document in documents {
        let size = document.to_string().len();
        let full = current.len() == MAX_BATCH_SIZE || current_bytes + size > MAX_BATCH_BYTES;
        if full && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(document);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
