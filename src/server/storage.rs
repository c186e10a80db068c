//! Server-side document storage.
//!
//! Documents live in memory, keyed by user and collection, and are written
//! through to disk when a data directory is configured:
//! ```text
//! <DATA_DIR>/
//!   <user_id>/
//!     glucose_readings.json
//!     blood_pressure_readings.json
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::ReadingKind;
use crate::remote::{RemoteError, RemoteStore, MAX_BATCH_SIZE};

type Documents = BTreeMap<String, Value>;

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// A stored collection file could not be parsed.
    Corrupt(PathBuf, serde_json::Error),
    /// A collection could not be serialized for writing.
    Encode(PathBuf, serde_json::Error),
    /// Invalid user ID (e.g., contains path separators).
    InvalidUserId(String),
    /// A document without a string `id` or an integer `updatedAt`.
    InvalidDocument(String),
    /// More documents than one commit may carry.
    BatchTooLarge(usize),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            StorageError::Corrupt(path, e) => {
                write!(f, "Failed to parse {}: {}", path.display(), e)
            }
            StorageError::Encode(path, e) => {
                write!(f, "Failed to encode {}: {}", path.display(), e)
            }
            StorageError::InvalidUserId(id) => write!(f, "Invalid user ID: {}", id),
            StorageError::InvalidDocument(reason) => write!(f, "Invalid document: {}", reason),
            StorageError::BatchTooLarge(size) => write!(
                f,
                "Batch of {} documents exceeds the limit of {}",
                size, MAX_BATCH_SIZE
            ),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(_, e) => Some(e),
            StorageError::Corrupt(_, e) | StorageError::Encode(_, e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for RemoteError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidDocument(reason) => RemoteError::InvalidDocument(reason),
            StorageError::BatchTooLarge(size) => RemoteError::BatchTooLarge {
                size,
                max: MAX_BATCH_SIZE,
            },
            other => RemoteError::Storage(other.to_string()),
        }
    }
}

/// Per-user, per-collection document store.
///
/// A commit either applies every document of the batch or none of them.
#[derive(Debug, Default)]
pub struct DocumentStore {
    data_dir: Option<PathBuf>,
    collections: RwLock<HashMap<(String, ReadingKind), Documents>>,
}

impl DocumentStore {
    /// Creates a store persisted under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            collections: RwLock::default(),
        }
    }

    /// Creates a store that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Validates a user ID to prevent path traversal attacks.
    fn validate_user_id(user_id: &str) -> Result<(), StorageError> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
            || user_id.starts_with('.')
        {
            return Err(StorageError::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn collection_path(&self, user_id: &str, kind: ReadingKind) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| {
            dir.join(user_id)
                .join(format!("{}.json", kind.collection()))
        })
    }

    /// Upserts documents by id, returning how many were written.
    pub async fn put_documents(
        &self,
        user_id: &str,
        kind: ReadingKind,
        documents: Vec<Value>,
    ) -> Result<usize, StorageError> {
        Self::validate_user_id(user_id)?;
        if documents.len() > MAX_BATCH_SIZE {
            return Err(StorageError::BatchTooLarge(documents.len()));
        }

        let mut keyed = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document_id(&document)?;
            keyed.push((id, document));
        }
        let count = keyed.len();

        let mut collections = self.collections.write().await;
        let stored = self.loaded(&mut collections, user_id, kind)?;

        let mut updated = stored.clone();
        updated.extend(keyed);
        self.persist(user_id, kind, &updated)?;
        *stored = updated;

        debug!(user_id, kind = %kind, count, "Stored documents");
        Ok(count)
    }

    /// Documents with `updatedAt` strictly after `since`, oldest change first.
    pub async fn changed_since(
        &self,
        user_id: &str,
        kind: ReadingKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>, StorageError> {
        Self::validate_user_id(user_id)?;
        let since = since.timestamp_millis();

        {
            let collections = self.collections.read().await;
            if let Some(stored) = collections.get(&(user_id.to_string(), kind)) {
                return Ok(filter_changed(stored, since));
            }
        }

        let mut collections = self.collections.write().await;
        let stored = self.loaded(&mut collections, user_id, kind)?;
        Ok(filter_changed(stored, since))
    }

    fn loaded<'a>(
        &self,
        collections: &'a mut HashMap<(String, ReadingKind), Documents>,
        user_id: &str,
        kind: ReadingKind,
    ) -> Result<&'a mut Documents, StorageError> {
        match collections.entry((user_id.to_string(), kind)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let documents = self.read_collection(user_id, kind)?;
                Ok(entry.insert(documents))
            }
        }
    }

    fn read_collection(&self, user_id: &str, kind: ReadingKind) -> Result<Documents, StorageError> {
        let Some(path) = self.collection_path(user_id, kind) else {
            return Ok(Documents::new());
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Documents::new()),
            Err(e) => return Err(StorageError::IoError(path, e)),
        };

        let documents: Vec<Value> =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt(path.clone(), e))?;
        documents
            .into_iter()
            .map(|document| Ok((document_id(&document)?, document)))
            .collect()
    }

    fn persist(
        &self,
        user_id: &str,
        kind: ReadingKind,
        documents: &Documents,
    ) -> Result<(), StorageError> {
        let Some(path) = self.collection_path(user_id, kind) else {
            return Ok(());
        };

        if let Some(user_dir) = path.parent() {
            fs::create_dir_all(user_dir)
                .map_err(|e| StorageError::IoError(user_dir.to_path_buf(), e))?;
        }

        let values: Vec<&Value> = documents.values().collect();
        let bytes = serde_json::to_vec(&values)
            .map_err(|e| StorageError::Encode(path.clone(), e))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes).map_err(|e| StorageError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, &path).map_err(|e| StorageError::IoError(path, e))?;

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for DocumentStore {
    async fn commit(
        &self,
        user_id: &str,
        kind: ReadingKind,
        documents: Vec<Value>,
    ) -> Result<(), RemoteError> {
        self.put_documents(user_id, kind, documents).await?;
        Ok(())
    }

    async fn query_changed(
        &self,
        user_id: &str,
        kind: ReadingKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>, RemoteError> {
        Ok(self.changed_since(user_id, kind, since).await?)
    }
}

fn document_id(document: &Value) -> Result<String, StorageError> {
    let id = document
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StorageError::InvalidDocument("missing string field 'id'".to_string()))?;

    if updated_at(document).is_none() {
        return Err(StorageError::InvalidDocument(format!(
            "document '{}' is missing integer field 'updatedAt'",
            id
        )));
    }
    Ok(id.to_string())
}

fn updated_at(document: &Value) -> Option<i64> {
    document.get("updatedAt").and_then(Value::as_i64)
}

fn filter_changed(documents: &Documents, since: i64) -> Vec<Value> {
    let mut changed: Vec<&Value> = documents
        .values()
        .filter(|doc| updated_at(doc).is_some_and(|at| at > since))
        .collect();
    changed.sort_by_key(|doc| updated_at(doc));
    changed.into_iter().cloned().collect()
}
