use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RemoteError;
use crate::models::{Measurement, Reading};

/// A reading as stored in the remote collection.
///
/// Carries no sync flag or owner: those only mean something locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord<M> {
    pub id: String,
    #[serde(flatten)]
    pub measurement: M,
    #[serde(with = "ts_milliseconds")]
    pub measured_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl<M: Measurement> RemoteRecord<M> {
    pub fn to_document(&self) -> Result<serde_json::Value, RemoteError> {
        serde_json::to_value(self).map_err(|e| RemoteError::Encode(e.to_string()))
    }

    pub fn from_document(document: serde_json::Value) -> Result<Self, RemoteError> {
        serde_json::from_value(document).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Converts into a clean local reading owned by `owner_id`.
    pub fn into_reading(self, owner_id: &str) -> Reading<M> {
        Reading {
            id: self.id,
            measurement: self.measurement,
            measured_at: self.measured_at,
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_deleted: self.is_deleted,
            dirty: false,
            owner_id: Some(owner_id.to_string()),
        }
    }
}

impl<M: Measurement> Reading<M> {
    pub fn to_remote(&self) -> RemoteRecord<M> {
        RemoteRecord {
            id: self.id.clone(),
            measurement: self.measurement.clone(),
            measured_at: self.measured_at,
            note: self.note.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_deleted: self.is_deleted,
        }
    }
}
