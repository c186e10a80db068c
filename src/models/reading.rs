use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::status::ReadingStatus;

/// The two kinds of readings the log keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Glucose,
    BloodPressure,
}

impl ReadingKind {
    pub const ALL: [ReadingKind; 2] = [ReadingKind::Glucose, ReadingKind::BloodPressure];

    /// Local table and remote collection name for this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            ReadingKind::Glucose => "glucose_readings",
            ReadingKind::BloodPressure => "blood_pressure_readings",
        }
    }

    /// Parse from a collection name.
    pub fn from_collection(s: &str) -> Option<Self> {
        match s {
            "glucose_readings" => Some(ReadingKind::Glucose),
            "blood_pressure_readings" => Some(ReadingKind::BloodPressure),
            _ => None,
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingKind::Glucose => write!(f, "glucose"),
            ReadingKind::BloodPressure => write!(f, "blood pressure"),
        }
    }
}

/// Kind-specific measured values carried by a [`Reading`].
pub trait Measurement:
    fmt::Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + Unpin + 'static
{
    const KIND: ReadingKind;

    fn status(&self) -> ReadingStatus;
}

/// A single health reading as owned by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading<M> {
    pub id: String,
    pub measurement: M,
    pub measured_at: DateTime<Utc>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    /// Local content not yet confirmed persisted remotely.
    pub dirty: bool,
    /// User the record was pulled for, if it came from the remote store.
    pub owner_id: Option<String>,
}

impl<M: Measurement> Reading<M> {
    /// Creates a new dirty reading with a fresh id.
    pub fn new(measurement: M, measured_at: DateTime<Utc>) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            measurement,
            measured_at: measured_at.trunc_subsecs(3),
            note: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            dirty: true,
            owner_id: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn kind(&self) -> ReadingKind {
        M::KIND
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState::of(self)
    }
}

/// Longest note, in characters, the CLI accepts.
pub const MAX_NOTE_CHARS: usize = 2_000;

/// Current time truncated to the millisecond precision readings are stored with.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Sync lifecycle of a stored reading.
///
/// Collapses onto the `dirty` / `is_deleted` pair persisted in the table; a dirty
/// reading whose `updated_at` still equals `created_at` has never been edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Clean,
    DirtyCreated,
    DirtyUpdated,
    DirtyDeleted,
}

impl SyncState {
    pub fn of<M>(reading: &Reading<M>) -> Self {
        if !reading.dirty {
            SyncState::Clean
        } else if reading.is_deleted {
            SyncState::DirtyDeleted
        } else if reading.updated_at == reading.created_at {
            SyncState::DirtyCreated
        } else {
            SyncState::DirtyUpdated
        }
    }

    /// State after the content of the reading was edited locally.
    pub fn on_update(self) -> Self {
        match self {
            SyncState::DirtyDeleted => SyncState::DirtyDeleted,
            _ => SyncState::DirtyUpdated,
        }
    }

    /// State after the reading was soft-deleted locally.
    pub fn on_delete(self) -> Self {
        SyncState::DirtyDeleted
    }

    /// State after a push persisted the reading remotely.
    pub fn on_pushed(self) -> Self {
        SyncState::Clean
    }

    pub fn is_dirty(self) -> bool {
        self != SyncState::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Glucose, MealContext};
    use chrono::{Duration, TimeZone};

    fn glucose() -> Reading<Glucose> {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap();
        Reading::new(Glucose::new(5.4, MealContext::Fasting), at)
    }

    #[test]
    fn test_new_reading_is_dirty_created() {
        let reading = glucose();
        assert!(reading.dirty);
        assert!(!reading.is_deleted);
        assert_eq!(reading.created_at, reading.updated_at);
        assert_eq!(reading.sync_state(), SyncState::DirtyCreated);
        assert!(Uuid::parse_str(&reading.id).is_ok());
    }

    #[test]
    fn test_sync_state_derivation() {
        let mut reading = glucose();

        reading.updated_at += Duration::milliseconds(1);
        assert_eq!(reading.sync_state(), SyncState::DirtyUpdated);

        reading.is_deleted = true;
        assert_eq!(reading.sync_state(), SyncState::DirtyDeleted);

        reading.dirty = false;
        assert_eq!(reading.sync_state(), SyncState::Clean);
    }

    #[test]
    fn test_sync_state_transitions() {
        assert_eq!(SyncState::DirtyCreated.on_update(), SyncState::DirtyUpdated);
        assert_eq!(SyncState::Clean.on_update(), SyncState::DirtyUpdated);
        assert_eq!(SyncState::DirtyUpdated.on_update(), SyncState::DirtyUpdated);
        assert_eq!(SyncState::DirtyDeleted.on_update(), SyncState::DirtyDeleted);

        for state in [
            SyncState::Clean,
            SyncState::DirtyCreated,
            SyncState::DirtyUpdated,
            SyncState::DirtyDeleted,
        ] {
            assert_eq!(state.on_delete(), SyncState::DirtyDeleted);
            assert_eq!(state.on_pushed(), SyncState::Clean);
        }

        assert!(!SyncState::Clean.is_dirty());
        assert!(SyncState::DirtyDeleted.is_dirty());
    }

    #[test]
    fn test_reading_kind_collection_roundtrip() {
        for kind in ReadingKind::ALL {
            assert_eq!(ReadingKind::from_collection(kind.collection()), Some(kind));
        }
        assert_eq!(ReadingKind::from_collection("weights"), None);
    }
}
