//! Sync-aware reading repository.
//!
//! Wraps a [`ReadingRepository`] so that:
//! 1. Every local mutation keeps `updated_at` strictly increasing and marks the reading dirty
//! 2. Every mutation asks the scheduler for a sync
//! 3. Reads never see soft-deleted readings

use chrono::{DateTime, SubsecRound, Utc};

use super::SyncScheduler;
use crate::db::{ReadingColumns, ReadingRepository, SortOrder, SyncMark};
use crate::models::{now_millis, Reading};

pub struct SyncReadingRepository<M> {
    repo: ReadingRepository<M>,
    trigger: Option<SyncScheduler>,
}

impl<M: ReadingColumns> SyncReadingRepository<M> {
    /// Creates a repository; without a trigger, writes stay local until the next sync.
    pub fn new(repo: ReadingRepository<M>, trigger: Option<SyncScheduler>) -> Self {
        Self { repo, trigger }
    }

    pub fn repository(&self) -> &ReadingRepository<M> {
        &self.repo
    }

    fn request_sync(&self) {
        if let Some(trigger) = &self.trigger {
            trigger.request_sync();
        }
    }

    /// Creates a new reading.
    pub async fn create(
        &self,
        measurement: M,
        measured_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<Reading<M>, sqlx::Error> {
        let mut reading = Reading::new(measurement, measured_at);
        reading.note = note;

        self.repo.upsert(&reading, SyncMark::Dirty).await?;
        self.request_sync();
        Ok(reading)
    }

    /// Applies `edit` to an existing reading.
    ///
    /// Returns `None` if there is no live reading with this id. The id,
    /// creation time, deletion flag and owner cannot be changed by `edit`.
    /// The stored `updated_at` is advanced by the database, so it stays
    /// strictly increasing even when two edits race.
    pub async fn update<F>(&self, id: &str, edit: F) -> Result<Option<Reading<M>>, sqlx::Error>
    where
        F: FnOnce(&mut Reading<M>),
    {
        let existing = match self.repo.get_by_id(id).await? {
            Some(reading) if !reading.is_deleted => reading,
            _ => return Ok(None),
        };

        let mut edited = existing.clone();
        edit(&mut edited);
        edited.id = existing.id;
        edited.measured_at = edited.measured_at.trunc_subsecs(3);

        let updated = self.repo.update_content(&edited, now_millis()).await?;
        if updated.is_some() {
            self.request_sync();
        }
        Ok(updated)
    }

    /// Soft-deletes a reading. Returns false if there is no live reading with this id.
    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        match self.repo.get_by_id(id).await? {
            Some(reading) if !reading.is_deleted => {}
            _ => return Ok(false),
        }

        let deleted = self.repo.soft_delete(id, now_millis()).await?;
        if deleted {
            self.request_sync();
        }
        Ok(deleted)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Reading<M>>, sqlx::Error> {
        Ok(self.repo.get_by_id(id).await?.filter(|r| !r.is_deleted))
    }

    pub async fn list(&self) -> Result<Vec<Reading<M>>, sqlx::Error> {
        self.repo.get_all().await
    }

    pub async fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: SortOrder,
    ) -> Result<Vec<Reading<M>>, sqlx::Error> {
        self.repo.get_by_range(start, end, order).await
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<Reading<M>>, sqlx::Error> {
        self.repo.get_recent(limit).await
    }
}
