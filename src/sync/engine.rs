//! One sync cycle: push local changes, then pull remote ones.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::identity::IdentityProvider;
use super::resolver::{resolve, Resolution};
use super::SyncError;
use crate::db::{PreferenceStore, ReadingColumns, ReadingRepository, SyncMark};
use crate::models::{now_millis, BloodPressure, Glucose};
use crate::remote::{RemoteCollection, RemoteStore};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Subtracted from the pull start time before it becomes the next watermark.
    pub clock_skew: Duration,
}

/// Counts for one reading kind in a finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindReport {
    pub pushed: usize,
    pub pulled: usize,
    /// Pulled records that replaced or created a local record.
    pub applied: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub glucose: KindReport,
    pub blood_pressure: KindReport,
    /// Watermark in effect after the cycle.
    pub watermark: DateTime<Utc>,
}

pub type SyncOutcome = Result<SyncReport, SyncError>;

/// Runs sync cycles between the local database and a [`RemoteStore`].
///
/// Cycles of one engine never overlap.
pub struct SyncEngine {
    glucose: ReadingRepository<Glucose>,
    blood_pressure: ReadingRepository<BloodPressure>,
    preferences: PreferenceStore,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    options: SyncOptions,
    cycle: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        pool: SqlitePool,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            glucose: ReadingRepository::new(pool.clone()),
            blood_pressure: ReadingRepository::new(pool.clone()),
            preferences: PreferenceStore::new(pool),
            remote,
            identity,
            options: SyncOptions::default(),
            cycle: Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs one full cycle.
    ///
    /// The watermark only moves when every stage succeeded.
    pub async fn sync(&self) -> SyncOutcome {
        let _cycle = self.cycle.lock().await;

        let user_id = self
            .identity
            .current_user_id()
            .ok_or(SyncError::NotSignedIn)?;
        debug!(user_id = %user_id, "Sync cycle started");

        let glucose_remote = RemoteCollection::<Glucose>::new(Arc::clone(&self.remote));
        let bp_remote = RemoteCollection::<BloodPressure>::new(Arc::clone(&self.remote));

        let mut glucose = KindReport {
            pushed: push(&self.glucose, &glucose_remote, &user_id).await?,
            ..Default::default()
        };
        let mut blood_pressure = KindReport {
            pushed: push(&self.blood_pressure, &bp_remote, &user_id).await?,
            ..Default::default()
        };

        let since = self.preferences.last_sync().await?;
        let pull_started = now_millis();

        (glucose.pulled, glucose.applied) =
            pull(&self.glucose, &glucose_remote, &user_id, since).await?;
        (blood_pressure.pulled, blood_pressure.applied) =
            pull(&self.blood_pressure, &bp_remote, &user_id, since).await?;

        let skew = chrono::Duration::from_std(self.options.clock_skew)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let watermark = self
            .preferences
            .advance_last_sync(pull_started - skew)
            .await?;

        info!(
            glucose_pushed = glucose.pushed,
            glucose_applied = glucose.applied,
            blood_pressure_pushed = blood_pressure.pushed,
            blood_pressure_applied = blood_pressure.applied,
            watermark = %watermark,
            "Sync cycle complete"
        );

        Ok(SyncReport {
            glucose,
            blood_pressure,
            watermark,
        })
    }
}

async fn push<M: ReadingColumns>(
    repo: &ReadingRepository<M>,
    remote: &RemoteCollection<M>,
    user_id: &str,
) -> Result<usize, SyncError> {
    let dirty = repo.get_dirty().await?;
    if dirty.is_empty() {
        return Ok(0);
    }

    remote.push_batch(user_id, &dirty).await?;

    // A failed mark leaves the reading dirty; the next push is an idempotent upsert
    for reading in &dirty {
        match repo
            .mark_synced_if_unchanged(&reading.id, reading.updated_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(id = %reading.id, "Reading changed during push, left dirty"),
            Err(e) => warn!(id = %reading.id, "Failed to mark reading synced: {}", e),
        }
    }

    debug!(kind = %M::KIND, count = dirty.len(), "Pushed dirty readings");
    Ok(dirty.len())
}

async fn pull<M: ReadingColumns>(
    repo: &ReadingRepository<M>,
    remote: &RemoteCollection<M>,
    user_id: &str,
    since: DateTime<Utc>,
) -> Result<(usize, usize), SyncError> {
    let records = remote.pull_changed(user_id, since).await?;
    let pulled = records.len();

    let mut applied = 0;
    for record in records {
        let local = repo.get_by_id(&record.id).await?;
        if resolve(&record, local.as_ref()) != Resolution::Overwrite {
            continue;
        }
        let id = record.id.clone();
        if repo
            .upsert(&record.into_reading(user_id), SyncMark::Synced)
            .await?
        {
            applied += 1;
        } else {
            debug!(%id, "Local edit landed during pull, kept");
        }
    }

    debug!(kind = %M::KIND, pulled, applied, "Pulled remote changes");
    Ok((pulled, applied))
}
