use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::models::{ReminderSettings, TimeOfDayRanges};

const LAST_SYNC_KEY: &str = "last_sync_timestamp";
const REMINDER_SETTINGS_KEY: &str = "reminder_settings";
const TIME_OF_DAY_RANGES_KEY: &str = "time_of_day_ranges";

/// Small key/value store for the sync watermark and user settings.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    pool: SqlitePool,
}

impl PreferenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Watermark of the last fully successful sync, or the epoch if there is none.
    pub async fn last_sync(&self) -> Result<DateTime<Utc>, sqlx::Error> {
        let stored = self.get(LAST_SYNC_KEY).await?;
        let millis = stored.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        Ok(DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH))
    }

    /// Moves the watermark forward to `at`, never backwards.
    ///
    /// Returns the watermark in effect afterwards.
    pub async fn advance_last_sync(
        &self,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, sqlx::Error> {
        let current = self.last_sync().await?;
        if at <= current {
            return Ok(current);
        }
        self.set(LAST_SYNC_KEY, &at.timestamp_millis().to_string())
            .await?;
        Ok(at)
    }

    pub async fn reminder_settings(&self) -> Result<ReminderSettings, sqlx::Error> {
        Ok(self.get_json(REMINDER_SETTINGS_KEY).await?.unwrap_or_default())
    }

    pub async fn set_reminder_settings(
        &self,
        settings: &ReminderSettings,
    ) -> Result<(), sqlx::Error> {
        self.set_json(REMINDER_SETTINGS_KEY, settings).await
    }

    pub async fn time_of_day_ranges(&self) -> Result<TimeOfDayRanges, sqlx::Error> {
        Ok(self
            .get_json(TIME_OF_DAY_RANGES_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn set_time_of_day_ranges(
        &self,
        ranges: &TimeOfDayRanges,
    ) -> Result<(), sqlx::Error> {
        self.set_json(TIME_OF_DAY_RANGES_KEY, ranges).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO preferences (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, sqlx::Error> {
        match self.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| sqlx::Error::Decode(Box::new(e))),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), sqlx::Error> {
        let raw = serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::{NaiveTime, TimeZone};
    use tempfile::TempDir;

    async fn setup() -> (PreferenceStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        (PreferenceStore::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_last_sync_defaults_to_epoch() {
        let (prefs, _dir) = setup().await;
        assert_eq!(prefs.last_sync().await.unwrap(), DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_advance_last_sync_is_monotonic() {
        let (prefs, _dir) = setup().await;
        let later = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

        assert_eq!(prefs.advance_last_sync(later).await.unwrap(), later);
        assert_eq!(prefs.advance_last_sync(earlier).await.unwrap(), later);
        assert_eq!(prefs.last_sync().await.unwrap(), later);
    }

    #[tokio::test]
    async fn test_reminder_settings_roundtrip() {
        let (prefs, _dir) = setup().await;
        assert_eq!(
            prefs.reminder_settings().await.unwrap(),
            ReminderSettings::default()
        );

        let settings = ReminderSettings {
            morning_enabled: true,
            morning_time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            ..Default::default()
        };
        prefs.set_reminder_settings(&settings).await.unwrap();
        assert_eq!(prefs.reminder_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_time_of_day_ranges_roundtrip() {
        let (prefs, _dir) = setup().await;
        assert_eq!(
            prefs.time_of_day_ranges().await.unwrap(),
            TimeOfDayRanges::default()
        );

        let ranges = TimeOfDayRanges::new(5, 11, 17, 21).unwrap();
        prefs.set_time_of_day_ranges(&ranges).await.unwrap();
        assert_eq!(prefs.time_of_day_ranges().await.unwrap(), ranges);
    }
}
