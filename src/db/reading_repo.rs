use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::marker::PhantomData;

use super::columns::{ReadingColumns, SqliteQuery};
use crate::models::Reading;

/// Columns shared by every reading table, in bind order.
const BASE_COLUMNS: [&str; 8] = [
    "id",
    "measured_at",
    "note",
    "created_at",
    "updated_at",
    "is_deleted",
    "dirty",
    "owner_id",
];

/// How an upsert leaves the sync flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMark {
    /// Local content that still has to be pushed.
    Dirty,
    /// Content known to match the remote store.
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    fn sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Keyed table of readings of one kind.
///
/// Soft-deleted rows stay in the table so the deletion can be pushed; every
/// read-facing query filters them out. Only [`ReadingRepository::get_by_id`]
/// and [`ReadingRepository::get_dirty`] see them.
#[derive(Debug, Clone)]
pub struct ReadingRepository<M> {
    pool: SqlitePool,
    _measurement: PhantomData<fn() -> M>,
}

impl<M: ReadingColumns> ReadingRepository<M> {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _measurement: PhantomData,
        }
    }

    fn table() -> &'static str {
        M::KIND.collection()
    }

    /// Non-deleted readings, most recently measured first.
    pub async fn get_all(&self) -> Result<Vec<Reading<M>>, sqlx::Error> {
        let sql = format!(
            "SELECT * FROM {} WHERE is_deleted = 0 ORDER BY measured_at DESC",
            Self::table()
        );
        self.fetch(sqlx::query(&sql)).await
    }

    /// Non-deleted readings measured in `[start, end)`.
    pub async fn get_by_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: SortOrder,
    ) -> Result<Vec<Reading<M>>, sqlx::Error> {
        let sql = format!(
            "SELECT * FROM {} WHERE is_deleted = 0 AND measured_at >= ? AND measured_at < ? ORDER BY measured_at {}",
            Self::table(),
            order.sql()
        );
        let query = sqlx::query(&sql)
            .bind(start.timestamp_millis())
            .bind(end.timestamp_millis());
        self.fetch(query).await
    }

    pub async fn get_recent(&self, limit: u32) -> Result<Vec<Reading<M>>, sqlx::Error> {
        let sql = format!(
            "SELECT * FROM {} WHERE is_deleted = 0 ORDER BY measured_at DESC LIMIT ?",
            Self::table()
        );
        self.fetch(sqlx::query(&sql).bind(i64::from(limit))).await
    }

    /// Looks up a reading by id, soft-deleted or not.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Reading<M>>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", Self::table());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(reading_from_row).transpose()
    }

    /// Readings not yet pushed, including soft-deleted ones.
    pub async fn get_dirty(&self) -> Result<Vec<Reading<M>>, sqlx::Error> {
        let sql = format!(
            "SELECT * FROM {} WHERE dirty = 1 ORDER BY updated_at",
            Self::table()
        );
        self.fetch(sqlx::query(&sql)).await
    }

    pub async fn count_dirty(&self) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE dirty = 1", Self::table());
        sqlx::query_scalar(&sql).fetch_one(&self.pool).await
    }

    pub async fn count_by_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE is_deleted = 0 AND measured_at >= ? AND measured_at < ?",
            Self::table()
        );
        sqlx::query_scalar(&sql)
            .bind(start.timestamp_millis())
            .bind(end.timestamp_millis())
            .fetch_one(&self.pool)
            .await
    }

    /// Inserts or fully replaces a reading by id.
    ///
    /// `created_at` of an existing row is never rewritten. The `dirty` field of
    /// `reading` is ignored in favour of `mark`. A [`SyncMark::Synced`] write
    /// only replaces a row whose `updated_at` is older, so a local edit made
    /// while a pull was resolving is kept. Returns false if the row was kept.
    pub async fn upsert(&self, reading: &Reading<M>, mark: SyncMark) -> Result<bool, sqlx::Error> {
        let table = Self::table();
        let columns: Vec<&str> = BASE_COLUMNS
            .iter()
            .chain(M::COLUMNS.iter())
            .copied()
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let assignments = columns
            .iter()
            .filter(|c| !matches!(**c, "id" | "created_at"))
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let guard = match mark {
            SyncMark::Dirty => String::new(),
            SyncMark::Synced => format!(" WHERE excluded.updated_at > {table}.updated_at"),
        };

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}{}",
            table,
            columns.join(", "),
            placeholders,
            assignments,
            guard
        );

        let query = sqlx::query(&sql)
            .bind(reading.id.as_str())
            .bind(reading.measured_at.timestamp_millis())
            .bind(reading.note.as_deref())
            .bind(reading.created_at.timestamp_millis())
            .bind(reading.updated_at.timestamp_millis())
            .bind(reading.is_deleted)
            .bind(mark == SyncMark::Dirty)
            .bind(reading.owner_id.as_deref());

        let result = reading
            .measurement
            .bind_columns(query)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rewrites the content of a live reading and marks it dirty.
    ///
    /// `updated_at` is computed in the same statement as `MAX(at, updated_at + 1)`,
    /// so concurrent edits never reuse a timestamp. Returns the stored row, or
    /// `None` if no live reading has this id.
    pub async fn update_content(
        &self,
        reading: &Reading<M>,
        at: DateTime<Utc>,
    ) -> Result<Option<Reading<M>>, sqlx::Error> {
        let assignments = ["measured_at", "note"]
            .iter()
            .chain(M::COLUMNS.iter())
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {}, dirty = 1, updated_at = MAX(?, updated_at + 1) \
             WHERE id = ? AND is_deleted = 0",
            Self::table(),
            assignments
        );

        let query = sqlx::query(&sql)
            .bind(reading.measured_at.timestamp_millis())
            .bind(reading.note.as_deref());
        let result = reading
            .measurement
            .bind_columns(query)
            .bind(at.timestamp_millis())
            .bind(reading.id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(&reading.id).await
    }

    /// Marks a reading deleted and dirty.
    ///
    /// `updated_at` becomes `at`, or one millisecond past the current value if
    /// `at` is not later. Returns false if no reading has this id.
    pub async fn soft_delete(&self, id: &str, at: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE {} SET is_deleted = 1, dirty = 1, updated_at = MAX(?, updated_at + 1) WHERE id = ?",
            Self::table()
        );
        let result = sqlx::query(&sql)
            .bind(at.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clears the dirty flag without touching the content.
    pub async fn mark_synced(&self, id: &str) -> Result<bool, sqlx::Error> {
        let sql = format!("UPDATE {} SET dirty = 0 WHERE id = ?", Self::table());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clears the dirty flag only if the row still has the pushed `updated_at`.
    ///
    /// A reading edited again while its previous version was being pushed
    /// stays dirty.
    pub async fn mark_synced_if_unchanged(
        &self,
        id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE {} SET dirty = 0 WHERE id = ? AND updated_at = ?",
            Self::table()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(updated_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch(&self, query: SqliteQuery<'_>) -> Result<Vec<Reading<M>>, sqlx::Error> {
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(reading_from_row).collect()
    }
}

fn reading_from_row<M: ReadingColumns>(row: &SqliteRow) -> Result<Reading<M>, sqlx::Error> {
    Ok(Reading {
        id: row.try_get("id")?,
        measurement: M::from_row(row)?,
        measured_at: millis_column(row, "measured_at")?,
        note: row.try_get("note")?,
        created_at: millis_column(row, "created_at")?,
        updated_at: millis_column(row, "updated_at")?,
        is_deleted: row.try_get("is_deleted")?,
        dirty: row.try_get("dirty")?,
        owner_id: row.try_get("owner_id")?,
    })
}

fn millis_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let millis: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("timestamp out of range: {}", millis).into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::{Arm, BloodPressure, Glucose, MealContext, SyncState, TimeOfDay};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    struct TestContext {
        glucose: ReadingRepository<Glucose>,
        blood_pressure: ReadingRepository<BloodPressure>,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(&db_path).await.unwrap();
        TestContext {
            glucose: ReadingRepository::new(pool.clone()),
            blood_pressure: ReadingRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn glucose_at(day: u32, hour: u32, value: f64) -> Reading<Glucose> {
        Reading::new(Glucose::new(value, MealContext::Fasting), at(day, hour))
    }

    #[tokio::test]
    async fn test_upsert_and_get_by_id() {
        let ctx = setup().await;
        let reading = glucose_at(15, 8, 5.4).with_note("after run");

        ctx.glucose.upsert(&reading, SyncMark::Dirty).await.unwrap();

        let fetched = ctx.glucose.get_by_id(&reading.id).await.unwrap().unwrap();
        assert_eq!(fetched, reading);
        assert!(fetched.dirty);
    }

    #[tokio::test]
    async fn test_get_by_id_missing() {
        let ctx = setup().await;
        assert!(ctx.glucose.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blood_pressure_columns_roundtrip() {
        let ctx = setup().await;
        let reading = Reading::new(
            BloodPressure::new(132, 84, Arm::Right, TimeOfDay::Evening).with_pulse(70),
            at(3, 19),
        );

        ctx.blood_pressure
            .upsert(&reading, SyncMark::Synced)
            .await
            .unwrap();

        let fetched = ctx
            .blood_pressure
            .get_by_id(&reading.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.measurement, reading.measurement);
        assert!(!fetched.dirty);
    }

    #[tokio::test]
    async fn test_upsert_replaces_content_but_keeps_created_at() {
        let ctx = setup().await;
        let original = glucose_at(15, 8, 5.4);
        ctx.glucose.upsert(&original, SyncMark::Synced).await.unwrap();

        let mut replacement = original.clone();
        replacement.measurement.value_mmol = 6.1;
        replacement.created_at = original.created_at + Duration::days(1);
        replacement.updated_at = original.updated_at + Duration::seconds(5);
        ctx.glucose
            .upsert(&replacement, SyncMark::Dirty)
            .await
            .unwrap();

        let fetched = ctx.glucose.get_by_id(&original.id).await.unwrap().unwrap();
        assert_eq!(fetched.measurement.value_mmol, 6.1);
        assert_eq!(fetched.created_at, original.created_at);
        assert_eq!(fetched.updated_at, replacement.updated_at);
        assert!(fetched.dirty);
    }

    #[tokio::test]
    async fn test_get_all_excludes_deleted_and_orders_desc() {
        let ctx = setup().await;
        let early = glucose_at(1, 8, 5.0);
        let late = glucose_at(3, 8, 5.2);
        let deleted = glucose_at(2, 8, 5.1);
        for r in [&early, &late, &deleted] {
            ctx.glucose.upsert(r, SyncMark::Dirty).await.unwrap();
        }
        ctx.glucose.soft_delete(&deleted.id, Utc::now()).await.unwrap();

        let all = ctx.glucose.get_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![late.id.as_str(), early.id.as_str()]);
    }

    #[tokio::test]
    async fn test_get_by_range_is_half_open() {
        let ctx = setup().await;
        let first = glucose_at(1, 0, 5.0);
        let second = glucose_at(5, 12, 5.1);
        let boundary = glucose_at(10, 0, 5.2);
        for r in [&first, &second, &boundary] {
            ctx.glucose.upsert(r, SyncMark::Dirty).await.unwrap();
        }

        let asc = ctx
            .glucose
            .get_by_range(at(1, 0), at(10, 0), SortOrder::Ascending)
            .await
            .unwrap();
        let ids: Vec<&str> = asc.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

        let desc = ctx
            .glucose
            .get_by_range(at(1, 0), at(10, 0), SortOrder::Descending)
            .await
            .unwrap();
        assert_eq!(desc[0].id, second.id);

        let count = ctx
            .glucose
            .count_by_range(at(1, 0), at(11, 0))
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_get_recent() {
        let ctx = setup().await;
        for day in 1..=5 {
            ctx.glucose
                .upsert(&glucose_at(day, 8, 5.0), SyncMark::Synced)
                .await
                .unwrap();
        }

        let recent = ctx.glucose.get_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].measured_at, at(5, 8));
        assert_eq!(recent[1].measured_at, at(4, 8));
    }

    #[tokio::test]
    async fn test_get_dirty_includes_soft_deleted() {
        let ctx = setup().await;
        let clean = glucose_at(1, 8, 5.0);
        let deleted = glucose_at(2, 8, 5.0);
        ctx.glucose.upsert(&clean, SyncMark::Synced).await.unwrap();
        ctx.glucose.upsert(&deleted, SyncMark::Synced).await.unwrap();

        assert!(ctx.glucose.get_dirty().await.unwrap().is_empty());

        ctx.glucose.soft_delete(&deleted.id, Utc::now()).await.unwrap();

        let dirty = ctx.glucose.get_dirty().await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id, deleted.id);
        assert!(dirty[0].is_deleted);
        assert_eq!(dirty[0].sync_state(), SyncState::DirtyDeleted);
        assert_eq!(ctx.glucose.count_dirty().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_advances_updated_at() {
        let ctx = setup().await;
        let reading = glucose_at(1, 8, 5.0);
        ctx.glucose.upsert(&reading, SyncMark::Synced).await.unwrap();

        // A clock behind the stored timestamp still moves updated_at forward
        let stale = reading.updated_at - Duration::hours(1);
        assert!(ctx.glucose.soft_delete(&reading.id, stale).await.unwrap());

        let fetched = ctx.glucose.get_by_id(&reading.id).await.unwrap().unwrap();
        assert!(fetched.is_deleted);
        assert!(fetched.dirty);
        assert_eq!(
            fetched.updated_at,
            reading.updated_at + Duration::milliseconds(1)
        );
    }

    #[tokio::test]
    async fn test_synced_upsert_keeps_newer_local_row() {
        let ctx = setup().await;
        let mut local = glucose_at(15, 8, 5.4);
        local.updated_at = at(15, 10);
        ctx.glucose.upsert(&local, SyncMark::Dirty).await.unwrap();

        let mut stale = local.clone();
        stale.measurement.value_mmol = 9.9;
        stale.updated_at = at(15, 9);
        assert!(!ctx.glucose.upsert(&stale, SyncMark::Synced).await.unwrap());

        let mut same = local.clone();
        same.measurement.value_mmol = 8.8;
        assert!(!ctx.glucose.upsert(&same, SyncMark::Synced).await.unwrap());

        let stored = ctx.glucose.get_by_id(&local.id).await.unwrap().unwrap();
        assert_eq!(stored.measurement.value_mmol, 5.4);
        assert!(stored.dirty);

        let mut newer = local.clone();
        newer.measurement.value_mmol = 7.1;
        newer.updated_at = at(15, 11);
        assert!(ctx.glucose.upsert(&newer, SyncMark::Synced).await.unwrap());

        let stored = ctx.glucose.get_by_id(&local.id).await.unwrap().unwrap();
        assert_eq!(stored.measurement.value_mmol, 7.1);
        assert!(!stored.dirty);
    }

    #[tokio::test]
    async fn test_update_content_advances_stored_updated_at() {
        let ctx = setup().await;
        let mut reading = glucose_at(15, 8, 5.4);
        reading.updated_at = at(15, 12);
        ctx.glucose.upsert(&reading, SyncMark::Synced).await.unwrap();

        // Both edits were prepared from the same snapshot with a clock behind the row
        let mut first = reading.clone();
        first.measurement.value_mmol = 6.0;
        let mut second = reading.clone();
        second.note = Some("second".to_string());

        let a = ctx
            .glucose
            .update_content(&first, at(15, 9))
            .await
            .unwrap()
            .unwrap();
        let b = ctx
            .glucose
            .update_content(&second, at(15, 9))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(a.updated_at, at(15, 12) + Duration::milliseconds(1));
        assert_eq!(b.updated_at, at(15, 12) + Duration::milliseconds(2));
        assert!(b.dirty);
        assert_eq!(b.note.as_deref(), Some("second"));
        assert_eq!(b.created_at, reading.created_at);
    }

    #[tokio::test]
    async fn test_update_content_skips_deleted_and_missing() {
        let ctx = setup().await;
        let reading = glucose_at(15, 8, 5.4);
        assert!(ctx
            .glucose
            .update_content(&reading, at(15, 9))
            .await
            .unwrap()
            .is_none());

        ctx.glucose.upsert(&reading, SyncMark::Synced).await.unwrap();
        ctx.glucose.soft_delete(&reading.id, at(15, 9)).await.unwrap();
        assert!(ctx
            .glucose
            .update_content(&reading, at(15, 10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_missing_is_noop() {
        let ctx = setup().await;
        assert!(!ctx.glucose.soft_delete("missing", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_synced_only_clears_flag() {
        let ctx = setup().await;
        let reading = glucose_at(1, 8, 5.0).with_note("note");
        ctx.glucose.upsert(&reading, SyncMark::Dirty).await.unwrap();
        let before = ctx.glucose.get_by_id(&reading.id).await.unwrap().unwrap();

        assert!(ctx.glucose.mark_synced(&reading.id).await.unwrap());

        let after = ctx.glucose.get_by_id(&reading.id).await.unwrap().unwrap();
        assert!(!after.dirty);
        assert_eq!(Reading { dirty: false, ..before }, after);
        assert!(ctx.glucose.get_dirty().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_synced_if_unchanged_skips_newer_edit() {
        let ctx = setup().await;
        let pushed = glucose_at(1, 8, 5.0);
        ctx.glucose.upsert(&pushed, SyncMark::Dirty).await.unwrap();

        let mut edited = pushed.clone();
        edited.updated_at = pushed.updated_at + Duration::seconds(1);
        ctx.glucose.upsert(&edited, SyncMark::Dirty).await.unwrap();

        let cleared = ctx
            .glucose
            .mark_synced_if_unchanged(&pushed.id, pushed.updated_at)
            .await
            .unwrap();
        assert!(!cleared);
        assert_eq!(ctx.glucose.get_dirty().await.unwrap().len(), 1);

        let cleared = ctx
            .glucose
            .mark_synced_if_unchanged(&pushed.id, edited.updated_at)
            .await
            .unwrap();
        assert!(cleared);
        assert!(ctx.glucose.get_dirty().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kinds_are_isolated() {
        let ctx = setup().await;
        ctx.glucose
            .upsert(&glucose_at(1, 8, 5.0), SyncMark::Dirty)
            .await
            .unwrap();

        assert_eq!(ctx.glucose.get_all().await.unwrap().len(), 1);
        assert!(ctx.blood_pressure.get_all().await.unwrap().is_empty());
    }
}
