//! Per-kind column mapping for the reading tables.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use crate::models::{Arm, BloodPressure, Glucose, MealContext, Measurement, TimeOfDay};

pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Maps a measurement onto the kind-specific columns of its table.
pub trait ReadingColumns: Measurement {
    /// Measurement columns, in the order [`ReadingColumns::bind_columns`] binds them.
    const COLUMNS: &'static [&'static str];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error>;
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

impl ReadingColumns for Glucose {
    const COLUMNS: &'static [&'static str] = &["value_mmol", "meal_context"];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.value_mmol)
            .bind(self.meal_context.as_str())
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Glucose {
            value_mmol: row.try_get("value_mmol")?,
            meal_context: parse_column::<MealContext>(row, "meal_context")?,
        })
    }
}

impl ReadingColumns for BloodPressure {
    const COLUMNS: &'static [&'static str] =
        &["systolic", "diastolic", "pulse", "arm", "time_of_day"];

    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.systolic)
            .bind(self.diastolic)
            .bind(self.pulse)
            .bind(self.arm.as_str())
            .bind(self.time_of_day.as_str())
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(BloodPressure {
            systolic: row.try_get("systolic")?,
            diastolic: row.try_get("diastolic")?,
            pulse: row.try_get("pulse")?,
            arm: parse_column::<Arm>(row, "arm")?,
            time_of_day: parse_column::<TimeOfDay>(row, "time_of_day")?,
        })
    }
}
