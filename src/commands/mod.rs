mod blood_pressure;
mod config_cmd;
mod glucose;
mod settings;
mod sync_cmd;

pub use blood_pressure::BloodPressureCommand;
pub use config_cmd::ConfigCommand;
pub use glucose::GlucoseCommand;
pub use settings::SettingsCommand;
pub use sync_cmd::SyncCommand;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, ValueEnum};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use glowlog::config::{Config, SyncConfig};
use glowlog::db::{init_db, PreferenceStore, ReadingColumns, ReadingRepository, SortOrder};
use glowlog::models::{
    BloodPressure, DateRange, Glucose, Measurement, Reading, ReadingStatus, MAX_NOTE_CHARS,
};
use glowlog::remote::{HttpRemoteStore, RemoteError};
use glowlog::sync::{
    RetryPolicy, Session, SyncEngine, SyncError, SyncEvent, SyncOptions, SyncReadingRepository,
    SyncScheduler,
};

/// How long a write command waits for its background sync before exiting.
const AUTO_SYNC_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RangeArg {
    Week,
    Month,
}

/// Shared filters for `list` subcommands.
#[derive(Args)]
pub struct ListArgs {
    /// Start date (YYYY-MM-DD), defaults to 7 days before --to
    #[arg(long)]
    from: Option<String>,

    /// End date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    to: Option<String>,

    /// Predefined range ending today
    #[arg(long, value_enum, conflicts_with_all = ["from", "to"])]
    range: Option<RangeArg>,

    /// Show at most this many readings
    #[arg(long, short = 'n')]
    limit: Option<u32>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ListArgs {
    fn date_range(&self) -> Result<Option<DateRange>, String> {
        if let Some(range) = self.range {
            return Ok(Some(match range {
                RangeArg::Week => DateRange::Week,
                RangeArg::Month => DateRange::Month,
            }));
        }
        if self.from.is_none() && self.to.is_none() {
            return Ok(None);
        }

        let to = match &self.to {
            Some(s) => parse_date(s)?,
            None => Local::now().date_naive(),
        };
        let from = match &self.from {
            Some(s) => parse_date(s)?,
            None => to - chrono::Days::new(7),
        };
        if from > to {
            return Err(format!("--from {} is after --to {}", from, to));
        }
        Ok(Some(DateRange::Custom(from, to)))
    }

    pub async fn fetch<M: ReadingColumns>(
        &self,
        repo: &SyncReadingRepository<M>,
    ) -> Result<Vec<Reading<M>>, Box<dyn std::error::Error>> {
        let mut readings = match self.date_range()? {
            Some(range) => {
                let (start, end) = range.bounds(Local::now().date_naive());
                repo.list_range(start, end, SortOrder::Descending).await?
            }
            None => match self.limit {
                Some(limit) => repo.recent(limit).await?,
                None => repo.list().await?,
            },
        };
        if let Some(limit) = self.limit {
            readings.truncate(limit as usize);
        }
        Ok(readings)
    }
}

/// Parse a calendar date in YYYY-MM-DD form.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Use YYYY-MM-DD.", s))
}

/// Parse a measurement time: RFC 3339, or local "YYYY-MM-DD HH:MM".
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").map_err(|_| {
        format!(
            "Invalid time '{}'. Use \"YYYY-MM-DD HH:MM\" or RFC 3339.",
            s
        )
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("Time '{}' does not exist in the local time zone", s))
}

/// Rejects notes too long to sync.
pub fn validate_note(note: Option<&str>) -> Result<(), String> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_CHARS => Err(format!(
            "Note is {} characters long; the limit is {}.",
            n.chars().count(),
            MAX_NOTE_CHARS
        )),
        _ => Ok(()),
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

#[derive(Serialize)]
struct ReadingJson<'a, M: Measurement> {
    #[serde(flatten)]
    reading: &'a Reading<M>,
    status: ReadingStatus,
}

impl<'a, M: Measurement> From<&'a Reading<M>> for ReadingJson<'a, M> {
    fn from(reading: &'a Reading<M>) -> Self {
        Self {
            reading,
            status: reading.measurement.status(),
        }
    }
}

pub fn print_readings<M: Measurement + fmt::Display>(
    readings: &[Reading<M>],
    format: OutputFormat,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => {
            let json: Vec<ReadingJson<M>> = readings.iter().map(ReadingJson::from).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if readings.is_empty() {
                println!("No readings found.");
                return Ok(());
            }
            for reading in readings {
                println!(
                    "{}  {}  [{}]  {}",
                    local_time(reading.measured_at),
                    reading.measurement,
                    reading.measurement.status(),
                    reading.id
                );
                if let Some(note) = &reading.note {
                    println!("    {}", note);
                }
            }
        }
    }
    Ok(())
}

pub fn print_reading<M: Measurement + fmt::Display>(
    reading: &Reading<M>,
    format: OutputFormat,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ReadingJson::from(reading))?
            );
        }
        OutputFormat::Text => {
            println!("ID:       {}", reading.id);
            println!("Measured: {}", local_time(reading.measured_at));
            println!("Value:    {}", reading.measurement);
            println!("Status:   {}", reading.measurement.status());
            if let Some(note) = &reading.note {
                println!("Note:     {}", note);
            }
            println!("Updated:  {}", local_time(reading.updated_at));
            println!(
                "Sync:     {}",
                if reading.dirty { "pending" } else { "synced" }
            );
        }
    }
    Ok(())
}

/// Builds a scheduler talking to the configured sync server.
pub fn build_scheduler(pool: &SqlitePool, sync: &SyncConfig) -> Result<SyncScheduler, RemoteError> {
    let remote = Arc::new(HttpRemoteStore::from_config(sync)?);
    let session = Arc::new(Session::new(sync.user_id.clone()));
    let engine = SyncEngine::new(pool.clone(), remote.clone(), session).with_options(SyncOptions {
        clock_skew: sync.clock_skew(),
    });
    Ok(SyncScheduler::new(
        Arc::new(engine),
        remote,
        RetryPolicy::from_config(sync),
    ))
}

struct AutoSync {
    scheduler: SyncScheduler,
    events: broadcast::Receiver<SyncEvent>,
}

/// Opened database plus the background sync wiring for one CLI invocation.
pub struct App {
    pub pool: SqlitePool,
    pub config: Config,
    auto_sync: Option<AutoSync>,
}

impl App {
    pub async fn open(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = init_db(&config.database_path.value).await?;

        let auto_sync = if config.sync.auto_sync && config.sync.is_configured() {
            match build_scheduler(&pool, &config.sync) {
                Ok(scheduler) => {
                    let events = scheduler.subscribe();
                    Some(AutoSync { scheduler, events })
                }
                Err(e) => {
                    warn!("Auto-sync disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            pool,
            config,
            auto_sync,
        })
    }

    fn trigger(&self) -> Option<SyncScheduler> {
        self.auto_sync.as_ref().map(|a| a.scheduler.clone())
    }

    pub fn glucose(&self) -> SyncReadingRepository<Glucose> {
        SyncReadingRepository::new(ReadingRepository::new(self.pool.clone()), self.trigger())
    }

    pub fn blood_pressure(&self) -> SyncReadingRepository<BloodPressure> {
        SyncReadingRepository::new(ReadingRepository::new(self.pool.clone()), self.trigger())
    }

    pub fn preferences(&self) -> PreferenceStore {
        PreferenceStore::new(self.pool.clone())
    }

    /// Waits (bounded) for syncs requested by this invocation to settle.
    ///
    /// Gives up early when the server is unreachable or a run fails, so an
    /// offline write never blocks the command.
    pub async fn finish_auto_sync(&mut self) {
        let Some(auto) = self.auto_sync.as_mut() else {
            return;
        };
        let scheduler = auto.scheduler.clone();

        let wait = async {
            let idle = tokio::select! {
                _ = scheduler.wait_idle() => true,
                _ = watch_events(&mut auto.events) => false,
            };
            if idle {
                while let Ok(event) = auto.events.try_recv() {
                    if log_auto_sync(&event) {
                        break;
                    }
                }
            }
        };

        if tokio::time::timeout(AUTO_SYNC_WAIT, wait).await.is_err() {
            warn!("Auto-sync did not finish in time; changes stay pending");
        }
    }
}

async fn watch_events(events: &mut broadcast::Receiver<SyncEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if log_auto_sync(&event) {
                    return;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        }
    }
}

/// Logs a background sync event. Returns true once there is nothing left to wait for.
fn log_auto_sync(event: &SyncEvent) -> bool {
    match event {
        SyncEvent::Started { attempt } => {
            debug!(attempt, "Auto-sync started");
            false
        }
        SyncEvent::Succeeded(report) => {
            debug!(
                pushed = report.glucose.pushed + report.blood_pressure.pushed,
                applied = report.glucose.applied + report.blood_pressure.applied,
                "Auto-sync complete"
            );
            false
        }
        SyncEvent::WaitingForNetwork => {
            warn!("Auto-sync: server unreachable, changes stay pending");
            true
        }
        SyncEvent::Failed(SyncError::NotSignedIn) => {
            debug!("Auto-sync skipped: not signed in");
            true
        }
        // The scheduler already logged the failure
        SyncEvent::Retrying { error, .. } | SyncEvent::Failed(error) => {
            debug!("Auto-sync gave up for this run: {}", error);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let at = parse_timestamp("2025-03-01T07:30:00Z").unwrap();
        assert_eq!(at.to_rfc3339(), "2025-03-01T07:30:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_local() {
        let at = parse_timestamp("2025-03-01 07:30").unwrap();
        let local = at.with_timezone(&Local);
        assert_eq!(local.hour(), 7);
        assert_eq!(local.minute(), 30);
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_date("01/03/2025").is_err());
    }

    #[test]
    fn test_validate_note_length() {
        assert!(validate_note(None).is_ok());
        assert!(validate_note(Some("after breakfast")).is_ok());
        assert!(validate_note(Some(&"é".repeat(MAX_NOTE_CHARS))).is_ok());
        assert!(validate_note(Some(&"x".repeat(MAX_NOTE_CHARS + 1))).is_err());
    }

    #[test]
    fn test_list_args_custom_range() {
        let args = ListArgs {
            from: Some("2025-01-01".to_string()),
            to: Some("2025-01-31".to_string()),
            range: None,
            limit: None,
            format: OutputFormat::Text,
        };
        let range = args.date_range().unwrap().unwrap();
        assert_eq!(
            range,
            DateRange::Custom(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
            )
        );
    }

    #[test]
    fn test_list_args_rejects_reversed_range() {
        let args = ListArgs {
            from: Some("2025-02-01".to_string()),
            to: Some("2025-01-01".to_string()),
            range: None,
            limit: None,
            format: OutputFormat::Text,
        };
        assert!(args.date_range().is_err());
    }

    #[test]
    fn test_only_problems_end_the_wait() {
        assert!(!log_auto_sync(&SyncEvent::Started { attempt: 1 }));
        assert!(log_auto_sync(&SyncEvent::WaitingForNetwork));
        assert!(log_auto_sync(&SyncEvent::Failed(SyncError::NotSignedIn)));
        assert!(log_auto_sync(&SyncEvent::Failed(SyncError::Network(
            "refused".to_string()
        ))));
    }
}
