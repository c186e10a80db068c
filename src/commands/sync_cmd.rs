//! Sync CLI commands for synchronizing with the server.

use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use glowlog::config::Config;
use glowlog::db::{PreferenceStore, ReadingRepository};
use glowlog::models::{BloodPressure, Glucose};
use glowlog::remote::{HttpRemoteStore, RemoteError};
use glowlog::sync::{KindReport, SyncError, SyncEvent};

use super::{build_scheduler, App};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Keep running and sync on the configured interval until Ctrl-C
    #[arg(long)]
    watch: bool,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, pending changes and server status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, app: &App) -> Result<(), SyncCommandError> {
        match &self.command {
            None if self.watch => self.watch(app).await,
            None => self.sync(app).await,
            Some(SyncSubcommand::Status) => self.status(app).await,
        }
    }

    async fn sync(&self, app: &App) -> Result<(), SyncCommandError> {
        let remote = HttpRemoteStore::from_config(&app.config.sync)?;
        println!("Syncing with {}...", remote.base_url());
        println!();

        remote.health().await?;

        let scheduler = build_scheduler(&app.pool, &app.config.sync)?;
        let report = scheduler.run_now().await?;

        print_kind("glucose", &report.glucose);
        print_kind("blood pressure", &report.blood_pressure);
        println!();

        let changed = report.glucose.pushed
            + report.glucose.applied
            + report.blood_pressure.pushed
            + report.blood_pressure.applied;
        if changed > 0 {
            println!("Sync complete.");
        } else {
            println!("Already up to date.");
        }
        Ok(())
    }

    async fn watch(&self, app: &App) -> Result<(), SyncCommandError> {
        let sync = &app.config.sync;
        if sync.user_id.is_none() {
            return Err(SyncError::NotSignedIn.into());
        }
        let remote = HttpRemoteStore::from_config(sync)?;
        let scheduler = build_scheduler(&app.pool, sync)?;
        let interval = sync.periodic_interval();

        println!(
            "Syncing with {} every {}s. Press Ctrl-C to stop.",
            remote.base_url(),
            interval.as_secs()
        );

        let mut events = scheduler.subscribe();
        let printer = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(line) = describe_event(&event) {
                            println!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), line);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed sync events"),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        scheduler
            .run_until(interval, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
            })
            .await;

        printer.abort();
        info!("Stopped watching");
        println!("Stopped.");
        Ok(())
    }

    async fn status(&self, app: &App) -> Result<(), SyncCommandError> {
        let config = &app.config;
        println!("Sync Configuration");
        println!("==================");
        println!();

        let (Some(server_url), Some(api_key)) = (&config.sync.server_url, &config.sync.api_key)
        else {
            print_setup_help();
            return Ok(());
        };

        println!("Server:    {}", server_url);
        println!("API Key:   {}", mask_key(api_key));
        println!(
            "User:      {}",
            config.sync.user_id.as_deref().unwrap_or("(not signed in)")
        );
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        let pending_glucose = ReadingRepository::<Glucose>::new(app.pool.clone())
            .count_dirty()
            .await?;
        let pending_bp = ReadingRepository::<BloodPressure>::new(app.pool.clone())
            .count_dirty()
            .await?;
        println!(
            "Pending:   {} glucose, {} blood pressure",
            pending_glucose, pending_bp
        );

        let last_sync = PreferenceStore::new(app.pool.clone()).last_sync().await?;
        if last_sync == DateTime::UNIX_EPOCH {
            println!("Last sync: never");
        } else {
            println!(
                "Last sync: {}",
                last_sync.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
        println!();

        print!("Server status: ");
        let remote = HttpRemoteStore::from_config(&config.sync)?;
        match remote.health().await {
            Ok(()) => println!("✓ connected"),
            Err(RemoteError::Network(_)) => println!("✗ unreachable"),
            Err(e) => println!("✗ error: {}", e),
        }

        Ok(())
    }
}

fn print_kind(name: &str, report: &KindReport) {
    println!(
        "  ✓ {}: {} pushed, {} pulled, {} applied",
        name, report.pushed, report.pulled, report.applied
    );
}

/// One line for a watch-mode event, or `None` for events not worth printing.
fn describe_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::Started { .. } => None,
        SyncEvent::WaitingForNetwork => Some("Server unreachable, waiting...".to_string()),
        SyncEvent::Retrying {
            attempt,
            delay,
            error,
        } => Some(format!(
            "Attempt {} failed ({}), retrying in {}s",
            attempt,
            error,
            delay.as_secs()
        )),
        SyncEvent::Succeeded(report) => Some(format!(
            "Synced: {} pushed, {} applied",
            report.glucose.pushed + report.blood_pressure.pushed,
            report.glucose.applied + report.blood_pressure.applied
        )),
        SyncEvent::Failed(error) => Some(format!("Sync failed: {}", error)),
    }
}

fn print_setup_help() {
    println!("Status: Not configured");
    println!();
    println!("To enable sync, add to your config file:");
    println!();
    println!("  sync:");
    println!("    server_url: \"http://localhost:8080\"");
    println!("    api_key: \"your-api-key\"");
    println!("    user_id: \"your-user-id\"");
    println!();
    println!("Or set environment variables:");
    println!("  GLOWLOG_SYNC_URL");
    println!("  GLOWLOG_SYNC_API_KEY");
    println!("  GLOWLOG_USER_ID");
}

/// Shows the first characters of an API key.
pub fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(8).collect();
    format!("{}...", visible)
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Remote(RemoteError),
    Sync(SyncError),
    Database(sqlx::Error),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Remote(RemoteError::Network(e)) => {
                write!(f, "Sync server unreachable: {}", e)
            }
            SyncCommandError::Remote(e) => write!(f, "{}", e),
            SyncCommandError::Sync(e) => write!(f, "Sync failed: {}", e),
            SyncCommandError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Remote(e) => Some(e),
            SyncCommandError::Sync(e) => Some(e),
            SyncCommandError::Database(e) => Some(e),
        }
    }
}

impl From<RemoteError> for SyncCommandError {
    fn from(e: RemoteError) -> Self {
        SyncCommandError::Remote(e)
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::Sync(e)
    }
}

impl From<sqlx::Error> for SyncCommandError {
    fn from(e: sqlx::Error) -> Self {
        SyncCommandError::Database(e)
    }
}
