use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    App, BloodPressureCommand, ConfigCommand, GlucoseCommand, SettingsCommand, SyncCommand,
};
use glowlog::config::Config;

#[derive(Parser)]
#[command(name = "glowlog")]
#[command(version)]
#[command(about = "Log glucose and blood pressure readings, synced across devices", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and review glucose readings
    Glucose(GlucoseCommand),

    /// Record and review blood pressure readings
    #[command(name = "bp")]
    BloodPressure(BloodPressureCommand),

    /// Sync with remote server
    Sync(SyncCommand),

    /// Manage time-of-day periods and reminders
    Settings(SettingsCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glowlog=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for config init
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config, cli_config_path),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let mut app = App::open(config).await?;

    let is_write = match &command {
        Commands::Glucose(cmd) => cmd.is_write(),
        Commands::BloodPressure(cmd) => cmd.is_write(),
        _ => false,
    };

    match command {
        Commands::Glucose(cmd) => cmd.run(&app.glucose()).await?,
        Commands::BloodPressure(cmd) => {
            cmd.run(&app.blood_pressure(), &app.preferences()).await?
        }
        Commands::Sync(cmd) => cmd.run(&app).await?,
        Commands::Settings(cmd) => cmd.run(&app.preferences()).await?,
        Commands::Config(_) => {}
    }

    // Writes already requested a sync; give it a chance to finish
    if is_write {
        app.finish_auto_sync().await;
    }

    Ok(())
}
