use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use glowlog::config::Config;

use super::sync_cmd::mask_key;
use super::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# glowlog configuration

# Path to SQLite database (default: platform data dir, e.g. ~/.local/share/glowlog/glowlog.db)
# database_path: ~/.local/share/glowlog/glowlog.db

# Cloud sync (optional)
# sync:
#   server_url: "http://localhost:8080"
#   api_key: "your-api-key"
#   user_id: "your-user-id"
#   auto_sync: true
#   max_attempts: 3
#   initial_backoff_secs: 30
#   max_backoff_secs: 300
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                let mut shown = config.clone();
                shown.sync.api_key = shown.sync.api_key.as_deref().map(mask_key);

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&shown)?);
                    }
                    OutputFormat::Text => print_config(&shown),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'glowlog config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

fn print_config(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    println!("database_path: {}", config.database_path.value.display());
    println!("  source: {}", config.database_path.source);
    println!();

    let sync = &config.sync;
    println!("sync:");
    println!(
        "  server_url: {}",
        sync.server_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  api_key: {}",
        sync.api_key.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  user_id: {}",
        sync.user_id.as_deref().unwrap_or("(not set)")
    );
    println!("  auto_sync: {}", sync.auto_sync);
    println!("  periodic_interval_secs: {}", sync.periodic_interval_secs);
    println!("  max_attempts: {}", sync.max_attempts);
    println!("  initial_backoff_secs: {}", sync.initial_backoff_secs);
    println!("  max_backoff_secs: {}", sync.max_backoff_secs);
    println!("  request_timeout_secs: {}", sync.request_timeout_secs);
    println!("  clock_skew_ms: {}", sync.clock_skew_ms);
}
