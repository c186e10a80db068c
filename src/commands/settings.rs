use chrono::NaiveTime;
use clap::{Args, Subcommand};
use serde::Serialize;

use glowlog::db::PreferenceStore;
use glowlog::models::{ReminderSettings, TimeOfDayRanges};

use super::OutputFormat;

#[derive(Args)]
pub struct SettingsCommand {
    #[command(subcommand)]
    pub command: SettingsSubcommand,
}

#[derive(Subcommand)]
pub enum SettingsSubcommand {
    /// Show current settings
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Set the hours at which each time-of-day period starts
    TimeOfDay {
        /// Hour the morning starts (0-23)
        #[arg(long)]
        morning: Option<u32>,

        /// Hour the day starts
        #[arg(long)]
        day: Option<u32>,

        /// Hour the evening starts
        #[arg(long)]
        evening: Option<u32>,

        /// Hour the night starts
        #[arg(long)]
        night: Option<u32>,
    },

    /// Configure measurement reminders
    Reminders {
        #[arg(long)]
        morning: Option<bool>,

        /// Morning reminder time (HH:MM)
        #[arg(long)]
        morning_time: Option<String>,

        #[arg(long)]
        evening: Option<bool>,

        /// Evening reminder time (HH:MM)
        #[arg(long)]
        evening_time: Option<String>,

        #[arg(long)]
        after_meal: Option<bool>,
    },
}

#[derive(Serialize)]
struct SettingsView {
    time_of_day: TimeOfDayRanges,
    reminders: ReminderSettings,
}

impl SettingsCommand {
    pub async fn run(&self, preferences: &PreferenceStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            SettingsSubcommand::Show { format } => {
                let view = SettingsView {
                    time_of_day: preferences.time_of_day_ranges().await?,
                    reminders: preferences.reminder_settings().await?,
                };
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
                    OutputFormat::Text => print_settings(&view),
                }
                Ok(())
            }
            SettingsSubcommand::TimeOfDay {
                morning,
                day,
                evening,
                night,
            } => {
                let current = preferences.time_of_day_ranges().await?;
                let ranges = TimeOfDayRanges::new(
                    morning.unwrap_or(current.morning_start),
                    day.unwrap_or(current.day_start),
                    evening.unwrap_or(current.evening_start),
                    night.unwrap_or(current.night_start),
                )?;
                preferences.set_time_of_day_ranges(&ranges).await?;

                println!("Time-of-day periods updated:");
                print_ranges(&ranges);
                Ok(())
            }
            SettingsSubcommand::Reminders {
                morning,
                morning_time,
                evening,
                evening_time,
                after_meal,
            } => {
                let mut settings = preferences.reminder_settings().await?;
                if let Some(enabled) = morning {
                    settings.morning_enabled = *enabled;
                }
                if let Some(time) = morning_time {
                    settings.morning_time = parse_time(time)?;
                }
                if let Some(enabled) = evening {
                    settings.evening_enabled = *enabled;
                }
                if let Some(time) = evening_time {
                    settings.evening_time = parse_time(time)?;
                }
                if let Some(enabled) = after_meal {
                    settings.after_meal_enabled = *enabled;
                }
                preferences.set_reminder_settings(&settings).await?;

                println!("Reminders updated:");
                println!("{}", settings);
                Ok(())
            }
        }
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| format!("Invalid time '{}'. Use HH:MM.", s))
}

fn print_ranges(ranges: &TimeOfDayRanges) {
    println!("  morning from {:02}:00", ranges.morning_start);
    println!("  day     from {:02}:00", ranges.day_start);
    println!("  evening from {:02}:00", ranges.evening_start);
    println!("  night   from {:02}:00", ranges.night_start);
}

fn print_settings(view: &SettingsView) {
    println!("Settings");
    println!("========\n");
    println!("Time-of-day periods:");
    print_ranges(&view.time_of_day);
    println!();
    println!("{}", view.reminders);
}
