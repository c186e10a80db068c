use chrono::Utc;
use clap::{Args, Subcommand};

use glowlog::models::{Glucose, MealContext};
use glowlog::sync::SyncReadingRepository;

use super::{
    parse_timestamp, print_reading, print_readings, validate_note, ListArgs, OutputFormat,
};

#[derive(Args)]
pub struct GlucoseCommand {
    #[command(subcommand)]
    pub command: GlucoseSubcommand,
}

#[derive(Subcommand)]
pub enum GlucoseSubcommand {
    /// Record a glucose reading
    Add {
        /// Blood glucose in mmol/L
        value: f64,

        /// Meal context (fasting, before-meal, after-meal-1h, after-meal-2h)
        #[arg(long, short = 'm', default_value = "fasting")]
        context: String,

        /// Measurement time ("YYYY-MM-DD HH:MM" local, or RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,

        /// Free-text note
        #[arg(long)]
        note: Option<String>,
    },

    /// List glucose readings, newest first
    List(ListArgs),

    /// Show a glucose reading
    Show {
        /// Reading ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update a glucose reading
    Update {
        /// Reading ID
        id: String,

        /// New value in mmol/L
        #[arg(long)]
        value: Option<f64>,

        /// New meal context
        #[arg(long, short = 'm')]
        context: Option<String>,

        /// New measurement time
        #[arg(long)]
        at: Option<String>,

        /// New note (empty string clears it)
        #[arg(long)]
        note: Option<String>,
    },

    /// Delete a glucose reading
    Delete {
        /// Reading ID
        id: String,
    },
}

impl GlucoseCommand {
    /// Returns true if the command changed local data.
    pub fn is_write(&self) -> bool {
        matches!(
            self.command,
            GlucoseSubcommand::Add { .. }
                | GlucoseSubcommand::Update { .. }
                | GlucoseSubcommand::Delete { .. }
        )
    }

    pub async fn run(
        &self,
        repo: &SyncReadingRepository<Glucose>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            GlucoseSubcommand::Add {
                value,
                context,
                at,
                note,
            } => {
                let value = validate_value(*value)?;
                let meal_context: MealContext = context.parse()?;
                validate_note(note.as_deref())?;
                let measured_at = match at {
                    Some(s) => parse_timestamp(s)?,
                    None => Utc::now(),
                };

                let reading = repo
                    .create(Glucose::new(value, meal_context), measured_at, note.clone())
                    .await?;

                println!("Recorded glucose reading:");
                println!();
                print_reading(&reading, OutputFormat::Text)?;
                Ok(())
            }
            GlucoseSubcommand::List(args) => {
                let readings = args.fetch(repo).await?;
                print_readings(&readings, args.format)?;
                Ok(())
            }
            GlucoseSubcommand::Show { id, format } => {
                let reading = repo
                    .get(id)
                    .await?
                    .ok_or_else(|| format!("Glucose reading not found: {}", id))?;
                print_reading(&reading, *format)?;
                Ok(())
            }
            GlucoseSubcommand::Update {
                id,
                value,
                context,
                at,
                note,
            } => {
                let value = value.map(validate_value).transpose()?;
                let meal_context = context
                    .as_deref()
                    .map(str::parse::<MealContext>)
                    .transpose()?;
                let measured_at = at.as_deref().map(parse_timestamp).transpose()?;
                validate_note(note.as_deref())?;

                let updated = repo
                    .update(id, |reading| {
                        if let Some(v) = value {
                            reading.measurement.value_mmol = v;
                        }
                        if let Some(c) = meal_context {
                            reading.measurement.meal_context = c;
                        }
                        if let Some(t) = measured_at {
                            reading.measured_at = t;
                        }
                        if let Some(n) = note {
                            reading.note = (!n.is_empty()).then(|| n.clone());
                        }
                    })
                    .await?
                    .ok_or_else(|| format!("Glucose reading not found: {}", id))?;

                println!("Updated glucose reading:");
                println!();
                print_reading(&updated, OutputFormat::Text)?;
                Ok(())
            }
            GlucoseSubcommand::Delete { id } => {
                if !repo.delete(id).await? {
                    return Err(format!("Glucose reading not found: {}", id).into());
                }
                println!("Deleted glucose reading {}", id);
                Ok(())
            }
        }
    }
}

fn validate_value(value: f64) -> Result<f64, String> {
    if value.is_finite() && value > 0.0 && value < 100.0 {
        Ok(value)
    } else {
        Err(format!(
            "Invalid glucose value {}. Expected mmol/L between 0 and 100.",
            value
        ))
    }
}
