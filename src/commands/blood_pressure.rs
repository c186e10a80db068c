use chrono::{Local, Timelike, Utc};
use clap::{Args, Subcommand};

use glowlog::db::PreferenceStore;
use glowlog::models::{Arm, BloodPressure, TimeOfDay};
use glowlog::sync::SyncReadingRepository;

use super::{
    parse_timestamp, print_reading, print_readings, validate_note, ListArgs, OutputFormat,
};

#[derive(Args)]
pub struct BloodPressureCommand {
    #[command(subcommand)]
    pub command: BloodPressureSubcommand,
}

#[derive(Subcommand)]
pub enum BloodPressureSubcommand {
    /// Record a blood pressure reading
    Add {
        /// Systolic pressure in mmHg
        systolic: i32,

        /// Diastolic pressure in mmHg
        diastolic: i32,

        /// Pulse in beats per minute
        #[arg(long, short)]
        pulse: Option<i32>,

        /// Arm used (left, right)
        #[arg(long, short, default_value = "left")]
        arm: String,

        /// Time of day (morning, day, evening, night), derived from the measurement time if omitted
        #[arg(long = "time-of-day", short = 't')]
        time_of_day: Option<String>,

        /// Measurement time ("YYYY-MM-DD HH:MM" local, or RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,

        /// Free-text note
        #[arg(long)]
        note: Option<String>,
    },

    /// List blood pressure readings, newest first
    List(ListArgs),

    /// Show a blood pressure reading
    Show {
        /// Reading ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update a blood pressure reading
    Update {
        /// Reading ID
        id: String,

        #[arg(long)]
        systolic: Option<i32>,

        #[arg(long)]
        diastolic: Option<i32>,

        #[arg(long, short)]
        pulse: Option<i32>,

        #[arg(long, short)]
        arm: Option<String>,

        #[arg(long = "time-of-day", short = 't')]
        time_of_day: Option<String>,

        /// New measurement time
        #[arg(long)]
        at: Option<String>,

        /// New note (empty string clears it)
        #[arg(long)]
        note: Option<String>,
    },

    /// Delete a blood pressure reading
    Delete {
        /// Reading ID
        id: String,
    },
}

impl BloodPressureCommand {
    /// Returns true if the command changed local data.
    pub fn is_write(&self) -> bool {
        matches!(
            self.command,
            BloodPressureSubcommand::Add { .. }
                | BloodPressureSubcommand::Update { .. }
                | BloodPressureSubcommand::Delete { .. }
        )
    }

    pub async fn run(
        &self,
        repo: &SyncReadingRepository<BloodPressure>,
        preferences: &PreferenceStore,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            BloodPressureSubcommand::Add {
                systolic,
                diastolic,
                pulse,
                arm,
                time_of_day,
                at,
                note,
            } => {
                validate_pressure(*systolic, *diastolic)?;
                if let Some(p) = pulse {
                    validate_pulse(*p)?;
                }
                let arm: Arm = arm.parse()?;
                validate_note(note.as_deref())?;
                let measured_at = match at {
                    Some(s) => parse_timestamp(s)?,
                    None => Utc::now(),
                };
                let time_of_day: TimeOfDay = match time_of_day {
                    Some(s) => s.parse()?,
                    None => {
                        let hour = measured_at.with_timezone(&Local).hour();
                        preferences.time_of_day_ranges().await?.resolve(hour)
                    }
                };

                let mut measurement = BloodPressure::new(*systolic, *diastolic, arm, time_of_day);
                if let Some(p) = pulse {
                    measurement = measurement.with_pulse(*p);
                }

                let reading = repo.create(measurement, measured_at, note.clone()).await?;

                println!("Recorded blood pressure reading:");
                println!();
                print_reading(&reading, OutputFormat::Text)?;
                Ok(())
            }
            BloodPressureSubcommand::List(args) => {
                let readings = args.fetch(repo).await?;
                print_readings(&readings, args.format)?;
                Ok(())
            }
            BloodPressureSubcommand::Show { id, format } => {
                let reading = repo
                    .get(id)
                    .await?
                    .ok_or_else(|| format!("Blood pressure reading not found: {}", id))?;
                print_reading(&reading, *format)?;
                Ok(())
            }
            BloodPressureSubcommand::Update {
                id,
                systolic,
                diastolic,
                pulse,
                arm,
                time_of_day,
                at,
                note,
            } => {
                let existing = repo
                    .get(id)
                    .await?
                    .ok_or_else(|| format!("Blood pressure reading not found: {}", id))?;
                validate_pressure(
                    systolic.unwrap_or(existing.measurement.systolic),
                    diastolic.unwrap_or(existing.measurement.diastolic),
                )?;
                if let Some(p) = pulse {
                    validate_pulse(*p)?;
                }
                let arm = arm.as_deref().map(str::parse::<Arm>).transpose()?;
                let time_of_day = time_of_day
                    .as_deref()
                    .map(str::parse::<TimeOfDay>)
                    .transpose()?;
                let measured_at = at.as_deref().map(parse_timestamp).transpose()?;
                validate_note(note.as_deref())?;

                let updated = repo
                    .update(id, |reading| {
                        let m = &mut reading.measurement;
                        if let Some(v) = systolic {
                            m.systolic = *v;
                        }
                        if let Some(v) = diastolic {
                            m.diastolic = *v;
                        }
                        if let Some(v) = pulse {
                            m.pulse = Some(*v);
                        }
                        if let Some(v) = arm {
                            m.arm = v;
                        }
                        if let Some(v) = time_of_day {
                            m.time_of_day = v;
                        }
                        if let Some(t) = measured_at {
                            reading.measured_at = t;
                        }
                        if let Some(n) = note {
                            reading.note = (!n.is_empty()).then(|| n.clone());
                        }
                    })
                    .await?
                    .ok_or_else(|| format!("Blood pressure reading not found: {}", id))?;

                println!("Updated blood pressure reading:");
                println!();
                print_reading(&updated, OutputFormat::Text)?;
                Ok(())
            }
            BloodPressureSubcommand::Delete { id } => {
                if !repo.delete(id).await? {
                    return Err(format!("Blood pressure reading not found: {}", id).into());
                }
                println!("Deleted blood pressure reading {}", id);
                Ok(())
            }
        }
    }
}

fn validate_pressure(systolic: i32, diastolic: i32) -> Result<(), String> {
    if !(40..=300).contains(&systolic) || !(20..=200).contains(&diastolic) {
        return Err(format!(
            "Invalid blood pressure {}/{}. Expected systolic 40-300 and diastolic 20-200 mmHg.",
            systolic, diastolic
        ));
    }
    if diastolic >= systolic {
        return Err(format!(
            "Invalid blood pressure {}/{}: systolic must be above diastolic.",
            systolic, diastolic
        ));
    }
    Ok(())
}

fn validate_pulse(pulse: i32) -> Result<(), String> {
    if (20..=250).contains(&pulse) {
        Ok(())
    } else {
        Err(format!("Invalid pulse {}. Expected 20-250 bpm.", pulse))
    }
}
