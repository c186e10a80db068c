use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement reminder preferences.
///
/// Only stored here; delivering notifications is up to the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    pub morning_enabled: bool,
    pub morning_time: NaiveTime,
    pub evening_enabled: bool,
    pub evening_time: NaiveTime,
    pub after_meal_enabled: bool,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            morning_enabled: false,
            morning_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            evening_enabled: false,
            evening_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
            after_meal_enabled: false,
        }
    }
}

impl fmt::Display for ReminderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |enabled: bool| if enabled { "on" } else { "off" };
        writeln!(
            f,
            "Morning reminder:    {} ({})",
            on_off(self.morning_enabled),
            self.morning_time.format("%H:%M")
        )?;
        writeln!(
            f,
            "Evening reminder:    {} ({})",
            on_off(self.evening_enabled),
            self.evening_time.format("%H:%M")
        )?;
        write!(
            f,
            "After-meal reminder: {}",
            on_off(self.after_meal_enabled)
        )
    }
}
