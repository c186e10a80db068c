use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::reading::{Measurement, ReadingKind};
use super::status::ReadingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arm::Left => "LEFT",
            Arm::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arm::Left => write!(f, "left"),
            Arm::Right => write!(f, "right"),
        }
    }
}

impl FromStr for Arm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Arm::Left),
            "right" => Ok(Arm::Right),
            _ => Err(format!("Invalid arm '{}'. Valid options: left, right", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeOfDay {
    Morning,
    Day,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "MORNING",
            TimeOfDay::Day => "DAY",
            TimeOfDay::Evening => "EVENING",
            TimeOfDay::Night => "NIGHT",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Morning => write!(f, "morning"),
            TimeOfDay::Day => write!(f, "day"),
            TimeOfDay::Evening => write!(f, "evening"),
            TimeOfDay::Night => write!(f, "night"),
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morning" => Ok(TimeOfDay::Morning),
            "day" => Ok(TimeOfDay::Day),
            "evening" => Ok(TimeOfDay::Evening),
            "night" => Ok(TimeOfDay::Night),
            _ => Err(format!(
                "Invalid time of day '{}'. Valid options: morning, day, evening, night",
                s
            )),
        }
    }
}

/// Hour-of-day boundaries (0-23), each marking the start of its period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDayRanges {
    pub morning_start: u32,
    pub day_start: u32,
    pub evening_start: u32,
    pub night_start: u32,
}

impl Default for TimeOfDayRanges {
    fn default() -> Self {
        Self {
            morning_start: 6,
            day_start: 12,
            evening_start: 18,
            night_start: 22,
        }
    }
}

impl TimeOfDayRanges {
    /// Builds ranges, requiring strictly increasing hours within a day.
    pub fn new(
        morning_start: u32,
        day_start: u32,
        evening_start: u32,
        night_start: u32,
    ) -> Result<Self, String> {
        if !(morning_start < day_start && day_start < evening_start && evening_start < night_start)
            || night_start > 23
        {
            return Err(format!(
                "Invalid time-of-day boundaries {}/{}/{}/{}: hours must increase and stay within 0-23",
                morning_start, day_start, evening_start, night_start
            ));
        }
        Ok(Self {
            morning_start,
            day_start,
            evening_start,
            night_start,
        })
    }

    pub fn resolve(&self, hour: u32) -> TimeOfDay {
        if hour >= self.night_start || hour < self.morning_start {
            TimeOfDay::Night
        } else if hour < self.day_start {
            TimeOfDay::Morning
        } else if hour < self.evening_start {
            TimeOfDay::Day
        } else {
            TimeOfDay::Evening
        }
    }
}

/// Blood pressure measurement in mmHg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodPressure {
    pub systolic: i32,
    pub diastolic: i32,
    #[serde(default)]
    pub pulse: Option<i32>,
    pub arm: Arm,
    pub time_of_day: TimeOfDay,
}

impl BloodPressure {
    pub fn new(systolic: i32, diastolic: i32, arm: Arm, time_of_day: TimeOfDay) -> Self {
        Self {
            systolic,
            diastolic,
            pulse: None,
            arm,
            time_of_day,
        }
    }

    pub fn with_pulse(mut self, pulse: i32) -> Self {
        self.pulse = Some(pulse);
        self
    }
}

impl Measurement for BloodPressure {
    const KIND: ReadingKind = ReadingKind::BloodPressure;

    fn status(&self) -> ReadingStatus {
        if self.systolic < 140 && self.diastolic < 90 {
            ReadingStatus::Normal
        } else if self.systolic <= 150 && self.diastolic <= 95 {
            ReadingStatus::Borderline
        } else {
            ReadingStatus::High
        }
    }
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} mmHg", self.systolic, self.diastolic)?;
        if let Some(pulse) = self.pulse {
            write!(f, ", pulse {}", pulse)?;
        }
        write!(f, " ({} arm, {})", self.arm, self.time_of_day)
    }
}
