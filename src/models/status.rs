use serde::{Deserialize, Serialize};
use std::fmt;

/// Clinical classification of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Normal,
    Borderline,
    High,
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingStatus::Normal => write!(f, "normal"),
            ReadingStatus::Borderline => write!(f, "borderline"),
            ReadingStatus::High => write!(f, "high"),
        }
    }
}
