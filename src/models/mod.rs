mod blood_pressure;
mod date_range;
mod glucose;
mod reading;
mod settings;
mod status;

pub use blood_pressure::{Arm, BloodPressure, TimeOfDay, TimeOfDayRanges};
pub use date_range::DateRange;
pub use glucose::{Glucose, MealContext};
pub use reading::{now_millis, Measurement, Reading, ReadingKind, SyncState, MAX_NOTE_CHARS};
pub use settings::ReminderSettings;
pub use status::ReadingStatus;

pub type GlucoseReading = Reading<Glucose>;
pub type BloodPressureReading = Reading<BloodPressure>;
