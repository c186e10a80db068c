use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::reading::{Measurement, ReadingKind};
use super::status::ReadingStatus;

/// When a glucose reading was taken relative to a meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MealContext {
    #[serde(rename = "FASTING")]
    Fasting,
    #[serde(rename = "BEFORE_MEAL")]
    BeforeMeal,
    #[serde(rename = "AFTER_MEAL_1H")]
    AfterMeal1h,
    #[serde(rename = "AFTER_MEAL_2H")]
    AfterMeal2h,
}

impl MealContext {
    /// Stored and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MealContext::Fasting => "FASTING",
            MealContext::BeforeMeal => "BEFORE_MEAL",
            MealContext::AfterMeal1h => "AFTER_MEAL_1H",
            MealContext::AfterMeal2h => "AFTER_MEAL_2H",
        }
    }
}

impl fmt::Display for MealContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealContext::Fasting => write!(f, "fasting"),
            MealContext::BeforeMeal => write!(f, "before-meal"),
            MealContext::AfterMeal1h => write!(f, "after-meal-1h"),
            MealContext::AfterMeal2h => write!(f, "after-meal-2h"),
        }
    }
}

impl FromStr for MealContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "fasting" => Ok(MealContext::Fasting),
            "before-meal" => Ok(MealContext::BeforeMeal),
            "after-meal-1h" => Ok(MealContext::AfterMeal1h),
            "after-meal-2h" => Ok(MealContext::AfterMeal2h),
            _ => Err(format!(
                "Invalid meal context '{}'. Valid options: fasting, before-meal, after-meal-1h, after-meal-2h",
                s
            )),
        }
    }
}

/// Blood glucose measurement in mmol/L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Glucose {
    pub value_mmol: f64,
    pub meal_context: MealContext,
}

impl Glucose {
    pub fn new(value_mmol: f64, meal_context: MealContext) -> Self {
        Self {
            value_mmol,
            meal_context,
        }
    }
}

impl Measurement for Glucose {
    const KIND: ReadingKind = ReadingKind::Glucose;

    fn status(&self) -> ReadingStatus {
        let (normal, borderline) = match self.meal_context {
            MealContext::Fasting | MealContext::BeforeMeal => (5.1, 5.6),
            MealContext::AfterMeal1h => (10.0, 11.0),
            MealContext::AfterMeal2h => (8.5, 9.3),
        };

        if self.value_mmol <= normal {
            ReadingStatus::Normal
        } else if self.value_mmol <= borderline {
            ReadingStatus::Borderline
        } else {
            ReadingStatus::High
        }
    }
}

impl fmt::Display for Glucose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} mmol/L ({})", self.value_mmol, self.meal_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meal_context_from_str() {
        assert_eq!(
            MealContext::from_str("fasting").unwrap(),
            MealContext::Fasting
        );
        assert_eq!(
            MealContext::from_str("BEFORE_MEAL").unwrap(),
            MealContext::BeforeMeal
        );
        assert_eq!(
            MealContext::from_str("after-meal-2h").unwrap(),
            MealContext::AfterMeal2h
        );
        assert!(MealContext::from_str("brunch").is_err());
    }

    #[test]
    fn test_meal_context_wire_names() {
        let json = serde_json::to_string(&MealContext::AfterMeal1h).unwrap();
        assert_eq!(json, "\"AFTER_MEAL_1H\"");
        assert_eq!(
            MealContext::from_str(MealContext::AfterMeal1h.as_str()).unwrap(),
            MealContext::AfterMeal1h
        );
    }

    #[test]
    fn test_glucose_status_fasting() {
        assert_eq!(
            Glucose::new(5.1, MealContext::Fasting).status(),
            ReadingStatus::Normal
        );
        assert_eq!(
            Glucose::new(5.5, MealContext::BeforeMeal).status(),
            ReadingStatus::Borderline
        );
        assert_eq!(
            Glucose::new(5.7, MealContext::Fasting).status(),
            ReadingStatus::High
        );
    }

    #[test]
    fn test_glucose_status_after_meal() {
        assert_eq!(
            Glucose::new(9.9, MealContext::AfterMeal1h).status(),
            ReadingStatus::Normal
        );
        assert_eq!(
            Glucose::new(10.5, MealContext::AfterMeal1h).status(),
            ReadingStatus::Borderline
        );
        assert_eq!(
            Glucose::new(9.0, MealContext::AfterMeal2h).status(),
            ReadingStatus::Borderline
        );
        assert_eq!(
            Glucose::new(9.4, MealContext::AfterMeal2h).status(),
            ReadingStatus::High
        );
    }
}
