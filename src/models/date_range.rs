use chrono::{DateTime, Days, Months, NaiveDate, Utc};

/// A calendar window for range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    /// The last 7 days up to and including today.
    Week,
    /// The last month up to and including today.
    Month,
    /// Inclusive calendar dates.
    Custom(NaiveDate, NaiveDate),
}

impl DateRange {
    /// Half-open instant window `[start 00:00, end + 1 day 00:00)` in UTC.
    pub fn bounds(&self, today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let (start, end) = match *self {
            DateRange::Week => (today - Days::new(7), today),
            DateRange::Month => (today.checked_sub_months(Months::new(1)).unwrap_or(today), today),
            DateRange::Custom(start, end) => (start, end),
        };
        let end = end.checked_add_days(Days::new(1)).unwrap_or(end);
        (start_of_day(start), start_of_day(end))
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}
