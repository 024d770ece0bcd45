//! School calendar: maps calendar dates onto teaching weeks.
//!
//! Week 1 starts on the configured Monday. Holiday breaks do not consume week
//! numbers; a date inside a break counts toward the last week before it.

use crate::error::{LedgerError, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Default accepted school days (Monday to Saturday).
pub const DEFAULT_SCHOOL_DAYS: [Weekday; 6] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// An inclusive date range during which no teaching weeks are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Break {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl Break {
    fn len_days(&self) -> i64 {
        (self.last - self.first).num_days() + 1
    }

    fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }
}

#[derive(Debug, Clone)]
pub struct SchoolCalendar {
    start: NaiveDate,
    breaks: Vec<Break>,
}

impl SchoolCalendar {
    /// Creates a calendar whose week 1 begins on `start`.
    ///
    /// Breaks are sorted; overlapping or inverted ranges are rejected.
    pub fn new(start: NaiveDate, mut breaks: Vec<Break>) -> Result<Self> {
        breaks.sort_by_key(|b| b.first);

        for b in &breaks {
            if b.last < b.first {
                return Err(LedgerError::InvalidInput(format!(
                    "break ends ({}) before it starts ({})",
                    b.last, b.first
                )));
            }
        }
        for pair in breaks.windows(2) {
            if pair[1].first <= pair[0].last {
                return Err(LedgerError::InvalidInput(format!(
                    "breaks starting {} and {} overlap",
                    pair[0].first, pair[1].first
                )));
            }
        }

        Ok(SchoolCalendar { start, breaks })
    }

    /// The 2025-2026 school year: week 1 on 8 September 2025, with the Tết
    /// break from 15 to 28 February 2026.
    pub fn school_year_2025() -> Result<Self> {
        let date = |y, m, d| {
            NaiveDate::from_ymd_opt(y, m, d)
                .ok_or_else(|| LedgerError::InvalidInput(format!("invalid date {}-{}-{}", y, m, d)))
        };

        SchoolCalendar::new(
            date(2025, 9, 8)?,
            vec![Break {
                first: date(2026, 2, 15)?,
                last: date(2026, 2, 28)?,
            }],
        )
    }

    /// Returns the teaching week containing `date`.
    ///
    /// Dates before the start of the year fall into week 1.
    pub fn week_of(&self, date: NaiveDate) -> u32 {
        if date < self.start {
            return 1;
        }

        let effective = self
            .breaks
            .iter()
            .find(|b| b.contains(date))
            .map(|b| b.first - Duration::days(1))
            .unwrap_or(date);

        let skipped: i64 = self
            .breaks
            .iter()
            .filter(|b| b.last < effective)
            .map(Break::len_days)
            .sum();

        let days = (effective - self.start).num_days() - skipped;
        (days.max(0) / 7 + 1) as u32
    }

    /// Returns `(week, weekday)` for a date.
    pub fn locate(&self, date: NaiveDate) -> (u32, Weekday) {
        (self.week_of(date), date.weekday())
    }
}

/// Parses a weekday name.
///
/// Accepts English names and abbreviations (`mon`, `Monday`) as well as the
/// Vietnamese short forms used in the class sheets (`T2` to `T7`, `CN`).
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    let trimmed = s.trim();
    let vietnamese = match trimmed.to_uppercase().as_str() {
        "T2" => Some(Weekday::Mon),
        "T3" => Some(Weekday::Tue),
        "T4" => Some(Weekday::Wed),
        "T5" => Some(Weekday::Thu),
        "T6" => Some(Weekday::Fri),
        "T7" => Some(Weekday::Sat),
        "CN" => Some(Weekday::Sun),
        _ => None,
    };

    match vietnamese {
        Some(day) => Ok(day),
        None => trimmed
            .parse::<Weekday>()
            .map_err(|_| LedgerError::InvalidInput(format!("unknown weekday {:?}", trimmed))),
    }
}
