//! Runtime configuration for the command line tool.
//!
//! Input files come from positional arguments; everything else comes from
//! environment variables:
//!
//! - `VIOLATION_LEDGER_SCHOOL_DAYS`: comma-separated accepted weekdays
//!   (default `mon,tue,wed,thu,fri,sat`)
//! - `VIOLATION_LEDGER_TERM_START`: first Monday of week 1 (`YYYY-MM-DD`),
//!   used for rows that carry only a date. Defaults to the 2025-2026 school
//!   year including its Tết break.

use crate::calendar::{parse_weekday, SchoolCalendar, DEFAULT_SCHOOL_DAYS};
use crate::error::{LedgerError, Result};
use chrono::{NaiveDate, Weekday};
use std::path::PathBuf;

pub const SCHOOL_DAYS_VAR: &str = "VIOLATION_LEDGER_SCHOOL_DAYS";
pub const TERM_START_VAR: &str = "VIOLATION_LEDGER_TERM_START";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub catalog_path: PathBuf,
    pub violations_path: PathBuf,
    pub activity_path: Option<PathBuf>,
    pub school_days: Vec<Weekday>,
    pub term_start: Option<NaiveDate>,
}

impl Config {
    /// Builds the configuration from process arguments (program name
    /// excluded) and the process environment.
    pub fn from_env<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        Self::from_parts(args, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from arguments and an environment lookup.
    pub fn from_parts<I, F>(args: I, env: F) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut args = args.into_iter();
        let catalog_path = args.next().ok_or(LedgerError::MissingArgument)?;
        let violations_path = args.next().ok_or(LedgerError::MissingArgument)?;
        let activity_path = args.next();

        let school_days = match env(SCHOOL_DAYS_VAR) {
            Some(raw) => parse_school_days(&raw)?,
            None => DEFAULT_SCHOOL_DAYS.to_vec(),
        };

        let term_start = env(TERM_START_VAR)
            .map(|raw| {
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
                    LedgerError::InvalidInput(format!("{}={:?}: {}", TERM_START_VAR, raw, e))
                })
            })
            .transpose()?;

        Ok(Config {
            catalog_path: catalog_path.into(),
            violations_path: violations_path.into(),
            activity_path: activity_path.map(PathBuf::from),
            school_days,
            term_start,
        })
    }

    /// The calendar used to place date-only rows.
    pub fn calendar(&self) -> Result<SchoolCalendar> {
        match self.term_start {
            Some(start) => SchoolCalendar::new(start, Vec::new()),
            None => SchoolCalendar::school_year_2025(),
        }
    }
}

fn parse_school_days(raw: &str) -> Result<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day = parse_weekday(part)?;
        if !days.contains(&day) {
            days.push(day);
        }
    }

    if days.is_empty() {
        return Err(LedgerError::InvalidInput(format!(
            "{} lists no weekdays",
            SCHOOL_DAYS_VAR
        )));
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn config(list: &[&str], vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_parts(args(list), |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&["codes.csv", "violations.csv"], &[]).unwrap();
        assert_eq!(config.catalog_path, PathBuf::from("codes.csv"));
        assert_eq!(config.activity_path, None);
        assert_eq!(config.school_days, DEFAULT_SCHOOL_DAYS.to_vec());
        assert_eq!(config.term_start, None);
    }

    #[test]
    fn test_missing_arguments() {
        assert!(matches!(
            config(&["codes.csv"], &[]),
            Err(LedgerError::MissingArgument)
        ));
        assert!(matches!(config(&[], &[]), Err(LedgerError::MissingArgument)));
    }

    #[test]
    fn test_environment_overrides() {
        let config = config(
            &["c.csv", "v.csv", "a.csv"],
            &[
                (SCHOOL_DAYS_VAR, "mon, tue,T4,mon"),
                (TERM_START_VAR, "2026-09-07"),
            ],
        )
        .unwrap();

        assert_eq!(config.activity_path, Some(PathBuf::from("a.csv")));
        assert_eq!(config.school_days, [Weekday::Mon, Weekday::Tue, Weekday::Wed]);
        assert_eq!(config.term_start, NaiveDate::from_ymd_opt(2026, 9, 7));

        let calendar = config.calendar().unwrap();
        assert_eq!(calendar.week_of(NaiveDate::from_ymd_opt(2026, 9, 14).unwrap()), 2);
    }

    #[test]
    fn test_invalid_environment() {
        assert!(config(&["c", "v"], &[(SCHOOL_DAYS_VAR, " , ")]).is_err());
        assert!(config(&["c", "v"], &[(SCHOOL_DAYS_VAR, "mon,blursday")]).is_err());
        assert!(config(&["c", "v"], &[(TERM_START_VAR, "next week")]).is_err());
    }
}
