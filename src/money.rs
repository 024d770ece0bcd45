//! Whole-unit currency amounts.
//!
//! Fines and payments are integral (the source workbook records đồng with no
//! fractional part), so amounts are a thin wrapper over `i64`. Balances may go
//! negative when a student has over-paid.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// An amount of money in whole currency units.
///
/// Parsing accepts thousands separators as they appear in the spreadsheet
/// exports, displaying always prints the bare integer. Arithmetic is checked:
/// an overflowing sum is an error, never a wrapped value.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use violation_ledger::Vnd;
///
/// let amount = Vnd::from_str("10.000").unwrap();
/// assert_eq!(amount, Vnd::new(10_000));
/// assert_eq!(amount.to_string(), "10000");
/// assert!(Vnd::from_str("12.5").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Vnd(i64);

impl Vnd {
    /// Zero value.
    pub const ZERO: Self = Vnd(0);

    /// Wraps a raw amount.
    pub const fn new(value: i64) -> Self {
        Vnd(value)
    }

    /// Returns the raw amount.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this value is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if this value is below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.0.checked_add(rhs.0).map(Vnd).ok_or(LedgerError::AmountOverflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self> {
        self.0.checked_sub(rhs.0).map(Vnd).ok_or(LedgerError::AmountOverflow)
    }

    pub fn checked_mul(self, rhs: i64) -> Result<Self> {
        self.0.checked_mul(rhs).map(Vnd).ok_or(LedgerError::AmountOverflow)
    }

    /// Sums amounts, failing with `AmountOverflow` instead of wrapping.
    pub fn checked_sum<I>(amounts: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vnd>,
    {
        amounts
            .into_iter()
            .try_fold(Vnd::ZERO, |total, amount| total.checked_add(amount))
    }
}

/// Why a string is not an amount.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseVndError {
    /// Separators must split the digits into groups of three, all with the
    /// same separator
    #[error("invalid digit grouping in {0:?}")]
    Grouping(String),

    #[error(transparent)]
    Int(#[from] ParseIntError),
}

impl FromStr for Vnd {
    type Err = ParseVndError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (sign, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let ungrouped =
            ungroup(digits).ok_or_else(|| ParseVndError::Grouping(trimmed.to_string()))?;
        Ok(Vnd(format!("{}{}", sign, ungrouped).parse::<i64>()?))
    }
}

/// Removes thousands separators from `1.000.000`, `1,000,000` or `1_000_000`.
///
/// Returns `None` when separators are mixed or a group after the first is not
/// exactly three digits, so `12.5` and `10,000.50` are rejected.
fn ungroup(digits: &str) -> Option<String> {
    let mut separators = digits.chars().filter(|c| matches!(c, '.' | ',' | '_'));
    let separator = match separators.next() {
        Some(separator) => separator,
        None => return Some(digits.to_string()),
    };
    if separators.any(|c| c != separator) {
        return None;
    }

    let is_digits = |group: &str| group.bytes().all(|b| b.is_ascii_digit());
    let mut groups = digits.split(separator);
    let head = groups.next()?;
    if head.is_empty() || head.len() > 3 || !is_digits(head) {
        return None;
    }

    let mut ungrouped = head.to_string();
    for group in groups {
        if group.len() != 3 || !is_digits(group) {
            return None;
        }
        ungrouped.push_str(group);
    }
    Some(ungrouped)
}

impl fmt::Display for Vnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Vnd {
    fn from(value: i64) -> Self {
        Vnd(value)
    }
}

impl Serialize for Vnd {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Vnd {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Vnd::from_str(&s).map_err(serde::de::Error::custom)
    }
}
