//! Error-code catalog: maps each violation code to its fine.
//!
//! The catalog is built once, before the ledger exists, and never changes
//! afterwards. Codes stay resolvable for as long as any violation refers to
//! them.

use crate::error::{LedgerError, Result};
use crate::money::Vnd;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCode {
    /// Short unique code, e.g. `VP01`.
    pub code: String,

    /// Base fine charged for one violation.
    pub fine_amount: Vnd,

    /// Human readable description.
    pub description: String,

    /// Extra charge for each earlier violation with the same code by the same
    /// student in the same week. Zero for codes that do not escalate.
    pub repeat_surcharge: Vnd,
}

impl ErrorCode {
    /// Creates a non-escalating entry.
    pub fn new(code: impl Into<String>, fine_amount: Vnd, description: impl Into<String>) -> Self {
        ErrorCode {
            code: code.into(),
            fine_amount,
            description: description.into(),
            repeat_surcharge: Vnd::ZERO,
        }
    }

    /// Sets the per-repeat surcharge.
    pub fn with_repeat_surcharge(mut self, surcharge: Vnd) -> Self {
        self.repeat_surcharge = surcharge;
        self
    }

    /// Fine for the violation preceded by `prior` same-week repeats.
    pub fn fine_after(&self, prior: usize) -> Result<Vnd> {
        let prior = i64::try_from(prior).map_err(|_| LedgerError::AmountOverflow)?;
        self.fine_amount
            .checked_add(self.repeat_surcharge.checked_mul(prior)?)
    }
}

/// Immutable lookup table of error codes, ordered by code.
#[derive(Debug, Clone, Default)]
pub struct ErrorCatalog {
    entries: BTreeMap<String, ErrorCode>,
}

impl ErrorCatalog {
    /// Builds a catalog from entries.
    ///
    /// Fails with `InvalidInput` on an empty or duplicate code, or a negative
    /// amount.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = ErrorCode>,
    {
        let mut map = BTreeMap::new();

        for entry in entries {
            let code = entry.code.trim().to_string();
            if code.is_empty() {
                return Err(LedgerError::InvalidInput("empty error code".to_string()));
            }
            if entry.fine_amount.is_negative() || entry.repeat_surcharge.is_negative() {
                return Err(LedgerError::InvalidInput(format!(
                    "negative fine for error code {}",
                    code
                )));
            }
            if map.contains_key(&code) {
                return Err(LedgerError::InvalidInput(format!(
                    "duplicate error code {}",
                    code
                )));
            }
            map.insert(code.clone(), ErrorCode { code, ..entry });
        }

        Ok(ErrorCatalog { entries: map })
    }

    /// The default codes used by the class workbook.
    pub fn standard() -> Self {
        let surcharge = Vnd::new(10_000);
        let entries = [
            ErrorCode::new("VP01", Vnd::new(10_000), "Arriving late")
                .with_repeat_surcharge(surcharge),
            ErrorCode::new("VP02", Vnd::ZERO, "Letting a stranger into class"),
            ErrorCode::new("VP03", Vnd::new(10_000), "Swapping seats"),
            ErrorCode::new("VP04", Vnd::new(10_000), "Forgetting school supplies"),
            ErrorCode::new("VP05", Vnd::new(10_000), "Sleeping in class"),
            ErrorCode::new("VP06", Vnd::new(30_000), "Unexcused absence")
                .with_repeat_surcharge(surcharge),
        ];

        ErrorCatalog {
            entries: entries
                .into_iter()
                .map(|e| (e.code.clone(), e))
                .collect(),
        }
    }

    /// Looks up a code.
    pub fn lookup(&self, code: &str) -> Result<&ErrorCode> {
        self.entries
            .get(code)
            .ok_or_else(|| LedgerError::not_found("error code", code))
    }

    /// Returns the base fine for a code.
    pub fn fine_amount(&self, code: &str) -> Result<Vnd> {
        self.entries
            .get(code)
            .map(|e| e.fine_amount)
            .ok_or_else(|| LedgerError::UnknownErrorCode(code.to_string()))
    }

    /// Returns `true` if the code is known.
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Iterates entries in ascending code order.
    pub fn codes(&self) -> impl Iterator<Item = &ErrorCode> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
