//! Error types for the violation ledger.

use crate::money::Vnd;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur while operating on the ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Failed to open, read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Catalog miss for a referenced error code
    #[error("Unknown error code {0}")]
    UnknownErrorCode(String),

    /// Week is zero or the day is not an accepted school day
    #[error("Invalid week {week} or day {day}")]
    InvalidWeekOrDay { week: u32, day: String },

    /// Payment amount is not strictly positive
    #[error("Invalid payment amount {0}")]
    InvalidAmount(Vnd),

    /// A sum of amounts does not fit in the currency type
    #[error("Amount overflow")]
    AmountOverflow,

    /// Any other malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The complaint has already left the pending state
    #[error("Complaint {0} is already resolved")]
    AlreadyResolved(u32),

    /// Another complaint against the same violation was approved
    #[error("Violation {violation} already waived by complaint {approved_by}")]
    ViolationAlreadyWaived { violation: u32, approved_by: u32 },

    /// Bulk import attempted on a ledger that already holds records
    #[error("Violations have already been imported")]
    AlreadyImported,

    /// Missing positional arguments
    #[error(
        "Missing input file argument. Usage: violation-ledger <catalog.csv> <violations.csv> [activity.csv]"
    )]
    MissingArgument,
}

impl LedgerError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
