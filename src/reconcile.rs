//! Reconciliation: derives what a student owes from the ledger, the complaint
//! workflow and the payment register.
//!
//! The engine keeps no state of its own. Every call re-reads the components, so
//! repeated calls with no intervening write return identical results.

use crate::complaint::ComplaintWorkflow;
use crate::error::{LedgerError, Result};
use crate::ledger::{ViolationLedger, ViolationRecord};
use crate::money::Vnd;
use crate::payment::PaymentRegister;
use log::warn;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Resolves student ids to the names shown on transfer descriptions.
///
/// Implemented by the account layer; the core only reads from it.
pub trait StudentDirectory: Send + Sync {
    fn display_name(&self, student_id: &str) -> Option<String>;
}

/// In-memory directory of display names.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: HashMap<String, String>,
    ids_as_names: bool,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// A roster that falls back to the student id as display name, as in
    /// class lists keyed by full name.
    pub fn identity() -> Self {
        Roster {
            names: HashMap::new(),
            ids_as_names: true,
        }
    }

    pub fn insert(&mut self, student_id: impl Into<String>, display_name: impl Into<String>) {
        self.names.insert(student_id.into(), display_name.into());
    }
}

impl StudentDirectory for Roster {
    fn display_name(&self, student_id: &str) -> Option<String> {
        match self.names.get(student_id) {
            Some(name) => Some(name.clone()),
            None if self.ids_as_names => Some(student_id.to_string()),
            None => None,
        }
    }
}

/// A student's reconciled position at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentStatement {
    pub student_id: String,
    pub display_name: String,
    pub violations: usize,
    /// All fines before complaints and payments.
    pub gross: Vnd,
    /// Fines removed by approved complaints.
    pub waived: Vnd,
    pub paid: Vnd,
    /// `gross - waived - paid`; negative when the student has over-paid.
    pub balance: Vnd,
    /// Distinct codes of unwaived violations, ascending.
    pub codes: Vec<String>,
    pub transfer: String,
}

struct Tally {
    violations: usize,
    gross: Vnd,
    waived: Vnd,
    codes: BTreeSet<String>,
}

impl Tally {
    fn balance(&self, paid: Vnd) -> Result<Vnd> {
        self.gross.checked_sub(self.waived)?.checked_sub(paid)
    }
}

/// Composes the ledger, complaints and payments into balances.
pub struct ReconciliationEngine<'a> {
    ledger: &'a ViolationLedger,
    complaints: &'a ComplaintWorkflow,
    payments: &'a PaymentRegister,
    directory: &'a dyn StudentDirectory,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        ledger: &'a ViolationLedger,
        complaints: &'a ComplaintWorkflow,
        payments: &'a PaymentRegister,
        directory: &'a dyn StudentDirectory,
    ) -> Self {
        ReconciliationEngine {
            ledger,
            complaints,
            payments,
            directory,
        }
    }

    fn tally(&self, student_id: &str) -> Result<Tally> {
        let mut tally = Tally {
            violations: 0,
            gross: Vnd::ZERO,
            waived: Vnd::ZERO,
            codes: BTreeSet::new(),
        };

        for (record, fine) in self.ledger.fines_for(student_id)? {
            let ViolationRecord { id, error_code, .. } = record;
            tally.violations += 1;
            tally.gross = tally.gross.checked_add(fine)?;
            if self.complaints.is_waived(id) {
                tally.waived = tally.waived.checked_add(fine)?;
            } else {
                tally.codes.insert(error_code);
            }
        }

        Ok(tally)
    }

    fn display_name(&self, student_id: &str) -> Result<String> {
        self.directory
            .display_name(student_id)
            .ok_or_else(|| LedgerError::not_found("student", student_id))
    }

    /// Unwaived fines minus payments. Negative when over-paid.
    pub fn outstanding_balance(&self, student_id: &str) -> Result<Vnd> {
        let tally = self.tally(student_id)?;
        tally.balance(self.payments.total_paid(student_id))
    }

    /// The canonical transfer description: `"<name> <amount> <code,code,...>"`.
    ///
    /// Codes are those of unwaived violations, de-duplicated and ascending.
    /// The code segment is omitted when no unwaived violation remains.
    pub fn transfer_identifier(&self, student_id: &str) -> Result<String> {
        Ok(self.statement(student_id)?.transfer)
    }

    /// Every reconciled figure for a student, computed from one read of each
    /// component.
    pub fn statement(&self, student_id: &str) -> Result<StudentStatement> {
        let display_name = self.display_name(student_id)?;
        self.statement_as(student_id, display_name)
    }

    /// Like [`statement`](Self::statement), but a student missing from the
    /// directory is shown under their id instead of failing. Used for
    /// reports, where one unnamed payer must not hide every other row.
    pub fn statement_or_id(&self, student_id: &str) -> Result<StudentStatement> {
        let display_name = self.directory.display_name(student_id).unwrap_or_else(|| {
            warn!("No display name for student {}, using the id", student_id);
            student_id.to_string()
        });
        self.statement_as(student_id, display_name)
    }

    fn statement_as(&self, student_id: &str, display_name: String) -> Result<StudentStatement> {
        let tally = self.tally(student_id)?;
        let paid = self.payments.total_paid(student_id);
        let balance = tally.balance(paid)?;
        let codes: Vec<String> = tally.codes.into_iter().collect();

        Ok(StudentStatement {
            student_id: student_id.to_string(),
            transfer: format_transfer(&display_name, balance, &codes),
            display_name,
            violations: tally.violations,
            gross: tally.gross,
            waived: tally.waived,
            paid,
            balance,
            codes,
        })
    }
}

fn format_transfer(display_name: &str, balance: Vnd, codes: &[String]) -> String {
    if codes.is_empty() {
        format!("{} {}", display_name, balance)
    } else {
        format!("{} {} {}", display_name, balance, codes.join(","))
    }
}
