//! The violation system: owns every component and drives them from CSV.
//!
//! Activity rows are applied in the order they are received. A row that fails
//! to parse or breaks a business rule is logged at warn level and skipped; the
//! rest of the stream is still processed.

use crate::activity::{Activity, ActivityRecord};
use crate::complaint::ComplaintWorkflow;
use crate::error::Result;
use crate::import::{import_once, ImportMarker, ImportOutcome};
use crate::ledger::{ViolationEntry, ViolationLedger};
use crate::payment::PaymentRegister;
use crate::reconcile::{ReconciliationEngine, Roster, StudentDirectory, StudentStatement};
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;

/// Counts of activity rows applied and skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivitySummary {
    pub applied: usize,
    pub skipped: usize,
}

/// Ledger, complaints and payments wired together.
///
/// Every component takes `&self`, so a system can be shared across request
/// handlers behind an `Arc`.
pub struct ViolationSystem {
    ledger: Arc<ViolationLedger>,
    complaints: ComplaintWorkflow,
    payments: PaymentRegister,
    directory: Box<dyn StudentDirectory>,
}

impl ViolationSystem {
    /// Creates a system over a ledger. Display names default to student ids.
    pub fn new(ledger: ViolationLedger) -> Self {
        let ledger = Arc::new(ledger);
        ViolationSystem {
            complaints: ComplaintWorkflow::new(Arc::clone(&ledger)),
            ledger,
            payments: PaymentRegister::new(),
            directory: Box::new(Roster::identity()),
        }
    }

    /// Replaces the directory used for display names.
    pub fn with_directory(mut self, directory: impl StudentDirectory + 'static) -> Self {
        self.directory = Box::new(directory);
        self
    }

    pub fn ledger(&self) -> &ViolationLedger {
        &self.ledger
    }

    pub fn complaints(&self) -> &ComplaintWorkflow {
        &self.complaints
    }

    pub fn payments(&self) -> &PaymentRegister {
        &self.payments
    }

    /// A reconciliation view over the current state.
    pub fn reconciler(&self) -> ReconciliationEngine<'_> {
        ReconciliationEngine::new(
            &self.ledger,
            &self.complaints,
            &self.payments,
            self.directory.as_ref(),
        )
    }

    /// Bulk-loads violations, skipping the load if `marker` records an
    /// earlier import.
    pub fn import<M, I>(&self, marker: &M, entries: I) -> Result<ImportOutcome>
    where
        M: ImportMarker + ?Sized,
        I: IntoIterator<Item = ViolationEntry>,
    {
        import_once(&self.ledger, marker, entries)
    }

    /// Processes activity rows from a CSV reader in streaming fashion.
    pub fn process_activity_csv<R: Read>(&self, reader: R) -> Result<ActivitySummary> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);
        let mut summary = ActivitySummary::default();

        for (row_idx, result) in csv_reader.deserialize::<ActivityRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let outcome = result
                .map_err(Into::into)
                .and_then(|record| record.parse())
                .and_then(|activity| self.apply(activity));

            match outcome {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!("Row {}: {}", row_num, e);
                    summary.skipped += 1;
                }
            }
        }

        debug!(
            "Activity processed: {} applied, {} skipped",
            summary.applied, summary.skipped
        );
        Ok(summary)
    }

    /// Applies a single parsed activity.
    pub fn apply(&self, activity: Activity) -> Result<()> {
        match activity {
            Activity::FileComplaint {
                violation,
                email,
                message,
            } => {
                let complaint = self.complaints.file_complaint(violation, &email, &message)?;
                debug!("Filed complaint {} against violation {}", complaint.id, violation);
            }
            Activity::Resolve {
                complaint,
                outcome,
                resolver,
            } => {
                self.complaints.resolve(complaint, outcome, &resolver)?;
                debug!("Resolved complaint {} as {:?}", complaint, outcome);
            }
            Activity::Payment {
                student,
                amount,
                recorder,
                memo,
            } => {
                let payment =
                    self.payments
                        .record_payment(&student, amount, &recorder, memo.as_deref())?;
                debug!("Recorded payment {}", payment.id);
            }
        }

        Ok(())
    }

    /// Students known to either the ledger or the register, ascending.
    pub fn students(&self) -> Vec<String> {
        let mut students: BTreeSet<String> = self.ledger.students().into_iter().collect();
        students.extend(self.payments.payers());
        students.into_iter().collect()
    }

    /// Reconciled statements for every known student, ascending by id.
    ///
    /// Students missing from the directory are listed under their id.
    pub fn statements(&self) -> Result<Vec<StudentStatement>> {
        let reconciler = self.reconciler();
        self.students()
            .iter()
            .map(|student| reconciler.statement_or_id(student))
            .collect()
    }

    /// Writes one reconciliation row per student to CSV.
    ///
    /// Output is sorted by student id for deterministic results. A student
    /// missing from the directory is written under their id; the report fails
    /// only if a total overflows.
    pub fn write_report<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "student",
            "violations",
            "gross",
            "waived",
            "paid",
            "balance",
            "transfer",
        ])?;

        for statement in self.statements()? {
            csv_writer.write_record([
                statement.student_id,
                statement.violations.to_string(),
                statement.gross.to_string(),
                statement.waived.to_string(),
                statement.paid.to_string(),
                statement.balance.to_string(),
                statement.transfer,
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ErrorCatalog, ErrorCode};
    use crate::complaint::ComplaintStatus;
    use crate::error::LedgerError;
    use crate::import::{ImportStamp, MemoryMarker};
    use crate::money::Vnd;
    use chrono::Weekday;
    use std::io::Cursor;

    fn system() -> ViolationSystem {
        let catalog = ErrorCatalog::from_entries([
            ErrorCode::new("E1", Vnd::new(50), "first"),
            ErrorCode::new("E2", Vnd::new(30), "second"),
        ])
        .unwrap();
        let system = ViolationSystem::new(ViolationLedger::new(catalog));
        system
            .import(
                &MemoryMarker::default(),
                [
                    ViolationEntry::new("S", 1, Weekday::Mon, "E1"),
                    ViolationEntry::new("S", 1, Weekday::Tue, "E2"),
                    ViolationEntry::new("T", 2, Weekday::Mon, "E2"),
                ],
            )
            .unwrap();
        system
    }

    fn report(system: &ViolationSystem) -> String {
        let mut output = Vec::new();
        system.write_report(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_worked_example_from_activity_log() {
        let system = system();
        let csv = r#"type,violation,complaint,student,amount,actor,email,note
complaint,2,,,,,s@example.com,was excused
approve,,1,,,admin,,
payment,,,S,20,admin,,S 30 E1"#;

        let summary = system.process_activity_csv(Cursor::new(csv)).unwrap();
        assert_eq!(summary, ActivitySummary { applied: 3, skipped: 0 });

        let reconciler = system.reconciler();
        assert_eq!(reconciler.outstanding_balance("S").unwrap(), Vnd::new(30));
        assert_eq!(reconciler.transfer_identifier("S").unwrap(), "S 30 E1");
    }

    #[test]
    fn test_rejected_rows_are_skipped() {
        let system = system();
        let csv = r#"type,violation,complaint,student,amount,actor,email,note
complaint,1,,,,,a@example.com,first
complaint,1,,,,,b@example.com,second
approve,,1,,,admin,,
approve,,2,,,admin,,
approve,,1,,,admin,,
payment,,,S,0,admin,,
complaint,99,,,,,c@example.com,ghost
refund,,,S,10,admin,,"#;

        let summary = system.process_activity_csv(Cursor::new(csv)).unwrap();
        assert_eq!(summary, ActivitySummary { applied: 3, skipped: 5 });

        assert!(system.complaints().is_waived(1));
        assert_eq!(
            system.complaints().get(2).unwrap().status,
            ComplaintStatus::Pending
        );
        assert_eq!(system.payments().total_paid("S"), Vnd::ZERO);
    }

    #[test]
    fn test_report_lists_every_student() {
        let system = system();
        let csv = "type,violation,complaint,student,amount,actor,email,note
payment,,,U,15,admin,,advance";
        system.process_activity_csv(Cursor::new(csv)).unwrap();

        let output = report(&system);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            [
                "student,violations,gross,waived,paid,balance,transfer",
                "S,2,80,0,0,80,\"S 80 E1,E2\"",
                "T,1,30,0,0,30,T 30 E2",
                "U,0,0,0,15,-15,U -15",
            ]
        );
    }

    #[test]
    fn test_custom_directory() {
        let mut roster = Roster::new();
        roster.insert("S", "Nguyen Van S");
        roster.insert("T", "Tran Thi T");
        let system = system().with_directory(roster);

        assert_eq!(
            system.reconciler().transfer_identifier("S").unwrap(),
            "Nguyen Van S 80 E1,E2"
        );
    }

    #[test]
    fn test_report_survives_partial_directory() {
        let mut roster = Roster::new();
        roster.insert("S", "Nguyen Van S");
        let system = system().with_directory(roster);

        let output = report(&system);
        assert!(output.contains("S,2,80,0,0,80,\"Nguyen Van S 80 E1,E2\""));
        assert!(output.contains("T,1,30,0,0,30,T 30 E2"));
        assert!(matches!(
            system.reconciler().transfer_identifier("T"),
            Err(LedgerError::NotFound { entity: "student", .. })
        ));
    }

    #[test]
    fn test_decimal_payment_amount_is_skipped() {
        let system = system();
        let csv = "type,violation,complaint,student,amount,actor,email,note
payment,,,S,12.5,admin,,
payment,,,S,\"10,000.50\",admin,,
payment,,,S,1.2.3,admin,,
payment,,,S,1.000,admin,,";

        let summary = system.process_activity_csv(Cursor::new(csv)).unwrap();
        assert_eq!(summary, ActivitySummary { applied: 1, skipped: 3 });
        assert_eq!(system.payments().total_paid("S"), Vnd::new(1_000));
    }

    #[test]
    fn test_second_import_is_skipped() {
        let system = system();
        let marker = MemoryMarker::default();
        marker
            .store(&ImportStamp {
                imported_at: chrono::Utc::now(),
                violations: 3,
            })
            .unwrap();

        let outcome = system
            .import(&marker, vec![ViolationEntry::new("S", 3, Weekday::Mon, "E1")])
            .unwrap();
        assert!(matches!(outcome, ImportOutcome::AlreadyImported(_)));

        // A fresh marker does not bypass the ledger's own guard.
        let result = system.import(
            &MemoryMarker::default(),
            vec![ViolationEntry::new("S", 3, Weekday::Mon, "E1")],
        );
        assert!(matches!(result, Err(LedgerError::AlreadyImported)));
        assert_eq!(system.ledger().len(), 3);
    }
}
