//! # Violation Ledger
//!
//! Records student rule violations against a catalog of error codes, runs
//! the complaint workflow that can waive them, registers payments and
//! reconciles everything into outstanding balances and bank-transfer
//! descriptions.
//!
//! ## Design Principles
//!
//! - **Whole currency units**: amounts are integer [`Vnd`], no fractions
//! - **Append-only history**: violations and payments are never edited
//! - **At most one waiver**: only one complaint per violation can be approved
//! - **Derived balances**: `balance == gross - waived - paid`, recomputed on
//!   every read
//! - **Deterministic output**: reports are sorted by student id
//!
//! ## Example
//!
//! ```no_run
//! use chrono::Weekday;
//! use violation_ledger::{ErrorCatalog, ViolationLedger, ViolationSystem};
//! use std::io::Cursor;
//!
//! let ledger = ViolationLedger::new(ErrorCatalog::standard());
//! ledger.record_violation("An", 1, Weekday::Mon, "VP01").unwrap();
//!
//! let system = ViolationSystem::new(ledger);
//! let csv = "type,violation,complaint,student,amount,actor,email,note\n\
//!            payment,,,An,10000,treasurer,,\n";
//! system.process_activity_csv(Cursor::new(csv)).unwrap();
//! system.write_report(std::io::stdout()).unwrap();
//! ```

pub mod activity;
pub mod calendar;
pub mod catalog;
pub mod complaint;
pub mod config;
pub mod error;
pub mod import;
pub mod ledger;
pub mod money;
pub mod payment;
pub mod reconcile;
pub mod system;

pub use activity::{Activity, ActivityRecord};
pub use calendar::SchoolCalendar;
pub use catalog::{ErrorCatalog, ErrorCode};
pub use complaint::{Complaint, ComplaintStatus, ComplaintWorkflow, Outcome, ResolutionListener};
pub use config::Config;
pub use error::{LedgerError, Result};
pub use import::{FileMarker, ImportMarker, ImportOutcome, MemoryMarker};
pub use ledger::{ViolationEntry, ViolationFilter, ViolationLedger, ViolationRecord};
pub use money::{ParseVndError, Vnd};
pub use payment::{Payment, PaymentRegister};
pub use reconcile::{ReconciliationEngine, Roster, StudentDirectory, StudentStatement};
pub use system::{ActivitySummary, ViolationSystem};
