//! Violation Ledger CLI
//!
//! Loads an error-code catalog and a violation list, replays an optional
//! activity log (complaints, resolutions, payments) and prints one
//! reconciliation row per student.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- codes.csv violations.csv activity.csv > report.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `VIOLATION_LEDGER_SCHOOL_DAYS`: accepted weekdays, e.g. `mon,tue,wed,thu,fri`
//! - `VIOLATION_LEDGER_TERM_START`: first Monday of week 1 for date-only rows

use log::info;
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use violation_ledger::import::{read_catalog, read_violations};
use violation_ledger::{Complaint, Config, MemoryMarker, Result, ViolationLedger, ViolationSystem};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::from_env(env::args().skip(1))?;
    let calendar = config.calendar()?;

    let catalog = read_catalog(BufReader::new(File::open(&config.catalog_path)?))?;
    let entries = read_violations(
        BufReader::new(File::open(&config.violations_path)?),
        &calendar,
    )?;

    let ledger = ViolationLedger::new(catalog).with_school_days(config.school_days.iter().copied());
    let system = ViolationSystem::new(ledger);
    system.complaints().subscribe(|complaint: &Complaint| {
        info!(
            "Notify {}: complaint {} on violation {} is {:?}",
            complaint.complainant_email, complaint.id, complaint.violation_id, complaint.status
        );
    });
    system.import(&MemoryMarker::default(), entries)?;

    if let Some(path) = &config.activity_path {
        let summary = system.process_activity_csv(BufReader::new(File::open(path)?))?;
        info!(
            "Activity log: {} applied, {} skipped",
            summary.applied, summary.skipped
        );
    }

    let stdout = io::stdout();
    let handle = stdout.lock();
    system.write_report(handle)?;

    Ok(())
}
