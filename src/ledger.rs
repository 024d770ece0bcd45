//! Violation ledger: the immutable record of every imported violation.
//!
//! Records are appended during import and never edited afterwards. Every
//! per-student view is ordered by `(week, day, created_at, id)` so summaries
//! and repeat-offence surcharges are deterministic.

use crate::calendar::{SchoolCalendar, DEFAULT_SCHOOL_DAYS};
use crate::catalog::{ErrorCatalog, ErrorCode};
use crate::error::{LedgerError, Result};
use crate::money::Vnd;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Violation identifier, assigned sequentially from 1.
pub type ViolationId = u32;

/// A single recorded violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationRecord {
    pub id: ViolationId,
    pub student_id: String,
    pub week: u32,
    pub day: Weekday,
    pub error_code: String,
    /// Free-text reason copied from the source sheet, if any.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ViolationRecord {
    fn sort_key(&self) -> (u32, u32, DateTime<Utc>, ViolationId) {
        (
            self.week,
            self.day.num_days_from_monday(),
            self.created_at,
            self.id,
        )
    }
}

/// A violation waiting to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationEntry {
    pub student_id: String,
    pub week: u32,
    pub day: Weekday,
    pub error_code: String,
    pub reason: Option<String>,
}

impl ViolationEntry {
    pub fn new(
        student_id: impl Into<String>,
        week: u32,
        day: Weekday,
        error_code: impl Into<String>,
    ) -> Self {
        ViolationEntry {
            student_id: student_id.into(),
            week,
            day,
            error_code: error_code.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Optional criteria for [`ViolationLedger::query`].
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub week: Option<u32>,
    pub day: Option<Weekday>,
    /// Case-insensitive substring of the student id.
    pub student: Option<String>,
    pub error_code: Option<String>,
}

impl ViolationFilter {
    fn matches(&self, record: &ViolationRecord) -> bool {
        self.week.map_or(true, |w| record.week == w)
            && self.day.map_or(true, |d| record.day == d)
            && self.error_code.as_deref().map_or(true, |c| record.error_code == c)
            && self.student.as_deref().map_or(true, |s| {
                record
                    .student_id
                    .to_lowercase()
                    .contains(&s.to_lowercase())
            })
    }
}

#[derive(Debug, Default)]
struct LedgerLog {
    records: Vec<ViolationRecord>,
    by_student: HashMap<String, Vec<usize>>,
}

impl LedgerLog {
    fn push(&mut self, entry: ViolationEntry) -> ViolationRecord {
        let index = self.records.len();
        let record = ViolationRecord {
            id: index as ViolationId + 1,
            student_id: entry.student_id,
            week: entry.week,
            day: entry.day,
            error_code: entry.error_code,
            reason: entry.reason,
            created_at: Utc::now(),
        };
        self.by_student
            .entry(record.student_id.clone())
            .or_default()
            .push(index);
        self.records.push(record.clone());
        record
    }

    fn get(&self, id: ViolationId) -> Option<&ViolationRecord> {
        (id as usize)
            .checked_sub(1)
            .and_then(|index| self.records.get(index))
    }

    fn ordered_for(&self, student_id: &str) -> Vec<ViolationRecord> {
        let mut records: Vec<ViolationRecord> = self
            .by_student
            .get(student_id)
            .map(|indices| indices.iter().map(|&i| self.records[i].clone()).collect())
            .unwrap_or_default();
        records.sort_by_key(ViolationRecord::sort_key);
        records
    }
}

/// The violation ledger.
///
/// Owns the catalog it was built with; every fine is resolved through it.
/// Safe to share between threads: writers take an exclusive lock, readers a
/// shared one.
#[derive(Debug)]
pub struct ViolationLedger {
    catalog: ErrorCatalog,
    school_days: Vec<Weekday>,
    log: RwLock<LedgerLog>,
}

impl ViolationLedger {
    /// Creates an empty ledger accepting Monday to Saturday.
    pub fn new(catalog: ErrorCatalog) -> Self {
        ViolationLedger {
            catalog,
            school_days: DEFAULT_SCHOOL_DAYS.to_vec(),
            log: RwLock::new(LedgerLog::default()),
        }
    }

    /// Replaces the accepted set of school days.
    pub fn with_school_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.school_days = days.into_iter().collect();
        self
    }

    pub fn catalog(&self) -> &ErrorCatalog {
        &self.catalog
    }

    pub fn school_days(&self) -> &[Weekday] {
        &self.school_days
    }

    // The log is append-only, so a guard recovered from a poisoned lock still
    // sees a consistent prefix of records.
    fn read(&self) -> RwLockReadGuard<'_, LedgerLog> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerLog> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(&self, entry: &ViolationEntry) -> Result<()> {
        if entry.week == 0 || !self.school_days.contains(&entry.day) {
            return Err(LedgerError::InvalidWeekOrDay {
                week: entry.week,
                day: entry.day.to_string(),
            });
        }
        if entry.student_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput("empty student id".to_string()));
        }
        if !self.catalog.contains(&entry.error_code) {
            return Err(LedgerError::UnknownErrorCode(entry.error_code.clone()));
        }
        Ok(())
    }

    /// Records one violation.
    pub fn record_violation(
        &self,
        student_id: &str,
        week: u32,
        day: Weekday,
        error_code: &str,
    ) -> Result<ViolationRecord> {
        self.record_entry(ViolationEntry::new(student_id, week, day, error_code))
    }

    /// Records a violation dated on the calendar rather than by week and day.
    pub fn record_violation_on(
        &self,
        student_id: &str,
        date: NaiveDate,
        error_code: &str,
        calendar: &SchoolCalendar,
    ) -> Result<ViolationRecord> {
        let (week, day) = calendar.locate(date);
        self.record_violation(student_id, week, day, error_code)
    }

    /// Records a fully specified entry.
    pub fn record_entry(&self, entry: ViolationEntry) -> Result<ViolationRecord> {
        self.validate(&entry)?;
        let record = self.write().push(entry);
        debug!(
            "Recorded violation {} ({}) for {} in week {} on {}",
            record.id, record.error_code, record.student_id, record.week, record.day
        );
        Ok(record)
    }

    /// Loads a batch of entries into an empty ledger.
    ///
    /// Every entry is validated before any is stored, so a failed load leaves
    /// the ledger untouched. Fails with `AlreadyImported` if records exist.
    pub fn bulk_load<I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = ViolationEntry>,
    {
        let entries: Vec<ViolationEntry> = entries.into_iter().collect();
        for entry in &entries {
            self.validate(entry)?;
        }

        let mut log = self.write();
        if !log.records.is_empty() {
            return Err(LedgerError::AlreadyImported);
        }

        let count = entries.len();
        for entry in entries {
            log.push(entry);
        }
        debug!("Bulk loaded {} violations", count);
        Ok(count)
    }

    /// Returns a violation by id.
    pub fn get(&self, id: ViolationId) -> Result<ViolationRecord> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("violation", id))
    }

    /// Returns `true` if the id refers to a recorded violation.
    pub fn contains(&self, id: ViolationId) -> bool {
        self.read().get(id).is_some()
    }

    /// All violations of a student, ordered by week, day and creation time.
    pub fn violations_for(&self, student_id: &str) -> Vec<ViolationRecord> {
        self.read().ordered_for(student_id)
    }

    /// A student's violations paired with their individual fines.
    ///
    /// The k-th same-code violation of a week carries the code's repeat
    /// surcharge k times.
    pub fn fines_for(&self, student_id: &str) -> Result<Vec<(ViolationRecord, Vnd)>> {
        let records = self.violations_for(student_id);
        let mut seen: HashMap<(u32, String), usize> = HashMap::new();
        let mut fines = Vec::with_capacity(records.len());

        for record in records {
            let code = self.code_for(&record)?;
            let prior = seen
                .entry((record.week, record.error_code.clone()))
                .or_insert(0);
            let fine = code.fine_after(*prior)?;
            *prior += 1;
            fines.push((record, fine));
        }

        Ok(fines)
    }

    /// The fine charged for one violation.
    pub fn fine_for(&self, id: ViolationId) -> Result<Vnd> {
        let record = self.get(id)?;
        self.fines_for(&record.student_id)?
            .into_iter()
            .find(|(r, _)| r.id == id)
            .map(|(_, fine)| fine)
            .ok_or_else(|| LedgerError::not_found("violation", id))
    }

    /// Sum of every fine owed by a student, ignoring complaints and payments.
    pub fn gross_fine_for(&self, student_id: &str) -> Result<Vnd> {
        Vnd::checked_sum(self.fines_for(student_id)?.into_iter().map(|(_, fine)| fine))
    }

    fn code_for(&self, record: &ViolationRecord) -> Result<&ErrorCode> {
        self.catalog
            .lookup(&record.error_code)
            .map_err(|_| LedgerError::UnknownErrorCode(record.error_code.clone()))
    }

    /// Violations matching a filter, ordered by student then ledger order.
    pub fn query(&self, filter: &ViolationFilter) -> Vec<ViolationRecord> {
        let mut matched: Vec<ViolationRecord> = self
            .read()
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.student_id
                .cmp(&b.student_id)
                .then_with(|| a.sort_key().cmp(&b.sort_key()))
        });
        matched
    }

    /// Distinct student ids, ascending.
    pub fn students(&self) -> Vec<String> {
        self.read()
            .by_student
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of violations recorded per week, ascending by week.
    pub fn week_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.read().records {
            *counts.entry(record.week).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }
}
