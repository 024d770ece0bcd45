//! Importer boundary: typed rows for the catalog and the violation list, and
//! the import-once gate for the bulk load.
//!
//! The spreadsheet is exported to CSV before it reaches this module, so every
//! row is deserialized into a concrete record and validated here. The ledger
//! never sees loosely typed cells.

use crate::calendar::{parse_weekday, SchoolCalendar};
use crate::catalog::{ErrorCatalog, ErrorCode};
use crate::error::{LedgerError, Result};
use crate::ledger::{ViolationEntry, ViolationLedger};
use crate::money::Vnd;
use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, Trim};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Catalog row: `code,fine_amount,description[,repeat_surcharge]`.
#[derive(Debug, Deserialize)]
pub struct CatalogRecord {
    pub code: String,
    pub fine_amount: Vnd,
    pub description: String,
    #[serde(default)]
    pub repeat_surcharge: Option<Vnd>,
}

impl From<CatalogRecord> for ErrorCode {
    fn from(record: CatalogRecord) -> Self {
        ErrorCode::new(record.code, record.fine_amount, record.description)
            .with_repeat_surcharge(record.repeat_surcharge.unwrap_or(Vnd::ZERO))
    }
}

/// Violation row: `student,week,day,error_code[,date][,reason]`.
///
/// Either `week` and `day` or `date` must be present. When only the date is
/// given, the school calendar supplies both.
#[derive(Debug, Deserialize)]
pub struct ViolationRow {
    pub student: String,
    #[serde(default)]
    pub week: Option<u32>,
    #[serde(default)]
    pub day: Option<String>,
    pub error_code: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ViolationRow {
    /// Converts the row into a ledger entry.
    pub fn into_entry(self, calendar: &SchoolCalendar) -> Result<ViolationEntry> {
        let day = self.day.as_deref().map(str::trim).filter(|d| !d.is_empty());
        let (week, day) = match (self.week, day, self.date) {
            (Some(week), Some(day), _) => {
                let weekday = parse_weekday(day).map_err(|_| LedgerError::InvalidWeekOrDay {
                    week,
                    day: day.to_string(),
                })?;
                (week, weekday)
            }
            (_, _, Some(date)) => calendar.locate(date),
            _ => {
                return Err(LedgerError::InvalidInput(
                    "violation needs week and day, or a date".to_string(),
                ))
            }
        };

        let mut entry = ViolationEntry::new(
            normalize_name(&self.student),
            week,
            day,
            self.error_code.trim(),
        );
        if let Some(reason) = self.reason.filter(|r| !r.trim().is_empty()) {
            entry = entry.with_reason(reason.trim());
        }
        Ok(entry)
    }
}

/// Collapses whitespace and capitalizes each word of a name so entries typed
/// by different people agree with the class list.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader)
}

fn row_error(row: usize, error: impl std::fmt::Display) -> LedgerError {
    LedgerError::InvalidInput(format!("row {}: {}", row, error))
}

/// Reads a whole catalog. Any malformed row fails the load.
pub fn read_catalog<R: Read>(reader: R) -> Result<ErrorCatalog> {
    let mut codes = Vec::new();
    for (row_idx, result) in csv_reader(reader).deserialize::<CatalogRecord>().enumerate() {
        let row_num = row_idx + 2; // 1-indexed, accounting for header row
        let record = result.map_err(|e| row_error(row_num, e))?;
        codes.push(ErrorCode::from(record));
    }

    let catalog = ErrorCatalog::from_entries(codes)?;
    debug!("Loaded {} error codes", catalog.len());
    Ok(catalog)
}

/// Reads every violation row. Any malformed row fails the load.
pub fn read_violations<R: Read>(reader: R, calendar: &SchoolCalendar) -> Result<Vec<ViolationEntry>> {
    let mut entries = Vec::new();
    for (row_idx, result) in csv_reader(reader).deserialize::<ViolationRow>().enumerate() {
        let row_num = row_idx + 2;
        let row = result.map_err(|e| row_error(row_num, e))?;
        let entry = row.into_entry(calendar).map_err(|e| row_error(row_num, e))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Persisted record of a completed bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStamp {
    pub imported_at: DateTime<Utc>,
    pub violations: usize,
}

/// Storage for the "already imported" flag.
pub trait ImportMarker {
    /// Returns the stamp of a previous import, if one happened.
    fn load(&self) -> Result<Option<ImportStamp>>;

    /// Persists the stamp of a completed import.
    fn store(&self, stamp: &ImportStamp) -> Result<()>;
}

/// Keeps the import stamp as a one-row CSV file.
#[derive(Debug, Clone)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileMarker { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImportMarker for FileMarker {
    fn load(&self) -> Result<Option<ImportStamp>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match csv_reader(file).deserialize::<ImportStamp>().next() {
            Some(stamp) => Ok(Some(stamp?)),
            None => Err(LedgerError::InvalidInput(format!(
                "import marker {} is empty",
                self.path.display()
            ))),
        }
    }

    fn store(&self, stamp: &ImportStamp) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.serialize(stamp)?;
        writer.flush()?;
        Ok(())
    }
}

/// Import stamp held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryMarker {
    stamp: Mutex<Option<ImportStamp>>,
}

impl ImportMarker for MemoryMarker {
    fn load(&self) -> Result<Option<ImportStamp>> {
        Ok(self
            .stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn store(&self, stamp: &ImportStamp) -> Result<()> {
        *self.stamp.lock().unwrap_or_else(PoisonError::into_inner) = Some(stamp.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The entries were loaded into the ledger.
    Imported { violations: usize },
    /// A previous import was recorded; nothing was loaded.
    AlreadyImported(ImportStamp),
}

/// Loads `entries` into the ledger unless the marker records an earlier import.
///
/// The marker is written only after the ledger accepted every entry.
pub fn import_once<M, I>(ledger: &ViolationLedger, marker: &M, entries: I) -> Result<ImportOutcome>
where
    M: ImportMarker + ?Sized,
    I: IntoIterator<Item = ViolationEntry>,
{
    if let Some(stamp) = marker.load()? {
        info!(
            "Skipping import: {} violations already imported at {}",
            stamp.violations, stamp.imported_at
        );
        return Ok(ImportOutcome::AlreadyImported(stamp));
    }

    let violations = ledger.bulk_load(entries)?;
    marker.store(&ImportStamp {
        imported_at: Utc::now(),
        violations,
    })?;
    info!("Imported {} violations", violations);
    Ok(ImportOutcome::Imported { violations })
}
