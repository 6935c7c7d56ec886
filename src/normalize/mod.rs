//! Record Normalizer
//!
//! Turns a [`RawDataset`] (CSV rows or scraped records) into a [`Dataset`] the
//! loader can write verbatim:
//! - trims and canonicalizes ids, names and free text
//! - resolves display-name references into stable foreign keys
//! - assigns continuing faculty ids to rows that have none
//! - drops duplicate records by natural key
//!
//! The normalizer never touches the store.

pub mod resolve;
pub mod watermark;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::{Error, Result};
use crate::ingest::{RawDataset, SourceRow};
use crate::model::{Capability, CapabilityDepartment, Dataset, Department, EntityKind, Faculty, Grant};

pub use resolve::{KnownEntity, ResolveError, canonical, resolve};
pub use watermark::Watermark;

/// What to do with a row whose reference does not resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Collect every unresolved row of the entity, then fail the run
    #[default]
    Abort,
    /// Log each unresolved row and leave it out of the table generation
    Skip,
}

impl FromStr for UnresolvedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" | "fail" => Ok(UnresolvedPolicy::Abort),
            "skip" => Ok(UnresolvedPolicy::Skip),
            other => Err(format!("unknown unresolved policy: {other} (expected abort or skip)")),
        }
    }
}

impl fmt::Display for UnresolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedPolicy::Abort => write!(f, "abort"),
            UnresolvedPolicy::Skip => write!(f, "skip"),
        }
    }
}

/// A row that could not be tied to its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRow {
    pub entity: EntityKind,
    pub line: u64,
    pub column: &'static str,
    pub reference: String,
    pub reason: ResolveError,
}

impl fmt::Display for UnresolvedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line {}: {} {:?} {}",
            self.entity, self.line, self.column, self.reference, self.reason
        )
    }
}

/// What normalization did besides producing rows
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub skipped: Vec<UnresolvedRow>,
    pub deduplicated: usize,
    pub assigned_ids: Vec<String>,
}

/// Default prefix of generated faculty ids
pub const FACULTY_ID_PREFIX: &str = "F";

pub struct Normalizer {
    policy: UnresolvedPolicy,
    faculty_prefix: String,
}

impl Normalizer {
    pub fn new(policy: UnresolvedPolicy) -> Self {
        Self {
            policy,
            faculty_prefix: FACULTY_ID_PREFIX.to_string(),
        }
    }

    pub fn with_faculty_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.faculty_prefix = prefix.into();
        self
    }

    /// Normalize a full source set, parents first so references can resolve.
    pub fn normalize(&self, raw: &RawDataset) -> Result<(Dataset, NormalizeReport)> {
        let mut report = NormalizeReport::default();

        let departments = self.departments(&raw.departments, &mut report)?;
        let department_keys: Vec<KnownEntity> = departments
            .iter()
            .map(|d| KnownEntity::new(&d.department_id, &d.department_name))
            .collect();

        let capabilities = self.capabilities(&raw.capabilities, &mut report)?;
        let capability_keys: Vec<KnownEntity> = capabilities
            .iter()
            .map(|c| KnownEntity::new(&c.capabilities_id, &c.capability_name))
            .collect();

        let capability_departments = self.capability_departments(
            &raw.capability_departments,
            &capability_keys,
            &department_keys,
            &mut report,
        )?;

        let faculty = self.faculty(&raw.faculty, &department_keys, &mut report)?;
        let faculty_keys: Vec<KnownEntity> = faculty
            .iter()
            .map(|f| KnownEntity::new(&f.faculty_id, &f.full_name))
            .collect();

        let grants = self.grants(
            &raw.grants,
            &department_keys,
            &capability_keys,
            &faculty_keys,
            &mut report,
        )?;

        let dataset = Dataset {
            departments,
            capabilities,
            capability_departments,
            faculty,
            grants,
        };
        for entity in EntityKind::all() {
            tracing::info!(entity = %entity, rows = dataset.len_of(*entity), "normalized");
        }
        Ok((dataset, report))
    }

    /// Apply the unresolved policy to the rows collected for one entity
    fn settle(
        &self,
        entity: EntityKind,
        unresolved: Vec<UnresolvedRow>,
        report: &mut NormalizeReport,
    ) -> Result<()> {
        if unresolved.is_empty() {
            return Ok(());
        }
        match self.policy {
            UnresolvedPolicy::Abort => Err(Error::UnresolvedReference {
                entity,
                rows: unresolved,
            }),
            UnresolvedPolicy::Skip => {
                for row in &unresolved {
                    tracing::warn!(%row, "skipping row with unresolved reference");
                }
                report.skipped.extend(unresolved);
                Ok(())
            }
        }
    }

    pub fn departments(
        &self,
        rows: &[SourceRow<crate::ingest::DepartmentRow>],
        report: &mut NormalizeReport,
    ) -> Result<Vec<Department>> {
        let entity = EntityKind::Department;
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let department_id = required(entity, row.line, "department_id", &row.record.department_id)?;
            let department_name = required_name(entity, row.line, "department_name", &row.record.department_name)?;
            if !seen.insert((department_id.clone(), canonical(&department_name))) {
                tracing::debug!(line = row.line, %department_id, "duplicate department row collapsed");
                report.deduplicated += 1;
                continue;
            }
            out.push(Department {
                department_id,
                department_name,
            });
        }
        Ok(out)
    }

    pub fn capabilities(
        &self,
        rows: &[SourceRow<crate::ingest::CapabilityRow>],
        report: &mut NormalizeReport,
    ) -> Result<Vec<Capability>> {
        let entity = EntityKind::Capability;
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let capabilities_id = required(entity, row.line, "capabilities_id", &row.record.capabilities_id)?;
            let capability_name = required_name(entity, row.line, "capability_name", &row.record.capability_name)?;
            if !seen.insert((capabilities_id.clone(), canonical(&capability_name))) {
                report.deduplicated += 1;
                continue;
            }
            out.push(Capability {
                capabilities_id,
                capability_name,
            });
        }
        Ok(out)
    }

    pub fn capability_departments(
        &self,
        rows: &[SourceRow<crate::ingest::CapabilityDepartmentRow>],
        capabilities: &[KnownEntity],
        departments: &[KnownEntity],
        report: &mut NormalizeReport,
    ) -> Result<Vec<CapabilityDepartment>> {
        let entity = EntityKind::CapabilityDepartment;
        let mut unresolved = Vec::new();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in rows {
            let mut refs = RowRefs::new(entity, row.line, &mut unresolved);
            let capabilities_id = refs.required("capabilities_id", &row.record.capabilities_id, capabilities);
            let department_id = refs.required("department_id", &row.record.department_id, departments);
            let (Some(capabilities_id), Some(department_id)) = (capabilities_id, department_id) else {
                continue;
            };
            let link = CapabilityDepartment {
                capabilities_id,
                department_id,
            };
            if !seen.insert(link.clone()) {
                report.deduplicated += 1;
                continue;
            }
            out.push(link);
        }
        self.settle(entity, unresolved, report)?;
        Ok(out)
    }

    pub fn faculty(
        &self,
        rows: &[SourceRow<crate::ingest::FacultyRow>],
        departments: &[KnownEntity],
        report: &mut NormalizeReport,
    ) -> Result<Vec<Faculty>> {
        let entity = EntityKind::Faculty;
        let mut unresolved = Vec::new();
        let mut natural_keys = HashSet::new();
        let mut out = Vec::new();

        // Only rows without an id need the watermark; computing it lazily keeps
        // files using a different id scheme loadable as long as every id is set.
        // Ids assigned here live only in this dataset; `fill_missing_ids` in the
        // faculty scraper persists them to the sink.
        let mut watermark: Option<Watermark> = None;

        for row in rows {
            let record = &row.record;
            let first_name = clean_name(&record.first_name);
            let last_name = clean_name(&record.last_name);
            let full_name = match clean_name(&record.full_name) {
                Some(name) => name,
                None => match (&last_name, &first_name) {
                    (Some(last), Some(first)) => format!("{}, {}", last, first),
                    _ => {
                        return Err(Error::InvalidRecord {
                            entity,
                            line: row.line,
                            message: "full_name is empty and cannot be derived".to_string(),
                        });
                    }
                },
            };

            let mut refs = RowRefs::new(entity, row.line, &mut unresolved);
            let department_id = match refs.optional("department_id", &record.department_id, departments) {
                Some(resolved) => resolved,
                None => continue,
            };

            if !natural_keys.insert((canonical(&full_name), department_id.clone())) {
                tracing::warn!(line = row.line, %full_name, "duplicate faculty record dropped");
                report.deduplicated += 1;
                continue;
            }

            let faculty_id = match clean(&record.faculty_id) {
                Some(id) => id,
                None => {
                    let scanned = match watermark.take() {
                        Some(wm) => wm,
                        None => {
                            let existing = rows.iter().filter_map(|r| r.record.faculty_id.as_deref());
                            Watermark::scan(self.faculty_prefix.clone(), existing)?
                        }
                    };
                    let wm = watermark.insert(scanned);
                    let id = wm.allocate()?;
                    tracing::info!(line = row.line, %id, "assigned faculty id");
                    report.assigned_ids.push(id.clone());
                    id
                }
            };

            out.push(Faculty {
                faculty_id,
                full_name,
                first_name,
                last_name,
                title: clean(&record.title),
                department_id,
                college: clean(&record.college),
                academic_history: clean(&record.academic_history),
            });
        }

        self.settle(entity, unresolved, report)?;
        Ok(out)
    }

    pub fn grants(
        &self,
        rows: &[SourceRow<crate::ingest::GrantRow>],
        departments: &[KnownEntity],
        capabilities: &[KnownEntity],
        faculty: &[KnownEntity],
        report: &mut NormalizeReport,
    ) -> Result<Vec<Grant>> {
        let entity = EntityKind::Grant;
        let mut unresolved = Vec::new();
        let mut out = Vec::new();

        for row in rows {
            let record = &row.record;
            let grant_id = required(entity, row.line, "grant_id", &record.grant_id)?;
            let funding = parse_funding(record.funding.as_deref()).map_err(|message| Error::InvalidRecord {
                entity,
                line: row.line,
                message,
            })?;
            let is_anticipated = parse_flag(record.is_anticipated.as_deref()).map_err(|message| {
                Error::InvalidRecord {
                    entity,
                    line: row.line,
                    message,
                }
            })?;

            let mut refs = RowRefs::new(entity, row.line, &mut unresolved);
            let department_id = refs.required("department_id", &record.department_id, departments);
            let capabilities_id = refs.optional("capabilities_id", &record.capabilities_id, capabilities);
            let faculty_id = refs.optional("faculty_id", &record.faculty_id, faculty);
            let (Some(department_id), Some(capabilities_id), Some(faculty_id)) =
                (department_id, capabilities_id, faculty_id)
            else {
                continue;
            };

            out.push(Grant {
                grant_id,
                funding,
                sponsor: clean(&record.sponsor),
                awardee: clean_name(&record.awardee),
                title: clean(&record.title),
                date: clean(&record.date).map(|d| iso_date(&d)),
                is_anticipated,
                capabilities_id,
                department_id,
                faculty_id,
            });
        }

        self.settle(entity, unresolved, report)?;
        Ok(out)
    }
}

/// Resolves the foreign keys of one row, recording failures
struct RowRefs<'a> {
    entity: EntityKind,
    line: u64,
    unresolved: &'a mut Vec<UnresolvedRow>,
}

impl<'a> RowRefs<'a> {
    fn new(entity: EntityKind, line: u64, unresolved: &'a mut Vec<UnresolvedRow>) -> Self {
        Self {
            entity,
            line,
            unresolved,
        }
    }

    /// A required reference; blank is unresolved
    fn required(&mut self, column: &'static str, value: &Option<String>, known: &[KnownEntity]) -> Option<String> {
        let reference = value.as_deref().unwrap_or("");
        match resolve(reference, known) {
            Ok(id) => Some(id),
            Err(reason) => {
                self.record(column, reference, reason);
                None
            }
        }
    }

    /// A nullable reference; blank resolves to NULL (`Some(None)`)
    fn optional(
        &mut self,
        column: &'static str,
        value: &Option<String>,
        known: &[KnownEntity],
    ) -> Option<Option<String>> {
        match clean(value) {
            None => Some(None),
            Some(reference) => match resolve(&reference, known) {
                Ok(id) => Some(Some(id)),
                Err(reason) => {
                    self.record(column, &reference, reason);
                    None
                }
            },
        }
    }

    fn record(&mut self, column: &'static str, reference: &str, reason: ResolveError) {
        tracing::debug!(entity = %self.entity, line = self.line, column, reference, %reason, "unresolved reference");
        self.unresolved.push(UnresolvedRow {
            entity: self.entity,
            line: self.line,
            column,
            reference: reference.to_string(),
            reason,
        });
    }
}

/// Trimmed text, blank as None
pub fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Like [`clean`], with inner whitespace runs collapsed
pub fn clean_name(value: &Option<String>) -> Option<String> {
    clean(value).map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn required(entity: EntityKind, line: u64, column: &str, value: &Option<String>) -> Result<String> {
    clean(value).ok_or_else(|| Error::InvalidRecord {
        entity,
        line,
        message: format!("{column} is empty"),
    })
}

fn required_name(entity: EntityKind, line: u64, column: &str, value: &Option<String>) -> Result<String> {
    clean_name(value).ok_or_else(|| Error::InvalidRecord {
        entity,
        line,
        message: format!("{column} is empty"),
    })
}

/// Parse a funding amount into whole dollars.
///
/// Accepts `100000`, `100000.0`, `$100,000`, `$1.5M` and `$15K`.
pub fn parse_funding(raw: Option<&str>) -> std::result::Result<Option<i64>, String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    let (digits, multiplier) = match compact.chars().last() {
        Some('M' | 'm') => (&compact[..compact.len() - 1], 1_000_000.0),
        Some('K' | 'k') => (&compact[..compact.len() - 1], 1_000.0),
        _ => (compact.as_str(), 1.0),
    };
    let amount: f64 = digits
        .parse()
        .map_err(|_| format!("funding {raw:?} is not an amount"))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("funding {raw:?} is not an amount"));
    }
    let dollars = (amount * multiplier).trunc();
    // i64::MAX as f64 rounds up to 2^63, so anything at or above it overflows
    if dollars >= i64::MAX as f64 {
        return Err(format!("funding {raw:?} is too large"));
    }
    Ok(Some(dollars as i64))
}

/// Parse a boolean column; blank is false
pub fn parse_flag(raw: Option<&str>) -> std::result::Result<bool, String> {
    match raw.map(|r| r.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("true" | "t" | "yes" | "y" | "1" | "1.0") => Ok(true),
        Some("false" | "f" | "no" | "n" | "0" | "0.0") => Ok(false),
        Some(other) => Err(format!("{other:?} is not a boolean")),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"];

/// Parse a date written as `2026-01-12`, `January 12, 2026`, `Jan 12, 2026`
/// or `01/12/2026`. A trailing period is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().trim_end_matches('.');
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(cleaned, format).ok())
}

/// Normalize a date to ISO `YYYY-MM-DD` when it is in a known format;
/// anything else is kept as written.
pub fn iso_date(raw: &str) -> String {
    match parse_date(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.trim().to_string(),
    }
}
