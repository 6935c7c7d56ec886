//! CSV ingestion
//!
//! Every entity has a fixed column contract. The header of each file is checked
//! against it before a single row is read, so a renamed or missing column fails
//! the run with a [`Error::SchemaMismatch`] naming the offending columns.
//!
//! Rows are read as all-optional strings; turning them into typed, resolved
//! records is the normalizer's job.

use std::io::Read;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use crate::{Error, Result};
use crate::model::EntityKind;

/// Column contract for one entity
#[derive(Debug, Clone, Copy)]
pub struct ColumnContract {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl ColumnContract {
    pub fn for_entity(entity: EntityKind) -> Self {
        match entity {
            EntityKind::Department => Self {
                required: &["department_id", "department_name"],
                optional: &[],
            },
            EntityKind::Capability => Self {
                required: &["capabilities_id", "capability_name"],
                optional: &[],
            },
            EntityKind::CapabilityDepartment => Self {
                required: &["capabilities_id", "department_id"],
                optional: &[],
            },
            EntityKind::Faculty => Self {
                required: &[
                    "faculty_id",
                    "full_name",
                    "first_name",
                    "last_name",
                    "title",
                    "department_id",
                    "college",
                    "academic_history",
                ],
                optional: &[],
            },
            EntityKind::Grant => Self {
                required: &[
                    "grant_id",
                    "funding",
                    "sponsor",
                    "awardee",
                    "title",
                    "date",
                    "department_id",
                ],
                optional: &["capabilities_id", "faculty_id", "is_anticipated"],
            },
        }
    }

    /// Compare a header row against the contract
    pub fn check(&self, entity: EntityKind, headers: &[&str]) -> Result<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|col| !headers.contains(col))
            .map(|col| col.to_string())
            .collect();
        let extra: Vec<String> = headers
            .iter()
            .filter(|h| !self.required.contains(h) && !self.optional.contains(h))
            .map(|h| h.to_string())
            .collect();

        if missing.is_empty() && extra.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaMismatch { entity, missing, extra })
        }
    }
}

/// A raw record plus the CSV line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow<T> {
    pub line: u64,
    pub record: T,
}

impl<T> SourceRow<T> {
    pub fn new(line: u64, record: T) -> Self {
        Self { line, record }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRow {
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub department_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRow {
    #[serde(default)]
    pub capabilities_id: Option<String>,
    #[serde(default)]
    pub capability_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDepartmentRow {
    #[serde(default)]
    pub capabilities_id: Option<String>,
    /// Department id or display name
    #[serde(default)]
    pub department_id: Option<String>,
}

/// Faculty row; column order is the file layout written by the scraper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyRow {
    #[serde(default)]
    pub faculty_id: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Department id or display name
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default)]
    pub academic_history: Option<String>,
}

/// Grant row; column order is the file layout written by the scraper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRow {
    #[serde(default)]
    pub grant_id: Option<String>,
    #[serde(default)]
    pub funding: Option<String>,
    #[serde(default)]
    pub sponsor: Option<String>,
    #[serde(default)]
    pub awardee: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub is_anticipated: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub capabilities_id: Option<String>,
    #[serde(default)]
    pub faculty_id: Option<String>,
}

/// Raw records for every entity, before normalization
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub departments: Vec<SourceRow<DepartmentRow>>,
    pub capabilities: Vec<SourceRow<CapabilityRow>>,
    pub capability_departments: Vec<SourceRow<CapabilityDepartmentRow>>,
    pub faculty: Vec<SourceRow<FacultyRow>>,
    pub grants: Vec<SourceRow<GrantRow>>,
}

/// Where each entity's CSV lives
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub departments: PathBuf,
    pub capabilities: PathBuf,
    pub capability_departments: PathBuf,
    pub faculty: PathBuf,
    pub grants: PathBuf,
}

impl SourcePaths {
    /// Default file names under one data directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            departments: dir.join("departments.csv"),
            capabilities: dir.join("capabilities.csv"),
            capability_departments: dir.join("capability_departments.csv"),
            faculty: dir.join("faculty.csv"),
            grants: dir.join("grants.csv"),
        }
    }
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(input)
}

/// Read and header-check one entity's rows from any reader
pub fn read_rows<T, R>(entity: EntityKind, input: R) -> Result<Vec<SourceRow<T>>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut reader = csv_reader(input);
    let headers = reader.headers()?.clone();
    let names: Vec<&str> = headers.iter().collect();
    ColumnContract::for_entity(entity).check(entity, &names)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let parsed: T = record.deserialize(Some(&headers))?;
        rows.push(SourceRow::new(line, parsed));
    }

    tracing::debug!(entity = %entity, rows = rows.len(), "read csv rows");
    Ok(rows)
}

/// Read one entity's CSV file. A missing optional file reads as empty.
pub fn read_file<T>(entity: EntityKind, path: &Path, required: bool) -> Result<Vec<SourceRow<T>>>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        if required {
            return Err(Error::MissingSource {
                entity,
                path: path.to_path_buf(),
            });
        }
        tracing::info!(entity = %entity, path = %path.display(), "optional source absent, loading empty table");
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    read_rows(entity, file)
}

/// Read the full source set. Departments and grants are required.
pub fn read_sources(paths: &SourcePaths) -> Result<RawDataset> {
    Ok(RawDataset {
        departments: read_file(EntityKind::Department, &paths.departments, true)?,
        capabilities: read_file(EntityKind::Capability, &paths.capabilities, false)?,
        capability_departments: read_file(
            EntityKind::CapabilityDepartment,
            &paths.capability_departments,
            false,
        )?,
        faculty: read_file(EntityKind::Faculty, &paths.faculty, false)?,
        grants: read_file(EntityKind::Grant, &paths.grants, true)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_departments() {
        let csv = "department_id,department_name\nCS, Computer Science \nECE,Electrical and Computer Engineering\n";
        let rows: Vec<SourceRow<DepartmentRow>> =
            read_rows(EntityKind::Department, csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].record.department_name.as_deref(), Some("Computer Science"));
    }

    #[test]
    fn test_missing_and_extra_columns_named() {
        let csv = "department_id,dept_name\nCS,Computer Science\n";
        let err = read_rows::<DepartmentRow, _>(EntityKind::Department, csv.as_bytes()).unwrap_err();
        match err {
            Error::SchemaMismatch { entity, missing, extra } => {
                assert_eq!(entity, EntityKind::Department);
                assert_eq!(missing, vec!["department_name".to_string()]);
                assert_eq!(extra, vec!["dept_name".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_grant_optional_columns() {
        let csv = "grant_id,funding,sponsor,awardee,title,date,department_id\n\
                   G00001,100000,NSF,Kai Zeng,,2026-01-12,CS\n";
        let rows: Vec<SourceRow<GrantRow>> = read_rows(EntityKind::Grant, csv.as_bytes()).unwrap();
        let row = &rows[0].record;
        assert_eq!(row.funding.as_deref(), Some("100000"));
        assert_eq!(row.title, None);
        assert_eq!(row.faculty_id, None);
        assert_eq!(row.capabilities_id, None);
    }

    #[test]
    fn test_unexpected_grant_column_rejected() {
        let csv = "grant_id,funding,sponsor,awardee,title,date,department_id,notes\n";
        let err = read_rows::<GrantRow, _>(EntityKind::Grant, csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { ref extra, .. } if extra == &vec!["notes".to_string()]));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let csv = "department_id,department_name\nCS,Computer Science\n,\n";
        let rows: Vec<SourceRow<DepartmentRow>> =
            read_rows(EntityKind::Department, csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_missing_required_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SourcePaths::in_dir(dir.path());
        let err = read_sources(&paths).unwrap_err();
        assert!(matches!(err, Error::MissingSource { entity: EntityKind::Department, .. }));
    }
}
