//! Loader / Reconciler
//!
//! Replaces the contents of every table with a new generation. The whole run
//! is one SQLite transaction:
//!
//! 1. delete every table's rows, dependents first
//! 2. insert the new rows, parents first
//! 3. commit
//!
//! Any failure drops the transaction, which rolls back, so readers see either
//! the previous generation or the new one and never a mix.

use std::fmt;
use rusqlite::{Error as SqliteError, ErrorCode, Statement, Transaction, ffi, params};
use crate::{Error, Result};
use crate::model::{Capability, CapabilityDepartment, Dataset, Department, EntityKind, Faculty, Grant};
use crate::storage::{CecStore, schema};

/// Where a loader is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Store has no schema yet
    Empty,
    SchemaApplied,
    Loading(EntityKind),
    Loaded,
    /// The last run failed and was rolled back
    Aborted,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Empty => write!(f, "empty"),
            LoadState::SchemaApplied => write!(f, "schema applied"),
            LoadState::Loading(entity) => write!(f, "loading {}", entity),
            LoadState::Loaded => write!(f, "loaded"),
            LoadState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Rows written per table by one successful run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LoadSummary {
    pub tables: Vec<(EntityKind, usize)>,
}

impl LoadSummary {
    pub fn rows(&self, entity: EntityKind) -> usize {
        self.tables
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Sole writer of table rows
pub struct Loader<'a> {
    store: &'a mut CecStore,
    state: LoadState,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a mut CecStore) -> Result<Self> {
        let state = if store.has_schema()? {
            LoadState::SchemaApplied
        } else {
            LoadState::Empty
        };
        Ok(Self { store, state })
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Replace every table with `dataset`. The schema must already exist.
    pub fn load(&mut self, dataset: &Dataset) -> Result<LoadSummary> {
        if self.state == LoadState::Empty || !self.store.has_schema()? {
            self.state = LoadState::Empty;
            return Err(Error::SchemaNotApplied);
        }
        self.run(dataset, false)
    }

    /// Drop and recreate the schema, then load `dataset`, in one transaction.
    pub fn rebuild(&mut self, dataset: &Dataset) -> Result<LoadSummary> {
        self.run(dataset, true)
    }

    fn run(&mut self, dataset: &Dataset, reset: bool) -> Result<LoadSummary> {
        let mut state = self.state;
        let result = Self::replace(&mut *self.store, dataset, reset, &mut state);
        self.state = match &result {
            Ok(_) => LoadState::Loaded,
            Err(err) => {
                tracing::error!(%err, at = %state, "load aborted, previous generation kept");
                LoadState::Aborted
            }
        };
        tracing::info!(state = %self.state, "loader finished");
        result
    }

    fn replace(
        store: &mut CecStore,
        dataset: &Dataset,
        reset: bool,
        state: &mut LoadState,
    ) -> Result<LoadSummary> {
        let tx = store.transaction()?;

        if reset {
            schema::reset(&tx)?;
            *state = LoadState::SchemaApplied;
            tracing::info!("schema reset inside load transaction");
        } else {
            for def in schema::drop_order() {
                let removed = tx.execute(&format!("DELETE FROM {}", def.name), [])?;
                tracing::debug!(table = def.name, removed, "cleared previous generation");
            }
        }

        let mut summary = LoadSummary::default();
        for entity in EntityKind::all() {
            *state = LoadState::Loading(*entity);
            tracing::info!(state = %state, "state transition");
            let written = match entity {
                EntityKind::Department => insert_all(&tx, &dataset.departments)?,
                EntityKind::Capability => insert_all(&tx, &dataset.capabilities)?,
                EntityKind::CapabilityDepartment => insert_all(&tx, &dataset.capability_departments)?,
                EntityKind::Faculty => insert_all(&tx, &dataset.faculty)?,
                EntityKind::Grant => insert_all(&tx, &dataset.grants)?,
            };
            tracing::info!(table = entity.table_name(), rows = written, "table loaded");
            summary.tables.push((*entity, written));
        }

        tx.commit()?;
        Ok(summary)
    }
}

/// A model record the loader knows how to insert
trait LoadRow {
    const ENTITY: EntityKind;
    const INSERT_SQL: &'static str;

    /// Primary key, for error reports
    fn key(&self) -> String;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize>;
}

impl LoadRow for Department {
    const ENTITY: EntityKind = EntityKind::Department;
    const INSERT_SQL: &'static str =
        "INSERT INTO departments (department_id, department_name) VALUES (?1, ?2)";

    fn key(&self) -> String {
        self.department_id.clone()
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![self.department_id, self.department_name])
    }
}

impl LoadRow for Capability {
    const ENTITY: EntityKind = EntityKind::Capability;
    const INSERT_SQL: &'static str =
        "INSERT INTO capabilities (capabilities_id, capability_name) VALUES (?1, ?2)";

    fn key(&self) -> String {
        self.capabilities_id.clone()
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![self.capabilities_id, self.capability_name])
    }
}

impl LoadRow for CapabilityDepartment {
    const ENTITY: EntityKind = EntityKind::CapabilityDepartment;
    const INSERT_SQL: &'static str =
        "INSERT INTO capability_departments (capabilities_id, department_id) VALUES (?1, ?2)";

    fn key(&self) -> String {
        format!("{}/{}", self.capabilities_id, self.department_id)
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![self.capabilities_id, self.department_id])
    }
}

impl LoadRow for Faculty {
    const ENTITY: EntityKind = EntityKind::Faculty;
    const INSERT_SQL: &'static str = "INSERT INTO faculty
        (faculty_id, full_name, first_name, last_name, title, department_id, college, academic_history)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

    fn key(&self) -> String {
        self.faculty_id.clone()
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.faculty_id,
            self.full_name,
            self.first_name,
            self.last_name,
            self.title,
            self.department_id,
            self.college,
            self.academic_history,
        ])
    }
}

impl LoadRow for Grant {
    const ENTITY: EntityKind = EntityKind::Grant;
    const INSERT_SQL: &'static str = "INSERT INTO grants
        (grant_id, funding, sponsor, awardee, title, date, is_anticipated, capabilities_id, department_id, faculty_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

    fn key(&self) -> String {
        self.grant_id.clone()
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.grant_id,
            self.funding,
            self.sponsor,
            self.awardee,
            self.title,
            self.date,
            self.is_anticipated,
            self.capabilities_id,
            self.department_id,
            self.faculty_id,
        ])
    }
}

fn insert_all<T: LoadRow>(tx: &Transaction<'_>, rows: &[T]) -> Result<usize> {
    let mut stmt = tx.prepare(T::INSERT_SQL)?;
    for (idx, row) in rows.iter().enumerate() {
        row.insert(&mut stmt)
            .map_err(|err| constraint_error(T::ENTITY, idx + 1, row.key(), err))?;
    }
    Ok(rows.len())
}

/// Attach entity, row and key to constraint failures
fn constraint_error(entity: EntityKind, row: usize, key: String, err: SqliteError) -> Error {
    let constraint = match &err {
        SqliteError::SqliteFailure(failure, message) if failure.code == ErrorCode::ConstraintViolation => Some((
            failure.extended_code,
            message.clone().unwrap_or_else(|| failure.to_string()),
        )),
        _ => None,
    };
    let Some((extended_code, detail)) = constraint else {
        return Error::Storage(err);
    };
    match extended_code {
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::ForeignKeyViolation { entity, row, key, detail },
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            Error::UniqueConstraintViolation { entity, row, key, detail }
        }
        _ => Error::Storage(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset {
            departments: vec![
                Department {
                    department_id: "CS".to_string(),
                    department_name: "Computer Science".to_string(),
                },
                Department {
                    department_id: "BIOE".to_string(),
                    department_name: "Bioengineering".to_string(),
                },
            ],
            capabilities: vec![Capability {
                capabilities_id: "C1".to_string(),
                capability_name: "Cybersecurity".to_string(),
            }],
            capability_departments: vec![CapabilityDepartment {
                capabilities_id: "C1".to_string(),
                department_id: "CS".to_string(),
            }],
            faculty: vec![Faculty {
                faculty_id: "F00001".to_string(),
                full_name: "Zeng, Kai".to_string(),
                first_name: Some("Kai".to_string()),
                last_name: Some("Zeng".to_string()),
                title: Some("Associate Professor".to_string()),
                department_id: Some("CS".to_string()),
                college: Some("College of Engineering and Computing".to_string()),
                academic_history: None,
            }],
            grants: vec![Grant {
                grant_id: "G00001".to_string(),
                funding: Some(100_000),
                sponsor: Some("National Science Foundation".to_string()),
                awardee: Some("Kai Zeng".to_string()),
                title: None,
                date: Some("2026-01-12".to_string()),
                is_anticipated: false,
                capabilities_id: Some("C1".to_string()),
                department_id: "CS".to_string(),
                faculty_id: Some("F00001".to_string()),
            }],
        }
    }

    fn fingerprints(store: &CecStore) -> Vec<String> {
        EntityKind::all()
            .iter()
            .map(|e| store.fingerprint(*e).unwrap())
            .collect()
    }

    fn applied_store() -> CecStore {
        let mut store = CecStore::open_in_memory().unwrap();
        store.apply_schema().unwrap();
        store
    }

    #[test]
    fn test_load_requires_schema() {
        let mut store = CecStore::open_in_memory().unwrap();
        let mut loader = Loader::new(&mut store).unwrap();
        assert_eq!(loader.state(), LoadState::Empty);
        assert!(matches!(loader.load(&dataset()), Err(Error::SchemaNotApplied)));
    }

    #[test]
    fn test_load_is_idempotent() {
        let mut store = applied_store();
        let summary = Loader::new(&mut store).unwrap().load(&dataset()).unwrap();
        assert_eq!(summary.rows(EntityKind::Department), 2);
        assert_eq!(summary.total(), 6);
        let first = fingerprints(&store);

        let mut loader = Loader::new(&mut store).unwrap();
        loader.load(&dataset()).unwrap();
        assert_eq!(loader.state(), LoadState::Loaded);
        assert_eq!(first, fingerprints(&store));
        assert_eq!(store.count(EntityKind::Grant).unwrap(), 1);
    }

    #[test]
    fn test_referential_closure() {
        let mut store = applied_store();
        Loader::new(&mut store).unwrap().load(&dataset()).unwrap();
        assert!(store.foreign_key_check().unwrap().is_empty());
    }

    #[test]
    fn test_foreign_key_violation_keeps_previous_generation() {
        let mut store = applied_store();
        Loader::new(&mut store).unwrap().load(&dataset()).unwrap();
        let before = fingerprints(&store);

        let mut broken = dataset();
        broken.grants[0].department_id = "MATH".to_string();
        let mut loader = Loader::new(&mut store).unwrap();
        let err = loader.load(&broken).unwrap_err();
        match err {
            Error::ForeignKeyViolation { entity, row, key, .. } => {
                assert_eq!(entity, EntityKind::Grant);
                assert_eq!(row, 1);
                assert_eq!(key, "G00001");
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(loader.state(), LoadState::Aborted);
        assert_eq!(before, fingerprints(&store));
    }

    #[test]
    fn test_unique_violation() {
        let mut store = applied_store();
        let mut broken = dataset();
        broken.departments.push(Department {
            department_id: "CS2".to_string(),
            department_name: "Computer Science".to_string(),
        });
        let err = Loader::new(&mut store).unwrap().load(&broken).unwrap_err();
        assert!(matches!(
            err,
            Error::UniqueConstraintViolation { entity: EntityKind::Department, row: 3, .. }
        ));
        assert_eq!(store.count(EntityKind::Department).unwrap(), 0);
    }

    #[test]
    fn test_names_unique_ignoring_case() {
        let mut store = applied_store();
        let mut broken = dataset();
        broken.departments.push(Department {
            department_id: "CS2".to_string(),
            department_name: "computer science".to_string(),
        });
        let err = Loader::new(&mut store).unwrap().load(&broken).unwrap_err();
        assert!(matches!(
            err,
            Error::UniqueConstraintViolation { entity: EntityKind::Department, row: 3, ref key, .. } if key == "CS2"
        ));

        let mut broken = dataset();
        broken.capabilities.push(Capability {
            capabilities_id: "C2".to_string(),
            capability_name: "CYBERSECURITY".to_string(),
        });
        let err = Loader::new(&mut store).unwrap().load(&broken).unwrap_err();
        assert!(matches!(
            err,
            Error::UniqueConstraintViolation { entity: EntityKind::Capability, row: 2, .. }
        ));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_schema_and_data() {
        let mut store = applied_store();
        Loader::new(&mut store).unwrap().load(&dataset()).unwrap();
        let before = fingerprints(&store);

        let mut broken = dataset();
        broken.faculty[0].department_id = Some("MATH".to_string());
        let mut loader = Loader::new(&mut store).unwrap();
        let err = loader.rebuild(&broken).unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation { entity: EntityKind::Faculty, row: 1, .. }));
        assert_eq!(loader.state(), LoadState::Aborted);

        assert!(store.has_schema().unwrap());
        assert_eq!(store.count(EntityKind::Department).unwrap(), 2);
        assert_eq!(before, fingerprints(&store));
    }

    #[test]
    fn test_rebuild_over_existing_data() {
        let mut store = applied_store();
        Loader::new(&mut store).unwrap().load(&dataset()).unwrap();

        let mut smaller = dataset();
        smaller.grants.clear();
        let mut loader = Loader::new(&mut store).unwrap();
        loader.rebuild(&smaller).unwrap();
        assert_eq!(loader.state(), LoadState::Loaded);
        assert_eq!(store.count(EntityKind::Grant).unwrap(), 0);
        assert_eq!(store.count(EntityKind::Faculty).unwrap(), 1);
    }

    #[test]
    fn test_rebuild_on_empty_store() {
        let mut store = CecStore::open_in_memory().unwrap();
        Loader::new(&mut store).unwrap().rebuild(&dataset()).unwrap();
        assert!(store.has_schema().unwrap());
        assert_eq!(store.count(EntityKind::Department).unwrap(), 2);
    }
}
