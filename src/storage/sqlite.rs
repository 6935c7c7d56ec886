//! SQLite storage implementation

use std::path::Path;
use rusqlite::{Connection, Transaction, types::ValueRef};
use serde::Serialize;
use crate::Result;
use crate::model::{Capability, CapabilityDepartment, Department, EntityKind, Faculty, Grant};
use super::schema;

/// SQLite-backed store for the CEC dataset.
///
/// Reads are public; row writes go through [`crate::Loader`], which borrows the
/// store mutably for the duration of one load.
pub struct CecStore {
    conn: Connection,
}

impl CecStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        // Must be on before any write; it is a no-op inside a transaction.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Whether SQLite is enforcing foreign keys on this connection
    pub fn foreign_keys_enabled(&self) -> Result<bool> {
        let enabled: i64 = self.conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        Ok(enabled == 1)
    }

    // ========== Schema ==========

    /// Create missing tables
    pub fn apply_schema(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        schema::apply(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Drop and recreate every table, atomically
    pub fn reset_schema(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        schema::reset(&tx)?;
        tx.commit()?;
        tracing::info!("schema reset");
        Ok(())
    }

    /// True when every table exists
    pub fn has_schema(&self) -> Result<bool> {
        Ok(schema::is_applied(&self.conn)?)
    }

    pub(crate) fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    // ========== Reads ==========

    pub fn departments(&self) -> Result<Vec<Department>> {
        let mut stmt = self.conn.prepare(
            "SELECT department_id, department_name FROM departments ORDER BY department_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Department {
                    department_id: row.get(0)?,
                    department_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn capabilities(&self) -> Result<Vec<Capability>> {
        let mut stmt = self.conn.prepare(
            "SELECT capabilities_id, capability_name FROM capabilities ORDER BY capabilities_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Capability {
                    capabilities_id: row.get(0)?,
                    capability_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn capability_departments(&self) -> Result<Vec<CapabilityDepartment>> {
        let mut stmt = self.conn.prepare(
            "SELECT capabilities_id, department_id FROM capability_departments
             ORDER BY capabilities_id, department_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CapabilityDepartment {
                    capabilities_id: row.get(0)?,
                    department_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn faculty(&self) -> Result<Vec<Faculty>> {
        let mut stmt = self.conn.prepare(
            "SELECT faculty_id, full_name, first_name, last_name, title, department_id, college, academic_history
             FROM faculty ORDER BY faculty_id",
        )?;
        let rows = stmt
            .query_map([], |row| self.row_to_faculty(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Faculty ids currently stored; new ids must not land on any of them
    pub fn faculty_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT faculty_id FROM faculty ORDER BY faculty_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    pub fn grants(&self) -> Result<Vec<Grant>> {
        let mut stmt = self.conn.prepare(
            "SELECT grant_id, funding, sponsor, awardee, title, date, is_anticipated,
                    capabilities_id, department_id, faculty_id
             FROM grants ORDER BY grant_id",
        )?;
        let rows = stmt
            .query_map([], |row| self.row_to_grant(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Helper to convert a row to a Faculty
    fn row_to_faculty(&self, row: &rusqlite::Row) -> rusqlite::Result<Faculty> {
        Ok(Faculty {
            faculty_id: row.get(0)?,
            full_name: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            title: row.get(4)?,
            department_id: row.get(5)?,
            college: row.get(6)?,
            academic_history: row.get(7)?,
        })
    }

    /// Helper to convert a row to a Grant
    fn row_to_grant(&self, row: &rusqlite::Row) -> rusqlite::Result<Grant> {
        Ok(Grant {
            grant_id: row.get(0)?,
            funding: row.get(1)?,
            sponsor: row.get(2)?,
            awardee: row.get(3)?,
            title: row.get(4)?,
            date: row.get(5)?,
            is_anticipated: row.get(6)?,
            capabilities_id: row.get(7)?,
            department_id: row.get(8)?,
            faculty_id: row.get(9)?,
        })
    }

    /// Count rows of one entity table
    pub fn count(&self, entity: EntityKind) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table_name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Content hash of a table, ordered by primary key.
    ///
    /// Two loads of the same sources produce the same fingerprint.
    pub fn fingerprint(&self, entity: EntityKind) -> Result<String> {
        let def = schema::table_for(entity);
        let sql = format!(
            "SELECT * FROM {} ORDER BY {}",
            def.name,
            def.primary_key.join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt.column_count();
        let mut hasher = blake3::Hasher::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for idx in 0..columns {
                match row.get_ref(idx)? {
                    ValueRef::Null => {
                        hasher.update(&[0]);
                    }
                    ValueRef::Integer(i) => {
                        hasher.update(&[1]);
                        hasher.update(&i.to_le_bytes());
                    }
                    ValueRef::Real(f) => {
                        hasher.update(&[2]);
                        hasher.update(&f.to_le_bytes());
                    }
                    ValueRef::Text(t) => {
                        hasher.update(&[3]);
                        hasher.update(&(t.len() as u64).to_le_bytes());
                        hasher.update(t);
                    }
                    ValueRef::Blob(b) => {
                        hasher.update(&[4]);
                        hasher.update(&(b.len() as u64).to_le_bytes());
                        hasher.update(b);
                    }
                }
            }
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Run SQLite's foreign key check over the whole database
    pub fn foreign_key_check(&self) -> Result<Vec<ForeignKeyIssue>> {
        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check")?;
        let issues = stmt
            .query_map([], |row| {
                Ok(ForeignKeyIssue {
                    table: row.get(0)?,
                    rowid: row.get(1)?,
                    parent: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(issues)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let mut tables = Vec::new();
        for entity in EntityKind::all() {
            tables.push(TableStats {
                table: entity.table_name().to_string(),
                rows: self.count(*entity)?,
                fingerprint: self.fingerprint(*entity)?,
            });
        }
        Ok(DbStats { tables })
    }
}

/// One row reported by `PRAGMA foreign_key_check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyIssue {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub table: String,
    pub rows: usize,
    pub fingerprint: String,
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub tables: Vec<TableStats>,
}
