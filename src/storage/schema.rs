//! Database schema definitions
//!
//! Tables are declared parent-first. Foreign keys are enforced by SQLite once
//! `PRAGMA foreign_keys` is on, so DROP must walk the list in reverse: dropping
//! `departments` while `grants` still references it is a constraint violation.
//!
//! Display names are unique case-insensitively, the same way references to them
//! are resolved. Whitespace is collapsed before rows reach the store.

use rusqlite::Connection;
use crate::model::EntityKind;

/// A table owned by the schema definer
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub entity: EntityKind,
    pub name: &'static str,
    pub create_sql: &'static str,
    pub primary_key: &'static [&'static str],
    /// Tables this one holds foreign keys into
    pub parents: &'static [&'static str],
}

/// SQL to create the departments table
pub const CREATE_DEPARTMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS departments (
    department_id TEXT PRIMARY KEY,
    department_name TEXT NOT NULL UNIQUE COLLATE NOCASE
)
"#;

/// SQL to create the capabilities table
pub const CREATE_CAPABILITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS capabilities (
    capabilities_id TEXT PRIMARY KEY,
    capability_name TEXT NOT NULL UNIQUE COLLATE NOCASE
)
"#;

/// SQL to create the capability/department join table
pub const CREATE_CAPABILITY_DEPARTMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS capability_departments (
    capabilities_id TEXT NOT NULL REFERENCES capabilities(capabilities_id),
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    PRIMARY KEY (capabilities_id, department_id)
)
"#;

/// SQL to create the faculty table
pub const CREATE_FACULTY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS faculty (
    faculty_id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL,
    first_name TEXT,
    last_name TEXT,
    title TEXT,
    department_id TEXT REFERENCES departments(department_id),
    college TEXT,
    academic_history TEXT
)
"#;

/// SQL to create the grants table
pub const CREATE_GRANTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS grants (
    grant_id TEXT PRIMARY KEY,
    funding INTEGER,
    sponsor TEXT,
    awardee TEXT,
    title TEXT,
    date TEXT,
    is_anticipated INTEGER NOT NULL DEFAULT 0,
    capabilities_id TEXT REFERENCES capabilities(capabilities_id),
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    faculty_id TEXT REFERENCES faculty(faculty_id)
)
"#;

/// Tables in creation order (parents first)
pub const CREATE_ORDER: &[TableDef] = &[
    TableDef {
        entity: EntityKind::Department,
        name: "departments",
        create_sql: CREATE_DEPARTMENTS_TABLE,
        primary_key: &["department_id"],
        parents: &[],
    },
    TableDef {
        entity: EntityKind::Capability,
        name: "capabilities",
        create_sql: CREATE_CAPABILITIES_TABLE,
        primary_key: &["capabilities_id"],
        parents: &[],
    },
    TableDef {
        entity: EntityKind::CapabilityDepartment,
        name: "capability_departments",
        create_sql: CREATE_CAPABILITY_DEPARTMENTS_TABLE,
        primary_key: &["capabilities_id", "department_id"],
        parents: &["capabilities", "departments"],
    },
    TableDef {
        entity: EntityKind::Faculty,
        name: "faculty",
        create_sql: CREATE_FACULTY_TABLE,
        primary_key: &["faculty_id"],
        parents: &["departments"],
    },
    TableDef {
        entity: EntityKind::Grant,
        name: "grants",
        create_sql: CREATE_GRANTS_TABLE,
        primary_key: &["grant_id"],
        parents: &["capabilities", "departments", "faculty"],
    },
];

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_capability_departments_department ON capability_departments(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_faculty_department ON faculty(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_grants_department ON grants(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_grants_capability ON grants(capabilities_id)",
    "CREATE INDEX IF NOT EXISTS idx_grants_faculty ON grants(faculty_id)",
];

/// Tables in drop order (dependents first)
pub fn drop_order() -> Vec<&'static TableDef> {
    CREATE_ORDER.iter().rev().collect()
}

/// Look up the definition backing an entity
pub fn table_for(entity: EntityKind) -> &'static TableDef {
    // CREATE_ORDER follows EntityKind declaration order
    &CREATE_ORDER[entity as usize]
}

/// All schema creation statements, in order
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts: Vec<&'static str> = CREATE_ORDER.iter().map(|def| def.create_sql).collect();
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Create whatever tables and indexes are missing.
pub fn apply(conn: &Connection) -> rusqlite::Result<()> {
    for stmt in all_schema_statements() {
        conn.execute(stmt, [])?;
    }
    Ok(())
}

/// Drop every table (dependents first) and recreate them (parents first).
///
/// Callers wanting the reset to be atomic run this inside a transaction.
pub fn reset(conn: &Connection) -> rusqlite::Result<()> {
    for def in drop_order() {
        tracing::debug!(table = def.name, "dropping table");
        conn.execute(&format!("DROP TABLE IF EXISTS {}", def.name), [])?;
    }
    apply(conn)
}

/// True when every table of the schema exists
pub fn is_applied(conn: &Connection) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
    )?;
    for def in CREATE_ORDER {
        let count: i64 = stmt.query_row([def.name], |row| row.get(0))?;
        if count == 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[&TableDef], name: &str) -> usize {
        order.iter().position(|def| def.name == name).unwrap()
    }

    #[test]
    fn test_parents_are_created_first() {
        let order: Vec<&TableDef> = CREATE_ORDER.iter().collect();
        for (idx, def) in order.iter().enumerate() {
            for parent in def.parents {
                assert!(position(&order, parent) < idx, "{} created before {}", def.name, parent);
            }
        }
    }

    #[test]
    fn test_drop_order_is_reverse() {
        let order = drop_order();
        assert!(position(&order, "grants") < position(&order, "departments"));
        assert!(position(&order, "capability_departments") < position(&order, "capabilities"));
        assert!(position(&order, "faculty") < position(&order, "departments"));
    }

    #[test]
    fn test_table_names_match_entities() {
        for def in CREATE_ORDER {
            assert_eq!(def.entity.table_name(), def.name);
            assert_eq!(table_for(def.entity).name, def.name);
        }
    }

    #[test]
    fn test_apply_and_reset() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        assert!(!is_applied(&conn).unwrap());

        apply(&conn).unwrap();
        assert!(is_applied(&conn).unwrap());

        conn.execute("INSERT INTO departments VALUES ('CS', 'Computer Science')", []).unwrap();
        conn.execute(
            "INSERT INTO grants (grant_id, department_id) VALUES ('G00001', 'CS')",
            [],
        )
        .unwrap();

        reset(&conn).unwrap();
        assert!(is_applied(&conn).unwrap());
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM grants", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_dropping_parent_first_violates_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        apply(&conn).unwrap();
        conn.execute("INSERT INTO departments VALUES ('CS', 'Computer Science')", []).unwrap();
        conn.execute(
            "INSERT INTO grants (grant_id, department_id) VALUES ('G00001', 'CS')",
            [],
        )
        .unwrap();

        assert!(conn.execute("DROP TABLE departments", []).is_err());
    }
}
