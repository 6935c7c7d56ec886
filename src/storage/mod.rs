//! Storage Layer - SQLite-backed persistence
//!
//! One table generation is held in:
//! - departments(department_id, department_name)
//! - capabilities(capabilities_id, capability_name)
//! - capability_departments(capabilities_id, department_id)
//! - faculty(faculty_id, full_name, ..., department_id)
//! - grants(grant_id, funding, ..., capabilities_id, department_id, faculty_id)

pub mod schema;
pub mod sqlite;

pub use sqlite::{CecStore, DbStats, ForeignKeyIssue, TableStats};
