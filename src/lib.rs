//! # cecdb - CEC research dataset loader
//!
//! Materializes the departments, capabilities, faculty and grants dataset
//! into a SQLite store with enforced foreign keys.
//!
//! cecdb provides:
//! - A schema definer owning table order and referential-integrity rules
//! - A CSV reader that enforces the per-entity column contract
//! - A record normalizer that resolves display names into stable ids
//! - A loader that replaces every table generation in one transaction
//! - Parsers for scraped faculty and grant announcements

pub mod model;
pub mod storage;
pub mod ingest;
pub mod normalize;
pub mod loader;
pub mod scrape;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use model::{Capability, CapabilityDepartment, Dataset, Department, EntityKind, Faculty, Grant};
pub use storage::CecStore;
pub use normalize::{Normalizer, UnresolvedPolicy, UnresolvedRow};
pub use loader::{LoadState, Loader};

/// Result type alias for cecdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cecdb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema mismatch for {entity}: missing columns [{}], unexpected columns [{}]", .missing.join(", "), .extra.join(", "))]
    SchemaMismatch {
        entity: EntityKind,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("{} unresolved reference(s) in {entity}:\n{}", .rows.len(), format_unresolved(.rows))]
    UnresolvedReference {
        entity: EntityKind,
        rows: Vec<UnresolvedRow>,
    },

    #[error("Foreign key violation in {entity} row {row} (key {key}): {detail}")]
    ForeignKeyViolation {
        entity: EntityKind,
        row: usize,
        key: String,
        detail: String,
    },

    #[error("Unique constraint violation in {entity} row {row} (key {key}): {detail}")]
    UniqueConstraintViolation {
        entity: EntityKind,
        row: usize,
        key: String,
        detail: String,
    },

    #[error("Id {id} collides with an existing id after recomputing the watermark")]
    DuplicateIdCollision { id: String },

    #[error("Malformed id {id:?}: expected prefix {prefix:?} followed by digits")]
    MalformedId { id: String, prefix: String },

    #[error("Invalid {entity} record at line {line}: {message}")]
    InvalidRecord {
        entity: EntityKind,
        line: u64,
        message: String,
    },

    #[error("Schema has not been applied to the store")]
    SchemaNotApplied,

    #[error("Required {entity} source not found at {}", .path.display())]
    MissingSource {
        entity: EntityKind,
        path: std::path::PathBuf,
    },

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_unresolved(rows: &[UnresolvedRow]) -> String {
    rows.iter()
        .map(|row| format!("  {}", row))
        .collect::<Vec<_>>()
        .join("\n")
}
