//! Natural-key resolution
//!
//! Turns a free-text reference (an id, or a display name as typed in a CSV or
//! scraped from a catalog page) into the stable id of a known entity.
//!
//! Resolution order, first stage with any match wins:
//! 1. Exact id
//! 2. Canonical id (case and whitespace insensitive)
//! 3. Canonical name
//! 4. Partial name (either string contains the other)
//!
//! A stage that matches more than one entity is ambiguous and fails; no stage
//! ever picks one candidate out of several.

use std::fmt;

/// An entity a reference may resolve to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownEntity {
    pub id: String,
    pub name: String,
}

impl KnownEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for KnownEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.id)
    }
}

/// Why a reference did not resolve
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("reference is empty")]
    Empty,

    #[error("no matching entity")]
    NotFound,

    #[error("ambiguous, matches {}", .candidates.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", "))]
    Ambiguous { candidates: Vec<KnownEntity> },
}

/// Canonical comparison form: trimmed, inner whitespace collapsed, lowercase
pub fn canonical(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    ExactId,
    CanonicalId,
    CanonicalName,
    PartialName,
}

impl Stage {
    const ALL: [Stage; 4] = [
        Stage::ExactId,
        Stage::CanonicalId,
        Stage::CanonicalName,
        Stage::PartialName,
    ];

    fn matches(self, known: &KnownEntity, trimmed: &str, wanted: &str) -> bool {
        match self {
            Stage::ExactId => known.id == trimmed,
            Stage::CanonicalId => canonical(&known.id) == wanted,
            Stage::CanonicalName => canonical(&known.name) == wanted,
            Stage::PartialName => {
                let name = canonical(&known.name);
                !name.is_empty() && (wanted.contains(&name) || name.contains(wanted))
            }
        }
    }
}

/// Resolve `reference` to the id of exactly one entity in `known`.
pub fn resolve(reference: &str, known: &[KnownEntity]) -> Result<String, ResolveError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::Empty);
    }
    let wanted = canonical(trimmed);

    for stage in Stage::ALL {
        let mut hits: Vec<&KnownEntity> = known
            .iter()
            .filter(|k| stage.matches(k, trimmed, &wanted))
            .collect();
        hits.dedup_by(|a, b| a.id == b.id);
        match hits.len() {
            0 => continue,
            1 => {
                tracing::trace!(reference = trimmed, id = %hits[0].id, ?stage, "resolved reference");
                return Ok(hits[0].id.clone());
            }
            _ => {
                return Err(ResolveError::Ambiguous {
                    candidates: hits.into_iter().cloned().collect(),
                });
            }
        }
    }

    Err(ResolveError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn departments() -> Vec<KnownEntity> {
        vec![
            KnownEntity::new("CS", "Computer Science"),
            KnownEntity::new("CE", "Computer Engineering"),
            KnownEntity::new("BIOE", "Bioengineering"),
            KnownEntity::new("SYST", "Systems Engineering and Operations Research"),
        ]
    }

    #[test]
    fn test_canonical() {
        assert_eq!(canonical("  Computer   Science \t"), "computer science");
    }

    #[test]
    fn test_resolve_by_id() {
        assert_eq!(resolve("CS", &departments()).unwrap(), "CS");
        assert_eq!(resolve(" bioe ", &departments()).unwrap(), "BIOE");
    }

    #[test]
    fn test_resolve_case_insensitive_name() {
        assert_eq!(resolve("computer science", &departments()).unwrap(), "CS");
        assert_eq!(resolve("COMPUTER  ENGINEERING", &departments()).unwrap(), "CE");
    }

    #[test]
    fn test_resolve_partial() {
        assert_eq!(resolve("Department of Bioengineering", &departments()).unwrap(), "BIOE");
        assert_eq!(resolve("Systems Engineering", &departments()).unwrap(), "SYST");
    }

    #[test]
    fn test_ambiguous_reference_rejected() {
        let err = resolve("Computer", &departments()).unwrap_err();
        match err {
            ResolveError::Ambiguous { candidates } => {
                let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
                assert_eq!(ids, vec!["CS", "CE"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_not_found_and_empty() {
        assert_eq!(resolve("Mathematics", &departments()), Err(ResolveError::NotFound));
        assert_eq!(resolve("   ", &departments()), Err(ResolveError::Empty));
        assert_eq!(resolve("CS", &[]), Err(ResolveError::NotFound));
    }

    #[test]
    fn test_exact_beats_partial() {
        let known = vec![
            KnownEntity::new("CS", "Computer Science"),
            KnownEntity::new("CSE", "Computer Science Education"),
        ];
        assert_eq!(resolve("Computer Science", &known).unwrap(), "CS");
    }
}
