//! Id continuation for append-only entities
//!
//! A [`Watermark`] is computed from the ids present in a sink at the start of a
//! run and passed to whatever assigns new ids. Nothing keeps a counter between
//! runs, so a second run over the grown sink continues where the first ended.

use std::collections::BTreeSet;
use crate::{Error, Result};

/// Default zero-padded width of the numeric part (`F00038`)
pub const DEFAULT_ID_WIDTH: usize = 5;

#[derive(Debug, Clone)]
pub struct Watermark {
    prefix: String,
    width: usize,
    max: u64,
    taken: BTreeSet<u64>,
}

impl Watermark {
    /// Empty watermark; the first allocated id is number 1
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            width: DEFAULT_ID_WIDTH,
            max: 0,
            taken: BTreeSet::new(),
        }
    }

    /// Compute the watermark from the ids currently in the sink.
    ///
    /// Blank ids are ignored; ids not shaped like prefix + digits are rejected.
    pub fn scan<I, S>(prefix: impl Into<String>, ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut watermark = Self::new(prefix);
        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            let number = watermark.parse(id)?;
            if !watermark.taken.insert(number) {
                tracing::warn!(id, "id number appears more than once in sink");
            }
            watermark.max = watermark.max.max(number);
        }
        Ok(watermark)
    }

    /// Highest number currently assigned
    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Numeric part of an id, e.g. `F00005` -> 5
    pub fn parse(&self, id: &str) -> Result<u64> {
        id.strip_prefix(self.prefix.as_str())
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| Error::MalformedId {
                id: id.to_string(),
                prefix: self.prefix.clone(),
            })
    }

    pub fn format(&self, number: u64) -> String {
        format!("{}{:0width$}", self.prefix, number, width = self.width)
    }

    /// Mark an id as taken without moving the watermark.
    ///
    /// Used for ids held outside the sink, such as rows still in the faculty
    /// table; the next allocation that lands on one recomputes the watermark.
    pub fn reserve(&mut self, id: &str) -> Result<()> {
        let number = self.parse(id)?;
        self.taken.insert(number);
        Ok(())
    }

    /// Assign the next id
    pub fn allocate(&mut self) -> Result<String> {
        let mut candidate = self.next_candidate()?;
        if self.taken.contains(&candidate) {
            let recomputed = self.taken.last().copied().unwrap_or(0);
            tracing::warn!(
                collided = %self.format(candidate),
                watermark = recomputed,
                "id collision, recomputing watermark"
            );
            self.max = self.max.max(recomputed);
            candidate = self.next_candidate()?;
            if self.taken.contains(&candidate) {
                return Err(Error::DuplicateIdCollision {
                    id: self.format(candidate),
                });
            }
        }
        self.taken.insert(candidate);
        self.max = candidate;
        Ok(self.format(candidate))
    }

    fn next_candidate(&self) -> Result<u64> {
        self.max.checked_add(1).ok_or_else(|| Error::DuplicateIdCollision {
            id: self.format(self.max),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continues_from_max() {
        let existing: Vec<String> = (1..=37).map(|n| format!("F{:05}", n)).collect();
        let mut watermark = Watermark::scan("F", &existing).unwrap();
        assert_eq!(watermark.max(), 37);

        let new_ids: Vec<String> = (0..3).map(|_| watermark.allocate().unwrap()).collect();
        assert_eq!(new_ids, vec!["F00038", "F00039", "F00040"]);
        for id in &new_ids {
            assert!(!existing.contains(id));
        }
    }

    #[test]
    fn test_gaps_do_not_get_reused() {
        let mut watermark = Watermark::scan("F", ["F00002", "F00037", ""]).unwrap();
        assert_eq!(watermark.allocate().unwrap(), "F00038");
    }

    #[test]
    fn test_empty_sink_starts_at_one() {
        let mut watermark = Watermark::scan("G", Vec::<String>::new()).unwrap();
        assert_eq!(watermark.allocate().unwrap(), "G00001");
    }

    #[test]
    fn test_malformed_id_rejected() {
        let err = Watermark::scan("F", ["F00001", "X12"]).unwrap_err();
        assert!(matches!(err, Error::MalformedId { ref id, .. } if id == "X12"));
        assert!(Watermark::new("F").parse("F").is_err());
        assert!(Watermark::new("F").parse("F12a").is_err());
    }

    #[test]
    fn test_collision_recomputes_watermark() {
        let mut watermark = Watermark::scan("F", ["F00037"]).unwrap();
        watermark.reserve("F00038").unwrap();
        watermark.reserve("F00041").unwrap();
        assert_eq!(watermark.allocate().unwrap(), "F00042");
        assert_eq!(watermark.allocate().unwrap(), "F00043");
    }

    #[test]
    fn test_overflow_is_a_collision() {
        let mut watermark = Watermark::new("F");
        watermark.max = u64::MAX;
        assert!(matches!(watermark.allocate(), Err(Error::DuplicateIdCollision { .. })));
    }
}
