//! Entity types for the CEC dataset
//!
//! Five tables make up one table generation:
//! - `Department`: stable department_id plus a unique display name
//! - `Capability`: research capability
//! - `CapabilityDepartment`: many-to-many link between the two
//! - `Faculty`: scraped catalog entries, optionally tied to a department
//! - `Grant`: funding announcements, always tied to a department

use serde::{Deserialize, Serialize};

/// The entity kinds, in parent-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Department,
    Capability,
    CapabilityDepartment,
    Faculty,
    Grant,
}

impl EntityKind {
    /// Get the string representation of the entity kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Department => "department",
            EntityKind::Capability => "capability",
            EntityKind::CapabilityDepartment => "capability_department",
            EntityKind::Faculty => "faculty",
            EntityKind::Grant => "grant",
        }
    }

    /// Name of the backing table
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Department => "departments",
            EntityKind::Capability => "capabilities",
            EntityKind::CapabilityDepartment => "capability_departments",
            EntityKind::Faculty => "faculty",
            EntityKind::Grant => "grants",
        }
    }

    /// All entity kinds, parents before dependents
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Department,
            EntityKind::Capability,
            EntityKind::CapabilityDepartment,
            EntityKind::Faculty,
            EntityKind::Grant,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub department_id: String,
    pub department_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub capabilities_id: String,
    pub capability_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityDepartment {
    pub capabilities_id: String,
    pub department_id: String,
}

/// A faculty member as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faculty {
    pub faculty_id: String,
    /// "Last, First" as printed in the catalog
    pub full_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub department_id: Option<String>,
    pub college: Option<String>,
    pub academic_history: Option<String>,
}

/// One grant row. Multi-awardee announcements produce one row per awardee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grant_id: String,
    /// Whole dollars
    pub funding: Option<i64>,
    pub sponsor: Option<String>,
    pub awardee: Option<String>,
    pub title: Option<String>,
    /// ISO `YYYY-MM-DD` when the source date parsed
    pub date: Option<String>,
    pub is_anticipated: bool,
    pub capabilities_id: Option<String>,
    pub department_id: String,
    pub faculty_id: Option<String>,
}

/// A complete, normalized table generation ready for the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub departments: Vec<Department>,
    pub capabilities: Vec<Capability>,
    pub capability_departments: Vec<CapabilityDepartment>,
    pub faculty: Vec<Faculty>,
    pub grants: Vec<Grant>,
}

impl Dataset {
    /// Number of rows held for an entity
    pub fn len_of(&self, entity: EntityKind) -> usize {
        match entity {
            EntityKind::Department => self.departments.len(),
            EntityKind::Capability => self.capabilities.len(),
            EntityKind::CapabilityDepartment => self.capability_departments.len(),
            EntityKind::Faculty => self.faculty.len(),
            EntityKind::Grant => self.grants.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_order_is_parent_first() {
        let all = EntityKind::all();
        let pos = |e| all.iter().position(|k| *k == e).unwrap();
        assert!(pos(EntityKind::Department) < pos(EntityKind::Grant));
        assert!(pos(EntityKind::Department) < pos(EntityKind::Faculty));
        assert!(pos(EntityKind::Capability) < pos(EntityKind::CapabilityDepartment));
        assert!(pos(EntityKind::Faculty) < pos(EntityKind::Grant));
    }
}
