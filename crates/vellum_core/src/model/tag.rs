//! Tag and dataset-tag link domain models.
//!
//! # Responsibility
//! - Define the tag's (field-less) revisioned shape and read models.
//!
//! # Invariants
//! - Tag names are normalized to lowercase before persistence.
//! - A dataset-tag link is a versioned entity with its own snapshot chain,
//!   never a bare join row.

use crate::model::entity::ContinuityId;
use crate::model::revision::RevisionId;
use crate::model::state::EntityState;
use serde::{Deserialize, Serialize};

/// Tags carry no revisioned fields beyond lifecycle state; the snapshot
/// chain still records when the tag appeared, vanished, and returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFields;

/// Revisioned shape of a dataset-tag link; state only, like tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTagFields;

/// Identity columns stored on the dataset-tag continuity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetTagIdentity {
    /// Linked dataset continuity.
    pub dataset_id: ContinuityId,
    /// Linked tag continuity.
    pub tag_id: ContinuityId,
}

/// Read model resolved through a tag's current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    /// Stable continuity id.
    pub continuity_id: ContinuityId,
    /// Normalized natural key.
    pub name: String,
    /// Lifecycle state of the current snapshot.
    pub state: EntityState,
    /// Revision that produced the current snapshot.
    pub revision_id: RevisionId,
}

/// Read model for one dataset-tag link continuity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetTagRecord {
    /// Stable continuity id of the link itself.
    pub continuity_id: ContinuityId,
    /// Linked dataset continuity.
    pub dataset_id: ContinuityId,
    /// Linked tag continuity.
    pub tag_id: ContinuityId,
    /// Lifecycle state of the current snapshot.
    pub state: EntityState,
    /// Revision that produced the current snapshot.
    pub revision_id: RevisionId,
}

/// Normalizes one tag name; empty input yields `None`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_tag;

    #[test]
    fn normalize_tag_lowercases_and_trims() {
        assert_eq!(normalize_tag("  Economy "), Some("economy".to_string()));
        assert_eq!(normalize_tag("\t"), None);
    }
}
