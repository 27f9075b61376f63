//! Dataset domain model.
//!
//! # Responsibility
//! - Define the dataset's revisioned field set and catalog read model.
//!
//! # Invariants
//! - `name` is the natural key; it lives on the continuity row and never
//!   changes across the snapshot chain.

use crate::model::entity::ContinuityId;
use crate::model::revision::RevisionId;
use crate::model::state::EntityState;
use serde::{Deserialize, Serialize};

/// Revisioned dataset fields; one full copy per snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFields {
    /// Human-facing title.
    pub title: String,
    /// Free-form description markdown.
    pub notes: Option<String>,
    /// Upstream source location.
    pub url: Option<String>,
}

/// Read model resolved through a dataset's current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    /// Stable continuity id.
    pub continuity_id: ContinuityId,
    /// Natural key.
    pub name: String,
    /// Current revisioned field values.
    pub fields: DatasetFields,
    /// Lifecycle state of the current snapshot.
    pub state: EntityState,
    /// Revision that produced the current snapshot.
    pub revision_id: RevisionId,
    /// Names of tags actively linked to this dataset.
    pub tags: Vec<String>,
}
