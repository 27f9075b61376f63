//! Dataset attachment domain model.
//!
//! # Responsibility
//! - Define the attachment's revisioned fields and read model.
//!
//! # Invariants
//! - An attachment exists only in the context of one dataset; soft-deleting
//!   the dataset cascades to its active attachments in the same revision.

use crate::model::entity::ContinuityId;
use crate::model::revision::RevisionId;
use crate::model::state::EntityState;
use serde::{Deserialize, Serialize};

/// Identity columns stored on the attachment continuity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentIdentity {
    /// Owning dataset continuity.
    pub dataset_id: ContinuityId,
    /// Stable position within the dataset's attachment list.
    pub ordinal: i64,
}

/// Revisioned attachment fields; one full copy per snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentFields {
    /// Download or reference location of the attached resource.
    pub url: String,
    /// Optional human-facing description.
    pub description: Option<String>,
}

/// Read model resolved through an attachment's current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    /// Stable continuity id.
    pub continuity_id: ContinuityId,
    /// Owning dataset continuity.
    pub dataset_id: ContinuityId,
    /// Stable position within the dataset's attachment list.
    pub ordinal: i64,
    /// Current revisioned field values.
    pub fields: AttachmentFields,
    /// Lifecycle state of the current snapshot.
    pub state: EntityState,
    /// Revision that produced the current snapshot.
    pub revision_id: RevisionId,
}
