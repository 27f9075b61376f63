//! Continuity/snapshot vocabulary shared by every versioned entity kind.
//!
//! # Responsibility
//! - Define stable continuity identifiers and the generic snapshot shape.
//! - Enumerate the closed set of entity kinds with their storage mapping
//!   and declared dependency relation.
//!
//! # Invariants
//! - A `ContinuityId` is never reused for another logical entity.
//! - `EntityKind::depends_on` must describe an acyclic relation; the purge
//!   planner verifies this before touching any row.

use crate::model::revision::RevisionId;
use crate::model::state::EntityState;
use uuid::Uuid;

/// Stable identity of one versioned entity instance across its history.
pub type ContinuityId = Uuid;

/// Full copy of an entity's revisioned fields as they stood immediately
/// after one revision, plus its lifecycle tag and `current` marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<F> {
    /// Owning continuity.
    pub continuity_id: ContinuityId,
    /// Revision that produced this snapshot.
    pub revision_id: RevisionId,
    /// Revisioned field values.
    pub fields: F,
    /// Lifecycle state as of this revision.
    pub state: EntityState,
    /// Marks the live row; at most one per continuity.
    pub current: bool,
}

/// Closed set of versioned entity kinds in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Dataset,
    Tag,
    Attachment,
    DatasetTag,
}

impl EntityKind {
    /// Every kind, in declaration order. Processing order for purge is a
    /// topological sort over [`EntityKind::depends_on`], not this list.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Dataset,
        EntityKind::Tag,
        EntityKind::Attachment,
        EntityKind::DatasetTag,
    ];

    /// Stable lowercase label used in logs and error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Tag => "tag",
            Self::Attachment => "attachment",
            Self::DatasetTag => "dataset_tag",
        }
    }

    /// Table holding the identity row per entity instance.
    pub fn continuity_table(self) -> &'static str {
        match self {
            Self::Dataset => "datasets",
            Self::Tag => "tags",
            Self::Attachment => "attachments",
            Self::DatasetTag => "dataset_tags",
        }
    }

    /// Table holding one row per (continuity, revision) pair.
    pub fn snapshot_table(self) -> &'static str {
        match self {
            Self::Dataset => "dataset_revisions",
            Self::Tag => "tag_revisions",
            Self::Attachment => "attachment_revisions",
            Self::DatasetTag => "dataset_tag_revisions",
        }
    }

    /// Identity/FK columns stored on the continuity row.
    pub fn identity_columns(self) -> &'static [&'static str] {
        match self {
            Self::Dataset => &["name"],
            Self::Tag => &["name"],
            Self::Attachment => &["dataset_uuid", "ordinal"],
            Self::DatasetTag => &["dataset_uuid", "tag_uuid"],
        }
    }

    /// Revisioned field columns copied into every snapshot row.
    pub fn field_columns(self) -> &'static [&'static str] {
        match self {
            Self::Dataset => &["title", "notes", "url"],
            Self::Tag => &[],
            Self::Attachment => &["url", "description"],
            Self::DatasetTag => &[],
        }
    }

    /// Kinds this kind references by foreign key. Association kinds must be
    /// repaired after the kinds they point at.
    pub fn depends_on(self) -> &'static [EntityKind] {
        match self {
            Self::Dataset => &[],
            Self::Tag => &[],
            Self::Attachment => &[EntityKind::Dataset],
            Self::DatasetTag => &[EntityKind::Dataset, EntityKind::Tag],
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
