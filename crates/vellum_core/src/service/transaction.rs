//! Buffered write transaction.
//!
//! # Responsibility
//! - Buffer typed continuity/snapshot writes until `commit` materializes
//!   them under one freshly assigned revision id.
//! - Enforce the soft-delete state machine and parent->child cascade at
//!   buffering time.
//!
//! # Invariants
//! - Nothing touches the database until `commit`; `rollback` is simply
//!   discarding the buffer.
//! - Writes that would reproduce the current snapshot byte-for-byte are
//!   dropped at commit; a commit with zero surviving writes fails with
//!   `EmptyRevision` instead of appending a hollow ledger row.
//! - Buffer order preserves creation dependencies: an op referencing
//!   another continuity is buffered after the op that created it.

use crate::model::attachment::{AttachmentFields, AttachmentIdentity};
use crate::model::dataset::DatasetFields;
use crate::model::entity::{ContinuityId, EntityKind};
use crate::model::revision::{Revision, RevisionId};
use crate::model::state::EntityState;
use crate::model::tag::{normalize_tag, DatasetTagFields, DatasetTagIdentity, TagFields};
use crate::repo::catalog_repo;
use crate::repo::ledger_repo::insert_revision;
use crate::repo::snapshot_repo::{
    current_snapshot, insert_continuity, insert_snapshot, AttachmentKind, DatasetKind,
    DatasetTagKind, TagKind,
};
use crate::service::{CatalogError, CatalogResult};
use log::{debug, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::time::Instant;
use uuid::Uuid;

/// Explicit write scope threaded through every mutation; owns the buffer
/// and exclusive access to the connection until committed or dropped.
pub struct Transaction<'conn> {
    conn: &'conn mut Connection,
    ops: Vec<PendingWrite>,
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Dataset {
        continuity_id: ContinuityId,
        new_name: Option<String>,
        fields: DatasetFields,
        state: EntityState,
    },
    Tag {
        continuity_id: ContinuityId,
        new_name: Option<String>,
        state: EntityState,
    },
    Attachment {
        continuity_id: ContinuityId,
        new_identity: Option<AttachmentIdentity>,
        fields: AttachmentFields,
        state: EntityState,
    },
    Link {
        continuity_id: ContinuityId,
        new_identity: Option<DatasetTagIdentity>,
        state: EntityState,
    },
}

impl PendingWrite {
    fn continuity_id(&self) -> ContinuityId {
        match self {
            Self::Dataset { continuity_id, .. }
            | Self::Tag { continuity_id, .. }
            | Self::Attachment { continuity_id, .. }
            | Self::Link { continuity_id, .. } => *continuity_id,
        }
    }

    fn kind(&self) -> EntityKind {
        match self {
            Self::Dataset { .. } => EntityKind::Dataset,
            Self::Tag { .. } => EntityKind::Tag,
            Self::Attachment { .. } => EntityKind::Attachment,
            Self::Link { .. } => EntityKind::DatasetTag,
        }
    }

    /// Replaces payload with `newer`, keeping the earlier creation marker
    /// so a created-then-edited entity still gets its continuity row.
    fn absorb(&mut self, newer: PendingWrite) {
        match (self, newer) {
            (
                Self::Dataset { fields, state, .. },
                Self::Dataset {
                    fields: newer_fields,
                    state: newer_state,
                    ..
                },
            ) => {
                *fields = newer_fields;
                *state = newer_state;
            }
            (
                Self::Tag { state, .. },
                Self::Tag {
                    state: newer_state, ..
                },
            ) => *state = newer_state,
            (
                Self::Attachment { fields, state, .. },
                Self::Attachment {
                    fields: newer_fields,
                    state: newer_state,
                    ..
                },
            ) => {
                *fields = newer_fields;
                *state = newer_state;
            }
            (
                Self::Link { state, .. },
                Self::Link {
                    state: newer_state, ..
                },
            ) => *state = newer_state,
            _ => debug_assert!(false, "absorb across entity kinds"),
        }
    }
}

impl<'conn> Transaction<'conn> {
    pub(crate) fn new(conn: &'conn mut Connection) -> Self {
        Self {
            conn,
            ops: Vec::new(),
        }
    }

    /// Returns whether no writes have been buffered yet.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of buffered writes (before no-op filtering at commit).
    pub fn buffered_writes(&self) -> usize {
        self.ops.len()
    }

    // ---- datasets ----

    /// Registers a new dataset, or resurrects a soft-deleted one under the
    /// same natural key (its history stays on one continuity).
    pub fn create_dataset(
        &mut self,
        name: &str,
        fields: DatasetFields,
    ) -> CatalogResult<ContinuityId> {
        let name = valid_name(name)?;
        match self.resolve_dataset(&name)? {
            Some(continuity_id) => {
                let (_, state) = self.dataset_view(continuity_id)?.ok_or_else(|| {
                    missing_chain(EntityKind::Dataset, continuity_id)
                })?;
                if state != EntityState::Deleted {
                    return Err(CatalogError::AlreadyExists {
                        kind: EntityKind::Dataset,
                        key: name,
                    });
                }
                self.guard(EntityKind::Dataset, continuity_id, state, EntityState::Active)?;
                self.buffer(PendingWrite::Dataset {
                    continuity_id,
                    new_name: None,
                    fields,
                    state: EntityState::Active,
                });
                Ok(continuity_id)
            }
            None => {
                let continuity_id = Uuid::new_v4();
                self.buffer(PendingWrite::Dataset {
                    continuity_id,
                    new_name: Some(name),
                    fields,
                    state: EntityState::Active,
                });
                Ok(continuity_id)
            }
        }
    }

    /// Registers a dataset in `Pending` state, invisible to ordinary reads
    /// until published.
    pub fn stage_dataset(
        &mut self,
        name: &str,
        fields: DatasetFields,
    ) -> CatalogResult<ContinuityId> {
        let name = valid_name(name)?;
        if self.resolve_dataset(&name)?.is_some() {
            return Err(CatalogError::AlreadyExists {
                kind: EntityKind::Dataset,
                key: name,
            });
        }
        let continuity_id = Uuid::new_v4();
        self.buffer(PendingWrite::Dataset {
            continuity_id,
            new_name: Some(name),
            fields,
            state: EntityState::Pending,
        });
        Ok(continuity_id)
    }

    /// Moves a staged dataset to `Active`.
    pub fn publish_dataset(&mut self, name: &str) -> CatalogResult<()> {
        let name = valid_name(name)?;
        let continuity_id = self
            .resolve_dataset(&name)?
            .ok_or(CatalogError::DatasetNotFound(name))?;
        let (fields, state) = self
            .dataset_view(continuity_id)?
            .ok_or_else(|| missing_chain(EntityKind::Dataset, continuity_id))?;
        self.guard(EntityKind::Dataset, continuity_id, state, EntityState::Active)?;
        self.buffer(PendingWrite::Dataset {
            continuity_id,
            new_name: None,
            fields,
            state: EntityState::Active,
        });
        Ok(())
    }

    /// Replaces a dataset's revisioned fields; lifecycle state unchanged.
    pub fn update_dataset(&mut self, name: &str, fields: DatasetFields) -> CatalogResult<()> {
        let name = valid_name(name)?;
        let continuity_id = self
            .resolve_dataset(&name)?
            .ok_or(CatalogError::DatasetNotFound(name))?;
        let (_, state) = self
            .dataset_view(continuity_id)?
            .ok_or_else(|| missing_chain(EntityKind::Dataset, continuity_id))?;
        self.buffer(PendingWrite::Dataset {
            continuity_id,
            new_name: None,
            fields,
            state,
        });
        Ok(())
    }

    /// Soft-deletes a dataset and cascades to its active attachments and
    /// tag links within the same revision.
    pub fn delete_dataset(&mut self, name: &str) -> CatalogResult<()> {
        let name = valid_name(name)?;
        let continuity_id = self
            .resolve_dataset(&name)?
            .ok_or(CatalogError::DatasetNotFound(name))?;
        let (fields, state) = self
            .dataset_view(continuity_id)?
            .ok_or_else(|| missing_chain(EntityKind::Dataset, continuity_id))?;
        self.guard(EntityKind::Dataset, continuity_id, state, EntityState::Deleted)?;
        self.buffer(PendingWrite::Dataset {
            continuity_id,
            new_name: None,
            fields,
            state: EntityState::Deleted,
        });
        self.cascade_dataset_children(continuity_id)?;
        Ok(())
    }

    /// Reverses a soft-delete by writing a further `Active` snapshot.
    pub fn restore_dataset(&mut self, name: &str) -> CatalogResult<()> {
        let name = valid_name(name)?;
        let continuity_id = self
            .resolve_dataset(&name)?
            .ok_or(CatalogError::DatasetNotFound(name))?;
        let (fields, state) = self
            .dataset_view(continuity_id)?
            .ok_or_else(|| missing_chain(EntityKind::Dataset, continuity_id))?;
        self.guard(EntityKind::Dataset, continuity_id, state, EntityState::Active)?;
        self.buffer(PendingWrite::Dataset {
            continuity_id,
            new_name: None,
            fields,
            state: EntityState::Active,
        });
        Ok(())
    }

    // ---- tags ----

    /// Registers a tag (normalized to lowercase), resurrecting a deleted
    /// continuity with the same name.
    pub fn create_tag(&mut self, name: &str) -> CatalogResult<ContinuityId> {
        let name = normalize_tag(name).ok_or_else(|| CatalogError::InvalidName(name.to_string()))?;
        match self.resolve_tag(&name)? {
            Some(continuity_id) => {
                let state = self
                    .tag_view(continuity_id)?
                    .ok_or_else(|| missing_chain(EntityKind::Tag, continuity_id))?;
                if state != EntityState::Deleted {
                    return Err(CatalogError::AlreadyExists {
                        kind: EntityKind::Tag,
                        key: name,
                    });
                }
                self.guard(EntityKind::Tag, continuity_id, state, EntityState::Active)?;
                self.buffer(PendingWrite::Tag {
                    continuity_id,
                    new_name: None,
                    state: EntityState::Active,
                });
                Ok(continuity_id)
            }
            None => {
                let continuity_id = Uuid::new_v4();
                self.buffer(PendingWrite::Tag {
                    continuity_id,
                    new_name: Some(name),
                    state: EntityState::Active,
                });
                Ok(continuity_id)
            }
        }
    }

    /// Soft-deletes a tag and cascades to its active dataset links.
    pub fn delete_tag(&mut self, name: &str) -> CatalogResult<()> {
        let name = normalize_tag(name).ok_or_else(|| CatalogError::InvalidName(name.to_string()))?;
        let continuity_id = self
            .resolve_tag(&name)?
            .ok_or(CatalogError::TagNotFound(name))?;
        let state = self
            .tag_view(continuity_id)?
            .ok_or_else(|| missing_chain(EntityKind::Tag, continuity_id))?;
        self.guard(EntityKind::Tag, continuity_id, state, EntityState::Deleted)?;
        self.buffer(PendingWrite::Tag {
            continuity_id,
            new_name: None,
            state: EntityState::Deleted,
        });

        for link in catalog_repo::links_for_tag(self.conn, continuity_id, true)? {
            self.buffer_link_state(link.continuity_id, EntityState::Deleted)?;
        }
        let pending: Vec<ContinuityId> = self
            .ops
            .iter()
            .filter_map(|op| match op {
                PendingWrite::Link {
                    continuity_id: link_id,
                    new_identity: Some(identity),
                    state: EntityState::Active,
                } if identity.tag_id == continuity_id => Some(*link_id),
                _ => None,
            })
            .collect();
        for link_id in pending {
            self.buffer_link_state(link_id, EntityState::Deleted)?;
        }
        Ok(())
    }

    /// Links a dataset to a tag, creating or resurrecting the tag and the
    /// link continuity as needed.
    pub fn tag_dataset(&mut self, dataset_name: &str, tag_name: &str) -> CatalogResult<()> {
        let dataset_name = valid_name(dataset_name)?;
        let dataset_id = self
            .resolve_dataset(&dataset_name)?
            .ok_or(CatalogError::DatasetNotFound(dataset_name))?;

        let tag_name =
            normalize_tag(tag_name).ok_or_else(|| CatalogError::InvalidName(tag_name.to_string()))?;
        let tag_id = match self.resolve_tag(&tag_name)? {
            Some(tag_id) => {
                let state = self
                    .tag_view(tag_id)?
                    .ok_or_else(|| missing_chain(EntityKind::Tag, tag_id))?;
                if state == EntityState::Deleted {
                    self.buffer(PendingWrite::Tag {
                        continuity_id: tag_id,
                        new_name: None,
                        state: EntityState::Active,
                    });
                }
                tag_id
            }
            None => {
                let tag_id = Uuid::new_v4();
                self.buffer(PendingWrite::Tag {
                    continuity_id: tag_id,
                    new_name: Some(tag_name),
                    state: EntityState::Active,
                });
                tag_id
            }
        };

        match self.resolve_link(dataset_id, tag_id)? {
            Some(link_id) => self.buffer_link_state(link_id, EntityState::Active),
            None => {
                self.buffer(PendingWrite::Link {
                    continuity_id: Uuid::new_v4(),
                    new_identity: Some(DatasetTagIdentity { dataset_id, tag_id }),
                    state: EntityState::Active,
                });
                Ok(())
            }
        }
    }

    /// Soft-deletes the link between a dataset and a tag.
    pub fn untag_dataset(&mut self, dataset_name: &str, tag_name: &str) -> CatalogResult<()> {
        let dataset_name = valid_name(dataset_name)?;
        let dataset_id = self
            .resolve_dataset(&dataset_name)?
            .ok_or_else(|| CatalogError::DatasetNotFound(dataset_name.clone()))?;
        let tag_name =
            normalize_tag(tag_name).ok_or_else(|| CatalogError::InvalidName(tag_name.to_string()))?;
        let tag_id = self
            .resolve_tag(&tag_name)?
            .ok_or_else(|| CatalogError::TagNotFound(tag_name.clone()))?;
        let link_id = self
            .resolve_link(dataset_id, tag_id)?
            .ok_or(CatalogError::LinkNotFound {
                dataset: dataset_name,
                tag: tag_name,
            })?;
        let state = self
            .link_view(link_id)?
            .ok_or_else(|| missing_chain(EntityKind::DatasetTag, link_id))?;
        self.guard(EntityKind::DatasetTag, link_id, state, EntityState::Deleted)?;
        self.buffer(PendingWrite::Link {
            continuity_id: link_id,
            new_identity: None,
            state: EntityState::Deleted,
        });
        Ok(())
    }

    // ---- attachments ----

    /// Adds an attachment at the next free ordinal of the dataset.
    pub fn add_attachment(
        &mut self,
        dataset_name: &str,
        fields: AttachmentFields,
    ) -> CatalogResult<ContinuityId> {
        let dataset_name = valid_name(dataset_name)?;
        let dataset_id = self
            .resolve_dataset(&dataset_name)?
            .ok_or(CatalogError::DatasetNotFound(dataset_name))?;

        let mut ordinal = catalog_repo::next_attachment_ordinal(self.conn, dataset_id)?;
        for op in &self.ops {
            if let PendingWrite::Attachment {
                new_identity: Some(identity),
                ..
            } = op
            {
                if identity.dataset_id == dataset_id && identity.ordinal >= ordinal {
                    ordinal = identity.ordinal + 1;
                }
            }
        }

        let continuity_id = Uuid::new_v4();
        self.buffer(PendingWrite::Attachment {
            continuity_id,
            new_identity: Some(AttachmentIdentity {
                dataset_id,
                ordinal,
            }),
            fields,
            state: EntityState::Active,
        });
        Ok(continuity_id)
    }

    /// Replaces an attachment's revisioned fields.
    pub fn update_attachment(
        &mut self,
        dataset_name: &str,
        ordinal: i64,
        fields: AttachmentFields,
    ) -> CatalogResult<()> {
        let (continuity_id, state) = self.require_attachment(dataset_name, ordinal)?;
        self.buffer(PendingWrite::Attachment {
            continuity_id,
            new_identity: None,
            fields,
            state,
        });
        Ok(())
    }

    /// Soft-deletes one attachment.
    pub fn delete_attachment(&mut self, dataset_name: &str, ordinal: i64) -> CatalogResult<()> {
        let (continuity_id, state) = self.require_attachment(dataset_name, ordinal)?;
        let (fields, _) = self
            .attachment_view(continuity_id)?
            .ok_or_else(|| missing_chain(EntityKind::Attachment, continuity_id))?;
        self.guard(EntityKind::Attachment, continuity_id, state, EntityState::Deleted)?;
        self.buffer(PendingWrite::Attachment {
            continuity_id,
            new_identity: None,
            fields,
            state: EntityState::Deleted,
        });
        Ok(())
    }

    // ---- lifecycle ----

    /// Assigns the next revision id and persists the ledger row plus every
    /// effective buffered write in one SQL transaction.
    ///
    /// # Errors
    /// - `EmptyRevision` when no buffered write survives no-op filtering.
    /// - Storage failures roll the whole transaction back untouched.
    pub fn commit(self, message: &str, author: &str) -> CatalogResult<Revision> {
        let started_at = Instant::now();
        let ops = self.ops;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut effective = Vec::new();
        for op in ops {
            if op_is_effective(&tx, &op)? {
                effective.push(op);
            }
        }

        if effective.is_empty() {
            drop(tx);
            warn!(
                "event=commit module=repository status=empty duration_ms={}",
                started_at.elapsed().as_millis()
            );
            return Err(CatalogError::EmptyRevision);
        }

        let revision = insert_revision(&tx, author, message)?;
        for op in &effective {
            apply_op(&tx, op, revision.id)?;
        }
        tx.commit()?;

        info!(
            "event=commit module=repository status=ok revision={} writes={} duration_ms={}",
            revision.id,
            effective.len(),
            started_at.elapsed().as_millis()
        );
        Ok(revision)
    }

    /// Discards every buffered write; no revision is created.
    pub fn rollback(self) {
        debug!(
            "event=rollback module=repository status=ok discarded={}",
            self.ops.len()
        );
    }

    // ---- internals ----

    fn buffer(&mut self, op: PendingWrite) {
        let continuity_id = op.continuity_id();
        let kind = op.kind();
        if let Some(existing) = self
            .ops
            .iter_mut()
            .find(|existing| existing.continuity_id() == continuity_id && existing.kind() == kind)
        {
            existing.absorb(op);
        } else {
            self.ops.push(op);
        }
    }

    fn buffer_link_state(
        &mut self,
        link_id: ContinuityId,
        state: EntityState,
    ) -> CatalogResult<()> {
        self.buffer(PendingWrite::Link {
            continuity_id: link_id,
            new_identity: None,
            state,
        });
        Ok(())
    }

    /// Same-state rewrites pass through (they become no-op candidates);
    /// genuine transitions must be legal.
    fn guard(
        &self,
        kind: EntityKind,
        continuity_id: ContinuityId,
        from: EntityState,
        to: EntityState,
    ) -> CatalogResult<()> {
        if from == to || from.can_become(to) {
            Ok(())
        } else {
            Err(CatalogError::IllegalStateChange {
                kind,
                continuity_id,
                from,
                to,
            })
        }
    }

    fn cascade_dataset_children(&mut self, dataset_id: ContinuityId) -> CatalogResult<()> {
        for link in catalog_repo::links_for_dataset(self.conn, dataset_id, true)? {
            let state = self
                .link_view(link.continuity_id)?
                .ok_or_else(|| missing_chain(EntityKind::DatasetTag, link.continuity_id))?;
            if state == EntityState::Active {
                self.buffer_link_state(link.continuity_id, EntityState::Deleted)?;
            }
        }
        let pending_links: Vec<ContinuityId> = self
            .ops
            .iter()
            .filter_map(|op| match op {
                PendingWrite::Link {
                    continuity_id,
                    new_identity: Some(identity),
                    state: EntityState::Active,
                } if identity.dataset_id == dataset_id => Some(*continuity_id),
                _ => None,
            })
            .collect();
        for link_id in pending_links {
            self.buffer_link_state(link_id, EntityState::Deleted)?;
        }

        for attachment in catalog_repo::attachments_for_dataset(self.conn, dataset_id, false)? {
            if let Some((fields, EntityState::Active)) =
                self.attachment_view(attachment.continuity_id)?
            {
                self.buffer(PendingWrite::Attachment {
                    continuity_id: attachment.continuity_id,
                    new_identity: None,
                    fields,
                    state: EntityState::Deleted,
                });
            }
        }
        let pending_attachments: Vec<(ContinuityId, AttachmentFields)> = self
            .ops
            .iter()
            .filter_map(|op| match op {
                PendingWrite::Attachment {
                    continuity_id,
                    new_identity: Some(identity),
                    fields,
                    state: EntityState::Active,
                } if identity.dataset_id == dataset_id => {
                    Some((*continuity_id, fields.clone()))
                }
                _ => None,
            })
            .collect();
        for (attachment_id, fields) in pending_attachments {
            self.buffer(PendingWrite::Attachment {
                continuity_id: attachment_id,
                new_identity: None,
                fields,
                state: EntityState::Deleted,
            });
        }
        Ok(())
    }

    fn require_attachment(
        &self,
        dataset_name: &str,
        ordinal: i64,
    ) -> CatalogResult<(ContinuityId, EntityState)> {
        let dataset_name = valid_name(dataset_name)?;
        let dataset_id = self
            .resolve_dataset(&dataset_name)?
            .ok_or_else(|| CatalogError::DatasetNotFound(dataset_name.clone()))?;

        let continuity_id = match catalog_repo::find_attachment_id(self.conn, dataset_id, ordinal)?
        {
            Some(id) => Some(id),
            None => self.ops.iter().find_map(|op| match op {
                PendingWrite::Attachment {
                    continuity_id,
                    new_identity: Some(identity),
                    ..
                } if identity.dataset_id == dataset_id && identity.ordinal == ordinal => {
                    Some(*continuity_id)
                }
                _ => None,
            }),
        }
        .ok_or(CatalogError::AttachmentNotFound {
            dataset: dataset_name,
            ordinal,
        })?;

        let (_, state) = self
            .attachment_view(continuity_id)?
            .ok_or_else(|| missing_chain(EntityKind::Attachment, continuity_id))?;
        Ok((continuity_id, state))
    }

    fn resolve_dataset(&self, name: &str) -> CatalogResult<Option<ContinuityId>> {
        if let Some(id) = catalog_repo::find_dataset_id(self.conn, name)? {
            return Ok(Some(id));
        }
        Ok(self.ops.iter().find_map(|op| match op {
            PendingWrite::Dataset {
                continuity_id,
                new_name: Some(pending_name),
                ..
            } if pending_name == name => Some(*continuity_id),
            _ => None,
        }))
    }

    fn resolve_tag(&self, name: &str) -> CatalogResult<Option<ContinuityId>> {
        if let Some(id) = catalog_repo::find_tag_id(self.conn, name)? {
            return Ok(Some(id));
        }
        Ok(self.ops.iter().find_map(|op| match op {
            PendingWrite::Tag {
                continuity_id,
                new_name: Some(pending_name),
                ..
            } if pending_name == name => Some(*continuity_id),
            _ => None,
        }))
    }

    fn resolve_link(
        &self,
        dataset_id: ContinuityId,
        tag_id: ContinuityId,
    ) -> CatalogResult<Option<ContinuityId>> {
        if let Some(id) = catalog_repo::find_link_id(self.conn, dataset_id, tag_id)? {
            return Ok(Some(id));
        }
        Ok(self.ops.iter().find_map(|op| match op {
            PendingWrite::Link {
                continuity_id,
                new_identity: Some(identity),
                ..
            } if identity.dataset_id == dataset_id && identity.tag_id == tag_id => {
                Some(*continuity_id)
            }
            _ => None,
        }))
    }

    /// Latest buffered view of a dataset, falling back to the stored
    /// current snapshot.
    fn dataset_view(
        &self,
        continuity_id: ContinuityId,
    ) -> CatalogResult<Option<(DatasetFields, EntityState)>> {
        for op in self.ops.iter().rev() {
            if let PendingWrite::Dataset {
                continuity_id: id,
                fields,
                state,
                ..
            } = op
            {
                if *id == continuity_id {
                    return Ok(Some((fields.clone(), *state)));
                }
            }
        }
        Ok(current_snapshot::<DatasetKind>(self.conn, continuity_id)?
            .map(|snapshot| (snapshot.fields, snapshot.state)))
    }

    fn tag_view(&self, continuity_id: ContinuityId) -> CatalogResult<Option<EntityState>> {
        for op in self.ops.iter().rev() {
            if let PendingWrite::Tag {
                continuity_id: id,
                state,
                ..
            } = op
            {
                if *id == continuity_id {
                    return Ok(Some(*state));
                }
            }
        }
        Ok(current_snapshot::<TagKind>(self.conn, continuity_id)?.map(|snapshot| snapshot.state))
    }

    fn link_view(&self, continuity_id: ContinuityId) -> CatalogResult<Option<EntityState>> {
        for op in self.ops.iter().rev() {
            if let PendingWrite::Link {
                continuity_id: id,
                state,
                ..
            } = op
            {
                if *id == continuity_id {
                    return Ok(Some(*state));
                }
            }
        }
        Ok(current_snapshot::<DatasetTagKind>(self.conn, continuity_id)?
            .map(|snapshot| snapshot.state))
    }

    fn attachment_view(
        &self,
        continuity_id: ContinuityId,
    ) -> CatalogResult<Option<(AttachmentFields, EntityState)>> {
        for op in self.ops.iter().rev() {
            if let PendingWrite::Attachment {
                continuity_id: id,
                fields,
                state,
                ..
            } = op
            {
                if *id == continuity_id {
                    return Ok(Some((fields.clone(), *state)));
                }
            }
        }
        Ok(current_snapshot::<AttachmentKind>(self.conn, continuity_id)?
            .map(|snapshot| (snapshot.fields, snapshot.state)))
    }
}

fn valid_name(name: &str) -> CatalogResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(CatalogError::InvalidName(name.to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

fn missing_chain(kind: EntityKind, continuity_id: ContinuityId) -> CatalogError {
    CatalogError::Repo(crate::repo::RepoError::Invariant(format!(
        "{kind} continuity {continuity_id} has no current snapshot"
    )))
}

/// A write is effective unless it reproduces the stored current snapshot
/// exactly; brand-new continuities are always effective.
fn op_is_effective(conn: &Connection, op: &PendingWrite) -> CatalogResult<bool> {
    match op {
        PendingWrite::Dataset {
            continuity_id,
            new_name,
            fields,
            state,
        } => {
            if new_name.is_some() {
                return Ok(true);
            }
            let stored = current_snapshot::<DatasetKind>(conn, *continuity_id)?;
            Ok(!matches!(stored, Some(ref snapshot) if snapshot.fields == *fields && snapshot.state == *state))
        }
        PendingWrite::Tag {
            continuity_id,
            new_name,
            state,
        } => {
            if new_name.is_some() {
                return Ok(true);
            }
            let stored = current_snapshot::<TagKind>(conn, *continuity_id)?;
            Ok(!matches!(stored, Some(ref snapshot) if snapshot.state == *state))
        }
        PendingWrite::Attachment {
            continuity_id,
            new_identity,
            fields,
            state,
        } => {
            if new_identity.is_some() {
                return Ok(true);
            }
            let stored = current_snapshot::<AttachmentKind>(conn, *continuity_id)?;
            Ok(!matches!(stored, Some(ref snapshot) if snapshot.fields == *fields && snapshot.state == *state))
        }
        PendingWrite::Link {
            continuity_id,
            new_identity,
            state,
        } => {
            if new_identity.is_some() {
                return Ok(true);
            }
            let stored = current_snapshot::<DatasetTagKind>(conn, *continuity_id)?;
            Ok(!matches!(stored, Some(ref snapshot) if snapshot.state == *state))
        }
    }
}

fn apply_op(conn: &Connection, op: &PendingWrite, revision_id: RevisionId) -> CatalogResult<()> {
    match op {
        PendingWrite::Dataset {
            continuity_id,
            new_name,
            fields,
            state,
        } => {
            if let Some(name) = new_name {
                insert_continuity::<DatasetKind>(conn, *continuity_id, name)?;
            }
            insert_snapshot::<DatasetKind>(conn, *continuity_id, revision_id, fields, *state)?;
        }
        PendingWrite::Tag {
            continuity_id,
            new_name,
            state,
        } => {
            if let Some(name) = new_name {
                insert_continuity::<TagKind>(conn, *continuity_id, name)?;
            }
            insert_snapshot::<TagKind>(conn, *continuity_id, revision_id, &TagFields, *state)?;
        }
        PendingWrite::Attachment {
            continuity_id,
            new_identity,
            fields,
            state,
        } => {
            if let Some(identity) = new_identity {
                insert_continuity::<AttachmentKind>(conn, *continuity_id, identity)?;
            }
            insert_snapshot::<AttachmentKind>(conn, *continuity_id, revision_id, fields, *state)?;
        }
        PendingWrite::Link {
            continuity_id,
            new_identity,
            state,
        } => {
            if let Some(identity) = new_identity {
                insert_continuity::<DatasetTagKind>(conn, *continuity_id, identity)?;
            }
            insert_snapshot::<DatasetTagKind>(
                conn,
                *continuity_id,
                revision_id,
                &DatasetTagFields,
                *state,
            )?;
        }
    }
    Ok(())
}
