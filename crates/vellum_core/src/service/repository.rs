//! Catalog repository facade.
//!
//! # Responsibility
//! - Own the SQLite connection and hand out read models, historical views,
//!   and explicit write transactions.
//! - Run the purge engine: plan first, then apply atomically with foreign
//!   key checks deferred to transaction end.
//!
//! # Invariants
//! - Every write goes through `begin_transaction`; the facade itself never
//!   mutates entity tables outside purge.
//! - `purge_revision` commits plan and ledger outcome in one SQL
//!   transaction; a failed step leaves the store untouched.

use crate::db::{open_db, open_db_in_memory, rebuild_db};
use crate::model::attachment::AttachmentRecord;
use crate::model::dataset::{DatasetFields, DatasetRecord};
use crate::model::entity::{ContinuityId, EntityKind, Snapshot};
use crate::model::revision::{Revision, RevisionId};
use crate::model::tag::TagRecord;
use crate::purge::{apply_repair, plan_repair, RepairPlan};
use crate::repo::snapshot_repo::{
    continuities_with_broken_current, continuities_without_snapshots, snapshot_as_of, DatasetKind,
    RevisionedKind,
};
use crate::repo::catalog_repo::{self, DatasetListQuery};
use crate::repo::ledger_repo::{self, HistoryQuery};
use crate::repo::RepoError;
use crate::service::transaction::Transaction;
use crate::service::{CatalogError, CatalogResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::time::Instant;

/// Versioned catalog store over one SQLite connection.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    /// Opens (creating if needed) a catalog database file.
    pub fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    /// Opens a fresh in-memory catalog, mainly for tests.
    pub fn open_in_memory() -> CatalogResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    /// Wraps an already-bootstrapped connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Raw connection access for callers composing their own reads.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts a buffered write transaction. Exclusive borrow: at most one
    /// open transaction per repository.
    pub fn begin_transaction(&mut self) -> Transaction<'_> {
        Transaction::new(&mut self.conn)
    }

    // ---- ledger ----

    /// The most recent revision, if any commit has ever happened.
    pub fn youngest_revision(&self) -> CatalogResult<Option<Revision>> {
        Ok(ledger_repo::youngest_revision(&self.conn)?)
    }

    /// Loads one ledger row by id.
    pub fn get_revision(&self, id: RevisionId) -> CatalogResult<Option<Revision>> {
        Ok(ledger_repo::get_revision(&self.conn, id)?)
    }

    /// Pages through the ledger, most recent first.
    pub fn history(&self, query: &HistoryQuery) -> CatalogResult<Vec<Revision>> {
        Ok(ledger_repo::list_history(&self.conn, query)?)
    }

    /// Stamps moderation approval time on one revision.
    pub fn approve_revision(&self, id: RevisionId) -> CatalogResult<()> {
        if ledger_repo::set_approved(&self.conn, id)? {
            Ok(())
        } else {
            Err(CatalogError::RevisionNotFound(id))
        }
    }

    // ---- reads ----

    /// Loads one dataset through its current snapshot, tags included.
    pub fn get_dataset(
        &self,
        name: &str,
        include_deleted: bool,
    ) -> CatalogResult<Option<DatasetRecord>> {
        Ok(catalog_repo::get_dataset(&self.conn, name, include_deleted)?)
    }

    /// Lists active datasets with optional tag filter and pagination.
    pub fn list_datasets(&self, query: &DatasetListQuery) -> CatalogResult<Vec<DatasetRecord>> {
        Ok(catalog_repo::list_datasets(&self.conn, query)?)
    }

    /// Loads one tag through its current snapshot.
    pub fn get_tag(&self, name: &str, include_deleted: bool) -> CatalogResult<Option<TagRecord>> {
        Ok(catalog_repo::get_tag(&self.conn, name, include_deleted)?)
    }

    /// All active tag names, sorted.
    pub fn list_tags(&self) -> CatalogResult<Vec<String>> {
        Ok(catalog_repo::list_tags(&self.conn)?)
    }

    /// Attachments of one dataset. The dataset itself must exist.
    pub fn attachments(
        &self,
        dataset_name: &str,
        include_deleted: bool,
    ) -> CatalogResult<Vec<AttachmentRecord>> {
        let dataset_id = catalog_repo::find_dataset_id(&self.conn, dataset_name)?
            .ok_or_else(|| CatalogError::DatasetNotFound(dataset_name.to_string()))?;
        Ok(catalog_repo::attachments_for_dataset(
            &self.conn,
            dataset_id,
            include_deleted,
        )?)
    }

    // ---- historical views ----

    /// A dataset's fields and state as of `revision`. `None` means the
    /// dataset did not exist yet at that point.
    pub fn dataset_as_of(
        &self,
        name: &str,
        revision: &Revision,
    ) -> CatalogResult<Option<Snapshot<DatasetFields>>> {
        let Some(continuity_id) = catalog_repo::find_dataset_id(&self.conn, name)? else {
            return Ok(None);
        };
        self.as_of::<DatasetKind>(continuity_id, revision)
    }

    /// Generic point-in-time read: the snapshot of one continuity with the
    /// largest revision id not exceeding `revision`.
    pub fn as_of<K: RevisionedKind>(
        &self,
        continuity_id: ContinuityId,
        revision: &Revision,
    ) -> CatalogResult<Option<Snapshot<K::Fields>>> {
        Ok(snapshot_as_of::<K>(&self.conn, continuity_id, revision.id)?)
    }

    // ---- purge ----

    /// Destructively excises one revision from history.
    ///
    /// Plans the repair from the stored chains, applies it together with the
    /// ledger outcome (tombstone rewrite when `leave_record`, row deletion
    /// otherwise) in a single SQL transaction, and returns the executed plan.
    pub fn purge_revision(
        &mut self,
        revision: &Revision,
        leave_record: bool,
    ) -> CatalogResult<RepairPlan> {
        let started_at = Instant::now();
        if ledger_repo::get_revision(&self.conn, revision.id)?.is_none() {
            return Err(CatalogError::RevisionNotFound(revision.id));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Repairs cross FK edges mid-flight; check them at commit instead.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;

        let plan = plan_repair(&tx, revision.id)?;
        apply_repair(&tx, &plan, leave_record)?;
        if let Err(err) = tx.commit() {
            return Err(purge_commit_error(err, revision.id));
        }

        info!(
            "event=purge module=purge status=ok revision={} actions={} leave_record={} duration_ms={}",
            plan.revision_id,
            plan.actions.len(),
            leave_record,
            started_at.elapsed().as_millis()
        );
        Ok(plan)
    }

    // ---- maintenance ----

    /// Scans every entity kind for continuities that violate the snapshot
    /// chain contract. An empty result means the store is consistent.
    pub fn verify_integrity(&self) -> CatalogResult<Vec<String>> {
        let mut findings = Vec::new();
        for kind in EntityKind::ALL {
            for continuity_id in continuities_without_snapshots(&self.conn, kind)? {
                findings.push(format!("{kind} {continuity_id}: continuity has no snapshots"));
            }
            for continuity_id in continuities_with_broken_current(&self.conn, kind)? {
                findings.push(format!(
                    "{kind} {continuity_id}: current flag missing, duplicated, or not newest"
                ));
            }
        }
        Ok(findings)
    }

    /// Drops every table and reapplies migrations from scratch. Intended
    /// for tests and local tooling; all data is lost.
    pub fn rebuild(&mut self) -> CatalogResult<()> {
        Ok(rebuild_db(&mut self.conn)?)
    }
}

/// Deferred FK enforcement reports dangling references only at commit.
/// A repair that would orphan association rows from later revisions ends
/// here; name the situation instead of leaking a bare constraint failure.
fn purge_commit_error(err: rusqlite::Error, revision_id: RevisionId) -> CatalogError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return CatalogError::Repo(RepoError::Invariant(format!(
                "revision {revision_id} cannot be purged: an entity it created is still \
                 referenced by associations from later revisions; purge those revisions first"
            )));
        }
    }
    CatalogError::from(err)
}
