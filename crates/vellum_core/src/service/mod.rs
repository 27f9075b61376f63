//! Revision lifecycle orchestration.
//!
//! # Responsibility
//! - Expose the catalog's public write surface: explicit transactions,
//!   commit/rollback, purge, and current-state reads.
//! - Keep callers decoupled from SQL and chain-surgery details.
//!
//! # Invariants
//! - Every mutation happens inside an explicit [`Transaction`] value; there
//!   is no ambient session or process-wide current transaction.
//! - State changes route through `EntityState::can_become` before anything
//!   is buffered.
//!
//! [`Transaction`]: transaction::Transaction

use crate::model::entity::{ContinuityId, EntityKind};
use crate::model::revision::RevisionId;
use crate::model::state::EntityState;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod repository;
pub mod transaction;

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Error surface of the catalog write and lifecycle APIs.
#[derive(Debug)]
pub enum CatalogError {
    /// Commit found no effective mutation; an empty revision is a caller
    /// logic error and is never silently ignored.
    EmptyRevision,
    /// Named dataset does not exist (in any state) for a targeted write.
    DatasetNotFound(String),
    /// Named tag does not exist (in any state) for a targeted write.
    TagNotFound(String),
    /// No link continuity exists for the given dataset/tag pair.
    LinkNotFound { dataset: String, tag: String },
    /// No attachment at the given ordinal for the dataset.
    AttachmentNotFound { dataset: String, ordinal: i64 },
    /// Targeted revision id is absent from the ledger.
    RevisionNotFound(RevisionId),
    /// Creating an entity whose natural key already names a live one.
    AlreadyExists { kind: EntityKind, key: String },
    /// Input name/tag failed normalization.
    InvalidName(String),
    /// Requested state change is not a legal transition.
    IllegalStateChange {
        kind: EntityKind,
        continuity_id: ContinuityId,
        from: EntityState,
        to: EntityState,
    },
    /// Persistence-layer failure, including invariant violations detected
    /// by the purge planner.
    Repo(RepoError),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRevision => {
                write!(f, "transaction mutated nothing; refusing to commit an empty revision")
            }
            Self::DatasetNotFound(name) => write!(f, "dataset not found: {name}"),
            Self::TagNotFound(name) => write!(f, "tag not found: {name}"),
            Self::LinkNotFound { dataset, tag } => {
                write!(f, "dataset {dataset} has no link to tag {tag}")
            }
            Self::AttachmentNotFound { dataset, ordinal } => {
                write!(f, "dataset {dataset} has no attachment at ordinal {ordinal}")
            }
            Self::RevisionNotFound(id) => write!(f, "revision not found: {id}"),
            Self::AlreadyExists { kind, key } => write!(f, "{kind} already exists: {key}"),
            Self::InvalidName(value) => write!(f, "invalid name: `{value}`"),
            Self::IllegalStateChange {
                kind,
                continuity_id,
                from,
                to,
            } => write!(
                f,
                "illegal state change for {kind} {continuity_id}: {} -> {}",
                from.as_db(),
                to.as_db()
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CatalogError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl From<crate::db::DbError> for CatalogError {
    fn from(value: crate::db::DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}
