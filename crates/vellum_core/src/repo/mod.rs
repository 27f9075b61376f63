//! Persistence layer for the revision ledger and snapshot chains.
//!
//! # Responsibility
//! - Keep all SQL details inside the core persistence boundary.
//! - Provide typed ledger and continuity/snapshot access used by the
//!   repository facade, transaction commit, and the purge engine.
//!
//! # Invariants
//! - Write helpers assume they run inside an enclosing SQL transaction
//!   owned by the caller; they never commit on their own.
//! - Read helpers report "nothing there" as `Ok(None)` / empty vectors,
//!   never as an error.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod catalog_repo;
pub mod ledger_repo;
pub mod snapshot_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence-layer error for ledger and snapshot operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap failure.
    Db(DbError),
    /// Persisted row cannot be converted to a valid domain value.
    InvalidData(String),
    /// Stored history breaks a structural invariant; indicates a prior bug
    /// and is never retried.
    Invariant(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Invariant(message) => write!(f, "history invariant violated: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::Invariant(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
