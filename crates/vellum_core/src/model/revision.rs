//! Revision ledger record.
//!
//! # Responsibility
//! - Define the immutable record marking one committed batch of mutations.
//!
//! # Invariants
//! - `id` values are totally ordered and never reused, even after purge.
//! - A committed revision only ever changes through the purge engine
//!   rewriting `message` to the retained-record sentinel.

use serde::{Deserialize, Serialize};

/// Ordered ledger identifier assigned at commit time.
pub type RevisionId = i64;

/// Message written in place of a purged revision's original message when
/// the ledger row is retained for adjacency.
pub const PURGED_MESSAGE: &str = "PURGED";

/// One committed batch of entity mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Monotonic ledger position.
    pub id: RevisionId,
    /// Commit wall-clock time in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Free-form author identifier supplied by the committer.
    pub author: String,
    /// Commit message; `PURGED` after a record-keeping purge.
    pub message: String,
    /// Moderation approval time, when a workflow sets one.
    pub approved_timestamp_ms: Option<i64>,
}

impl Revision {
    /// Returns whether this ledger row is a purge tombstone.
    pub fn is_purged_record(&self) -> bool {
        self.message == PURGED_MESSAGE
    }
}
