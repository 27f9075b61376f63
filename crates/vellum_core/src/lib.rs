//! Core domain logic for Vellum, a versioned catalog store.
//! This crate is the single source of truth for revision-history invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod purge;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, rebuild_db, DbError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::attachment::{AttachmentFields, AttachmentIdentity, AttachmentRecord};
pub use model::dataset::{DatasetFields, DatasetRecord};
pub use model::entity::{ContinuityId, EntityKind, Snapshot};
pub use model::revision::{Revision, RevisionId, PURGED_MESSAGE};
pub use model::state::EntityState;
pub use model::tag::{normalize_tag, DatasetTagIdentity, DatasetTagRecord, TagRecord};
pub use purge::{RepairAction, RepairPlan};
pub use repo::catalog_repo::DatasetListQuery;
pub use repo::ledger_repo::HistoryQuery;
pub use repo::{RepoError, RepoResult};
pub use service::repository::Repository;
pub use service::transaction::Transaction;
pub use service::{CatalogError, CatalogResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
