//! Versioned catalog domain model.
//!
//! # Responsibility
//! - Define the revision ledger record and per-kind revisioned field shapes.
//! - Define the continuity/snapshot vocabulary shared by every entity kind.
//! - Own the soft-delete state machine.
//!
//! # Invariants
//! - Every continuity is identified by a stable `ContinuityId`.
//! - Deletion is represented by `Deleted` snapshots, never by removing
//!   history; hard removal is the purge engine's job alone.

pub mod attachment;
pub mod dataset;
pub mod entity;
pub mod revision;
pub mod state;
pub mod tag;
