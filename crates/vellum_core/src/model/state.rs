//! Soft-delete state machine shared by all snapshot chains.
//!
//! # Responsibility
//! - Define the closed set of lifecycle states a snapshot can carry.
//! - Centralize every legal transition in one place.
//!
//! # Invariants
//! - No caller mutates state fields directly; changes go through
//!   `can_become` checks before a snapshot is buffered.
//! - Purge is not a transition: it is chain surgery outside this machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state carried by every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Written but not yet published.
    Pending,
    /// Live and visible to ordinary reads.
    Active,
    /// Soft-deleted tombstone; history stays intact and restorable.
    Deleted,
}

impl EntityState {
    /// Returns whether moving from `self` to `next` is a legal transition.
    ///
    /// Legal moves: `Pending -> Active`, `Pending -> Deleted`,
    /// `Active -> Deleted`, `Deleted -> Active`. A same-state rewrite is
    /// not a transition; callers treat it as a potential no-op write.
    pub fn can_become(self, next: EntityState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Deleted)
                | (Self::Active, Self::Deleted)
                | (Self::Deleted, Self::Active)
        )
    }

    /// Returns whether ordinary reads should see entities in this state.
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Database column representation.
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    /// Parses the database column representation.
    pub fn parse_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EntityState;

    #[test]
    fn publish_delete_restore_cycle_is_legal() {
        assert!(EntityState::Pending.can_become(EntityState::Active));
        assert!(EntityState::Active.can_become(EntityState::Deleted));
        assert!(EntityState::Deleted.can_become(EntityState::Active));
    }

    #[test]
    fn nothing_returns_to_pending() {
        assert!(!EntityState::Active.can_become(EntityState::Pending));
        assert!(!EntityState::Deleted.can_become(EntityState::Pending));
    }

    #[test]
    fn same_state_is_not_a_transition() {
        assert!(!EntityState::Active.can_become(EntityState::Active));
        assert!(!EntityState::Deleted.can_become(EntityState::Deleted));
        assert!(!EntityState::Pending.can_become(EntityState::Pending));
    }

    #[test]
    fn db_representation_round_trips() {
        for state in [
            EntityState::Pending,
            EntityState::Active,
            EntityState::Deleted,
        ] {
            assert_eq!(EntityState::parse_db(state.as_db()), Some(state));
        }
        assert_eq!(EntityState::parse_db("purged"), None);
    }
}
