//! Purge engine: permanent removal of one revision's effects.
//!
//! # Responsibility
//! - Compute a `RepairPlan` for excising one revision from every snapshot
//!   chain it touched, as a pure function over the stored snapshot index.
//! - Apply a plan atomically inside the caller's SQL transaction.
//!
//! # Invariants
//! - Planning performs no writes; a plan can be inspected and tested
//!   without a live transaction.
//! - Kind processing order is a topological sort of `EntityKind::depends_on`
//!   with association kinds repaired before the kinds they reference; a
//!   dependency cycle is an invariant failure, not a silent fallback.
//! - Mid-chain repairs never touch snapshots newer than the purged one.

use crate::model::entity::{ContinuityId, EntityKind};
use crate::model::revision::RevisionId;
use crate::repo::snapshot_repo::{
    chain_length, continuities_touched_by, delete_continuity_row, delete_snapshot_row,
    promote_snapshot, recent_chain, snapshot_is_current,
};
use crate::repo::{ledger_repo, RepoError, RepoResult};
use rusqlite::Connection;

/// One surgical step of a revision repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    /// The purged revision created this entity and nothing else ever
    /// happened to it: remove the continuity and its sole snapshot.
    DeleteContinuity {
        kind: EntityKind,
        continuity_id: ContinuityId,
    },
    /// The purged snapshot is the current one: its immediate predecessor
    /// becomes the live state and the purged row is removed.
    RevertToPredecessor {
        kind: EntityKind,
        continuity_id: ContinuityId,
        predecessor_revision: RevisionId,
    },
    /// The purged snapshot sits mid-chain: remove that row only, leaving
    /// every newer snapshot untouched.
    DropSnapshotOnly {
        kind: EntityKind,
        continuity_id: ContinuityId,
    },
}

/// Complete repair for one revision, computed before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPlan {
    /// Revision being excised.
    pub revision_id: RevisionId,
    /// Surgical steps in kind processing order.
    pub actions: Vec<RepairAction>,
}

/// Kind processing order for repairs: a kind is placed only after every
/// kind that depends on it, so association rows are gone before the rows
/// they reference are touched. Returns `Invariant` on a dependency cycle.
pub fn processing_order() -> RepoResult<Vec<EntityKind>> {
    let mut placed: Vec<EntityKind> = Vec::with_capacity(EntityKind::ALL.len());

    while placed.len() < EntityKind::ALL.len() {
        let mut advanced = false;
        for kind in EntityKind::ALL {
            if placed.contains(&kind) {
                continue;
            }
            let dependents_placed = EntityKind::ALL
                .iter()
                .filter(|other| other.depends_on().contains(&kind))
                .all(|other| placed.contains(other));
            if dependents_placed {
                placed.push(kind);
                advanced = true;
            }
        }
        if !advanced {
            let stuck: Vec<&str> = EntityKind::ALL
                .iter()
                .filter(|kind| !placed.contains(kind))
                .map(|kind| kind.label())
                .collect();
            return Err(RepoError::Invariant(format!(
                "entity kind dependency cycle involving: {}",
                stuck.join(", ")
            )));
        }
    }

    Ok(placed)
}

/// Computes the repair for `revision_id` across every entity kind.
///
/// Pure with respect to the store: only reads. The classification per
/// affected continuity follows the chain shape at planning time; a chain
/// that contradicts the ledger (sole snapshot from a different revision, or
/// a current flag below the chain head) is reported as `Invariant`.
pub fn plan_repair(conn: &Connection, revision_id: RevisionId) -> RepoResult<RepairPlan> {
    let mut actions = Vec::new();

    for kind in processing_order()? {
        for continuity_id in continuities_touched_by(conn, kind, revision_id)? {
            actions.push(classify(conn, kind, continuity_id, revision_id)?);
        }
    }

    Ok(RepairPlan {
        revision_id,
        actions,
    })
}

/// Applies a computed plan plus the ledger-side outcome. Runs inside the
/// caller's SQL transaction; on any error the caller rolls back everything.
pub fn apply_repair(conn: &Connection, plan: &RepairPlan, leave_record: bool) -> RepoResult<()> {
    for action in &plan.actions {
        match *action {
            RepairAction::DeleteContinuity {
                kind,
                continuity_id,
            } => {
                if !delete_continuity_row(conn, kind, continuity_id)? {
                    return Err(RepoError::Invariant(format!(
                        "{kind} continuity {continuity_id} vanished during purge"
                    )));
                }
            }
            RepairAction::RevertToPredecessor {
                kind,
                continuity_id,
                predecessor_revision,
            } => {
                if !delete_snapshot_row(conn, kind, continuity_id, plan.revision_id)? {
                    return Err(RepoError::Invariant(format!(
                        "{kind} snapshot ({continuity_id}, {}) vanished during purge",
                        plan.revision_id
                    )));
                }
                if !promote_snapshot(conn, kind, continuity_id, predecessor_revision)? {
                    return Err(RepoError::Invariant(format!(
                        "{kind} predecessor snapshot ({continuity_id}, {predecessor_revision}) missing"
                    )));
                }
            }
            RepairAction::DropSnapshotOnly {
                kind,
                continuity_id,
            } => {
                if !delete_snapshot_row(conn, kind, continuity_id, plan.revision_id)? {
                    return Err(RepoError::Invariant(format!(
                        "{kind} snapshot ({continuity_id}, {}) vanished during purge",
                        plan.revision_id
                    )));
                }
            }
        }
    }

    let ledger_ok = if leave_record {
        ledger_repo::mark_purged(conn, plan.revision_id)?
    } else {
        ledger_repo::delete_revision(conn, plan.revision_id)?
    };
    if !ledger_ok {
        return Err(RepoError::Invariant(format!(
            "ledger row {} vanished during purge",
            plan.revision_id
        )));
    }

    Ok(())
}

fn classify(
    conn: &Connection,
    kind: EntityKind,
    continuity_id: ContinuityId,
    revision_id: RevisionId,
) -> RepoResult<RepairAction> {
    let head = recent_chain(conn, kind, continuity_id)?;
    let length = chain_length(conn, kind, continuity_id)?;

    let newest = head.first().ok_or_else(|| {
        RepoError::Invariant(format!(
            "{kind} continuity {continuity_id} has a revision-{revision_id} snapshot but an empty chain"
        ))
    })?;

    if length == 1 {
        if newest.revision_id != revision_id {
            return Err(RepoError::Invariant(format!(
                "{kind} continuity {continuity_id} sole snapshot is revision {} but revision {revision_id} claimed it",
                newest.revision_id
            )));
        }
        return Ok(RepairAction::DeleteContinuity {
            kind,
            continuity_id,
        });
    }

    if newest.revision_id == revision_id {
        let predecessor = head.get(1).ok_or_else(|| {
            RepoError::Invariant(format!(
                "{kind} continuity {continuity_id} reports {length} snapshots but no predecessor"
            ))
        })?;
        return Ok(RepairAction::RevertToPredecessor {
            kind,
            continuity_id,
            predecessor_revision: predecessor.revision_id,
        });
    }

    // Mid-chain: the purged snapshot must not hold the current flag, since
    // current always sits on the maximum revision id.
    match snapshot_is_current(conn, kind, continuity_id, revision_id)? {
        Some(false) => Ok(RepairAction::DropSnapshotOnly {
            kind,
            continuity_id,
        }),
        Some(true) => Err(RepoError::Invariant(format!(
            "{kind} continuity {continuity_id} holds current on mid-chain revision {revision_id}"
        ))),
        None => Err(RepoError::Invariant(format!(
            "{kind} snapshot ({continuity_id}, {revision_id}) disappeared while planning"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_repair, processing_order, RepairAction};
    use crate::db::open_db_in_memory;
    use crate::model::dataset::DatasetFields;
    use crate::model::entity::EntityKind;
    use crate::model::state::EntityState;
    use crate::repo::ledger_repo::insert_revision;
    use crate::repo::snapshot_repo::{insert_continuity, insert_snapshot, DatasetKind};
    use rusqlite::Connection;
    use uuid::Uuid;

    fn seed_dataset_history(conn: &Connection, edits: &[&str]) -> (Uuid, Vec<i64>) {
        let continuity_id = Uuid::new_v4();
        insert_continuity::<DatasetKind>(conn, continuity_id, &"seed".to_string()).unwrap();
        let mut revisions = Vec::new();
        for title in edits {
            let revision = insert_revision(conn, "tester", "seed").unwrap();
            let fields = DatasetFields {
                title: (*title).to_string(),
                ..DatasetFields::default()
            };
            insert_snapshot::<DatasetKind>(
                conn,
                continuity_id,
                revision.id,
                &fields,
                EntityState::Active,
            )
            .unwrap();
            revisions.push(revision.id);
        }
        (continuity_id, revisions)
    }

    #[test]
    fn processing_order_repairs_associations_before_their_targets() {
        let order = processing_order().unwrap();
        let position = |kind: EntityKind| order.iter().position(|k| *k == kind).unwrap();

        assert!(position(EntityKind::DatasetTag) < position(EntityKind::Dataset));
        assert!(position(EntityKind::DatasetTag) < position(EntityKind::Tag));
        assert!(position(EntityKind::Attachment) < position(EntityKind::Dataset));
        assert_eq!(order.len(), EntityKind::ALL.len());
    }

    #[test]
    fn sole_snapshot_plans_continuity_deletion() {
        let conn = open_db_in_memory().unwrap();
        let (continuity_id, revisions) = seed_dataset_history(&conn, &["only"]);

        let plan = plan_repair(&conn, revisions[0]).unwrap();
        assert_eq!(
            plan.actions,
            vec![RepairAction::DeleteContinuity {
                kind: EntityKind::Dataset,
                continuity_id,
            }]
        );
    }

    #[test]
    fn newest_snapshot_plans_revert_to_predecessor() {
        let conn = open_db_in_memory().unwrap();
        let (continuity_id, revisions) = seed_dataset_history(&conn, &["a", "b"]);

        let plan = plan_repair(&conn, revisions[1]).unwrap();
        assert_eq!(
            plan.actions,
            vec![RepairAction::RevertToPredecessor {
                kind: EntityKind::Dataset,
                continuity_id,
                predecessor_revision: revisions[0],
            }]
        );
    }

    #[test]
    fn mid_chain_snapshot_plans_row_drop_only() {
        let conn = open_db_in_memory().unwrap();
        let (continuity_id, revisions) = seed_dataset_history(&conn, &["a", "b", "c"]);

        let plan = plan_repair(&conn, revisions[1]).unwrap();
        assert_eq!(
            plan.actions,
            vec![RepairAction::DropSnapshotOnly {
                kind: EntityKind::Dataset,
                continuity_id,
            }]
        );
    }

    #[test]
    fn untouched_revision_yields_empty_plan() {
        let conn = open_db_in_memory().unwrap();
        let (_, revisions) = seed_dataset_history(&conn, &["a"]);

        let plan = plan_repair(&conn, revisions[0] + 100).unwrap();
        assert!(plan.actions.is_empty());
    }
}
