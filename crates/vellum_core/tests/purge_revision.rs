use vellum_core::{
    AttachmentFields, CatalogError, DatasetFields, EntityState, RepairAction, Repository,
    PURGED_MESSAGE,
};

fn fields(title: &str) -> DatasetFields {
    DatasetFields {
        title: title.to_string(),
        notes: None,
        url: None,
    }
}

fn commit_title(repo: &mut Repository, name: &str, title: &str) -> vellum_core::Revision {
    let mut tx = repo.begin_transaction();
    tx.update_dataset(name, fields(title)).unwrap();
    tx.commit(&format!("set {title}"), "ann").unwrap()
}

#[test]
fn purging_a_sole_revision_removes_the_continuity() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("Census")).unwrap();
    tx.tag_dataset("census", "official").unwrap();
    tx.add_attachment(
        "census",
        AttachmentFields {
            url: "https://example.org/census.csv".to_string(),
            description: None,
        },
    )
    .unwrap();
    let revision = tx.commit("seed", "ann").unwrap();

    let plan = repo.purge_revision(&revision, true).unwrap();
    // Everything the revision created disappears outright.
    assert!(plan
        .actions
        .iter()
        .all(|action| matches!(action, RepairAction::DeleteContinuity { .. })));
    assert_eq!(plan.actions.len(), 4);

    assert!(repo.get_dataset("census", true).unwrap().is_none());
    assert!(repo.get_tag("official", true).unwrap().is_none());
    assert!(repo.dataset_as_of("census", &revision).unwrap().is_none());

    // leave_record keeps the tombstone with a rewritten message.
    let tombstone = repo.get_revision(revision.id).unwrap().unwrap();
    assert_eq!(tombstone.message, PURGED_MESSAGE);
    assert!(repo.verify_integrity().unwrap().is_empty());
}

#[test]
fn purging_the_newest_revision_reverts_to_the_predecessor() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("A")).unwrap();
    tx.commit("create", "ann").unwrap();
    let rev_b = commit_title(&mut repo, "census", "B");

    let plan = repo.purge_revision(&rev_b, false).unwrap();
    assert_eq!(plan.actions.len(), 1);
    assert!(matches!(
        plan.actions[0],
        RepairAction::RevertToPredecessor { .. }
    ));

    let record = repo.get_dataset("census", false).unwrap().unwrap();
    assert_eq!(record.fields.title, "A");

    // Without leave_record the ledger row is gone and the youngest id drops.
    assert!(repo.get_revision(rev_b.id).unwrap().is_none());
    let youngest = repo.youngest_revision().unwrap().unwrap();
    assert!(youngest.id < rev_b.id);
    assert!(repo.verify_integrity().unwrap().is_empty());
}

#[test]
fn purging_a_mid_chain_revision_leaves_newer_state_intact() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("A")).unwrap();
    let rev_a = tx.commit("create", "ann").unwrap();
    let rev_b = commit_title(&mut repo, "census", "B");
    let rev_c = commit_title(&mut repo, "census", "C");

    let plan = repo.purge_revision(&rev_b, true).unwrap();
    assert_eq!(plan.actions.len(), 1);
    assert!(matches!(plan.actions[0], RepairAction::DropSnapshotOnly { .. }));

    // Current state is untouched.
    let record = repo.get_dataset("census", false).unwrap().unwrap();
    assert_eq!(record.fields.title, "C");
    assert_eq!(record.revision_id, rev_c.id);

    // Reads between the purged revision and its successor now resolve to
    // the predecessor's fields.
    let between = repo.dataset_as_of("census", &rev_b).unwrap().unwrap();
    assert_eq!(between.fields.title, "A");
    assert_eq!(between.revision_id, rev_a.id);

    // leave_record keeps the ledger contiguous around the gap.
    let tombstone = repo.get_revision(rev_b.id).unwrap().unwrap();
    assert_eq!(tombstone.message, PURGED_MESSAGE);
    assert!(repo.verify_integrity().unwrap().is_empty());
}

#[test]
fn purge_after_creation_revision_was_purged() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("Census v1")).unwrap();
    let rev_create = tx.commit("create census", "ann").unwrap();

    // One revision that both creates weather and edits census.
    let mut tx = repo.begin_transaction();
    tx.create_dataset("weather", fields("Weather")).unwrap();
    tx.update_dataset("census", fields("Census v2")).unwrap();
    let rev_mixed = tx.commit("weather + census edit", "ann").unwrap();

    // Purge census's creation first: its chain shrinks to the one snapshot
    // written by the mixed revision.
    repo.purge_revision(&rev_create, true).unwrap();
    let record = repo.get_dataset("census", false).unwrap().unwrap();
    assert_eq!(record.fields.title, "Census v2");

    // Purging the mixed revision now deletes both continuities: weather
    // because it created it, census because that lone edit is all that is
    // left of its chain.
    let plan = repo.purge_revision(&rev_mixed, true).unwrap();
    assert_eq!(plan.actions.len(), 2);
    assert!(plan
        .actions
        .iter()
        .all(|action| matches!(action, RepairAction::DeleteContinuity { .. })));
    assert!(repo.get_dataset("census", true).unwrap().is_none());
    assert!(repo.get_dataset("weather", true).unwrap().is_none());
    assert!(repo.verify_integrity().unwrap().is_empty());
}

#[test]
fn purging_a_creation_still_referenced_by_later_links_is_refused() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("Census")).unwrap();
    let rev_create = tx.commit("create", "ann").unwrap();

    // A later revision hangs a link off the dataset's continuity.
    let mut tx = repo.begin_transaction();
    tx.tag_dataset("census", "official").unwrap();
    tx.commit("tag", "ann").unwrap();

    // Removing the creation would orphan that link, so the whole purge is
    // refused and rolled back.
    let err = repo.purge_revision(&rev_create, true).unwrap_err();
    assert!(err.to_string().contains("still referenced"));

    let record = repo.get_dataset("census", false).unwrap().unwrap();
    assert_eq!(record.fields.title, "Census");
    assert_eq!(record.tags, vec!["official".to_string()]);
    let ledger = repo.get_revision(rev_create.id).unwrap().unwrap();
    assert_ne!(ledger.message, PURGED_MESSAGE);
    assert!(repo.verify_integrity().unwrap().is_empty());
}

#[test]
fn purging_an_unknown_revision_is_rejected() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("A")).unwrap();
    let mut revision = tx.commit("create", "ann").unwrap();
    revision.id += 100;

    let err = repo.purge_revision(&revision, true).unwrap_err();
    assert!(matches!(err, CatalogError::RevisionNotFound(_)));
}

#[test]
fn purging_an_untouched_revision_only_affects_the_ledger() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("A")).unwrap();
    tx.commit("create", "ann").unwrap();
    let mut tx = repo.begin_transaction();
    tx.create_dataset("weather", fields("W")).unwrap();
    let rev_w = tx.commit("weather", "ann").unwrap();

    // Purging the weather revision leaves census untouched.
    let plan = repo.purge_revision(&rev_w, true).unwrap();
    assert_eq!(plan.actions.len(), 1);
    assert!(repo.get_dataset("census", false).unwrap().is_some());
    assert!(repo.get_dataset("weather", true).unwrap().is_none());
}

#[test]
fn purging_a_delete_revision_resurrects_the_prior_state() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", fields("Census")).unwrap();
    tx.commit("create", "ann").unwrap();

    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    let rev_delete = tx.commit("remove", "ann").unwrap();
    assert!(repo.get_dataset("census", false).unwrap().is_none());

    // Excising the delete makes the active snapshot current again.
    repo.purge_revision(&rev_delete, false).unwrap();
    let record = repo.get_dataset("census", false).unwrap().unwrap();
    assert_eq!(record.state, EntityState::Active);
    assert_eq!(record.fields.title, "Census");
    assert!(repo.verify_integrity().unwrap().is_empty());
}
