use vellum_core::{AttachmentFields, CatalogError, DatasetFields, EntityState, Repository};

fn fields(title: &str) -> DatasetFields {
    DatasetFields {
        title: title.to_string(),
        notes: None,
        url: None,
    }
}

fn seed_tagged_dataset(repo: &mut Repository) {
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
    tx.commit("seed", "ann").unwrap();
}

#[test]
fn delete_hides_dataset_but_keeps_history() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);
    let created = repo.youngest_revision().unwrap().unwrap();

    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    tx.commit("remove", "ann").unwrap();

    assert!(repo.get_dataset("census", false).unwrap().is_none());
    let hidden = repo.get_dataset("census", true).unwrap().unwrap();
    assert_eq!(hidden.state, EntityState::Deleted);

    // History survives: the dataset is still readable as of its creation.
    let as_of = repo.dataset_as_of("census", &created).unwrap().unwrap();
    assert_eq!(as_of.state, EntityState::Active);
    assert_eq!(as_of.fields.title, "Census");
}

#[test]
fn delete_cascades_to_links_and_attachments() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);

    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    tx.commit("remove", "ann").unwrap();

    // The tag itself stays, but the link and attachment are deleted.
    assert!(repo.get_tag("official", false).unwrap().is_some());
    assert!(repo.attachments("census", false).unwrap().is_empty());
    let all = repo.attachments("census", true).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state, EntityState::Deleted);

    let official = repo
        .list_datasets(&vellum_core::DatasetListQuery {
            tag: Some("official".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert!(official.is_empty());
}

#[test]
fn repeated_delete_is_an_empty_revision() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);

    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    tx.commit("remove", "ann").unwrap();

    // Deleting again writes the same state back, which is a no-op.
    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    let err = tx.commit("remove again", "ann").unwrap_err();
    assert!(matches!(err, CatalogError::EmptyRevision));
}

#[test]
fn restore_reactivates_a_deleted_dataset() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);
    let continuity_before = repo
        .get_dataset("census", true)
        .unwrap()
        .unwrap()
        .continuity_id;

    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    tx.commit("remove", "ann").unwrap();

    let mut tx = repo.begin_transaction();
    tx.restore_dataset("census").unwrap();
    tx.commit("restore", "ann").unwrap();

    let restored = repo.get_dataset("census", false).unwrap().unwrap();
    assert_eq!(restored.state, EntityState::Active);
    assert_eq!(restored.fields.title, "Census");
    // Same continuity: the full edit history remains one chain.
    assert_eq!(restored.continuity_id, continuity_before);
}

#[test]
fn create_resurrects_a_deleted_continuity() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);
    let continuity_before = repo
        .get_dataset("census", true)
        .unwrap()
        .unwrap()
        .continuity_id;

    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    tx.commit("remove", "ann").unwrap();

    let mut tx = repo.begin_transaction();
    let continuity_after = tx.create_dataset("census", fields("Census v2")).unwrap();
    tx.commit("recreate", "ann").unwrap();

    assert_eq!(continuity_after, continuity_before);
    let record = repo.get_dataset("census", false).unwrap().unwrap();
    assert_eq!(record.fields.title, "Census v2");
}

#[test]
fn untag_and_retag_reuse_the_link_continuity() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);

    let mut tx = repo.begin_transaction();
    tx.untag_dataset("census", "official").unwrap();
    tx.commit("untag", "ann").unwrap();
    assert!(repo
        .get_dataset("census", false)
        .unwrap()
        .unwrap()
        .tags
        .is_empty());

    let mut tx = repo.begin_transaction();
    tx.tag_dataset("census", "official").unwrap();
    tx.commit("retag", "ann").unwrap();
    assert_eq!(
        repo.get_dataset("census", false).unwrap().unwrap().tags,
        vec!["official".to_string()]
    );

    let mut tx = repo.begin_transaction();
    let err = tx.untag_dataset("census", "unknown").unwrap_err();
    assert!(matches!(err, CatalogError::TagNotFound(_)));
    tx.rollback();
}

#[test]
fn deleting_a_tag_cascades_to_its_links() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);

    let mut tx = repo.begin_transaction();
    tx.create_dataset("budget", fields("Budget")).unwrap();
    tx.tag_dataset("budget", "official").unwrap();
    tx.commit("more", "ann").unwrap();

    let mut tx = repo.begin_transaction();
    tx.delete_tag("official").unwrap();
    tx.commit("drop tag", "ann").unwrap();

    assert!(repo.get_tag("official", false).unwrap().is_none());
    assert!(repo
        .get_dataset("census", false)
        .unwrap()
        .unwrap()
        .tags
        .is_empty());
    assert!(repo
        .get_dataset("budget", false)
        .unwrap()
        .unwrap()
        .tags
        .is_empty());
    assert!(repo.verify_integrity().unwrap().is_empty());
}

#[test]
fn update_on_deleted_dataset_keeps_it_hidden() {
    let mut repo = Repository::open_in_memory().unwrap();
    seed_tagged_dataset(&mut repo);

    let mut tx = repo.begin_transaction();
    tx.delete_dataset("census").unwrap();
    tx.commit("remove", "ann").unwrap();

    // An update on a deleted dataset keeps the deleted state; only the
    // fields change, so visibility is unchanged.
    let mut tx = repo.begin_transaction();
    tx.update_dataset("census", fields("Census edited")).unwrap();
    tx.commit("edit while deleted", "ann").unwrap();
    assert!(repo.get_dataset("census", false).unwrap().is_none());
    let hidden = repo.get_dataset("census", true).unwrap().unwrap();
    assert_eq!(hidden.fields.title, "Census edited");
    assert_eq!(hidden.state, EntityState::Deleted);
}
