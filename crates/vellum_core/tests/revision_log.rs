use vellum_core::{CatalogError, DatasetFields, HistoryQuery, Repository};

fn dataset_fields(title: &str) -> DatasetFields {
    DatasetFields {
        title: title.to_string(),
        notes: None,
        url: None,
    }
}

fn commit_dataset(repo: &mut Repository, name: &str, title: &str) -> vellum_core::Revision {
    let mut tx = repo.begin_transaction();
    tx.create_dataset(name, dataset_fields(title)).unwrap();
    tx.commit(&format!("add {name}"), "tester").unwrap()
}

#[test]
fn youngest_revision_tracks_latest_commit() {
    let mut repo = Repository::open_in_memory().unwrap();
    assert!(repo.youngest_revision().unwrap().is_none());

    let first = commit_dataset(&mut repo, "census", "Census");
    let second = commit_dataset(&mut repo, "weather", "Weather");
    assert!(second.id > first.id);

    let youngest = repo.youngest_revision().unwrap().unwrap();
    assert_eq!(youngest.id, second.id);
    assert_eq!(youngest.message, "add weather");
    assert_eq!(youngest.author, "tester");
}

#[test]
fn get_revision_round_trips_ledger_metadata() {
    let mut repo = Repository::open_in_memory().unwrap();
    let committed = commit_dataset(&mut repo, "census", "Census");

    let loaded = repo.get_revision(committed.id).unwrap().unwrap();
    assert_eq!(loaded.id, committed.id);
    assert_eq!(loaded.message, "add census");
    assert_eq!(loaded.author, "tester");
    assert!(loaded.approved_timestamp_ms.is_none());

    assert!(repo.get_revision(committed.id + 100).unwrap().is_none());
}

#[test]
fn history_pages_most_recent_first() {
    let mut repo = Repository::open_in_memory().unwrap();
    for index in 0..5 {
        commit_dataset(&mut repo, &format!("dataset-{index}"), "D");
    }

    let full = repo.history(&HistoryQuery::default()).unwrap();
    assert_eq!(full.len(), 5);
    assert!(full.windows(2).all(|pair| pair[0].id > pair[1].id));

    let page = repo
        .history(&HistoryQuery {
            limit: Some(2),
            offset: 1,
        })
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, full[1].id);
    assert_eq!(page[1].id, full[2].id);
}

#[test]
fn approve_revision_stamps_timestamp() {
    let mut repo = Repository::open_in_memory().unwrap();
    let revision = commit_dataset(&mut repo, "census", "Census");

    repo.approve_revision(revision.id).unwrap();
    let approved = repo.get_revision(revision.id).unwrap().unwrap();
    assert!(approved.approved_timestamp_ms.is_some());

    let err = repo.approve_revision(revision.id + 99).unwrap_err();
    assert!(matches!(err, CatalogError::RevisionNotFound(_)));
}

#[test]
fn commit_without_effective_writes_is_rejected() {
    let mut repo = Repository::open_in_memory().unwrap();
    commit_dataset(&mut repo, "census", "Census");

    // Writing back the identical fields and state mutates nothing.
    let mut tx = repo.begin_transaction();
    tx.update_dataset("census", dataset_fields("Census")).unwrap();
    let err = tx.commit("no-op", "tester").unwrap_err();
    assert!(matches!(err, CatalogError::EmptyRevision));

    // The failed commit must not consume a ledger id.
    let youngest = repo.youngest_revision().unwrap().unwrap();
    assert_eq!(youngest.message, "add census");
}

#[test]
fn rollback_discards_buffered_writes() {
    let mut repo = Repository::open_in_memory().unwrap();

    let mut tx = repo.begin_transaction();
    tx.create_dataset("census", dataset_fields("Census")).unwrap();
    assert!(!tx.is_empty());
    tx.rollback();

    assert!(repo.get_dataset("census", true).unwrap().is_none());
    assert!(repo.youngest_revision().unwrap().is_none());
}
