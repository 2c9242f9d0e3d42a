use docstore_core::db::open_db;
use docstore_core::{
    Document, DocumentRepository, EntityKind, RepoError, Repository, StoreConfig, UnitOfWork,
    UnitOfWorkFactory,
};
use std::path::Path;

#[test]
fn transaction_calls_out_of_order_are_rejected() {
    let uow = UnitOfWork::in_memory().unwrap();

    assert!(matches!(
        uow.commit_transaction(),
        Err(RepoError::TransactionMisuse(_))
    ));
    assert!(matches!(
        uow.rollback_transaction(),
        Err(RepoError::TransactionMisuse(_))
    ));

    uow.begin_transaction().unwrap();
    assert!(uow.in_transaction());
    assert!(matches!(
        uow.begin_transaction(),
        Err(RepoError::TransactionMisuse(_))
    ));
    uow.rollback_transaction().unwrap();
    assert!(!uow.in_transaction());
}

#[test]
fn rollback_discards_every_save_in_the_transaction() {
    let uow = UnitOfWork::in_memory().unwrap();
    uow.begin_transaction().unwrap();

    let first = uow.documents().add(sample_document("First")).unwrap();
    uow.save_changes().unwrap();
    let second = uow.documents().add(sample_document("Second")).unwrap();
    uow.save_changes().unwrap();
    assert!(uow.documents().get_by_id(first.id).unwrap().is_some());

    uow.rollback_transaction().unwrap();

    assert!(uow.documents().get_by_id(first.id).unwrap().is_none());
    assert!(uow.documents().get_by_id(second.id).unwrap().is_none());
}

#[test]
fn commit_makes_transaction_visible_to_other_units_of_work() {
    let dir = tempfile::tempdir().unwrap();
    let factory = file_factory(&dir.path().join("shared.db"));
    let writer = factory.create().unwrap();
    let reader = factory.create().unwrap();

    writer.begin_transaction().unwrap();
    let added = writer.documents().add(sample_document("Pending")).unwrap();
    writer.save_changes().unwrap();

    assert!(reader.documents().get_by_id(added.id).unwrap().is_none());

    writer.commit_transaction().unwrap();

    assert!(reader.documents().get_by_id(added.id).unwrap().is_some());
}

#[test]
fn closing_with_an_open_transaction_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let factory = file_factory(&dir.path().join("abandoned.db"));

    let writer = factory.create().unwrap();
    writer.begin_transaction().unwrap();
    let added = writer.documents().add(sample_document("Abandoned")).unwrap();
    writer.save_changes().unwrap();
    writer.close();

    let reader = factory.create().unwrap();
    assert!(reader.documents().get_by_id(added.id).unwrap().is_none());
}

#[test]
fn failed_save_applies_nothing_and_keeps_staged_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faulty.db");
    let factory = file_factory(&path);
    let uow = factory.create().unwrap();

    let raw = open_db(&path).unwrap();
    raw.execute_batch(
        "CREATE TRIGGER reject_explode BEFORE INSERT ON documents
         WHEN NEW.title = 'Explode'
         BEGIN
             SELECT RAISE(ABORT, 'rejected by test trigger');
         END;",
    )
    .unwrap();

    uow.documents().add(sample_document("Harmless")).unwrap();
    uow.documents().add(sample_document("Explode")).unwrap();

    let err = uow.save_changes().unwrap_err();
    assert!(matches!(err, RepoError::Db(_)));
    assert!(!err.is_transient());
    assert_eq!(uow.documents().count(None).unwrap(), 0);
    assert_eq!(uow.pending_changes(), 2);

    raw.execute_batch("DROP TRIGGER reject_explode;").unwrap();
    assert_eq!(uow.save_changes().unwrap(), 2);
    assert_eq!(uow.pending_changes(), 0);
    assert_eq!(uow.documents().count(None).unwrap(), 2);
}

#[test]
fn discard_changes_drops_the_staging_buffer() {
    let uow = UnitOfWork::in_memory().unwrap();
    uow.documents().add(sample_document("Never saved")).unwrap();
    assert_eq!(uow.pending_changes(), 1);

    uow.discard_changes();

    assert_eq!(uow.pending_changes(), 0);
    assert_eq!(uow.save_changes().unwrap(), 0);
    assert_eq!(uow.documents().count(None).unwrap(), 0);
}

#[test]
fn update_of_untracked_entity_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let factory = file_factory(&dir.path().join("tracking.db"));

    let first = factory.create().unwrap();
    let added = first.documents().add(sample_document("Tracked")).unwrap();
    first.save_changes().unwrap();

    let second = factory.create().unwrap();
    let mut detached = added.clone();
    detached.title = "Detached edit".to_string();
    second.documents().update(&detached).unwrap();

    assert_eq!(second.pending_changes(), 0);
    assert_eq!(second.save_changes().unwrap(), 0);
    let stored = second.documents().get_by_id(added.id).unwrap().unwrap();
    assert_eq!(stored.title, "Tracked");

    let mut attached = stored;
    attached.title = "Attached edit".to_string();
    second.documents().update(&attached).unwrap();
    assert_eq!(second.save_changes().unwrap(), 1);
    assert_eq!(
        first.documents().get_by_id(added.id).unwrap().unwrap().title,
        "Attached edit"
    );
}

#[test]
fn update_of_vanished_row_is_a_concurrency_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let factory = file_factory(&dir.path().join("conflict.db"));

    let first = factory.create().unwrap();
    let added = first.documents().add(sample_document("Contested")).unwrap();
    first.save_changes().unwrap();
    let mut loaded = first.documents().get_by_id(added.id).unwrap().unwrap();

    let second = factory.create().unwrap();
    let doomed = second.documents().get_by_id(added.id).unwrap().unwrap();
    second.hard_delete(&doomed).unwrap();
    second.save_changes().unwrap();

    loaded.title = "Too late".to_string();
    first.documents().update(&loaded).unwrap();
    match first.save_changes().unwrap_err() {
        RepoError::ConcurrencyConflict { kind, id } => {
            assert_eq!(kind, EntityKind::Document);
            assert_eq!(id, added.id);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(first.pending_changes(), 1);
}

#[test]
fn deleting_an_already_deleted_row_conflicts() {
    let uow = UnitOfWork::in_memory().unwrap();
    let added = uow.documents().add(sample_document("Twice")).unwrap();
    uow.save_changes().unwrap();
    uow.documents().delete(&added).unwrap();
    uow.save_changes().unwrap();

    uow.documents().delete(&added).unwrap();
    assert!(matches!(
        uow.save_changes(),
        Err(RepoError::ConcurrencyConflict { .. })
    ));
}

#[test]
fn repositories_share_one_change_set() {
    let uow = UnitOfWork::in_memory().unwrap();
    let document = uow.documents().add(sample_document("Parent")).unwrap();
    uow.analyses()
        .add(docstore_core::DocumentAnalysis::new(
            document.id,
            docstore_core::AnalysisType::Summary,
        ))
        .unwrap();

    assert_eq!(uow.pending_changes(), 2);
    assert_eq!(uow.save_changes().unwrap(), 2);

    let loaded = uow.documents().get_with_analyses(document.id).unwrap().unwrap();
    assert_eq!(loaded.analyses.len(), 1);
}

fn file_factory(path: &Path) -> UnitOfWorkFactory {
    let mut config = StoreConfig::in_memory().with_path(path);
    config.cache.enabled = false;
    UnitOfWorkFactory::from_config(&config).unwrap()
}

fn sample_document(title: &str) -> Document {
    Document::new(title, "Body text long enough to be valid.", "Notes")
}
