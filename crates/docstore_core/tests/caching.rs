use docstore_core::db::open_db;
use docstore_core::{
    AnalysisType, Document, DocumentAnalysis, DocumentRepository, DocumentStatus, Repository,
    StoreConfig, UnitOfWorkFactory,
};
use rusqlite::Connection;
use std::path::Path;

#[test]
fn repeated_reads_are_served_from_the_shared_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cached.db");
    let factory = cached_factory(&path);

    let writer = factory.create().unwrap();
    let added = writer.documents().add(sample_document("Cached title")).unwrap();
    writer.save_changes().unwrap();
    let first = writer.documents().get_by_id(added.id).unwrap().unwrap();
    assert_eq!(first.title, "Cached title");
    assert!(factory.caches().unwrap().documents.entry_count() > 0);

    let raw = open_db(&path).unwrap();
    rename_directly(&raw, &added, "Changed behind the cache");

    let reader = factory.create().unwrap();
    let second = reader.documents().get_by_id(added.id).unwrap().unwrap();
    assert_eq!(second.title, "Cached title");
}

#[test]
fn committed_writes_invalidate_cached_lists() {
    let dir = tempfile::tempdir().unwrap();
    let factory = cached_factory(&dir.path().join("invalidate.db"));

    let first = factory.create().unwrap();
    first.documents().add(sample_document("One")).unwrap();
    first.save_changes().unwrap();
    assert_eq!(first.documents().get_all().unwrap().len(), 1);
    assert_eq!(
        first
            .documents()
            .get_by_status(DocumentStatus::Draft)
            .unwrap()
            .len(),
        1
    );

    let second = factory.create().unwrap();
    second.documents().add(sample_document("Two")).unwrap();
    second.save_changes().unwrap();

    let third = factory.create().unwrap();
    assert_eq!(third.documents().get_all().unwrap().len(), 2);
    assert_eq!(
        third
            .documents()
            .get_by_status(DocumentStatus::Draft)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn cache_hits_still_track_entities_for_update() {
    let dir = tempfile::tempdir().unwrap();
    let factory = cached_factory(&dir.path().join("tracking.db"));

    let writer = factory.create().unwrap();
    let added = writer.documents().add(sample_document("Before")).unwrap();
    writer.save_changes().unwrap();
    writer.documents().get_by_id(added.id).unwrap();

    let editor = factory.create().unwrap();
    let mut cached = editor.documents().get_by_id(added.id).unwrap().unwrap();
    cached.title = "After".to_string();
    editor.documents().update(&cached).unwrap();
    assert_eq!(editor.save_changes().unwrap(), 1);

    let reader = factory.create().unwrap();
    assert_eq!(
        reader.documents().get_by_id(added.id).unwrap().unwrap().title,
        "After"
    );
}

#[test]
fn failed_save_leaves_the_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed.db");
    let factory = cached_factory(&path);

    let uow = factory.create().unwrap();
    let added = uow.documents().add(sample_document("Stable")).unwrap();
    uow.save_changes().unwrap();
    uow.documents().get_by_id(added.id).unwrap();

    let raw = open_db(&path).unwrap();
    rename_directly(&raw, &added, "Renamed directly");
    raw.execute_batch(
        "CREATE TRIGGER reject_explode BEFORE INSERT ON documents
         WHEN NEW.title = 'Explode'
         BEGIN
             SELECT RAISE(ABORT, 'rejected by test trigger');
         END;",
    )
    .unwrap();

    uow.documents().add(sample_document("Explode")).unwrap();
    assert!(uow.save_changes().is_err());

    let reader = factory.create().unwrap();
    assert_eq!(
        reader.documents().get_by_id(added.id).unwrap().unwrap().title,
        "Stable"
    );
}

#[test]
fn open_transaction_bypasses_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let factory = cached_factory(&dir.path().join("bypass.db"));

    let seeded = factory.create().unwrap();
    seeded.documents().add(sample_document("Committed")).unwrap();
    seeded.save_changes().unwrap();
    assert_eq!(seeded.documents().get_all().unwrap().len(), 1);
    let cache = &factory.caches().unwrap().documents;
    let entries_before = cache.entry_count();

    let writer = factory.create().unwrap();
    writer.begin_transaction().unwrap();
    writer.documents().add(sample_document("Uncommitted")).unwrap();
    writer.save_changes().unwrap();
    assert_eq!(writer.documents().get_all().unwrap().len(), 2);
    assert_eq!(writer.documents().search("committed").unwrap().len(), 2);
    assert_eq!(cache.entry_count(), entries_before);

    assert_eq!(seeded.documents().get_all().unwrap().len(), 1);
    writer.rollback_transaction().unwrap();
    assert_eq!(seeded.documents().get_all().unwrap().len(), 1);
}

#[test]
fn hard_delete_through_the_unit_of_work_invalidates() {
    let dir = tempfile::tempdir().unwrap();
    let factory = cached_factory(&dir.path().join("purge.db"));

    let uow = factory.create().unwrap();
    let added = uow.documents().add(sample_document("Purged")).unwrap();
    uow.save_changes().unwrap();
    assert!(uow.documents().get_by_id(added.id).unwrap().is_some());

    uow.hard_delete(&added).unwrap();
    uow.save_changes().unwrap();

    let reader = factory.create().unwrap();
    assert!(reader.documents().get_by_id(added.id).unwrap().is_none());
}

#[test]
fn hard_deleting_a_document_invalidates_cached_analyses() {
    let dir = tempfile::tempdir().unwrap();
    let factory = cached_factory(&dir.path().join("cascade.db"));

    let uow = factory.create().unwrap();
    let document = uow.documents().add(sample_document("Parent")).unwrap();
    let analysis = uow
        .analyses()
        .add(DocumentAnalysis::new(document.id, AnalysisType::Summary))
        .unwrap();
    uow.save_changes().unwrap();
    assert!(uow.analyses().get_by_id(analysis.id).unwrap().is_some());
    assert_eq!(uow.analyses().get_all().unwrap().len(), 1);

    uow.hard_delete(&document).unwrap();
    uow.save_changes().unwrap();

    let reader = factory.create().unwrap();
    assert!(reader.analyses().get_by_id(analysis.id).unwrap().is_none());
    assert!(reader.analyses().get_all().unwrap().is_empty());
}

#[test]
fn in_memory_factory_keeps_units_of_work_isolated() {
    let factory = UnitOfWorkFactory::from_config(&StoreConfig::in_memory()).unwrap();
    assert!(factory.caches().is_none());

    let first = factory.create().unwrap();
    first.documents().add(sample_document("Private")).unwrap();
    first.save_changes().unwrap();
    assert_eq!(first.documents().get_all().unwrap().len(), 1);

    let second = factory.create().unwrap();
    assert!(second.documents().get_all().unwrap().is_empty());
    assert_eq!(second.documents().count(None).unwrap(), 0);
}

#[test]
fn disabled_cache_reads_straight_from_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uncached.db");
    let mut config = StoreConfig::in_memory().with_path(&path);
    config.cache.enabled = false;
    let factory = UnitOfWorkFactory::from_config(&config).unwrap();
    assert!(factory.caches().is_none());

    let uow = factory.create().unwrap();
    let added = uow.documents().add(sample_document("Original")).unwrap();
    uow.save_changes().unwrap();
    uow.documents().get_by_id(added.id).unwrap();

    let raw = open_db(&path).unwrap();
    rename_directly(&raw, &added, "Direct");

    assert_eq!(
        uow.documents().get_by_id(added.id).unwrap().unwrap().title,
        "Direct"
    );
}

fn cached_factory(path: &Path) -> UnitOfWorkFactory {
    let config = StoreConfig::in_memory().with_path(path);
    assert!(config.cache.enabled);
    UnitOfWorkFactory::from_config(&config).unwrap()
}

fn rename_directly(conn: &Connection, document: &Document, title: &str) {
    conn.execute(
        "UPDATE documents SET title = ?1 WHERE id = ?2;",
        [title, document.id.to_string().as_str()],
    )
    .unwrap();
}

fn sample_document(title: &str) -> Document {
    Document::new(title, "Body text long enough to be valid.", "Notes")
}
