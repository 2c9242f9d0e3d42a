use docstore_core::db::migrations::{latest_version, schema_version};
use docstore_core::db::{open_db, open_db_in_memory, DbError, FOLD_CASE_FUNCTION};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_creates_document_tables() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "documents");
    assert_table_exists(&conn, "document_analyses");
    assert_eq!(pragma_i64(&conn, "foreign_keys"), 1);
}

#[test]
fn reopening_file_database_keeps_schema_and_wal_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docstore.db");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first).unwrap(), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second).unwrap(), latest_version());
    assert_table_exists(&second, "document_analyses");
    let journal_mode: String = second
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_ascii_lowercase(), "wal");
}

#[test]
fn analysis_rows_cascade_on_physical_document_delete() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO documents (id, title, content, category, status, created_at, created_by, updated_at, updated_by)
         VALUES ('d1', 'Title', 'Content body', 'Tutorial', 'Draft', 't', 'System', 't', 'System');
         INSERT INTO document_analyses (id, document_id, analysis_type, analyzed_at, created_at, created_by, updated_at, updated_by)
         VALUES ('a1', 'd1', 'Summary', 't', 't', 'System', 't', 'System');
         DELETE FROM documents WHERE id = 'd1';",
    )
    .unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM document_analyses;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn bootstrap_registers_unicode_fold_case() {
    let conn = open_db_in_memory().unwrap();
    let folded: String = conn
        .query_row(&format!("SELECT {FOLD_CASE_FUNCTION}('ÉCOLE Straße');"), [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(folded, "école straße");

    let null: Option<String> = conn
        .query_row(&format!("SELECT {FOLD_CASE_FUNCTION}(NULL);"), [], |row| row.get(0))
        .unwrap();
    assert!(null.is_none());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn pragma_i64(conn: &Connection, name: &str) -> i64 {
    conn.query_row(&format!("PRAGMA {name};"), [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert!(exists, "table {table_name} does not exist");
}
