//! Document-specific query shapes on top of the generic repository.
//!
//! # Invariants
//! - Every list is ordered newest-created first; same-instant rows fall
//!   back to insertion order, newest first.
//! - `search` never returns more than [`SEARCH_RESULT_LIMIT`] rows.
//! - Soft-deleted documents and analyses are excluded everywhere.

use super::generic::SqliteRepository;
use super::mapping::{column_count, id_value, read_entity, select_columns, StoreMapping};
use super::query::{Predicate, Query, SortOrder};
use super::{RepoResult, Repository};
use crate::model::analysis::DocumentAnalysis;
use crate::model::document::{Document, DocumentField, DocumentStatus};
use crate::model::entity::{Entity, EntityId};
use rusqlite::params;

/// Hard cap on `search` results.
pub const SEARCH_RESULT_LIMIT: u32 = 50;

/// SQLite-backed document repository.
pub type SqliteDocumentRepository<'ctx> = SqliteRepository<'ctx, Document>;

/// Document queries beyond generic CRUD.
pub trait DocumentRepository: Repository<Document> {
    /// Case-insensitive category match, newest first.
    fn get_by_category(&self, category: &str) -> RepoResult<Vec<Document>>;
    /// Exact status match, newest first.
    fn get_by_status(&self, status: DocumentStatus) -> RepoResult<Vec<Document>>;
    /// Document with its non-deleted analyses, loaded in one query.
    fn get_with_analyses(&self, id: EntityId) -> RepoResult<Option<Document>>;
    /// Case-insensitive substring match over title, content and tags.
    fn search(&self, term: &str) -> RepoResult<Vec<Document>>;
}

fn newest_first(predicate: Predicate<DocumentField>) -> Query<DocumentField> {
    Query::new()
        .filter(predicate)
        .order_by(DocumentField::CreatedAt, SortOrder::Desc)
}

impl DocumentRepository for SqliteRepository<'_, Document> {
    fn get_by_category(&self, category: &str) -> RepoResult<Vec<Document>> {
        self.query(&newest_first(Predicate::eq_ignore_case(
            DocumentField::Category,
            category,
        )))
    }

    fn get_by_status(&self, status: DocumentStatus) -> RepoResult<Vec<Document>> {
        self.query(&newest_first(Predicate::eq(DocumentField::Status, status)))
    }

    fn get_with_analyses(&self, id: EntityId) -> RepoResult<Option<Document>> {
        let sql = format!(
            "SELECT {}, {}
             FROM {} d
             LEFT JOIN {} a
               ON a.document_id = d.id
              AND a.is_deleted = 0
             WHERE d.id = ?1
               AND d.is_deleted = 0
             ORDER BY a.analyzed_at ASC, a.rowid ASC;",
            select_columns::<Document>(Some("d")),
            select_columns::<DocumentAnalysis>(Some("a")),
            Document::TABLE,
            DocumentAnalysis::TABLE,
        );
        let analysis_offset = column_count::<Document>();
        let ctx = self.context();
        let mut stmt = ctx.connection().prepare(&sql)?;
        let mut rows = stmt.query(params![id_value(id)])?;
        let mut document: Option<Document> = None;

        while let Some(row) = rows.next()? {
            if document.is_none() {
                document = Some(read_entity::<Document>(row, 0)?);
            }
            // LEFT JOIN yields one all-NULL analysis row for a document without analyses.
            if row.get::<_, Option<String>>(analysis_offset)?.is_none() {
                continue;
            }
            let analysis = read_entity::<DocumentAnalysis>(row, analysis_offset)?;
            ctx.track(DocumentAnalysis::KIND, analysis.id);
            if let Some(current) = document.as_mut() {
                current.analyses.push(analysis);
            }
        }

        if let Some(document) = document.as_ref() {
            ctx.track(Document::KIND, document.id);
        }
        Ok(document)
    }

    fn search(&self, term: &str) -> RepoResult<Vec<Document>> {
        let predicate = Predicate::contains(DocumentField::Title, term)
            .or(Predicate::contains(DocumentField::Content, term))
            .or(Predicate::any_element_contains(DocumentField::Tags, term));
        self.query(&newest_first(predicate).limit(SEARCH_RESULT_LIMIT))
    }
}
