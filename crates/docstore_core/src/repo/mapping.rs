//! Hand-written row mapping between entities and store columns.
//!
//! # Responsibility
//! - Describe each entity's table and data columns.
//! - Encode entity fields into bound values and decode rows back.
//!
//! # Invariants
//! - Column layout of every select is `id, <data columns>, <audit columns>`.
//! - Audit columns are written by the save pipeline only; `data_values`
//!   never includes them.
//! - Timestamps are fixed-width UTC text with microsecond precision, so
//!   text ordering equals chronological ordering.

use super::{RepoError, RepoResult};
use crate::model::analysis::{AnalysisType, DocumentAnalysis};
use crate::model::document::{Document, DocumentStatus};
use crate::model::entity::{AuditFields, Entity, EntityId, Timestamp};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::Row;
use uuid::Uuid;

pub(crate) const AUDIT_COLUMNS: [&str; 7] = [
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
    "is_deleted",
    "deleted_at",
    "deleted_by",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Per-entity table description and row codec.
pub trait StoreMapping: Entity {
    const TABLE: &'static str;
    /// Columns owned by the entity itself, excluding `id` and audit columns.
    const DATA_COLUMNS: &'static [&'static str];

    /// Values for [`StoreMapping::DATA_COLUMNS`], in the same order.
    fn data_values(&self) -> RepoResult<Vec<Value>>;

    /// Decodes data columns starting at `offset`.
    fn read_data(
        row: &Row<'_>,
        offset: usize,
        id: EntityId,
        audit: AuditFields,
    ) -> RepoResult<Self>;
}

/// Comma-separated select list, optionally qualified with a table alias.
pub(crate) fn select_columns<E: StoreMapping>(alias: Option<&str>) -> String {
    std::iter::once("id")
        .chain(E::DATA_COLUMNS.iter().copied())
        .chain(AUDIT_COLUMNS)
        .map(|column| match alias {
            Some(alias) => format!("{alias}.{column}"),
            None => column.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn column_count<E: StoreMapping>() -> usize {
    1 + E::DATA_COLUMNS.len() + AUDIT_COLUMNS.len()
}

/// Decodes one entity whose `id` column sits at `offset`.
pub(crate) fn read_entity<E: StoreMapping>(row: &Row<'_>, offset: usize) -> RepoResult<E> {
    let id_text: String = row.get(offset)?;
    let id = parse_id(&id_text, E::TABLE)?;
    let audit = read_audit(row, offset + 1 + E::DATA_COLUMNS.len(), E::TABLE)?;
    E::read_data(row, offset + 1, id, audit)
}

fn read_audit(row: &Row<'_>, offset: usize, table: &str) -> RepoResult<AuditFields> {
    let is_deleted = match row.get::<_, i64>(offset + 4)? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_deleted value `{other}` in {table}.is_deleted"
            )));
        }
    };
    let deleted_at = row
        .get::<_, Option<String>>(offset + 5)?
        .map(|text| parse_timestamp(&text, table))
        .transpose()?;

    Ok(AuditFields {
        created_at: parse_timestamp(&row.get::<_, String>(offset)?, table)?,
        created_by: row.get(offset + 1)?,
        updated_at: parse_timestamp(&row.get::<_, String>(offset + 2)?, table)?,
        updated_by: row.get(offset + 3)?,
        is_deleted,
        deleted_at,
        deleted_by: row.get(offset + 6)?,
    })
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Bindable value for comparisons against timestamp fields.
pub fn timestamp_value(ts: &Timestamp) -> Value {
    Value::Text(format_timestamp(ts))
}

/// Bindable value for comparisons against id fields.
pub fn id_value(id: EntityId) -> Value {
    Value::Text(id.to_string())
}

fn parse_timestamp(text: &str, table: &str) -> RepoResult<Timestamp> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| RepoError::InvalidData(format!("invalid timestamp `{text}` in {table}")))
}

fn parse_id(text: &str, table: &str) -> RepoResult<EntityId> {
    Uuid::parse_str(text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{text}` in {table}")))
}

impl From<DocumentStatus> for Value {
    fn from(value: DocumentStatus) -> Self {
        Value::Text(value.as_str().to_string())
    }
}

impl From<AnalysisType> for Value {
    fn from(value: AnalysisType) -> Self {
        Value::Text(value.as_str().to_string())
    }
}

impl StoreMapping for Document {
    const TABLE: &'static str = "documents";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "title",
        "content",
        "category",
        "status",
        "ai_summary",
        "ai_confidence_score",
        "tags",
    ];

    fn data_values(&self) -> RepoResult<Vec<Value>> {
        Ok(vec![
            Value::Text(self.title.clone()),
            Value::Text(self.content.clone()),
            Value::Text(self.category.clone()),
            self.status.into(),
            self.ai_summary.clone().into(),
            self.ai_confidence_score.into(),
            Value::Text(serde_json::to_string(&self.tags)?),
        ])
    }

    fn read_data(
        row: &Row<'_>,
        offset: usize,
        id: EntityId,
        audit: AuditFields,
    ) -> RepoResult<Self> {
        let status_text: String = row.get(offset + 3)?;
        let status = status_text
            .parse::<DocumentStatus>()
            .map_err(|err| RepoError::InvalidData(format!("documents.status: {err}")))?;
        let tags_text: String = row.get(offset + 6)?;
        let tags = serde_json::from_str(&tags_text).map_err(|err| {
            RepoError::InvalidData(format!("invalid tag list `{tags_text}` in documents.tags: {err}"))
        })?;

        Ok(Self {
            id,
            title: row.get(offset)?,
            content: row.get(offset + 1)?,
            category: row.get(offset + 2)?,
            status,
            ai_summary: row.get(offset + 4)?,
            ai_confidence_score: row.get(offset + 5)?,
            tags,
            analyses: Vec::new(),
            audit,
        })
    }
}

impl StoreMapping for DocumentAnalysis {
    const TABLE: &'static str = "document_analyses";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "document_id",
        "analysis_type",
        "results",
        "confidence_score",
        "error_message",
        "analyzed_at",
    ];

    fn data_values(&self) -> RepoResult<Vec<Value>> {
        Ok(vec![
            id_value(self.document_id),
            self.analysis_type.into(),
            Value::Text(self.results.clone()),
            Value::Real(self.confidence_score),
            self.error_message.clone().into(),
            timestamp_value(&self.analyzed_at),
        ])
    }

    fn read_data(
        row: &Row<'_>,
        offset: usize,
        id: EntityId,
        audit: AuditFields,
    ) -> RepoResult<Self> {
        let document_id_text: String = row.get(offset)?;
        let type_text: String = row.get(offset + 1)?;
        let analysis_type = type_text.parse::<AnalysisType>().map_err(|err| {
            RepoError::InvalidData(format!("document_analyses.analysis_type: {err}"))
        })?;
        let analyzed_at_text: String = row.get(offset + 5)?;

        Ok(Self {
            id,
            document_id: parse_id(&document_id_text, Self::TABLE)?,
            analysis_type,
            results: row.get(offset + 2)?,
            confidence_score: row.get(offset + 3)?,
            error_message: row.get(offset + 4)?,
            analyzed_at: parse_timestamp(&analyzed_at_text, Self::TABLE)?,
            audit,
        })
    }
}
