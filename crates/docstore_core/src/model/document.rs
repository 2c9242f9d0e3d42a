//! Document domain model.
//!
//! # Invariants
//! - `analyses` is only populated by eager-loading reads; writes never
//!   touch it (analyses are persisted through their own repository).
//! - Tag order is preserved exactly as supplied.

use super::analysis::DocumentAnalysis;
use super::entity::{
    check_confidence, check_length, AuditFields, Entity, EntityField, EntityId, EntityKind,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 200;
pub const CONTENT_MIN_CHARS: usize = 10;
pub const CATEGORY_MAX_CHARS: usize = 50;

/// Publication lifecycle of a document.
///
/// Any value may follow any other; the progression is not enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[default]
    Draft,
    Published,
    Archived,
    Processing,
    Analyzed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 5] = [
        Self::Draft,
        Self::Published,
        Self::Archived,
        Self::Processing,
        Self::Analyzed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Published => "Published",
            Self::Archived => "Archived",
            Self::Processing => "Processing",
            Self::Analyzed => "Analyzed",
        }
    }
}

impl Display for DocumentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ValidationError::UnknownVariant {
                field: "status",
                value: value.to_string(),
            })
    }
}

/// Stored text document with optional AI enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Nil until the repository `add` assigns one.
    pub id: EntityId,
    pub title: String,
    pub content: String,
    pub category: String,
    pub status: DocumentStatus,
    pub ai_summary: Option<String>,
    /// Nullable until an analysis has run.
    pub ai_confidence_score: Option<f64>,
    pub tags: Vec<String>,
    pub analyses: Vec<DocumentAnalysis>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl Document {
    /// Creates an unsaved draft document.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.into(),
            content: content.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    /// Checks field domains for the calling layer.
    ///
    /// The persistence layer itself does not call this; inputs are expected
    /// to be validated before they reach a repository.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_length("title", &self.title, TITLE_MIN_CHARS, TITLE_MAX_CHARS)?;
        check_length("content", &self.content, CONTENT_MIN_CHARS, usize::MAX)?;
        check_length("category", &self.category, 0, CATEGORY_MAX_CHARS)?;
        if let Some(score) = self.ai_confidence_score {
            check_confidence("ai_confidence_score", score)?;
        }
        Ok(())
    }
}

/// Queryable document fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentField {
    Id,
    Title,
    Content,
    Category,
    Status,
    AiSummary,
    AiConfidenceScore,
    /// JSON array of tag strings.
    Tags,
    CreatedAt,
    CreatedBy,
    UpdatedAt,
    UpdatedBy,
}

impl EntityField for DocumentField {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Content => "content",
            Self::Category => "category",
            Self::Status => "status",
            Self::AiSummary => "ai_summary",
            Self::AiConfidenceScore => "ai_confidence_score",
            Self::Tags => "tags",
            Self::CreatedAt => "created_at",
            Self::CreatedBy => "created_by",
            Self::UpdatedAt => "updated_at",
            Self::UpdatedBy => "updated_by",
        }
    }
}

impl Entity for Document {
    type Field = DocumentField;

    const KIND: EntityKind = EntityKind::Document;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}
