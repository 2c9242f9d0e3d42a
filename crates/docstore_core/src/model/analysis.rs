//! Document analysis domain model.
//!
//! # Invariants
//! - Every analysis belongs to exactly one document (`document_id`).
//! - `results` is opaque JSON; only callers know its shape.

use super::entity::{
    check_confidence, AuditFields, Entity, EntityField, EntityId, EntityKind, Timestamp,
    ValidationError,
};
use chrono::{SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of analysis that produced a result payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisType {
    #[default]
    Summary,
    Sentiment,
    KeyPhraseExtraction,
    Classification,
    Translation,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        Self::Summary,
        Self::Sentiment,
        Self::KeyPhraseExtraction,
        Self::Classification,
        Self::Translation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::Sentiment => "Sentiment",
            Self::KeyPhraseExtraction => "KeyPhraseExtraction",
            Self::Classification => "Classification",
            Self::Translation => "Translation",
        }
    }
}

impl Display for AnalysisType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ValidationError::UnknownVariant {
                field: "analysis_type",
                value: value.to_string(),
            })
    }
}

/// Result of one analysis run over a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub id: EntityId,
    pub document_id: EntityId,
    pub analysis_type: AnalysisType,
    /// Serialized result payload. Empty when the analysis produced nothing.
    pub results: String,
    pub confidence_score: f64,
    pub error_message: Option<String>,
    pub analyzed_at: Timestamp,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl DocumentAnalysis {
    /// Creates an unsaved analysis for `document_id`, analyzed now.
    pub fn new(document_id: EntityId, analysis_type: AnalysisType) -> Self {
        Self {
            id: Uuid::nil(),
            document_id,
            analysis_type,
            analyzed_at: Utc::now().trunc_subsecs(6),
            ..Self::default()
        }
    }

    /// Serializes `results` into the opaque payload.
    pub fn set_results<T: Serialize>(&mut self, results: &T) -> serde_json::Result<()> {
        self.results = serde_json::to_string(results)?;
        Ok(())
    }

    /// Deserializes the payload into a caller-chosen shape.
    ///
    /// Returns `Ok(None)` for an empty payload.
    pub fn results_as<T: DeserializeOwned>(&self) -> serde_json::Result<Option<T>> {
        if self.results.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&self.results).map(Some)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_confidence("confidence_score", self.confidence_score)
    }
}

/// Queryable analysis fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisField {
    Id,
    DocumentId,
    AnalysisType,
    ConfidenceScore,
    ErrorMessage,
    AnalyzedAt,
    CreatedAt,
    CreatedBy,
    UpdatedAt,
    UpdatedBy,
}

impl EntityField for AnalysisField {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::DocumentId => "document_id",
            Self::AnalysisType => "analysis_type",
            Self::ConfidenceScore => "confidence_score",
            Self::ErrorMessage => "error_message",
            Self::AnalyzedAt => "analyzed_at",
            Self::CreatedAt => "created_at",
            Self::CreatedBy => "created_by",
            Self::UpdatedAt => "updated_at",
            Self::UpdatedBy => "updated_by",
        }
    }
}

impl Entity for DocumentAnalysis {
    type Field = AnalysisField;

    const KIND: EntityKind = EntityKind::DocumentAnalysis;

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

#[cfg(test)]
mod tests {
    use super::{AnalysisType, DocumentAnalysis};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct SentimentScores {
        positive: f64,
        negative: f64,
    }

    #[test]
    fn results_payload_is_typed_by_caller() {
        let mut analysis = DocumentAnalysis::new(Uuid::new_v4(), AnalysisType::Sentiment);
        assert_eq!(analysis.results_as::<SentimentScores>().unwrap(), None);

        let scores = SentimentScores {
            positive: 0.7,
            negative: 0.1,
        };
        analysis.set_results(&scores).unwrap();
        assert_eq!(
            analysis.results_as::<SentimentScores>().unwrap(),
            Some(scores)
        );
        assert!(analysis.results_as::<Vec<String>>().is_err());
    }

    #[test]
    fn analysis_type_rejects_unknown_names() {
        assert_eq!(
            "keyphraseextraction".parse::<AnalysisType>().unwrap(),
            AnalysisType::KeyPhraseExtraction
        );
        assert!("Ocr".parse::<AnalysisType>().is_err());
    }
}
