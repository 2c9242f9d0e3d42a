//! Base entity contract shared by every persisted type.
//!
//! # Invariants
//! - `created_at`/`created_by` are write-once; the save pipeline never
//!   includes them in an update.
//! - `is_deleted`, `deleted_at` and `deleted_by` are only changed by the
//!   soft-delete and restore paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier for every persisted entity.
pub type EntityId = Uuid;

/// UTC instant used for every audit timestamp.
pub type Timestamp = DateTime<Utc>;

/// Actor recorded when no authenticated caller is present.
pub const SYSTEM_ACTOR: &str = "System";

/// Discriminates entity types for tracking, cache invalidation and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Document,
    DocumentAnalysis,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::DocumentAnalysis => f.write_str("document_analysis"),
        }
    }
}

/// Creation, modification and deletion provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
    pub created_at: Timestamp,
    pub created_by: String,
    pub updated_at: Timestamp,
    pub updated_by: String,
    /// Soft delete tombstone; hidden from every standard read when set.
    pub is_deleted: bool,
    pub deleted_at: Option<Timestamp>,
    pub deleted_by: Option<String>,
}

/// Queryable field of an entity, resolved to its store column.
pub trait EntityField: Copy + Debug + Send + Sync + 'static {
    fn column(self) -> &'static str;
}

/// Shape shared by every persisted type.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    /// Fields usable in predicates and ordering.
    type Field: EntityField;

    const KIND: EntityKind;

    fn id(&self) -> EntityId;
    fn set_id(&mut self, id: EntityId);
    fn audit(&self) -> &AuditFields;
    fn audit_mut(&mut self) -> &mut AuditFields;
}

/// Field value outside its recognized domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown {field} value `{value}`")]
    UnknownVariant { field: &'static str, value: String },
    #[error("{field} length {len} is outside {min}..={max}")]
    Length {
        field: &'static str,
        len: usize,
        min: usize,
        max: usize,
    },
    #[error("{field} value {value} is outside 0.0..=1.0")]
    Confidence { field: &'static str, value: f64 },
}

pub(crate) fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::Length {
            field,
            len,
            min,
            max,
        });
    }
    Ok(())
}

pub(crate) fn check_confidence(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::Confidence { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_confidence, check_length, ValidationError};

    #[test]
    fn check_length_counts_chars_not_bytes() {
        assert!(check_length("title", "héé", 3, 200).is_ok());
        let err = check_length("title", "ab", 3, 200).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Length {
                field: "title",
                len: 2,
                min: 3,
                max: 200
            }
        );
    }

    #[test]
    fn check_confidence_rejects_nan_and_out_of_range() {
        assert!(check_confidence("score", 0.0).is_ok());
        assert!(check_confidence("score", 1.0).is_ok());
        assert!(check_confidence("score", 1.01).is_err());
        assert!(check_confidence("score", f64::NAN).is_err());
    }
}
