//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the generic per-entity repository contract and the document
//!   specialization.
//! - Isolate SQLite query details from callers.
//! - Provide the read-through caching decorator over the same contracts.
//!
//! # Invariants
//! - Every standard read carries an explicit `is_deleted = 0` clause;
//!   include-deleted reads are separate, explicitly named variants.
//! - Writes only stage changes on the owning persistence context; nothing is
//!   durable before `save_changes`.
//! - "Not found" is `Ok(None)`, never an error.

use crate::db::DbError;
use crate::model::entity::{Entity, EntityId, EntityKind, ValidationError};
use rusqlite::ErrorCode;
use thiserror::Error;

pub mod cached;
pub mod document_repo;
pub mod generic;
pub mod mapping;
pub mod query;

pub use query::{Predicate, Query, SortOrder};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository and unit-of-work failure.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Db(#[from] DbError),
    /// Busy or locked store; the only class worth retrying.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),
    #[error("concurrency conflict: {kind} {id} was changed or removed since it was read")]
    ConcurrencyConflict { kind: EntityKind, id: EntityId },
    #[error("transaction misuse: {0}")]
    TransactionMisuse(&'static str),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RepoError {
    /// Returns whether replaying the same change set may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::StoreUnavailable(value)
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// CRUD and predicate-query contract over one entity type.
///
/// Mutations are staged; reads always hit the store (or a cache in front of
/// it), never the staging buffer.
pub trait Repository<E: Entity> {
    /// Returns the entity unless it is absent or soft-deleted.
    fn get_by_id(&self, id: EntityId) -> RepoResult<Option<E>>;
    /// Like [`Repository::get_by_id`] but also returns soft-deleted rows.
    fn get_by_id_including_deleted(&self, id: EntityId) -> RepoResult<Option<E>>;
    /// Returns every non-deleted row in insertion order.
    fn get_all(&self) -> RepoResult<Vec<E>>;
    /// Returns non-deleted rows matching `predicate`, evaluated by the store.
    fn find(&self, predicate: &Predicate<E::Field>) -> RepoResult<Vec<E>>;
    /// Runs a composed query with ordering, limit and deleted-row visibility.
    fn query(&self, query: &Query<E::Field>) -> RepoResult<Vec<E>>;
    /// Stages an insert, assigning an id when the entity has none.
    fn add(&self, entity: E) -> RepoResult<E>;
    /// Stages a full-row update. Ignored when the entity is not tracked.
    fn update(&self, entity: &E) -> RepoResult<()>;
    /// Stages a soft delete.
    fn delete(&self, entity: &E) -> RepoResult<()>;
    fn exists(&self, id: EntityId) -> RepoResult<bool>;
    fn count(&self, predicate: Option<&Predicate<E::Field>>) -> RepoResult<u64>;
}
