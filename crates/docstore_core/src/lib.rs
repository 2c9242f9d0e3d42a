//! Persistence core for the document store.
//! Owns the entity model, repositories, caching and the unit of work; every
//! audit and soft-delete rule is enforced here.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod seed;
pub mod uow;

pub use config::{ConfigError, StoreConfig, StoreLocation};
pub use context::{ActorProvider, Clock, RetryPolicy, StaticActor, SystemClock};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::analysis::{AnalysisField, AnalysisType, DocumentAnalysis};
pub use model::document::{Document, DocumentField, DocumentStatus};
pub use model::entity::{AuditFields, Entity, EntityId, EntityKind, Timestamp, ValidationError};
pub use repo::cached::{CachedRepository, EntityCache, StoreCaches};
pub use repo::document_repo::{DocumentRepository, SqliteDocumentRepository, SEARCH_RESULT_LIMIT};
pub use repo::generic::SqliteRepository;
pub use repo::{Predicate, Query, RepoError, RepoResult, Repository, SortOrder};
pub use seed::seed_sample_data;
pub use uow::{UnitOfWork, UnitOfWorkFactory};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
