//! Unit of work: the transaction-scoped façade over the repositories.
//!
//! # Responsibility
//! - Hand out repositories bound to one persistence context.
//! - Expose the single commit point and explicit transaction grouping.
//! - Build units of work from configuration with shared caches.
//!
//! # Invariants
//! - Repositories borrow the unit of work, so none outlive its disposal.
//! - One unit of work serves one logical operation; it is not `Sync`.

use crate::config::{ConfigError, StoreConfig, StoreLocation};
use crate::context::{
    ActorProvider, Clock, PersistenceContext, RetryPolicy, StaticActor, SystemClock,
};
use crate::db::{open_db, open_db_in_memory};
use crate::model::analysis::DocumentAnalysis;
use crate::model::entity::EntityKind;
use crate::repo::cached::{CachedRepository, StoreCaches};
use crate::repo::document_repo::{DocumentRepository, SqliteDocumentRepository};
use crate::repo::generic::SqliteRepository;
use crate::repo::mapping::StoreMapping;
use crate::repo::{RepoResult, Repository};
use log::info;
use rusqlite::Connection;
use std::sync::Arc;

/// Transaction-scoped repository façade.
pub struct UnitOfWork {
    context: PersistenceContext,
    caches: Option<StoreCaches>,
}

impl UnitOfWork {
    /// Wraps a migrated connection with the given actor identity.
    pub fn new(conn: Connection, actor: Arc<dyn ActorProvider>) -> Self {
        Self::with_parts(conn, actor, Arc::new(SystemClock), RetryPolicy::default(), None)
    }

    /// Opens a private in-memory store recording the system actor.
    pub fn in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?, Arc::new(StaticActor::system())))
    }

    pub fn with_parts(
        conn: Connection,
        actor: Arc<dyn ActorProvider>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        caches: Option<StoreCaches>,
    ) -> Self {
        Self {
            context: PersistenceContext::new(conn, actor, clock, retry),
            caches,
        }
    }

    /// Document repository, behind the cache when one is configured.
    pub fn documents(&self) -> Box<dyn DocumentRepository + '_> {
        let repo = SqliteDocumentRepository::new(&self.context);
        match self.caches.as_ref() {
            Some(caches) => Box::new(CachedRepository::new(
                repo,
                caches.documents.clone(),
                &self.context,
            )),
            None => Box::new(repo),
        }
    }

    /// Analysis repository, behind the cache when one is configured.
    pub fn analyses(&self) -> Box<dyn Repository<DocumentAnalysis> + '_> {
        let repo = SqliteRepository::<DocumentAnalysis>::new(&self.context);
        match self.caches.as_ref() {
            Some(caches) => Box::new(CachedRepository::new(
                repo,
                caches.analyses.clone(),
                &self.context,
            )),
            None => Box::new(repo),
        }
    }

    /// Runs the save pipeline and flushes all staged changes atomically.
    pub fn save_changes(&self) -> RepoResult<usize> {
        self.context.save_changes()
    }

    pub fn begin_transaction(&self) -> RepoResult<()> {
        self.context.begin_transaction()
    }

    pub fn commit_transaction(&self) -> RepoResult<()> {
        self.context.commit_transaction()
    }

    pub fn rollback_transaction(&self) -> RepoResult<()> {
        self.context.rollback_transaction()
    }

    /// Stages un-deleting a soft-deleted entity.
    ///
    /// Obtain the entity through an include-deleted read first.
    pub fn restore<E: StoreMapping>(&self, entity: &E) -> RepoResult<()> {
        self.context.restore(entity)?;
        self.invalidate_cache_for::<E>();
        Ok(())
    }

    /// Stages physical removal. Administrative cleanup only.
    ///
    /// Removing a document also removes its analyses through the foreign
    /// key cascade, so both caches are invalidated.
    pub fn hard_delete<E: StoreMapping>(&self, entity: &E) -> RepoResult<()> {
        self.context.hard_delete(entity)?;
        self.invalidate_cache_for::<E>();
        if E::KIND == EntityKind::Document {
            self.invalidate_kind(EntityKind::DocumentAnalysis);
        }
        Ok(())
    }

    pub fn pending_changes(&self) -> usize {
        self.context.pending_changes()
    }

    pub fn discard_changes(&self) {
        self.context.discard_changes();
    }

    pub fn in_transaction(&self) -> bool {
        self.context.in_transaction()
    }

    /// Releases the connection, rolling back an open transaction.
    pub fn close(self) {
        let rolled_back = self.context.in_transaction();
        drop(self);
        info!("event=uow_close module=uow status=ok rolled_back={rolled_back}");
    }

    fn invalidate_cache_for<E: StoreMapping>(&self) {
        self.invalidate_kind(E::KIND);
    }

    fn invalidate_kind(&self, kind: EntityKind) {
        let Some(caches) = self.caches.as_ref() else {
            return;
        };
        self.context
            .defer_invalidation(kind, caches.invalidation_for(kind));
    }
}

/// Builds units of work that share configuration and caches.
pub struct UnitOfWorkFactory {
    location: StoreLocation,
    caches: Option<StoreCaches>,
    actor: Arc<dyn ActorProvider>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl UnitOfWorkFactory {
    /// Builds a factory from validated configuration.
    ///
    /// In-memory locations never get caches: every `create()` opens its own
    /// private database, so a shared cache would leak rows across them.
    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let location = config.location();
        let caches = match (&location, config.cache.enabled) {
            (StoreLocation::File(_), true) => Some(StoreCaches::new(
                config.cache_ttl(),
                config.cache.max_capacity,
            )),
            (StoreLocation::Memory, true) => {
                info!(
                    "event=uow_factory module=uow status=ok cache=disabled reason=private_memory_store"
                );
                None
            }
            (_, false) => None,
        };
        let actor = match config.audit.actor.as_deref() {
            Some(actor) => StaticActor::new(actor),
            None => StaticActor::system(),
        };

        Ok(Self {
            location,
            caches,
            actor: Arc::new(actor),
            clock: Arc::new(SystemClock),
            retry: config.retry_policy(),
        })
    }

    /// Replaces the configured actor, e.g. with a per-request identity source.
    pub fn with_actor_provider(mut self, actor: Arc<dyn ActorProvider>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn caches(&self) -> Option<&StoreCaches> {
        self.caches.as_ref()
    }

    /// Opens a fresh connection and wraps it in a new unit of work.
    pub fn create(&self) -> RepoResult<UnitOfWork> {
        let conn = match &self.location {
            StoreLocation::Memory => open_db_in_memory()?,
            StoreLocation::File(path) => open_db(path)?,
        };
        Ok(UnitOfWork::with_parts(
            conn,
            Arc::clone(&self.actor),
            Arc::clone(&self.clock),
            self.retry,
            self.caches.clone(),
        ))
    }
}
