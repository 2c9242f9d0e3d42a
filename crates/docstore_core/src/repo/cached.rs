//! Read-through caching decorator over the repository contracts.
//!
//! # Responsibility
//! - Serve repeated reads from a process-wide cache with bounded TTL.
//! - Schedule coarse, per-entity-type invalidation for every mutation.
//!
//! # Invariants
//! - Invalidation fires only after the owning context made the write
//!   durable; failed saves and rollbacks never invalidate.
//! - While an explicit transaction is open the cache is bypassed, so
//!   uncommitted rows are never published to other units of work.
//! - Cache hits still mark returned entities as tracked.

use super::document_repo::DocumentRepository;
use super::query::{Predicate, Query};
use super::{RepoResult, Repository};
use crate::context::{CacheInvalidation, PersistenceContext};
use crate::model::analysis::DocumentAnalysis;
use crate::model::document::{Document, DocumentStatus};
use crate::model::entity::{Entity, EntityId, EntityKind};
use log::debug;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum CachedRead<E> {
    One(Option<E>),
    Many(Arc<Vec<E>>),
}

/// Process-wide cache for one entity type. Cloning shares the same store.
#[derive(Clone)]
pub struct EntityCache<E: Entity> {
    entries: Cache<String, CachedRead<E>>,
}

impl<E: Entity> EntityCache<E> {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Number of live entries after pending maintenance has run.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

impl<E: Entity> CacheInvalidation for EntityCache<E> {
    fn invalidate(&self) {
        self.invalidate_all();
    }
}

/// Caches shared by every unit of work created from one factory.
#[derive(Clone)]
pub struct StoreCaches {
    pub documents: EntityCache<Document>,
    pub analyses: EntityCache<DocumentAnalysis>,
}

impl StoreCaches {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            documents: EntityCache::new(ttl, max_capacity),
            analyses: EntityCache::new(ttl, max_capacity),
        }
    }

    pub(crate) fn invalidation_for(&self, kind: EntityKind) -> Arc<dyn CacheInvalidation> {
        match kind {
            EntityKind::Document => Arc::new(self.documents.clone()),
            EntityKind::DocumentAnalysis => Arc::new(self.analyses.clone()),
        }
    }
}

/// Repository decorator adding read-through caching.
pub struct CachedRepository<'ctx, E: Entity, R> {
    inner: R,
    cache: EntityCache<E>,
    ctx: &'ctx PersistenceContext,
}

impl<'ctx, E: Entity, R: Repository<E>> CachedRepository<'ctx, E, R> {
    pub fn new(inner: R, cache: EntityCache<E>, ctx: &'ctx PersistenceContext) -> Self {
        Self { inner, cache, ctx }
    }

    fn cached_one(
        &self,
        key: String,
        load: impl FnOnce(&R) -> RepoResult<Option<E>>,
    ) -> RepoResult<Option<E>> {
        if self.ctx.in_transaction() {
            return load(&self.inner);
        }
        if let Some(CachedRead::One(entity)) = self.cache.entries.get(&key) {
            debug!("event=cache_read module=cache status=hit kind={} key={}", E::KIND, key);
            if let Some(entity) = entity.as_ref() {
                self.ctx.track(E::KIND, entity.id());
            }
            return Ok(entity);
        }

        let entity = load(&self.inner)?;
        self.cache.entries.insert(key, CachedRead::One(entity.clone()));
        Ok(entity)
    }

    fn cached_many(
        &self,
        key: String,
        load: impl FnOnce(&R) -> RepoResult<Vec<E>>,
    ) -> RepoResult<Vec<E>> {
        if self.ctx.in_transaction() {
            return load(&self.inner);
        }
        if let Some(CachedRead::Many(entities)) = self.cache.entries.get(&key) {
            debug!("event=cache_read module=cache status=hit kind={} key={}", E::KIND, key);
            for entity in entities.iter() {
                self.ctx.track(E::KIND, entity.id());
            }
            return Ok(entities.as_ref().clone());
        }

        let entities = load(&self.inner)?;
        self.cache
            .entries
            .insert(key, CachedRead::Many(Arc::new(entities.clone())));
        Ok(entities)
    }

    fn schedule_invalidation(&self) {
        self.ctx
            .defer_invalidation(E::KIND, Arc::new(self.cache.clone()));
    }
}

impl<E: Entity, R: Repository<E>> Repository<E> for CachedRepository<'_, E, R> {
    fn get_by_id(&self, id: EntityId) -> RepoResult<Option<E>> {
        self.cached_one(format!("get_by_id:{id}"), |inner| inner.get_by_id(id))
    }

    fn get_by_id_including_deleted(&self, id: EntityId) -> RepoResult<Option<E>> {
        self.inner.get_by_id_including_deleted(id)
    }

    fn get_all(&self) -> RepoResult<Vec<E>> {
        self.cached_many("get_all".to_string(), |inner| inner.get_all())
    }

    fn find(&self, predicate: &Predicate<E::Field>) -> RepoResult<Vec<E>> {
        self.inner.find(predicate)
    }

    fn query(&self, query: &Query<E::Field>) -> RepoResult<Vec<E>> {
        self.inner.query(query)
    }

    fn add(&self, entity: E) -> RepoResult<E> {
        let added = self.inner.add(entity)?;
        self.schedule_invalidation();
        Ok(added)
    }

    fn update(&self, entity: &E) -> RepoResult<()> {
        self.inner.update(entity)?;
        self.schedule_invalidation();
        Ok(())
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        self.inner.delete(entity)?;
        self.schedule_invalidation();
        Ok(())
    }

    fn exists(&self, id: EntityId) -> RepoResult<bool> {
        self.inner.exists(id)
    }

    fn count(&self, predicate: Option<&Predicate<E::Field>>) -> RepoResult<u64> {
        self.inner.count(predicate)
    }
}

impl<R: DocumentRepository> DocumentRepository for CachedRepository<'_, Document, R> {
    fn get_by_category(&self, category: &str) -> RepoResult<Vec<Document>> {
        self.cached_many(format!("category:{category}"), |inner| {
            inner.get_by_category(category)
        })
    }

    fn get_by_status(&self, status: DocumentStatus) -> RepoResult<Vec<Document>> {
        self.cached_many(format!("status:{status}"), |inner| {
            inner.get_by_status(status)
        })
    }

    fn get_with_analyses(&self, id: EntityId) -> RepoResult<Option<Document>> {
        self.inner.get_with_analyses(id)
    }

    fn search(&self, term: &str) -> RepoResult<Vec<Document>> {
        self.cached_many(format!("search:{term}"), |inner| inner.search(term))
    }
}
