//! Generic SQLite repository over any mapped entity.
//!
//! # Responsibility
//! - Implement [`Repository`] once for every [`StoreMapping`] entity.
//! - Record every row it returns as tracked on the owning context.
//!
//! # Invariants
//! - Reads run against the store, never against staged changes.
//! - Writes only stage; identity is assigned here, audit fields are not.

use super::mapping::{id_value, read_entity, select_columns, StoreMapping};
use super::query::{Predicate, Query};
use super::{RepoResult, Repository};
use crate::context::{ChangeKind, PersistenceContext};
use crate::model::entity::{Entity, EntityId};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use std::marker::PhantomData;
use uuid::Uuid;

/// SQLite-backed repository bound to one persistence context.
pub struct SqliteRepository<'ctx, E> {
    ctx: &'ctx PersistenceContext,
    _entity: PhantomData<fn() -> E>,
}

impl<'ctx, E: StoreMapping> SqliteRepository<'ctx, E> {
    pub fn new(ctx: &'ctx PersistenceContext) -> Self {
        Self {
            ctx,
            _entity: PhantomData,
        }
    }

    pub(crate) fn context(&self) -> &'ctx PersistenceContext {
        self.ctx
    }

    /// Runs `sql` (a full select of `E` columns) and decodes every row.
    pub(crate) fn load(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<E>> {
        let mut stmt = self.ctx.connection().prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut entities = Vec::new();

        while let Some(row) = rows.next()? {
            let entity = read_entity::<E>(row, 0)?;
            self.ctx.track(E::KIND, entity.id());
            entities.push(entity);
        }

        Ok(entities)
    }

    fn load_by_id(&self, id: EntityId, include_deleted: bool) -> RepoResult<Option<E>> {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            select_columns::<E>(None),
            E::TABLE
        );
        if !include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        Ok(self.load(&sql, vec![id_value(id)])?.into_iter().next())
    }
}

impl<E: StoreMapping> Repository<E> for SqliteRepository<'_, E> {
    fn get_by_id(&self, id: EntityId) -> RepoResult<Option<E>> {
        self.load_by_id(id, false)
    }

    fn get_by_id_including_deleted(&self, id: EntityId) -> RepoResult<Option<E>> {
        self.load_by_id(id, true)
    }

    fn get_all(&self) -> RepoResult<Vec<E>> {
        self.query(&Query::new())
    }

    fn find(&self, predicate: &Predicate<E::Field>) -> RepoResult<Vec<E>> {
        self.query(&Query::new().filter(predicate.clone()))
    }

    fn query(&self, query: &Query<E::Field>) -> RepoResult<Vec<E>> {
        let mut sql = format!("SELECT {} FROM {}", select_columns::<E>(None), E::TABLE);
        let mut binds = Vec::new();
        query.write_clauses(&mut sql, &mut binds);
        self.load(&sql, binds)
    }

    fn add(&self, mut entity: E) -> RepoResult<E> {
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        self.ctx.stage(ChangeKind::Insert, &entity)?;
        self.ctx.track(E::KIND, entity.id());
        Ok(entity)
    }

    fn update(&self, entity: &E) -> RepoResult<()> {
        if !self.ctx.is_tracked(E::KIND, entity.id()) {
            debug!(
                "event=stage module=repo status=skipped op=update kind={} id={} reason=untracked",
                E::KIND,
                entity.id()
            );
            return Ok(());
        }
        self.ctx.stage(ChangeKind::Update, entity)
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        self.ctx.stage(ChangeKind::SoftDelete, entity)
    }

    fn exists(&self, id: EntityId) -> RepoResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1 AND is_deleted = 0);",
            E::TABLE
        );
        let exists = self
            .ctx
            .connection()
            .query_row(&sql, params![id_value(id)], |row| row.get::<_, bool>(0))?;
        Ok(exists)
    }

    fn count(&self, predicate: Option<&Predicate<E::Field>>) -> RepoResult<u64> {
        let mut sql = format!("SELECT COUNT(*) FROM {} WHERE is_deleted = 0", E::TABLE);
        let mut binds = Vec::new();
        if let Some(predicate) = predicate {
            sql.push_str(" AND ");
            predicate.write_sql(&mut sql, &mut binds);
        }
        let count = self
            .ctx
            .connection()
            .query_row(&sql, params_from_iter(binds), |row| row.get::<_, i64>(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
