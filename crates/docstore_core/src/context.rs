//! Persistence context: staging buffer, tracking and the save pipeline.
//!
//! # Responsibility
//! - Buffer staged inserts/updates/deletes for one unit of work.
//! - Stamp audit fields and rewrite deletes into soft deletes at commit.
//! - Own the explicit transaction state of the underlying connection.
//!
//! # Invariants
//! - Every durable write goes through [`PersistenceContext::save_changes`].
//! - Updates never write `created_at`/`created_by` or deletion fields.
//! - A save is all-or-nothing; staged changes survive a failed save.
//! - Cache invalidations fire only once the written rows are durable.

use crate::model::entity::{EntityId, EntityKind, Timestamp, SYSTEM_ACTOR};
use crate::repo::mapping::{format_timestamp, id_value, StoreMapping, AUDIT_COLUMNS};
use crate::repo::{RepoError, RepoResult};
use chrono::{SubsecRound, Utc};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SAVEPOINT_NAME: &str = "docstore_save";

/// Source of "now" for audit stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock, UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Supplies the identity recorded in `*_by` audit fields.
pub trait ActorProvider: Send + Sync {
    /// `None` means no authenticated caller; [`SYSTEM_ACTOR`] is recorded.
    fn current_actor(&self) -> Option<String>;
}

/// Fixed actor identity, typically taken from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticActor(Option<String>);

impl StaticActor {
    pub fn new(actor: impl Into<String>) -> Self {
        Self(Some(actor.into()))
    }

    pub fn system() -> Self {
        Self(None)
    }
}

impl ActorProvider for StaticActor {
    fn current_actor(&self) -> Option<String> {
        self.0.clone()
    }
}

fn resolve_actor(provider: &dyn ActorProvider) -> String {
    provider
        .current_actor()
        .map(|actor| actor.trim().to_string())
        .filter(|actor| !actor.is_empty())
        .unwrap_or_else(|| SYSTEM_ACTOR.to_string())
}

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }
}

/// Invalidation target scheduled by caching repositories.
pub trait CacheInvalidation: Send + Sync {
    fn invalidate(&self);
}

/// Staged operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    /// Rewritten to an update of the deletion fields; no row is removed.
    SoftDelete,
    Restore,
    /// Physical removal; bypasses the visibility filter and stamping.
    HardDelete,
}

#[derive(Debug, Clone)]
struct PendingChange {
    op: ChangeKind,
    kind: EntityKind,
    table: &'static str,
    data_columns: &'static [&'static str],
    id: EntityId,
    data: Vec<Value>,
}

impl PendingChange {
    fn from_entity<E: StoreMapping>(op: ChangeKind, entity: &E) -> RepoResult<Self> {
        let data = match op {
            ChangeKind::Insert | ChangeKind::Update => entity.data_values()?,
            ChangeKind::SoftDelete | ChangeKind::Restore | ChangeKind::HardDelete => Vec::new(),
        };
        Ok(Self {
            op,
            kind: E::KIND,
            table: E::TABLE,
            data_columns: E::DATA_COLUMNS,
            id: entity.id(),
            data,
        })
    }

    /// Builds the statement for this change, stamped with `now`/`actor`.
    fn statement(&self, now: &str, actor: &str) -> (String, Vec<Value>) {
        let now = Value::Text(now.to_string());
        let actor = Value::Text(actor.to_string());
        let id = id_value(self.id);

        match self.op {
            ChangeKind::Insert => {
                let columns = std::iter::once("id")
                    .chain(self.data_columns.iter().copied())
                    .chain(AUDIT_COLUMNS)
                    .collect::<Vec<_>>();
                let placeholders = vec!["?"; columns.len()].join(", ");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders});",
                    self.table,
                    columns.join(", ")
                );
                let mut binds = Vec::with_capacity(columns.len());
                binds.push(id);
                binds.extend(self.data.iter().cloned());
                binds.extend([
                    now.clone(),
                    actor.clone(),
                    now,
                    actor,
                    Value::Integer(0),
                    Value::Null,
                    Value::Null,
                ]);
                (sql, binds)
            }
            ChangeKind::Update => {
                let assignments = self
                    .data_columns
                    .iter()
                    .map(|column| format!("{column} = ?"))
                    .chain(["updated_at = ?".to_string(), "updated_by = ?".to_string()])
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE {} SET {assignments} WHERE id = ? AND is_deleted = 0;",
                    self.table
                );
                let mut binds = self.data.clone();
                binds.extend([now, actor, id]);
                (sql, binds)
            }
            ChangeKind::SoftDelete => (
                format!(
                    "UPDATE {}
                     SET is_deleted = 1, deleted_at = ?1, deleted_by = ?2,
                         updated_at = ?1, updated_by = ?2
                     WHERE id = ?3 AND is_deleted = 0;",
                    self.table
                ),
                vec![now, actor, id],
            ),
            ChangeKind::Restore => (
                format!(
                    "UPDATE {}
                     SET is_deleted = 0, deleted_at = NULL, deleted_by = NULL,
                         updated_at = ?1, updated_by = ?2
                     WHERE id = ?3;",
                    self.table
                ),
                vec![now, actor, id],
            ),
            ChangeKind::HardDelete => (
                format!("DELETE FROM {} WHERE id = ?1;", self.table),
                vec![id],
            ),
        }
    }

    /// Whether zero affected rows means the row vanished under us.
    fn requires_row(&self) -> bool {
        !matches!(self.op, ChangeKind::HardDelete)
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteScope {
    Transaction,
    Savepoint,
}

impl WriteScope {
    fn begin_sql(self) -> String {
        match self {
            Self::Transaction => "BEGIN IMMEDIATE;".to_string(),
            Self::Savepoint => format!("SAVEPOINT {SAVEPOINT_NAME};"),
        }
    }

    fn commit_sql(self) -> String {
        match self {
            Self::Transaction => "COMMIT;".to_string(),
            Self::Savepoint => format!("RELEASE {SAVEPOINT_NAME};"),
        }
    }

    fn rollback_sql(self) -> String {
        match self {
            Self::Transaction => "ROLLBACK;".to_string(),
            Self::Savepoint => {
                format!("ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME};")
            }
        }
    }
}

/// One connection plus the staged change set of a single unit of work.
///
/// Not thread-safe; scope it to one logical operation.
pub struct PersistenceContext {
    conn: Connection,
    actor: Arc<dyn ActorProvider>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    pending: RefCell<Vec<PendingChange>>,
    tracked: RefCell<HashSet<(EntityKind, EntityId)>>,
    transaction_open: Cell<bool>,
    deferred_invalidations: RefCell<HashMap<EntityKind, Arc<dyn CacheInvalidation>>>,
}

impl PersistenceContext {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn new(
        conn: Connection,
        actor: Arc<dyn ActorProvider>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            conn,
            actor,
            clock,
            retry,
            pending: RefCell::new(Vec::new()),
            tracked: RefCell::new(HashSet::new()),
            transaction_open: Cell::new(false),
            deferred_invalidations: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn stage<E: StoreMapping>(&self, op: ChangeKind, entity: &E) -> RepoResult<()> {
        let change = PendingChange::from_entity(op, entity)?;
        debug!(
            "event=stage module=context status=ok op={:?} kind={} id={}",
            change.op, change.kind, change.id
        );
        self.pending.borrow_mut().push(change);
        Ok(())
    }

    pub(crate) fn track(&self, kind: EntityKind, id: EntityId) {
        self.tracked.borrow_mut().insert((kind, id));
    }

    pub(crate) fn is_tracked(&self, kind: EntityKind, id: EntityId) -> bool {
        self.tracked.borrow().contains(&(kind, id))
    }

    pub(crate) fn defer_invalidation(&self, kind: EntityKind, target: Arc<dyn CacheInvalidation>) {
        self.deferred_invalidations
            .borrow_mut()
            .insert(kind, target);
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_open.get()
    }

    pub fn pending_changes(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Drops every staged change and scheduled invalidation.
    pub fn discard_changes(&self) {
        self.pending.borrow_mut().clear();
        self.deferred_invalidations.borrow_mut().clear();
    }

    /// Stages clearing of the soft-delete tombstone.
    pub fn restore<E: StoreMapping>(&self, entity: &E) -> RepoResult<()> {
        self.stage(ChangeKind::Restore, entity)
    }

    /// Stages physical removal of the row, whatever its deletion state.
    pub fn hard_delete<E: StoreMapping>(&self, entity: &E) -> RepoResult<()> {
        self.stage(ChangeKind::HardDelete, entity)
    }

    /// Runs the save pipeline and flushes every staged change atomically.
    ///
    /// Returns the number of affected rows. Transient store failures are
    /// retried per the [`RetryPolicy`]; replaying is safe because a failed
    /// attempt leaves nothing applied.
    pub fn save_changes(&self) -> RepoResult<usize> {
        let changes = self.pending.borrow().clone();
        if changes.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        let actor = resolve_actor(self.actor.as_ref());
        let mut attempt = 1;
        let affected = loop {
            let now = format_timestamp(&self.clock.now().trunc_subsecs(6));
            match self.flush(&changes, &now, &actor) {
                Ok(affected) => break affected,
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "event=save_changes module=context status=retry attempt={} delay_ms={} error={}",
                        attempt,
                        delay.as_millis(),
                        err
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        "event=save_changes module=context status=error changes={} attempts={} duration_ms={} error={}",
                        changes.len(),
                        attempt,
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(err);
                }
            }
        };

        self.pending.borrow_mut().clear();
        if !self.transaction_open.get() {
            self.fire_invalidations();
        }

        info!(
            "event=save_changes module=context status=ok changes={} affected={} attempts={} duration_ms={}",
            changes.len(),
            affected,
            attempt,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    fn flush(&self, changes: &[PendingChange], now: &str, actor: &str) -> RepoResult<usize> {
        let scope = if self.transaction_open.get() {
            WriteScope::Savepoint
        } else {
            WriteScope::Transaction
        };

        self.conn.execute_batch(&scope.begin_sql())?;
        let result = self
            .apply(changes, now, actor)
            .and_then(|affected| {
                self.conn.execute_batch(&scope.commit_sql())?;
                Ok(affected)
            });

        if result.is_err() {
            if let Err(rollback_err) = self.conn.execute_batch(&scope.rollback_sql()) {
                error!(
                    "event=save_rollback module=context status=error scope={:?} error={}",
                    scope, rollback_err
                );
            }
        }
        result
    }

    fn apply(&self, changes: &[PendingChange], now: &str, actor: &str) -> RepoResult<usize> {
        let mut affected = 0;
        for change in changes {
            let (sql, binds) = change.statement(now, actor);
            let changed = self.conn.execute(&sql, params_from_iter(binds))?;
            if changed == 0 && change.requires_row() {
                return Err(RepoError::ConcurrencyConflict {
                    kind: change.kind,
                    id: change.id,
                });
            }
            affected += changed;
        }
        Ok(affected)
    }

    fn fire_invalidations(&self) {
        let targets = std::mem::take(&mut *self.deferred_invalidations.borrow_mut());
        for (kind, target) in targets {
            target.invalidate();
            debug!("event=cache_invalidate module=context status=ok kind={kind}");
        }
    }

    /// Opens an explicit transaction grouping several saves.
    pub fn begin_transaction(&self) -> RepoResult<()> {
        if self.transaction_open.get() {
            return Err(RepoError::TransactionMisuse("a transaction is already open"));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.transaction_open.set(true);
        info!("event=transaction_begin module=context status=ok");
        Ok(())
    }

    pub fn commit_transaction(&self) -> RepoResult<()> {
        if !self.transaction_open.get() {
            return Err(RepoError::TransactionMisuse("commit without an open transaction"));
        }
        self.conn.execute_batch("COMMIT;")?;
        self.transaction_open.set(false);
        if self.pending_changes() > 0 {
            warn!(
                "event=transaction_commit module=context status=ok unsaved_changes={}",
                self.pending_changes()
            );
        }
        self.fire_invalidations();
        info!("event=transaction_commit module=context status=ok");
        Ok(())
    }

    pub fn rollback_transaction(&self) -> RepoResult<()> {
        if !self.transaction_open.get() {
            return Err(RepoError::TransactionMisuse(
                "rollback without an open transaction",
            ));
        }
        self.transaction_open.set(false);
        self.deferred_invalidations.borrow_mut().clear();
        self.conn.execute_batch("ROLLBACK;")?;
        info!("event=transaction_rollback module=context status=ok");
        Ok(())
    }
}

impl Drop for PersistenceContext {
    fn drop(&mut self) {
        if !self.transaction_open.get() {
            return;
        }
        self.transaction_open.set(false);
        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => warn!("event=context_dispose module=context status=ok rolled_back=true"),
            Err(err) => error!(
                "event=context_dispose module=context status=error rolled_back=false error={}",
                err
            ),
        }
    }
}
