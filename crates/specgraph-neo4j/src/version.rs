//! # Schema Version Singleton and Migration Lock
//!
//! A single `GraphSchemaVersion {singleton: true}` node records the current
//! schema version, the last applied migration, the completed sprints, and
//! the migration lock. The lock is a conditional update inside the engine's
//! own transactional world: setting `migration_in_progress = true` succeeds
//! only when it is currently false, which is sufficient to guarantee one
//! migration writer at a time.
//!
//! Locks older than the stale timeout are assumed abandoned: any process
//! may clear them, recording a `StaleLockCleared` event on the singleton.

use crate::engine::GraphEngine;
use crate::statement::Statement;
use serde_json::Value;
use specgraph::error::{LockError, StoreResult};
use specgraph::time::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default stale-lock timeout (30 minutes).
pub const DEFAULT_STALE_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Snapshot of the singleton node.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionState {
    /// Current schema version; 0 before the first migration completes.
    pub current_version: i64,
    /// Id of the last completed migration, when any.
    pub last_migration: Option<String>,
    /// Sprints whose migrations have all completed.
    pub sprints_completed: Vec<String>,
    /// Whether a migration currently holds the lock.
    pub migration_in_progress: bool,
    /// Holder of the lock, when held.
    pub locked_by: Option<String>,
    /// When the lock was taken (epoch milliseconds), when held.
    pub locked_at: Option<i64>,
}

/// Proof of lock ownership, passed back on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLock {
    /// The owner string the lock was acquired with.
    pub owner: String,
    /// When the lock was acquired (epoch milliseconds).
    pub acquired_at: i64,
}

/// Coordinator for the singleton. Only the migration engine writes through
/// this type.
#[derive(Clone)]
pub struct VersionCoordinator {
    engine: Arc<dyn GraphEngine>,
    stale_lock_timeout: Duration,
}

impl VersionCoordinator {
    /// A coordinator over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>, stale_lock_timeout: Duration) -> Self {
        Self {
            engine,
            stale_lock_timeout,
        }
    }

    /// Statement that creates the singleton when absent. Safe to re-run.
    #[must_use]
    pub fn ensure_singleton_statement() -> Statement {
        Statement::new(
            "MERGE (v:GraphSchemaVersion {singleton: true}) \
             ON CREATE SET v.current_version = 0, v.sprints_completed = [], \
             v.migration_in_progress = false",
        )
        .idempotent()
    }

    /// Read the singleton. `None` before the first migration ever ran.
    pub async fn state(&self) -> StoreResult<Option<VersionState>> {
        let statement = Statement::new(
            "MATCH (v:GraphSchemaVersion {singleton: true}) \
             RETURN v.current_version AS current_version, \
             v.last_migration AS last_migration, \
             v.sprints_completed AS sprints_completed, \
             v.migration_in_progress AS migration_in_progress, \
             v.locked_by AS locked_by, v.locked_at AS locked_at",
        )
        .returning(&[
            "current_version",
            "last_migration",
            "sprints_completed",
            "migration_in_progress",
            "locked_by",
            "locked_at",
        ])
        .idempotent();
        let records = self.engine.execute(statement).await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(VersionState {
            current_version: record
                .get("current_version")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            last_migration: record
                .get("last_migration")
                .and_then(Value::as_str)
                .map(String::from),
            sprints_completed: record
                .get("sprints_completed")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            migration_in_progress: record
                .get("migration_in_progress")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            locked_by: record
                .get("locked_by")
                .and_then(Value::as_str)
                .map(String::from),
            locked_at: record.get("locked_at").and_then(Value::as_i64),
        }))
    }

    /// Current schema version; 0 when the singleton does not exist yet.
    pub async fn current_version(&self) -> StoreResult<i64> {
        Ok(self
            .state()
            .await?
            .map(|state| state.current_version)
            .unwrap_or(0))
    }

    /// Try to take the migration lock.
    ///
    /// A held lock older than the stale timeout is cleared (recording a
    /// `StaleLockCleared` event) and the acquisition is retried once.
    ///
    /// # Errors
    ///
    /// `LockError::Busy` when another live migration holds the lock.
    pub async fn acquire(&self, owner: &str) -> StoreResult<MigrationLock> {
        self.engine
            .run(Self::ensure_singleton_statement())
            .await?;
        if let Some(lock) = self.try_acquire(owner).await? {
            return Ok(lock);
        }

        // Lock is held. Stale holders are cleared and the acquisition
        // retried once; live holders surface as Busy.
        let state = self.state().await?.unwrap_or_else(|| VersionState {
            current_version: 0,
            last_migration: None,
            sprints_completed: Vec::new(),
            migration_in_progress: false,
            locked_by: None,
            locked_at: None,
        });
        let held_by = state.locked_by.clone().unwrap_or_default();
        let locked_at = state.locked_at.unwrap_or(0);
        let stale_horizon = now_millis() - self.stale_lock_timeout.as_millis() as i64;
        if state.migration_in_progress && locked_at < stale_horizon {
            warn!(
                "clearing stale migration lock held by {held_by} since {locked_at}"
            );
            self.clear_stale(owner, &held_by, locked_at).await?;
            if let Some(lock) = self.try_acquire(owner).await? {
                return Ok(lock);
            }
        }
        Err(LockError::Busy {
            held_by,
            since: locked_at,
        }
        .into())
    }

    async fn try_acquire(&self, owner: &str) -> StoreResult<Option<MigrationLock>> {
        let now = now_millis();
        let statement = Statement::new(
            "MATCH (v:GraphSchemaVersion {singleton: true}) \
             WHERE coalesce(v.migration_in_progress, false) = false \
             SET v.migration_in_progress = true, v.locked_by = $owner, v.locked_at = $now \
             RETURN v.locked_by AS locked_by",
        )
        .param("owner", owner)
        .param("now", now)
        .returning(&["locked_by"]);
        let records = self.engine.execute(statement).await?;
        let acquired = records
            .first()
            .and_then(|record| record.get("locked_by"))
            .and_then(Value::as_str)
            == Some(owner);
        if acquired {
            debug!("migration lock acquired by {owner}");
            Ok(Some(MigrationLock {
                owner: owner.to_string(),
                acquired_at: now,
            }))
        } else {
            Ok(None)
        }
    }

    /// Clear a stale lock, conditional on the observed holder, and record
    /// the takeover on the singleton.
    async fn clear_stale(
        &self,
        cleared_by: &str,
        previous_owner: &str,
        locked_at: i64,
    ) -> StoreResult<()> {
        let statement = Statement::new(
            "MATCH (v:GraphSchemaVersion {singleton: true}) \
             WHERE v.migration_in_progress = true \
             AND v.locked_by = $previous_owner AND v.locked_at = $locked_at \
             SET v.migration_in_progress = false \
             REMOVE v.locked_by, v.locked_at \
             WITH v \
             CREATE (e:StaleLockCleared {previous_owner: $previous_owner, \
             locked_at: $locked_at, cleared_by: $cleared_by, cleared_at: $now}) \
             CREATE (v)-[:LOCK_EVENT]->(e)",
        )
        .param("previous_owner", previous_owner)
        .param("locked_at", locked_at)
        .param("cleared_by", cleared_by)
        .param("now", now_millis());
        self.engine.run(statement).await?;
        info!("stale migration lock of {previous_owner} cleared by {cleared_by}");
        Ok(())
    }

    /// Release a held lock. A no-op when the lock is no longer held by
    /// `lock.owner` (e.g. it was cleared as stale).
    pub async fn release(&self, lock: &MigrationLock) -> StoreResult<()> {
        let statement = Statement::new(
            "MATCH (v:GraphSchemaVersion {singleton: true}) \
             WHERE v.locked_by = $owner \
             SET v.migration_in_progress = false \
             REMOVE v.locked_by, v.locked_at",
        )
        .param("owner", lock.owner.as_str());
        self.engine.run(statement).await?;
        debug!("migration lock released by {}", lock.owner);
        Ok(())
    }

    /// Statement advancing the singleton to a new version. Runs inside the
    /// same transaction as the migration's final step; a failed migration
    /// therefore leaves the singleton unchanged.
    #[must_use]
    pub fn advance_statement(version: i64, migration_id: &str, sprint: &str) -> Statement {
        Statement::new(
            "MATCH (v:GraphSchemaVersion {singleton: true}) \
             SET v.current_version = $version, v.last_migration = $migration_id, \
             v.sprints_completed = CASE \
             WHEN $sprint IN coalesce(v.sprints_completed, []) THEN v.sprints_completed \
             ELSE coalesce(v.sprints_completed, []) + $sprint END",
        )
        .param("version", version)
        .param("migration_id", migration_id)
        .param("sprint", sprint)
        .idempotent()
    }
}
