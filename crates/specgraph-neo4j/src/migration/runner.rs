//! Migration execution.

use crate::contract_runner::ContractRunner;
use crate::engine::GraphEngine;
use crate::migration::{
    Migration, MigrationBatch, MigrationContext, MigrationPlan, MigrationRegistry, ShadowPlan,
};
use crate::statement::Statement;
use crate::temporal::TemporalStamp;
use crate::version::{VersionCoordinator, VersionState};
use serde_json::Value;
use specgraph::actor::Actor;
use specgraph::contract::contract_for_version;
use specgraph::error::{MigrationError, StoreResult};
use specgraph::migration::{AtomicMode, MigrationDescriptor, MigrationRunRecord, MigrationStatus};
use specgraph::time::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default checkpoint batch size.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Caller-facing knobs for one migration invocation.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Atomicity mode override; the migration's default applies when
    /// absent.
    pub mode: Option<AtomicMode>,
    /// Validate everything and record a `dry_run` `MigrationRun`, writing
    /// no IR data.
    pub dry_run: bool,
}

/// Drives migrations against the graph: lock acquisition, version and
/// dependency checks, mode dispatch, checkpointing, stamped rollback, the
/// post-run shape-contract gate, and `MigrationRun` bookkeeping.
pub struct MigrationEngine {
    engine: Arc<dyn GraphEngine>,
    coordinator: VersionCoordinator,
    contracts: ContractRunner,
    registry: MigrationRegistry,
    batch_size: usize,
}

impl MigrationEngine {
    /// An engine over the given graph client and registry.
    #[must_use]
    pub fn new(
        engine: Arc<dyn GraphEngine>,
        registry: MigrationRegistry,
        stale_lock_timeout: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            coordinator: VersionCoordinator::new(Arc::clone(&engine), stale_lock_timeout),
            contracts: ContractRunner::new(Arc::clone(&engine)),
            engine,
            registry,
            batch_size: batch_size.max(1),
        }
    }

    /// The version coordinator backing this engine.
    #[must_use]
    pub fn coordinator(&self) -> &VersionCoordinator {
        &self.coordinator
    }

    /// Run one migration under the singleton lock.
    pub async fn run_migration(
        &self,
        migration_id: &str,
        options: MigrationOptions,
    ) -> StoreResult<MigrationRunRecord> {
        let migration =
            self.registry
                .get(migration_id)
                .ok_or_else(|| MigrationError::UnknownMigration {
                    migration_id: migration_id.to_string(),
                })?;
        self.registry.execution_order()?;
        let descriptor = migration.descriptor();
        let owner = format!("specgraph-{}", Uuid::new_v4());
        let lock = self.coordinator.acquire(&owner).await?;
        let result = self
            .run_locked(migration.as_ref(), &descriptor, &options, None)
            .await;
        if let Err(release_error) = self.coordinator.release(&lock).await {
            warn!("failed to release migration lock: {release_error}");
        }
        result
    }

    /// Resume the latest invocation of a checkpoint-mode migration. When
    /// the latest run is still marked `running` (an abandoned process),
    /// execution continues at `last_checkpoint + 1`; otherwise this is a
    /// fresh `run_migration`.
    pub async fn resume_migration(&self, migration_id: &str) -> StoreResult<MigrationRunRecord> {
        let Some(abandoned) = self.latest_running_run(migration_id).await? else {
            debug!("no abandoned run of {migration_id}; starting fresh");
            return self.run_migration(migration_id, MigrationOptions::default()).await;
        };
        let migration =
            self.registry
                .get(migration_id)
                .ok_or_else(|| MigrationError::UnknownMigration {
                    migration_id: migration_id.to_string(),
                })?;
        let descriptor = migration.descriptor();
        let owner = format!("specgraph-{}", Uuid::new_v4());
        let lock = self.coordinator.acquire(&owner).await?;
        info!(
            "resuming migration {migration_id} run {} after batch {}",
            abandoned.run_id, abandoned.last_checkpoint
        );
        let result = self
            .run_locked(
                migration.as_ref(),
                &descriptor,
                &MigrationOptions::default(),
                Some(abandoned),
            )
            .await;
        if let Err(release_error) = self.coordinator.release(&lock).await {
            warn!("failed to release migration lock: {release_error}");
        }
        result
    }

    /// Apply every registered migration whose precondition matches, in
    /// execution order, until the graph is at the newest version.
    pub async fn migrate_to_latest(&self) -> StoreResult<Vec<MigrationRunRecord>> {
        let order = self.registry.execution_order()?;
        let by_id = self.registry.by_id();
        let mut records = Vec::new();
        for migration_id in order {
            let Some(descriptor) = by_id.get(&migration_id) else {
                continue;
            };
            let current = self.coordinator.current_version().await?;
            if descriptor.schema_version_after <= current {
                continue;
            }
            records.push(
                self.run_migration(&migration_id, MigrationOptions::default())
                    .await?,
            );
        }
        Ok(records)
    }

    async fn run_locked(
        &self,
        migration: &dyn Migration,
        descriptor: &MigrationDescriptor,
        options: &MigrationOptions,
        resume: Option<AbandonedRun>,
    ) -> StoreResult<MigrationRunRecord> {
        let prior = self.coordinator.state().await?.unwrap_or(VersionState {
            current_version: 0,
            last_migration: None,
            sprints_completed: Vec::new(),
            migration_in_progress: true,
            locked_by: None,
            locked_at: None,
        });

        // Re-running against a graph already at the target version is a
        // recorded no-op.
        if !options.dry_run && resume.is_none()
            && prior.current_version == descriptor.schema_version_after
        {
            info!(
                "migration {} already applied (version {}), recording no-op",
                descriptor.id, prior.current_version
            );
            let record = self
                .noop_record(descriptor, options.mode.unwrap_or(descriptor.default_mode))
                .await?;
            return Ok(record);
        }

        if prior.current_version != descriptor.schema_version_before {
            return Err(MigrationError::VersionMismatch {
                migration_id: descriptor.id.clone(),
                expected: descriptor.schema_version_before,
                found: prior.current_version,
            }
            .into());
        }
        self.check_dependencies(descriptor).await?;

        let started_at = resume.as_ref().map_or_else(now_millis, |r| r.started_at);
        let run_id = resume
            .as_ref()
            .map_or_else(|| Uuid::new_v4().to_string(), |r| r.run_id.clone());
        let context = MigrationContext {
            migration_id: descriptor.id.clone(),
            run_id: run_id.clone(),
            stamp: TemporalStamp::at(now_millis(), Actor::Migration),
            batch_size: self.batch_size,
        };

        if resume.is_none() {
            self.engine
                .run(create_run_statement(
                    descriptor,
                    &context,
                    started_at,
                    options.dry_run,
                    options.mode.unwrap_or(descriptor.default_mode),
                ))
                .await?;
        }

        let planned = migration.plan(&self.engine, &context).await?;

        let requested_mode = options.mode.unwrap_or(descriptor.default_mode);
        let mode = match &planned.plan {
            // A shadow plan is executed as such regardless of the caller's
            // mode preference.
            MigrationPlan::Shadow(_) => AtomicMode::Shadow,
            MigrationPlan::Batches(_) if requested_mode == AtomicMode::SingleTx => {
                AtomicMode::SingleTx
            }
            MigrationPlan::Batches(_) => AtomicMode::Checkpoint,
        };

        if options.dry_run {
            // Validations all passed and the plan was produced; nothing
            // but the run node is written.
            debug!("dry run of {} validated ({} mode)", descriptor.id, mode.as_str());
            let record = self
                .finalize(
                    descriptor,
                    &context,
                    started_at,
                    MigrationStatus::DryRun,
                    mode,
                    0,
                    0,
                    0,
                    None,
                )
                .await?;
            return Ok(record);
        }

        let skip_through = resume.map_or(0, |r| r.last_checkpoint);
        let executed = match (&planned.plan, mode) {
            (MigrationPlan::Shadow(shadow), _) => self.execute_shadow(descriptor, shadow).await,
            (MigrationPlan::Batches(batches), AtomicMode::SingleTx) => {
                self.execute_single_tx(descriptor, batches).await
            }
            (MigrationPlan::Batches(batches), _) => {
                self.execute_checkpointed(descriptor, &context, batches, skip_through)
                    .await
            }
        };

        let (updates, deletes) = match executed {
            Ok(counts) => counts,
            Err(failure) => {
                self.rollback(descriptor, &context, started_at, &prior).await;
                let message = failure.to_string();
                self.finalize(
                    descriptor,
                    &context,
                    started_at,
                    MigrationStatus::RolledBack,
                    mode,
                    0,
                    0,
                    0,
                    Some(&message),
                )
                .await
                .ok();
                return Err(failure);
            }
        };

        // Post-migration shape-contract gate.
        if let Some(contract) = contract_for_version(descriptor.schema_version_after) {
            let report = self.contracts.run(&contract).await?;
            if !report.passed() {
                error!(
                    "shape contract {} failed after migration {}: {} violation(s)",
                    contract.contract_id,
                    descriptor.id,
                    report.violations.len()
                );
                self.rollback(descriptor, &context, started_at, &prior).await;
                let failure = MigrationError::ContractAssertionFailed {
                    migration_id: descriptor.id.clone(),
                    violations: report.violations.len(),
                };
                self.finalize(
                    descriptor,
                    &context,
                    started_at,
                    MigrationStatus::Failed,
                    mode,
                    0,
                    0,
                    0,
                    Some(&failure.to_string()),
                )
                .await
                .ok();
                return Err(failure.into());
            }
        }

        let created = self.count_stamped(&context, started_at).await?;
        if !planned.affected_app_ids.is_empty() {
            self.engine
                .run(affected_statement(&context.run_id, &planned.affected_app_ids))
                .await?;
        }
        let record = self
            .finalize(
                descriptor,
                &context,
                started_at,
                MigrationStatus::Completed,
                mode,
                created,
                updates,
                deletes,
                None,
            )
            .await?;
        info!(
            "migration {} completed: version {} -> {}, {} objects created",
            descriptor.id,
            descriptor.schema_version_before,
            descriptor.schema_version_after,
            created
        );
        Ok(record)
    }

    async fn execute_single_tx(
        &self,
        descriptor: &MigrationDescriptor,
        batches: &[MigrationBatch],
    ) -> StoreResult<(i64, i64)> {
        let all_atomic = batches.iter().all(|b| b.atomic);
        let advance = VersionCoordinator::advance_statement(
            descriptor.schema_version_after,
            &descriptor.id,
            &descriptor.sprint,
        );
        let mut updates = 0i64;
        let mut deletes = 0i64;
        if all_atomic {
            let mut statements: Vec<Statement> = Vec::new();
            for batch in batches {
                statements.extend(batch.statements.iter().cloned());
                updates += batch.updates as i64;
                deletes += batch.deletes as i64;
            }
            statements.push(advance);
            self.engine.run_atomic(statements).await?;
        } else {
            // Schema statements take their own implicit transactions; the
            // version bump follows once every statement has applied.
            for batch in batches {
                for statement in &batch.statements {
                    self.engine.run(statement.clone()).await?;
                }
                updates += batch.updates as i64;
                deletes += batch.deletes as i64;
            }
            self.engine.run(advance).await?;
        }
        Ok((updates, deletes))
    }

    async fn execute_checkpointed(
        &self,
        descriptor: &MigrationDescriptor,
        context: &MigrationContext,
        batches: &[MigrationBatch],
        skip_through: u64,
    ) -> StoreResult<(i64, i64)> {
        let mut updates = 0i64;
        let mut deletes = 0i64;
        let last_ordinal = batches.iter().map(|b| b.ordinal).max().unwrap_or(0);
        for batch in batches {
            if batch.ordinal <= skip_through {
                debug!(
                    "skipping batch {} of {} (checkpointed)",
                    batch.ordinal, descriptor.id
                );
                continue;
            }
            let checkpoint = checkpoint_statement(
                &context.run_id,
                batch.ordinal,
                batch.records,
                context.stamp.now(),
            );
            let is_last = batch.ordinal == last_ordinal;
            let outcome = if batch.atomic {
                let mut group = batch.statements.clone();
                group.push(checkpoint);
                if is_last {
                    group.push(VersionCoordinator::advance_statement(
                        descriptor.schema_version_after,
                        &descriptor.id,
                        &descriptor.sprint,
                    ));
                }
                self.engine.run_atomic(group).await
            } else {
                let mut result = Ok(());
                for statement in &batch.statements {
                    result = self.engine.run(statement.clone()).await;
                    if result.is_err() {
                        break;
                    }
                }
                if result.is_ok() {
                    result = self.engine.run(checkpoint).await;
                }
                if result.is_ok() && is_last {
                    result = self
                        .engine
                        .run(VersionCoordinator::advance_statement(
                            descriptor.schema_version_after,
                            &descriptor.id,
                            &descriptor.sprint,
                        ))
                        .await;
                }
                result
            };
            if let Err(failure) = outcome {
                return Err(MigrationError::CheckpointFailed {
                    migration_id: descriptor.id.clone(),
                    batch: batch.ordinal,
                    reason: failure.to_string(),
                }
                .into());
            }
            updates += batch.updates as i64;
            deletes += batch.deletes as i64;
            debug!(
                "migration {} batch {}/{} checkpointed ({} records)",
                descriptor.id, batch.ordinal, last_ordinal, batch.records
            );
        }
        if last_ordinal == 0 {
            // Empty plan still advances the version.
            self.engine
                .run(VersionCoordinator::advance_statement(
                    descriptor.schema_version_after,
                    &descriptor.id,
                    &descriptor.sprint,
                ))
                .await?;
        }
        Ok((updates, deletes))
    }

    async fn execute_shadow(
        &self,
        descriptor: &MigrationDescriptor,
        shadow: &ShadowPlan,
    ) -> StoreResult<(i64, i64)> {
        for statement in &shadow.build {
            if let Err(failure) = self.engine.run(statement.clone()).await {
                self.discard_shadow(shadow).await;
                return Err(MigrationError::ShadowPromotionFailed {
                    migration_id: descriptor.id.clone(),
                    reason: format!("shadow build failed: {failure}"),
                }
                .into());
            }
        }
        for check in &shadow.checks {
            let records = self.engine.execute(check.statement.clone()).await?;
            let count = records
                .first()
                .and_then(|r| r.get("count"))
                .and_then(Value::as_i64)
                .unwrap_or(-1);
            if count != check.expected {
                self.discard_shadow(shadow).await;
                return Err(MigrationError::ShadowPromotionFailed {
                    migration_id: descriptor.id.clone(),
                    reason: format!(
                        "invariant {} expected {} shadow objects, found {count}",
                        check.name, check.expected
                    ),
                }
                .into());
            }
        }
        let mut promote = shadow.promote.clone();
        promote.push(VersionCoordinator::advance_statement(
            descriptor.schema_version_after,
            &descriptor.id,
            &descriptor.sprint,
        ));
        if let Err(failure) = self.engine.run_atomic(promote).await {
            self.discard_shadow(shadow).await;
            return Err(MigrationError::ShadowPromotionFailed {
                migration_id: descriptor.id.clone(),
                reason: format!("promotion failed: {failure}"),
            }
            .into());
        }
        Ok((0, 0))
    }

    async fn discard_shadow(&self, shadow: &ShadowPlan) {
        for statement in &shadow.discard {
            if let Err(failure) = self.engine.run(statement.clone()).await {
                warn!("failed to discard shadow set: {failure}");
            }
        }
    }

    /// Delete every node stamped by this run and restore the singleton to
    /// its pre-run state.
    async fn rollback(
        &self,
        descriptor: &MigrationDescriptor,
        context: &MigrationContext,
        started_at: i64,
        prior: &VersionState,
    ) {
        warn!("rolling back migration {} run {}", descriptor.id, context.run_id);
        let cleanup = Statement::new(
            "MATCH (n {migration_id: $migration_id}) \
             WHERE n.created_at >= $started_at \
             AND NOT n:MigrationRun AND NOT n:MigrationCheckpoint \
             DETACH DELETE n",
        )
        .param("migration_id", context.migration_id.as_str())
        .param("started_at", started_at)
        .idempotent();
        if let Err(failure) = self.engine.run(cleanup).await {
            error!("stamped-node cleanup failed for {}: {failure}", descriptor.id);
        }
        let restore = Statement::new(
            "MATCH (v:GraphSchemaVersion {singleton: true}) \
             SET v.current_version = $version, v.last_migration = $last_migration, \
             v.sprints_completed = $sprints",
        )
        .param("version", prior.current_version)
        .param(
            "last_migration",
            prior
                .last_migration
                .as_deref()
                .map(Value::from)
                .unwrap_or(Value::Null),
        )
        .param(
            "sprints",
            Value::Array(
                prior
                    .sprints_completed
                    .iter()
                    .map(|s| Value::from(s.as_str()))
                    .collect(),
            ),
        )
        .idempotent();
        if let Err(failure) = self.engine.run(restore).await {
            error!("singleton restore failed for {}: {failure}", descriptor.id);
        }
    }

    async fn check_dependencies(&self, descriptor: &MigrationDescriptor) -> StoreResult<()> {
        for dependency in &descriptor.dependencies {
            let statement = Statement::new(
                "MATCH (r:MigrationRun {migration_id: $migration_id, status: 'completed'}) \
                 RETURN count(r) AS count",
            )
            .param("migration_id", dependency.as_str())
            .returning(&["count"])
            .idempotent();
            let records = self.engine.execute(statement).await?;
            let completed = records
                .first()
                .and_then(|r| r.get("count"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if completed == 0 {
                return Err(MigrationError::UnmetDependency {
                    migration_id: descriptor.id.clone(),
                    dependency: dependency.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn count_stamped(
        &self,
        context: &MigrationContext,
        started_at: i64,
    ) -> StoreResult<i64> {
        let statement = Statement::new(
            "MATCH (n {migration_id: $migration_id}) \
             WHERE n.created_at >= $started_at \
             AND NOT n:MigrationRun AND NOT n:MigrationCheckpoint \
             RETURN count(n) AS count",
        )
        .param("migration_id", context.migration_id.as_str())
        .param("started_at", started_at)
        .returning(&["count"])
        .idempotent();
        let records = self.engine.execute(statement).await?;
        Ok(records
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    async fn latest_running_run(&self, migration_id: &str) -> StoreResult<Option<AbandonedRun>> {
        let statement = Statement::new(
            "MATCH (r:MigrationRun {migration_id: $migration_id}) \
             RETURN r.run_id AS run_id, r.status AS status, r.started_at AS started_at \
             ORDER BY r.started_at DESC LIMIT 1",
        )
        .param("migration_id", migration_id)
        .returning(&["run_id", "status", "started_at"])
        .idempotent();
        let records = self.engine.execute(statement).await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };
        if record.get("status").and_then(Value::as_str) != Some("running") {
            return Ok(None);
        }
        let run_id = record
            .get("run_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let started_at = record
            .get("started_at")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let checkpoint_statement = Statement::new(
            "MATCH (r:MigrationRun {run_id: $run_id})-[:HAS_CHECKPOINT]->(c:MigrationCheckpoint) \
             RETURN coalesce(max(c.batch), 0) AS last_batch",
        )
        .param("run_id", run_id.as_str())
        .returning(&["last_batch"])
        .idempotent();
        let checkpoints = self.engine.execute(checkpoint_statement).await?;
        let last_checkpoint = checkpoints
            .first()
            .and_then(|r| r.get("last_batch"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
            .max(0) as u64;
        Ok(Some(AbandonedRun {
            run_id,
            started_at,
            last_checkpoint,
        }))
    }

    async fn noop_record(
        &self,
        descriptor: &MigrationDescriptor,
        mode: AtomicMode,
    ) -> StoreResult<MigrationRunRecord> {
        let now = now_millis();
        let context = MigrationContext {
            migration_id: descriptor.id.clone(),
            run_id: Uuid::new_v4().to_string(),
            stamp: TemporalStamp::at(now, Actor::Migration),
            batch_size: self.batch_size,
        };
        self.engine
            .run(create_run_statement(descriptor, &context, now, false, mode))
            .await?;
        self.finalize(
            descriptor,
            &context,
            now,
            MigrationStatus::Completed,
            mode,
            0,
            0,
            0,
            None,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        descriptor: &MigrationDescriptor,
        context: &MigrationContext,
        started_at: i64,
        status: MigrationStatus,
        mode: AtomicMode,
        created: i64,
        updated: i64,
        deleted: i64,
        error_details: Option<&str>,
    ) -> StoreResult<MigrationRunRecord> {
        let completed_at = now_millis();
        let duration_seconds = (completed_at - started_at).max(0) as f64 / 1_000.0;
        let statement = Statement::new(
            "MATCH (r:MigrationRun {run_id: $run_id}) \
             SET r.status = $status, r.completed_at = $completed_at, \
             r.duration_seconds = $duration_seconds, r.objects_created = $created, \
             r.objects_updated = $updated, r.objects_deleted = $deleted, \
             r.error_details = $error_details",
        )
        .param("run_id", context.run_id.as_str())
        .param("status", status.as_str())
        .param("completed_at", completed_at)
        .param("duration_seconds", duration_seconds)
        .param("created", created)
        .param("updated", updated)
        .param("deleted", deleted)
        .param(
            "error_details",
            error_details.map(Value::from).unwrap_or(Value::Null),
        );
        self.engine.run(statement).await?;
        Ok(MigrationRunRecord {
            migration_id: descriptor.id.clone(),
            run_id: context.run_id.clone(),
            migration_name: descriptor.name.clone(),
            sprint: descriptor.sprint.clone(),
            schema_version_before: descriptor.schema_version_before,
            schema_version_after: if status == MigrationStatus::Completed {
                descriptor.schema_version_after
            } else {
                descriptor.schema_version_before
            },
            status,
            started_at,
            completed_at: Some(completed_at),
            duration_seconds: Some(duration_seconds),
            objects_created: created,
            objects_updated: updated,
            objects_deleted: deleted,
            error_details: error_details.map(String::from),
            dry_run: status == MigrationStatus::DryRun,
            atomic_mode: mode,
        })
    }
}

struct AbandonedRun {
    run_id: String,
    started_at: i64,
    last_checkpoint: u64,
}

fn create_run_statement(
    descriptor: &MigrationDescriptor,
    context: &MigrationContext,
    started_at: i64,
    dry_run: bool,
    mode: AtomicMode,
) -> Statement {
    Statement::new(
        "CREATE (r:MigrationRun {migration_id: $migration_id, run_id: $run_id, \
         migration_name: $migration_name, sprint: $sprint, \
         schema_version_before: $before, schema_version_after: $after, \
         status: 'running', started_at: $started_at, \
         objects_created: 0, objects_updated: 0, objects_deleted: 0, \
         dry_run: $dry_run, atomic_mode: $atomic_mode})",
    )
    .param("migration_id", descriptor.id.as_str())
    .param("run_id", context.run_id.as_str())
    .param("migration_name", descriptor.name.as_str())
    .param("sprint", descriptor.sprint.as_str())
    .param("before", descriptor.schema_version_before)
    .param("after", descriptor.schema_version_after)
    .param("started_at", started_at)
    .param("dry_run", dry_run)
    .param("atomic_mode", mode.as_str())
}

fn checkpoint_statement(run_id: &str, batch: u64, records: u64, now: i64) -> Statement {
    Statement::new(
        "MATCH (r:MigrationRun {run_id: $run_id}) \
         CREATE (c:MigrationCheckpoint {batch: $batch, records_processed: $records, \
         succeeded: true, recorded_at: $now}) \
         CREATE (r)-[:HAS_CHECKPOINT]->(c)",
    )
    .param("run_id", run_id)
    .param("batch", batch as i64)
    .param("records", records as i64)
    .param("now", now)
}

fn affected_statement(run_id: &str, app_ids: &[String]) -> Statement {
    Statement::new(
        "MATCH (r:MigrationRun {run_id: $run_id}) \
         UNWIND $app_ids AS app_id \
         MATCH (app:ApplicationIR {app_id: app_id}) \
         MERGE (r)-[:AFFECTED]->(app)",
    )
    .param("run_id", run_id)
    .param(
        "app_ids",
        Value::Array(app_ids.iter().map(|id| Value::from(id.as_str())).collect()),
    )
    .idempotent()
}
