//! # Migration Engine
//!
//! Applies ordered, idempotent migrations under the schema-version
//! singleton lock, in one of three atomicity modes:
//!
//! - **single transaction** for small migrations (≤ ~1 000 nodes),
//! - **checkpoint mode** (the default) slicing work into batches, each in
//!   its own transaction with a durable `MigrationCheckpoint` after it,
//! - **shadow-graph mode** building under `_TEMP` labels and promoting
//!   atomically.
//!
//! Every node or edge a migration creates must carry `migration_id` and a
//! `created_at` at or after the run's start; that stamp is how the
//! rollback path identifies the blast radius of a failed run.

mod builtin;
mod runner;

pub use builtin::{builtin_registry, BackfillTemporalMigration, InitSchemaMigration};
pub use runner::{MigrationEngine, MigrationOptions};

use crate::engine::GraphEngine;
use crate::statement::Statement;
use crate::temporal::TemporalStamp;
use async_trait::async_trait;
use specgraph::error::{MigrationError, StoreResult};
use specgraph::migration::{execution_order, MigrationDescriptor};
use std::collections::HashMap;
use std::sync::Arc;

/// Execution-scoped context handed to a migration when planning. All
/// statements a migration emits must stamp created nodes with
/// `context.migration_id` and the stamp's timestamp.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    /// Id of the migration being planned.
    pub migration_id: String,
    /// Unique id of this invocation.
    pub run_id: String,
    /// Temporal stamp for the run (`updated_by = migration`).
    pub stamp: TemporalStamp,
    /// Batch size the operator configured.
    pub batch_size: usize,
}

/// One unit of work in single-transaction or checkpoint mode.
#[derive(Debug, Clone)]
pub struct MigrationBatch {
    /// 1-based position of the batch.
    pub ordinal: u64,
    /// Statements the batch applies.
    pub statements: Vec<Statement>,
    /// Records this batch processes, for checkpoint bookkeeping.
    pub records: u64,
    /// Declared number of updated objects, for run accounting.
    pub updates: u64,
    /// Declared number of deleted objects, for run accounting.
    pub deletes: u64,
    /// Whether the batch may run inside an explicit transaction. Schema
    /// statements (constraints, indexes) must run in their own implicit
    /// transactions.
    pub atomic: bool,
}

impl MigrationBatch {
    /// An atomic data batch.
    #[must_use]
    pub fn new(ordinal: u64, statements: Vec<Statement>, records: u64) -> Self {
        Self {
            ordinal,
            statements,
            records,
            updates: 0,
            deletes: 0,
            atomic: true,
        }
    }

    /// A batch of schema statements, each run in its own transaction.
    #[must_use]
    pub fn schema(ordinal: u64, statements: Vec<Statement>) -> Self {
        Self {
            ordinal,
            statements,
            records: 0,
            updates: 0,
            deletes: 0,
            atomic: false,
        }
    }

    /// Declare updated-object accounting for this batch.
    #[must_use]
    pub fn with_updates(mut self, updates: u64) -> Self {
        self.updates = updates;
        self
    }

    /// Declare deleted-object accounting for this batch.
    #[must_use]
    pub fn with_deletes(mut self, deletes: u64) -> Self {
        self.deletes = deletes;
        self
    }
}

/// A count assertion over the shadow set, checked before promotion.
#[derive(Debug, Clone)]
pub struct ShadowCheck {
    /// Assertion name for error reporting.
    pub name: String,
    /// Statement returning a single `count` column.
    pub statement: Statement,
    /// The count the shadow set must show.
    pub expected: i64,
}

/// Plan for shadow-graph mode: build under `_TEMP` labels, verify, then
/// promote in one transaction that strips the `_TEMP` suffix and removes
/// the previous generation. On any failure the discard statements remove
/// the `_TEMP` set without touching the live graph.
#[derive(Debug, Clone)]
pub struct ShadowPlan {
    /// Statements building the `_TEMP` set.
    pub build: Vec<Statement>,
    /// Invariant checks on the shadow set.
    pub checks: Vec<ShadowCheck>,
    /// Atomic promotion statements.
    pub promote: Vec<Statement>,
    /// Cleanup statements deleting the `_TEMP` set.
    pub discard: Vec<Statement>,
}

/// What a migration wants executed.
#[derive(Debug, Clone)]
pub enum MigrationPlan {
    /// Batches for single-transaction or checkpoint mode.
    Batches(Vec<MigrationBatch>),
    /// A shadow-graph build-and-promote.
    Shadow(ShadowPlan),
}

/// Everything the runner needs to execute one migration.
#[derive(Debug, Clone)]
pub struct PlannedMigration {
    /// The work.
    pub plan: MigrationPlan,
    /// `app_id`s of IR roots this run touches; each gets an `AFFECTED`
    /// edge from the `MigrationRun`.
    pub affected_app_ids: Vec<String>,
}

/// One migration: a declared descriptor plus the ability to plan its work
/// against the current graph.
#[async_trait]
pub trait Migration: Send + Sync {
    /// The migration's declaration.
    fn descriptor(&self) -> MigrationDescriptor;

    /// Plan the work. Planning may read the graph (e.g. to count rows or
    /// enumerate affected applications) but must not write.
    async fn plan(
        &self,
        engine: &Arc<dyn GraphEngine>,
        context: &MigrationContext,
    ) -> StoreResult<PlannedMigration>;
}

/// Ordered collection of known migrations.
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a migration. Registration order does not matter; execution
    /// order is derived from ids and declared dependencies.
    pub fn register(&mut self, migration: Arc<dyn Migration>) {
        self.migrations.push(migration);
    }

    /// Look up a migration by id.
    #[must_use]
    pub fn get(&self, migration_id: &str) -> Option<Arc<dyn Migration>> {
        self.migrations
            .iter()
            .find(|m| m.descriptor().id == migration_id)
            .map(Arc::clone)
    }

    /// All descriptors, in registration order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<MigrationDescriptor> {
        self.migrations.iter().map(|m| m.descriptor()).collect()
    }

    /// Validate the dependency graph and return ids in execution order.
    pub fn execution_order(&self) -> Result<Vec<String>, MigrationError> {
        execution_order(&self.descriptors())
    }

    /// Descriptors indexed by id.
    #[must_use]
    pub fn by_id(&self) -> HashMap<String, MigrationDescriptor> {
        self.descriptors()
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect()
    }
}
