//! Migration descriptors and ordering.
//!
//! A migration is declared data: a sortable id, the schema versions it
//! moves between, its sprint, its predecessors, and a default atomicity
//! mode. The store's migration engine owns execution; this module owns the
//! declarations and the order in which they may legally run.

use crate::error::MigrationError;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Atomicity mode of a migration execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomicMode {
    /// Whole migration in one transaction. Suitable up to ~1 000 nodes.
    SingleTx,
    /// Batched with durable checkpoints; the default for large datasets.
    Checkpoint,
    /// Build under `_TEMP` labels, then promote atomically.
    Shadow,
}

impl AtomicMode {
    /// Wire representation stored on `MigrationRun`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomicMode::SingleTx => "single_tx",
            AtomicMode::Checkpoint => "checkpoint",
            AtomicMode::Shadow => "shadow",
        }
    }
}

/// Lifecycle state of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// The run is in progress.
    Running,
    /// The run completed and the version singleton was advanced.
    Completed,
    /// The run failed; cleanup may still be pending.
    Failed,
    /// The run failed and its stamped writes were removed.
    RolledBack,
    /// A validation-only run; no IR data was written.
    DryRun,
}

impl MigrationStatus {
    /// Wire representation stored on `MigrationRun`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Running => "running",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::RolledBack => "rolled_back",
            MigrationStatus::DryRun => "dry_run",
        }
    }
}

/// Declaration of one migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDescriptor {
    /// Sortable id, e.g. `0002_backfill_temporal`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Sprint this migration belongs to.
    pub sprint: String,
    /// Schema version the graph must be at before this migration runs.
    pub schema_version_before: i64,
    /// Schema version the graph is at after this migration completes.
    pub schema_version_after: i64,
    /// Ids of migrations that must have completed first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Atomicity mode used when the caller does not choose one.
    pub default_mode: AtomicMode,
}

/// Record of one migration invocation, mirrored onto the `MigrationRun`
/// node. Append-only: never updated after the run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRunRecord {
    /// Migration id this run executed.
    pub migration_id: String,
    /// Unique id of this invocation.
    pub run_id: String,
    /// Migration name at the time of the run.
    pub migration_name: String,
    /// Sprint of the migration.
    pub sprint: String,
    /// Version before the run.
    pub schema_version_before: i64,
    /// Version after the run (equal to before for failed runs).
    pub schema_version_after: i64,
    /// Final status.
    pub status: MigrationStatus,
    /// Start of the run (epoch milliseconds).
    pub started_at: i64,
    /// End of the run (epoch milliseconds), absent while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Wall-clock duration in seconds, absent while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Nodes and edges created by the run.
    pub objects_created: i64,
    /// Nodes and edges updated by the run.
    pub objects_updated: i64,
    /// Nodes and edges deleted by the run.
    pub objects_deleted: i64,
    /// Failure details, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// Whether this was a validation-only run.
    pub dry_run: bool,
    /// Atomicity mode the run used.
    pub atomic_mode: AtomicMode,
}

/// Durable record of one completed batch in checkpoint mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Batch ordinal, starting at 1.
    pub batch: u64,
    /// Records processed by this batch.
    pub records_processed: u64,
    /// Whether the batch committed.
    pub succeeded: bool,
    /// When the checkpoint was recorded (epoch milliseconds).
    pub recorded_at: i64,
}

/// Validate declared dependencies and produce the execution order.
///
/// The order is a topological sort of the dependency graph with ties broken
/// by the sortable id, so a registry with no dependencies runs in plain id
/// order. Unknown dependencies and dependency cycles are rejected.
pub fn execution_order(
    descriptors: &[MigrationDescriptor],
) -> Result<Vec<String>, MigrationError> {
    let by_id: HashMap<&str, &MigrationDescriptor> =
        descriptors.iter().map(|d| (d.id.as_str(), d)).collect();

    // Deduplicated dependency sets; unknown dependencies are rejected
    // before any ordering is attempted.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    let mut dependencies: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for descriptor in descriptors {
        graph.add_node(descriptor.id.as_str());
        let entry = dependencies.entry(descriptor.id.as_str()).or_default();
        for dependency in &descriptor.dependencies {
            if !by_id.contains_key(dependency.as_str()) {
                return Err(MigrationError::UnmetDependency {
                    migration_id: descriptor.id.clone(),
                    dependency: dependency.clone(),
                });
            }
            entry.insert(dependency.as_str());
            graph.add_edge(dependency.as_str(), descriptor.id.as_str(), ());
        }
    }

    // Kahn's walk with a sorted ready set: dependencies always precede
    // their dependents, and independent migrations run in plain id order.
    let mut indegree: HashMap<&str, usize> = dependencies
        .iter()
        .map(|(id, deps)| (*id, deps.len()))
        .collect();
    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(descriptors.len());
    while let Some(next) = ready.iter().next().copied() {
        ready.remove(next);
        order.push(next.to_string());
        for (id, deps) in &dependencies {
            if deps.contains(next) {
                let degree = indegree.entry(*id).or_insert(0);
                *degree = degree.saturating_sub(1);
                if *degree == 0 && !order.iter().any(|done| done == id) {
                    ready.insert(*id);
                }
            }
        }
    }

    if order.len() != descriptors.len() {
        debug_assert!(is_cyclic_directed(&graph));
        let mut leftover: Vec<&str> = indegree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .collect();
        leftover.sort_unstable();
        return Err(MigrationError::DependencyCycle {
            migration_id: leftover.first().copied().unwrap_or_default().to_string(),
        });
    }
    Ok(order)
}
