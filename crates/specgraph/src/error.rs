//! Error taxonomy for the IR store.
//!
//! Every failure surfaced by the store belongs to one of six kinds: engine,
//! persistence, contract, migration, lock, or loader. Each kind is its own
//! enum so callers can match on the family they care about, and every value
//! carries a stable machine code (see [`StoreError::code`]) plus a compact
//! structured payload for automated handling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the store.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Engine-level failures from the underlying graph database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Safe to retry: deadlocks, dropped connections, idempotent timeouts.
    #[error("transient engine error: {reason}")]
    Transient {
        /// Human-readable description of the underlying failure.
        reason: String,
    },
    /// Not safe to retry: syntax errors, constraint violations, auth failures.
    #[error("fatal engine error: {reason}")]
    Fatal {
        /// Human-readable description of the underlying failure.
        reason: String,
    },
    /// A transaction was opened while another was already active on this task.
    #[error("nested transactions are forbidden")]
    NestedTransaction,
    /// A statement exceeded its timeout and is not known to be idempotent.
    #[error("statement timed out after {timeout_ms} ms")]
    Timeout {
        /// The configured statement timeout in milliseconds.
        timeout_ms: u64,
    },
}

impl EngineError {
    /// Whether the retry budget may be spent on this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient { .. })
    }
}

/// Failures while persisting IR subgraphs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PersistenceError {
    /// Unrecoverable engine failure mid-replace; the engine rolled back.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of the failed write.
        reason: String,
    },
    /// The caller holds an IR snapshot taken at an older schema version.
    #[error("stale write: snapshot at schema version {held}, store at {current}")]
    StaleWrite {
        /// Schema version the caller's snapshot was loaded at.
        held: i64,
        /// Schema version currently recorded by the singleton.
        current: i64,
    },
}

/// IR invariant violations detected before or during a write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ContractError {
    /// A relationship count fell outside its declared bounds.
    #[error("cardinality violation on {label}: {detail}")]
    Cardinality {
        /// Label of the offending parent node.
        label: String,
        /// What was expected and what was found.
        detail: String,
    },
    /// A node is missing a property the contract requires.
    #[error("{label} node {id} is missing required property {property}")]
    MissingRequiredProperty {
        /// Label of the offending node.
        label: String,
        /// Identifier of the offending node.
        id: String,
        /// The absent property name.
        property: String,
    },
    /// An enumerated property carried a value outside its allowed set.
    #[error("unknown value {value:?} for {label}.{property}")]
    UnknownEnumValue {
        /// Label of the offending node or relationship.
        label: String,
        /// The property holding the invalid value.
        property: String,
        /// The value found.
        value: String,
    },
    /// Two nodes share a key that must be unique.
    #[error("duplicate unique key on {label}: {key}")]
    DuplicateUniqueKey {
        /// Label of the offending nodes.
        label: String,
        /// The duplicated key rendered as text.
        key: String,
    },
    /// `DEPENDS_ON_SEED` forms a cycle.
    #[error("seed dependency cycle: {}", cycle.join(" -> "))]
    SeedCycle {
        /// Seed entity names along the detected cycle.
        cycle: Vec<String>,
    },
    /// Step orders within a flow are not a contiguous `1..N` permutation.
    #[error("flow {flow} has non-contiguous step order {orders:?}")]
    NonContiguousStepOrder {
        /// Name of the offending flow.
        flow: String,
        /// The step orders as found.
        orders: Vec<i64>,
    },
    /// A write was attempted without an actor context.
    #[error("write attempted without an actor context")]
    MissingActor,
}

/// Migration engine failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MigrationError {
    /// The graph is not at the schema version this migration starts from.
    #[error("migration {migration_id} expects schema version {expected}, graph is at {found}")]
    VersionMismatch {
        /// The migration being applied.
        migration_id: String,
        /// The declared `schema_version_before`.
        expected: i64,
        /// The version recorded by the singleton.
        found: i64,
    },
    /// A declared predecessor has not completed.
    #[error("migration {migration_id} depends on {dependency}, which has not completed")]
    UnmetDependency {
        /// The migration being applied.
        migration_id: String,
        /// The unmet predecessor.
        dependency: String,
    },
    /// Post-migration shape contract validation failed.
    #[error("shape contract failed after migration {migration_id}: {violations} violation(s)")]
    ContractAssertionFailed {
        /// The migration that was rolled back.
        migration_id: String,
        /// Number of violations reported by the contract runner.
        violations: usize,
    },
    /// A checkpoint-mode batch failed; the run was rolled back.
    #[error("migration {migration_id} failed at batch {batch}: {reason}")]
    CheckpointFailed {
        /// The migration that was rolled back.
        migration_id: String,
        /// Ordinal of the failing batch.
        batch: u64,
        /// Description of the batch failure.
        reason: String,
    },
    /// The shadow set failed its invariant check or the atomic rename failed.
    #[error("shadow promotion failed for migration {migration_id}: {reason}")]
    ShadowPromotionFailed {
        /// The migration whose shadow set was discarded.
        migration_id: String,
        /// Description of the promotion failure.
        reason: String,
    },
    /// The requested migration id is not in the registry.
    #[error("unknown migration {migration_id}")]
    UnknownMigration {
        /// The id that failed to resolve.
        migration_id: String,
    },
    /// The registry's declared dependencies do not form a DAG.
    #[error("migration dependency cycle involving {migration_id}")]
    DependencyCycle {
        /// A migration on the detected cycle.
        migration_id: String,
    },
}

/// Migration-lock failures on the schema version singleton.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LockError {
    /// Another migration holds the singleton lock.
    #[error("migration lock busy: held by {held_by} since {since}")]
    Busy {
        /// Identifier of the current holder.
        held_by: String,
        /// When the lock was taken (epoch milliseconds).
        since: i64,
    },
    /// The lock was observed stale and forcibly cleared by another process.
    #[error("migration lock held by {held_by} was stale and has been cleared")]
    Stale {
        /// Identifier of the abandoned holder.
        held_by: String,
    },
}

/// Full IR loader failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LoaderError {
    /// No `ApplicationIR` node exists for the requested id.
    #[error("application {app_id} not found")]
    NotFound {
        /// The requested application id.
        app_id: String,
    },
    /// Mid-load invariants failed; the persisted subgraph is broken.
    #[error("inconsistent snapshot for {app_id}: {reason}")]
    InconsistentSnapshot {
        /// The application whose snapshot failed assembly.
        app_id: String,
        /// Which invariant failed during assembly.
        reason: String,
    },
}

/// Top-level error type aggregating every failure family.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Engine-level failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Persistence failure.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// IR contract violation.
    #[error(transparent)]
    Contract(#[from] ContractError),
    /// Migration engine failure.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// Migration lock failure.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Loader failure.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Compact, serializable rendering of a [`StoreError`] for automated
/// handling. The `code` is stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable machine code, e.g. `MIGRATION_CHECKPOINT_FAILED`.
    pub code: String,
    /// Short human-readable message.
    pub message: String,
    /// Offending identifiers, when known (node ids, labels, keys).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    /// The migration involved, when the failure belongs to a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_id: Option<String>,
    /// The failing batch ordinal in checkpoint mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<u64>,
}

impl StoreError {
    /// Stable machine code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Engine(e) => match e {
                EngineError::Transient { .. } => "ENGINE_TRANSIENT",
                EngineError::Fatal { .. } => "ENGINE_FATAL",
                EngineError::NestedTransaction => "ENGINE_NESTED_TRANSACTION",
                EngineError::Timeout { .. } => "ENGINE_TIMEOUT",
            },
            StoreError::Persistence(e) => match e {
                PersistenceError::WriteFailed { .. } => "PERSISTENCE_WRITE_FAILED",
                PersistenceError::StaleWrite { .. } => "PERSISTENCE_STALE_WRITE",
            },
            StoreError::Contract(e) => match e {
                ContractError::Cardinality { .. } => "CONTRACT_CARDINALITY",
                ContractError::MissingRequiredProperty { .. } => {
                    "CONTRACT_MISSING_REQUIRED_PROPERTY"
                }
                ContractError::UnknownEnumValue { .. } => "CONTRACT_UNKNOWN_ENUM_VALUE",
                ContractError::DuplicateUniqueKey { .. } => "CONTRACT_DUPLICATE_UNIQUE_KEY",
                ContractError::SeedCycle { .. } => "CONTRACT_SEED_CYCLE",
                ContractError::NonContiguousStepOrder { .. } => {
                    "CONTRACT_NON_CONTIGUOUS_STEP_ORDER"
                }
                ContractError::MissingActor => "CONTRACT_MISSING_ACTOR",
            },
            StoreError::Migration(e) => match e {
                MigrationError::VersionMismatch { .. } => "MIGRATION_VERSION_MISMATCH",
                MigrationError::UnmetDependency { .. } => "MIGRATION_UNMET_DEPENDENCY",
                MigrationError::ContractAssertionFailed { .. } => {
                    "MIGRATION_CONTRACT_ASSERTION_FAILED"
                }
                MigrationError::CheckpointFailed { .. } => "MIGRATION_CHECKPOINT_FAILED",
                MigrationError::ShadowPromotionFailed { .. } => "MIGRATION_SHADOW_PROMOTION_FAILED",
                MigrationError::UnknownMigration { .. } => "MIGRATION_UNKNOWN",
                MigrationError::DependencyCycle { .. } => "MIGRATION_DEPENDENCY_CYCLE",
            },
            StoreError::Lock(e) => match e {
                LockError::Busy { .. } => "LOCK_BUSY",
                LockError::Stale { .. } => "LOCK_STALE",
            },
            StoreError::Loader(e) => match e {
                LoaderError::NotFound { .. } => "LOADER_NOT_FOUND",
                LoaderError::InconsistentSnapshot { .. } => "LOADER_INCONSISTENT_SNAPSHOT",
            },
        }
    }

    /// Render this error as its compact structured payload.
    #[must_use]
    pub fn payload(&self) -> ErrorPayload {
        let mut payload = ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            identifiers: Vec::new(),
            migration_id: None,
            batch: None,
        };
        match self {
            StoreError::Contract(ContractError::MissingRequiredProperty {
                label, id, ..
            }) => {
                payload.identifiers = vec![label.clone(), id.clone()];
            }
            StoreError::Contract(ContractError::DuplicateUniqueKey { label, key }) => {
                payload.identifiers = vec![label.clone(), key.clone()];
            }
            StoreError::Contract(ContractError::SeedCycle { cycle }) => {
                payload.identifiers = cycle.clone();
            }
            StoreError::Migration(MigrationError::VersionMismatch { migration_id, .. })
            | StoreError::Migration(MigrationError::ContractAssertionFailed {
                migration_id,
                ..
            })
            | StoreError::Migration(MigrationError::ShadowPromotionFailed {
                migration_id, ..
            })
            | StoreError::Migration(MigrationError::UnknownMigration { migration_id })
            | StoreError::Migration(MigrationError::DependencyCycle { migration_id }) => {
                payload.migration_id = Some(migration_id.clone());
            }
            StoreError::Migration(MigrationError::UnmetDependency {
                migration_id,
                dependency,
            }) => {
                payload.migration_id = Some(migration_id.clone());
                payload.identifiers = vec![dependency.clone()];
            }
            StoreError::Migration(MigrationError::CheckpointFailed {
                migration_id,
                batch,
                ..
            }) => {
                payload.migration_id = Some(migration_id.clone());
                payload.batch = Some(*batch);
            }
            StoreError::Loader(LoaderError::NotFound { app_id })
            | StoreError::Loader(LoaderError::InconsistentSnapshot { app_id, .. }) => {
                payload.identifiers = vec![app_id.clone()];
            }
            StoreError::Lock(LockError::Busy { held_by, .. })
            | StoreError::Lock(LockError::Stale { held_by }) => {
                payload.identifiers = vec![held_by.clone()];
            }
            _ => {}
        }
        payload
    }

    /// Whether the retry budget may be spent on this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Engine(e) if e.is_retryable())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    // ========== Display Tests ==========

    #[test]
    fn test_engine_transient_display() {
        let err = EngineError::Transient {
            reason: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "transient engine error: connection reset");
    }

    #[test]
    fn test_engine_fatal_display() {
        let err = EngineError::Fatal {
            reason: "syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "fatal engine error: syntax error");
    }

    #[test]
    fn test_nested_transaction_display() {
        assert_eq!(
            EngineError::NestedTransaction.to_string(),
            "nested transactions are forbidden"
        );
    }

    #[test]
    fn test_stale_write_display() {
        let err = PersistenceError::StaleWrite {
            held: 3,
            current: 5,
        };
        assert!(err.to_string().contains("schema version 3"));
        assert!(err.to_string().contains("store at 5"));
    }

    #[test]
    fn test_seed_cycle_display_joins_names() {
        let err = ContractError::SeedCycle {
            cycle: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert_eq!(err.to_string(), "seed dependency cycle: A -> B -> A");
    }

    #[test]
    fn test_non_contiguous_step_order_display() {
        let err = ContractError::NonContiguousStepOrder {
            flow: "checkout".to_string(),
            orders: vec![1, 3],
        };
        assert!(err.to_string().contains("checkout"));
        assert!(err.to_string().contains("[1, 3]"));
    }

    #[test]
    fn test_version_mismatch_display() {
        let err = MigrationError::VersionMismatch {
            migration_id: "0002_backfill_temporal".to_string(),
            expected: 1,
            found: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("0002_backfill_temporal"));
        assert!(msg.contains("expects schema version 1"));
        assert!(msg.contains("graph is at 0"));
    }

    #[test]
    fn test_checkpoint_failed_display() {
        let err = MigrationError::CheckpointFailed {
            migration_id: "0003".to_string(),
            batch: 37,
            reason: "deadlock".to_string(),
        };
        assert!(err.to_string().contains("batch 37"));
    }

    #[test]
    fn test_lock_busy_display() {
        let err = LockError::Busy {
            held_by: "runner-1".to_string(),
            since: 1_700_000_000_000,
        };
        assert!(err.to_string().contains("runner-1"));
    }

    #[test]
    fn test_loader_not_found_display() {
        let err = LoaderError::NotFound {
            app_id: "A1".to_string(),
        };
        assert_eq!(err.to_string(), "application A1 not found");
    }

    // ========== Retryability Tests ==========

    #[test]
    fn test_transient_is_retryable() {
        let err = EngineError::Transient {
            reason: "deadlock".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_fatal_is_not_retryable() {
        let err = EngineError::Fatal {
            reason: "bad query".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_not_retryable() {
        assert!(!EngineError::Timeout { timeout_ms: 30_000 }.is_retryable());
    }

    #[test]
    fn test_store_error_retryable_follows_engine() {
        let retryable: StoreError = EngineError::Transient {
            reason: "x".to_string(),
        }
        .into();
        let not_retryable: StoreError = ContractError::MissingActor.into();
        assert!(retryable.is_retryable());
        assert!(!not_retryable.is_retryable());
    }

    // ========== Code Stability Tests ==========

    #[test]
    fn test_code_engine_transient() {
        let err: StoreError = EngineError::Transient {
            reason: "x".to_string(),
        }
        .into();
        assert_eq!(err.code(), "ENGINE_TRANSIENT");
    }

    #[test]
    fn test_code_contract_seed_cycle() {
        let err: StoreError = ContractError::SeedCycle { cycle: vec![] }.into();
        assert_eq!(err.code(), "CONTRACT_SEED_CYCLE");
    }

    #[test]
    fn test_code_migration_checkpoint_failed() {
        let err: StoreError = MigrationError::CheckpointFailed {
            migration_id: "m".to_string(),
            batch: 1,
            reason: "r".to_string(),
        }
        .into();
        assert_eq!(err.code(), "MIGRATION_CHECKPOINT_FAILED");
    }

    #[test]
    fn test_code_lock_busy() {
        let err: StoreError = LockError::Busy {
            held_by: "h".to_string(),
            since: 0,
        }
        .into();
        assert_eq!(err.code(), "LOCK_BUSY");
    }

    #[test]
    fn test_code_loader_not_found() {
        let err: StoreError = LoaderError::NotFound {
            app_id: "a".to_string(),
        }
        .into();
        assert_eq!(err.code(), "LOADER_NOT_FOUND");
    }

    #[test]
    fn test_codes_are_unique_per_variant_family() {
        let codes = [
            StoreError::from(EngineError::NestedTransaction).code(),
            StoreError::from(PersistenceError::WriteFailed {
                reason: "r".to_string(),
            })
            .code(),
            StoreError::from(ContractError::MissingActor).code(),
            StoreError::from(MigrationError::UnknownMigration {
                migration_id: "m".to_string(),
            })
            .code(),
            StoreError::from(LockError::Stale {
                held_by: "h".to_string(),
            })
            .code(),
            StoreError::from(LoaderError::NotFound {
                app_id: "a".to_string(),
            })
            .code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    // ========== Payload Tests ==========

    #[test]
    fn test_payload_checkpoint_failed_carries_batch() {
        let err: StoreError = MigrationError::CheckpointFailed {
            migration_id: "0005_split_schemas".to_string(),
            batch: 37,
            reason: "deliberate".to_string(),
        }
        .into();
        let payload = err.payload();
        assert_eq!(payload.code, "MIGRATION_CHECKPOINT_FAILED");
        assert_eq!(payload.migration_id.as_deref(), Some("0005_split_schemas"));
        assert_eq!(payload.batch, Some(37));
    }

    #[test]
    fn test_payload_seed_cycle_carries_identifiers() {
        let err: StoreError = ContractError::SeedCycle {
            cycle: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        }
        .into();
        let payload = err.payload();
        assert_eq!(payload.identifiers, vec!["A", "B", "A"]);
        assert_eq!(payload.batch, None);
    }

    #[test]
    fn test_payload_not_found_carries_app_id() {
        let err: StoreError = LoaderError::NotFound {
            app_id: "A1".to_string(),
        }
        .into();
        assert_eq!(err.payload().identifiers, vec!["A1"]);
    }

    #[test]
    fn test_payload_unmet_dependency_carries_both_ids() {
        let err: StoreError = MigrationError::UnmetDependency {
            migration_id: "0004".to_string(),
            dependency: "0003".to_string(),
        }
        .into();
        let payload = err.payload();
        assert_eq!(payload.migration_id.as_deref(), Some("0004"));
        assert_eq!(payload.identifiers, vec!["0003"]);
    }

    #[test]
    fn test_payload_serializes_without_empty_fields() {
        let err: StoreError = ContractError::MissingActor.into();
        let json = serde_json::to_value(err.payload()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("code"));
        assert!(obj.contains_key("message"));
        assert!(!obj.contains_key("identifiers"));
        assert!(!obj.contains_key("migration_id"));
        assert!(!obj.contains_key("batch"));
    }

    #[test]
    fn test_payload_roundtrip() {
        let err: StoreError = MigrationError::CheckpointFailed {
            migration_id: "m".to_string(),
            batch: 2,
            reason: "r".to_string(),
        }
        .into();
        let payload = err.payload();
        let json = serde_json::to_string(&payload).unwrap();
        let back: ErrorPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
    }

    // ========== Conversion Tests ==========

    #[test]
    fn test_from_engine_error() {
        let err: StoreError = EngineError::Fatal {
            reason: "x".to_string(),
        }
        .into();
        assert!(matches!(err, StoreError::Engine(_)));
    }

    #[test]
    fn test_from_contract_error() {
        let err: StoreError = ContractError::MissingActor.into();
        assert!(matches!(err, StoreError::Contract(_)));
    }

    #[test]
    fn test_transparent_display_passthrough() {
        let inner = LockError::Busy {
            held_by: "h".to_string(),
            since: 12,
        };
        let outer: StoreError = inner.clone().into();
        assert_eq!(outer.to_string(), inner.to_string());
    }
}
