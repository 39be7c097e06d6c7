//! Built-in migrations.
//!
//! `0001_init_schema` bootstraps a fresh database: uniqueness constraints
//! for every keyed IR label plus the `GraphSchemaVersion` singleton.
//! `0002_backfill_temporal` retrofits `created_at` / `updated_at` /
//! `updated_by` onto nodes written before the temporal service existed.
//! Both are MERGE/guard based and safe to re-run.

use crate::engine::GraphEngine;
use crate::migration::{
    Migration, MigrationBatch, MigrationContext, MigrationPlan, MigrationRegistry,
    PlannedMigration,
};
use crate::statement::Statement;
use crate::version::VersionCoordinator;
use async_trait::async_trait;
use serde_json::Value;
use specgraph::error::StoreResult;
use specgraph::migration::{AtomicMode, MigrationDescriptor};
use std::sync::Arc;

/// Labels with single-property uniqueness constraints, as
/// `(constraint name, label, property)`.
const UNIQUE_CONSTRAINTS: &[(&str, &str, &str)] = &[
    ("application_ir_app_id", "ApplicationIR", "app_id"),
    ("domain_model_ir_id", "DomainModelIR", "domain_model_id"),
    ("api_model_ir_id", "APIModelIR", "api_model_id"),
    ("behavior_model_ir_id", "BehaviorModelIR", "behavior_model_id"),
    (
        "validation_model_ir_id",
        "ValidationModelIR",
        "validation_model_id",
    ),
    (
        "infrastructure_model_ir_id",
        "InfrastructureModelIR",
        "infrastructure_model_id",
    ),
    ("tests_model_ir_id", "TestsModelIR", "tests_model_id"),
    ("entity_id_unique", "Entity", "entity_id"),
    ("attribute_id_unique", "Attribute", "attribute_id"),
    ("endpoint_id_unique", "Endpoint", "endpoint_id"),
    ("api_parameter_id_unique", "APIParameter", "param_id"),
    ("api_schema_id_unique", "APISchema", "schema_id"),
    ("api_schema_field_id_unique", "APISchemaField", "field_id"),
    ("flow_id_unique", "Flow", "flow_id"),
    ("step_id_unique", "Step", "step_id"),
    ("invariant_id_unique", "Invariant", "invariant_id"),
    ("validation_rule_id_unique", "ValidationRule", "rule_id"),
    (
        "enforcement_strategy_id_unique",
        "EnforcementStrategy",
        "strategy_id",
    ),
    ("seed_entity_id_unique", "SeedEntityIR", "seed_id"),
    ("test_scenario_id_unique", "TestScenarioIR", "scenario_id"),
    ("migration_run_run_id", "MigrationRun", "run_id"),
];

/// Labels the temporal backfill covers.
const TEMPORAL_LABELS: &[&str] = &[
    "ApplicationIR",
    "DomainModelIR",
    "APIModelIR",
    "BehaviorModelIR",
    "ValidationModelIR",
    "InfrastructureModelIR",
    "TestsModelIR",
    "Entity",
    "Attribute",
    "Endpoint",
    "APIParameter",
    "APISchema",
    "APISchemaField",
    "Flow",
    "Step",
    "Invariant",
    "ValidationRule",
    "EnforcementStrategy",
    "DatabaseConfig",
    "ContainerService",
    "ObservabilityConfig",
    "SeedEntityIR",
    "EndpointTestSuite",
    "FlowTestSuite",
    "TestScenarioIR",
];

/// `0001_init_schema`: constraints and the version singleton.
pub struct InitSchemaMigration;

#[async_trait]
impl Migration for InitSchemaMigration {
    fn descriptor(&self) -> MigrationDescriptor {
        MigrationDescriptor {
            id: "0001_init_schema".to_string(),
            name: "initialize graph schema".to_string(),
            sprint: "sprint-1".to_string(),
            schema_version_before: 0,
            schema_version_after: 1,
            dependencies: vec![],
            default_mode: AtomicMode::SingleTx,
        }
    }

    async fn plan(
        &self,
        _engine: &Arc<dyn GraphEngine>,
        _context: &MigrationContext,
    ) -> StoreResult<PlannedMigration> {
        let mut statements: Vec<Statement> = UNIQUE_CONSTRAINTS
            .iter()
            .map(|(name, label, property)| {
                Statement::new(format!(
                    "CREATE CONSTRAINT {name} IF NOT EXISTS \
                     FOR (n:{label}) REQUIRE n.{property} IS UNIQUE"
                ))
                .idempotent()
            })
            .collect();
        statements.push(VersionCoordinator::ensure_singleton_statement());
        Ok(PlannedMigration {
            // Constraint DDL runs in implicit transactions of its own.
            plan: MigrationPlan::Batches(vec![MigrationBatch::schema(1, statements)]),
            affected_app_ids: vec![],
        })
    }
}

/// `0002_backfill_temporal`: retroactive temporal enrichment. Nodes that
/// already carry `created_at` are left untouched, so re-running cannot
/// regress existing timestamps.
pub struct BackfillTemporalMigration;

#[async_trait]
impl Migration for BackfillTemporalMigration {
    fn descriptor(&self) -> MigrationDescriptor {
        MigrationDescriptor {
            id: "0002_backfill_temporal".to_string(),
            name: "backfill temporal metadata".to_string(),
            sprint: "sprint-1".to_string(),
            schema_version_before: 1,
            schema_version_after: 2,
            dependencies: vec!["0001_init_schema".to_string()],
            default_mode: AtomicMode::Checkpoint,
        }
    }

    async fn plan(
        &self,
        engine: &Arc<dyn GraphEngine>,
        context: &MigrationContext,
    ) -> StoreResult<PlannedMigration> {
        let mut batches = Vec::new();
        let mut ordinal = 0u64;
        for label in TEMPORAL_LABELS {
            let count_statement = Statement::new(format!(
                "MATCH (n:{label}) WHERE n.created_at IS NULL RETURN count(n) AS count"
            ))
            .returning(&["count"])
            .idempotent();
            let records = engine.execute(count_statement).await?;
            let missing = records
                .first()
                .and_then(|r| r.get("count"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if missing == 0 {
                continue;
            }
            ordinal += 1;
            let backfill = context.stamp.bind(
                Statement::new(format!(
                    "MATCH (n:{label}) WHERE n.created_at IS NULL \
                     SET n.created_at = $now, n.updated_at = $now, \
                     n.updated_by = 'migration'"
                ))
                .idempotent(),
            );
            batches.push(
                MigrationBatch::new(ordinal, vec![backfill], missing.max(0) as u64)
                    .with_updates(missing.max(0) as u64),
            );
        }
        Ok(PlannedMigration {
            plan: MigrationPlan::Batches(batches),
            affected_app_ids: vec![],
        })
    }
}

/// Registry carrying the built-in migrations.
#[must_use]
pub fn builtin_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry.register(Arc::new(InitSchemaMigration));
    registry.register(Arc::new(BackfillTemporalMigration));
    registry
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::TemporalStamp;
    use crate::test_support::RecordingEngine;
    use specgraph::actor::Actor;

    fn context() -> MigrationContext {
        MigrationContext {
            migration_id: "m".to_string(),
            run_id: "r".to_string(),
            stamp: TemporalStamp::at(1_700_000_000_000, Actor::Migration),
            batch_size: 100,
        }
    }

    #[test]
    fn test_builtin_registry_orders_init_before_backfill() {
        let registry = builtin_registry();
        assert_eq!(
            registry.execution_order().unwrap(),
            vec!["0001_init_schema", "0002_backfill_temporal"]
        );
    }

    #[tokio::test]
    async fn test_init_schema_plan_is_schema_batch() {
        let engine: Arc<dyn GraphEngine> = Arc::new(RecordingEngine::new());
        let planned = InitSchemaMigration.plan(&engine, &context()).await.unwrap();
        match planned.plan {
            MigrationPlan::Batches(batches) => {
                assert_eq!(batches.len(), 1);
                assert!(!batches[0].atomic);
                assert!(batches[0].statements[0]
                    .text
                    .contains("CREATE CONSTRAINT application_ir_app_id IF NOT EXISTS"));
                // The singleton bootstrap rides along with the constraints.
                assert!(batches[0]
                    .statements
                    .last()
                    .unwrap()
                    .text
                    .contains("GraphSchemaVersion"));
            }
            MigrationPlan::Shadow(_) => panic!("expected batches"),
        }
    }

    #[tokio::test]
    async fn test_backfill_plans_only_labels_with_missing_temporal() {
        let engine = Arc::new(RecordingEngine::new());
        let mut entity_count = serde_json::Map::new();
        entity_count.insert("count".to_string(), serde_json::json!(250));
        engine.respond_with("MATCH (n:Entity) WHERE n.created_at IS NULL", vec![entity_count]);
        let dyn_engine: Arc<dyn GraphEngine> = engine;
        let planned = BackfillTemporalMigration
            .plan(&dyn_engine, &context())
            .await
            .unwrap();
        match planned.plan {
            MigrationPlan::Batches(batches) => {
                assert_eq!(batches.len(), 1);
                assert_eq!(batches[0].records, 250);
                assert_eq!(batches[0].updates, 250);
                let text = &batches[0].statements[0].text;
                assert!(text.contains("WHERE n.created_at IS NULL"));
                assert!(text.contains("n.updated_by = 'migration'"));
            }
            MigrationPlan::Shadow(_) => panic!("expected batches"),
        }
    }

    #[tokio::test]
    async fn test_backfill_on_clean_graph_is_empty_plan() {
        let engine: Arc<dyn GraphEngine> = Arc::new(RecordingEngine::new());
        let planned = BackfillTemporalMigration
            .plan(&engine, &context())
            .await
            .unwrap();
        match planned.plan {
            MigrationPlan::Batches(batches) => assert!(batches.is_empty()),
            MigrationPlan::Shadow(_) => panic!("expected batches"),
        }
    }
}
