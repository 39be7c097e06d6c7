//! Validation submodel repository.
//!
//! Rules and enforcement strategies are subgraph-replaced; the optional
//! `VALIDATES_FIELD` reference from a rule to the attribute it constrains
//! is merged.

use crate::engine::GraphEngine;
use crate::repository::{
    attach_children, child_row, connect, delete_absent_children, edge_row, upsert_submodel_root,
};
use crate::statement::{JsonMap, Statement};
use crate::temporal::TemporalStamp;
use serde_json::Value;
use specgraph::actor::ActorContext;
use specgraph::error::StoreResult;
use specgraph::ids;
use specgraph::ir::ValidationModelIr;
use std::sync::Arc;
use tracing::debug;

/// Repository for `ValidationModelIR` subgraphs.
#[derive(Clone)]
pub struct ValidationRepository {
    engine: Arc<dyn GraphEngine>,
}

impl ValidationRepository {
    /// A repository over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Persist one validation submodel in a single transaction.
    pub async fn save(
        &self,
        app_id: &str,
        validation: &ValidationModelIr,
        context: &ActorContext,
    ) -> StoreResult<()> {
        let stamp = TemporalStamp::new(context)?;
        debug!(
            "saving validation model for {app_id}: {} rules, {} strategies",
            validation.rules.len(),
            validation.strategies.len()
        );
        self.engine
            .run_atomic(Self::plan(app_id, validation, &stamp))
            .await
            .map_err(crate::repository::surface_write_failure)
    }

    /// Statement plan for one validation submodel.
    #[must_use]
    pub fn plan(
        app_id: &str,
        validation: &ValidationModelIr,
        stamp: &TemporalStamp,
    ) -> Vec<Statement> {
        let root_id = &validation.validation_model_id;
        let domain_model_id = ids::submodel_id(app_id, "domain_model");
        let mut statements = vec![upsert_submodel_root(
            app_id,
            "HAS_VALIDATION_MODEL",
            "ValidationModelIR",
            "validation_model_id",
            root_id,
            stamp,
        )];

        let keep_rules: Vec<String> =
            validation.rules.iter().map(|r| r.rule_id.clone()).collect();
        statements.push(delete_absent_children(
            "ValidationModelIR",
            "validation_model_id",
            root_id,
            "HAS_RULE",
            "ValidationRule",
            "rule_id",
            keep_rules,
            &[],
        ));
        let keep_strategies: Vec<String> = validation
            .strategies
            .iter()
            .map(|s| s.strategy_id.clone())
            .collect();
        statements.push(delete_absent_children(
            "ValidationModelIR",
            "validation_model_id",
            root_id,
            "HAS_STRATEGY",
            "EnforcementStrategy",
            "strategy_id",
            keep_strategies,
            &[],
        ));

        if !validation.rules.is_empty() {
            let rule_rows: Vec<Value> = validation
                .rules
                .iter()
                .map(|rule| {
                    let mut props = JsonMap::new();
                    props.insert("entity".to_string(), Value::from(rule.entity.as_str()));
                    props.insert(
                        "attribute".to_string(),
                        Value::from(rule.attribute.as_str()),
                    );
                    props.insert("type".to_string(), Value::from(rule.kind.as_str()));
                    props.insert(
                        "condition".to_string(),
                        Value::from(rule.condition.as_str()),
                    );
                    props.insert("severity".to_string(), Value::from(rule.severity.as_str()));
                    props.insert(
                        "enforcement_type".to_string(),
                        Value::from(rule.enforcement_type.as_str()),
                    );
                    child_row(root_id, &rule.rule_id, props)
                })
                .collect();
            statements.push(attach_children(
                "ValidationModelIR",
                "validation_model_id",
                "HAS_RULE",
                "ValidationRule",
                "rule_id",
                rule_rows,
                stamp,
            ));

            // Merged reference from each rule to the attribute it constrains.
            let field_rows: Vec<Value> = validation
                .rules
                .iter()
                .map(|rule| {
                    let entity_id = ids::child_id(&domain_model_id, "entity", &rule.entity);
                    edge_row(
                        &rule.rule_id,
                        &ids::child_id(&entity_id, "attribute", &rule.attribute),
                        None,
                        JsonMap::new(),
                    )
                })
                .collect();
            statements.push(connect(
                "ValidationRule",
                "rule_id",
                "Attribute",
                "attribute_id",
                "VALIDATES_FIELD",
                None,
                field_rows,
                stamp,
            ));
        }

        if !validation.strategies.is_empty() {
            let strategy_rows: Vec<Value> = validation
                .strategies
                .iter()
                .map(|strategy| {
                    let mut props = JsonMap::new();
                    props.insert("type".to_string(), Value::from(strategy.kind.as_str()));
                    props.insert(
                        "implementation".to_string(),
                        Value::from(strategy.implementation.as_str()),
                    );
                    props.insert(
                        "applied_at".to_string(),
                        Value::Array(
                            strategy
                                .applied_at
                                .iter()
                                .map(|layer| Value::from(layer.as_str()))
                                .collect(),
                        ),
                    );
                    child_row(root_id, &strategy.strategy_id, props)
                })
                .collect();
            statements.push(attach_children(
                "ValidationModelIR",
                "validation_model_id",
                "HAS_STRATEGY",
                "EnforcementStrategy",
                "strategy_id",
                strategy_rows,
                stamp,
            ));
        }

        statements
    }
}
