//! Behavior submodel repository.
//!
//! Flows and invariants are subgraph-replaced; steps are subgraph-replaced
//! under their flow.

use crate::engine::GraphEngine;
use crate::repository::{
    attach_children, child_row, delete_absent_children, delete_absent_descendants,
    upsert_submodel_root, CascadeHop,
};
use crate::statement::{JsonMap, Statement};
use crate::temporal::TemporalStamp;
use serde_json::Value;
use specgraph::actor::ActorContext;
use specgraph::error::StoreResult;
use specgraph::ir::validate::validate_behavior;
use specgraph::ir::BehaviorModelIr;
use std::sync::Arc;
use tracing::debug;

/// Repository for `BehaviorModelIR` subgraphs.
#[derive(Clone)]
pub struct BehaviorRepository {
    engine: Arc<dyn GraphEngine>,
}

impl BehaviorRepository {
    /// A repository over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Validate and persist one behavior submodel in a single transaction.
    pub async fn save(
        &self,
        app_id: &str,
        behavior: &BehaviorModelIr,
        context: &ActorContext,
    ) -> StoreResult<()> {
        validate_behavior(behavior)?;
        let stamp = TemporalStamp::new(context)?;
        debug!(
            "saving behavior model for {app_id}: {} flows, {} invariants",
            behavior.flows.len(),
            behavior.invariants.len()
        );
        self.engine
            .run_atomic(Self::plan(app_id, behavior, &stamp))
            .await
            .map_err(crate::repository::surface_write_failure)
    }

    /// Statement plan for one behavior submodel.
    #[must_use]
    pub fn plan(
        app_id: &str,
        behavior: &BehaviorModelIr,
        stamp: &TemporalStamp,
    ) -> Vec<Statement> {
        let root_id = &behavior.behavior_model_id;
        let mut statements = vec![upsert_submodel_root(
            app_id,
            "HAS_BEHAVIOR_MODEL",
            "BehaviorModelIR",
            "behavior_model_id",
            root_id,
            stamp,
        )];

        let keep_flows: Vec<String> = behavior.flows.iter().map(|f| f.flow_id.clone()).collect();
        statements.push(delete_absent_children(
            "BehaviorModelIR",
            "behavior_model_id",
            root_id,
            "HAS_FLOW",
            "Flow",
            "flow_id",
            keep_flows,
            &[CascadeHop {
                rel_type: "HAS_STEP",
                label: "Step",
            }],
        ));
        let keep_steps: Vec<String> = behavior
            .flows
            .iter()
            .flat_map(|flow| flow.steps.iter().map(|step| step.step_id.clone()))
            .collect();
        statements.push(delete_absent_descendants(
            "BehaviorModelIR",
            "behavior_model_id",
            root_id,
            &[("HAS_FLOW", "Flow"), ("HAS_STEP", "Step")],
            "step_id",
            keep_steps,
        ));
        let keep_invariants: Vec<String> = behavior
            .invariants
            .iter()
            .map(|i| i.invariant_id.clone())
            .collect();
        statements.push(delete_absent_children(
            "BehaviorModelIR",
            "behavior_model_id",
            root_id,
            "HAS_INVARIANT",
            "Invariant",
            "invariant_id",
            keep_invariants,
            &[],
        ));

        if !behavior.flows.is_empty() {
            let flow_rows: Vec<Value> = behavior
                .flows
                .iter()
                .map(|flow| {
                    let mut props = JsonMap::new();
                    props.insert("name".to_string(), Value::from(flow.name.as_str()));
                    props.insert("type".to_string(), Value::from(flow.kind.as_str()));
                    props.insert("trigger".to_string(), Value::from(flow.trigger.as_str()));
                    props.insert(
                        "description".to_string(),
                        Value::from(flow.description.as_str()),
                    );
                    child_row(root_id, &flow.flow_id, props)
                })
                .collect();
            statements.push(attach_children(
                "BehaviorModelIR",
                "behavior_model_id",
                "HAS_FLOW",
                "Flow",
                "flow_id",
                flow_rows,
                stamp,
            ));
        }

        let step_rows: Vec<Value> = behavior
            .flows
            .iter()
            .flat_map(|flow| {
                flow.steps.iter().map(|step| {
                    let mut props = JsonMap::new();
                    props.insert("order".to_string(), Value::from(step.order));
                    props.insert("action".to_string(), Value::from(step.action.as_str()));
                    props.insert(
                        "target_entity".to_string(),
                        Value::from(step.target_entity.as_str()),
                    );
                    child_row(&flow.flow_id, &step.step_id, props)
                })
            })
            .collect();
        if !step_rows.is_empty() {
            statements.push(attach_children(
                "Flow",
                "flow_id",
                "HAS_STEP",
                "Step",
                "step_id",
                step_rows,
                stamp,
            ));
        }

        if !behavior.invariants.is_empty() {
            let invariant_rows: Vec<Value> = behavior
                .invariants
                .iter()
                .map(|invariant| {
                    let mut props = JsonMap::new();
                    props.insert("entity".to_string(), Value::from(invariant.entity.as_str()));
                    props.insert(
                        "description".to_string(),
                        Value::from(invariant.description.as_str()),
                    );
                    props.insert(
                        "expression".to_string(),
                        Value::from(invariant.expression.as_str()),
                    );
                    props.insert(
                        "enforcement_level".to_string(),
                        Value::from(invariant.enforcement_level.as_str()),
                    );
                    child_row(root_id, &invariant.invariant_id, props)
                })
                .collect();
            statements.push(attach_children(
                "BehaviorModelIR",
                "behavior_model_id",
                "HAS_INVARIANT",
                "Invariant",
                "invariant_id",
                invariant_rows,
                stamp,
            ));
        }

        statements
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingEngine;
    use specgraph::actor::Actor;
    use specgraph::ir::{Flow, Step};

    fn sample_behavior() -> BehaviorModelIr {
        let mut behavior = BehaviorModelIr::default();
        let mut flow = Flow::new("checkout", "user_journey", "POST /checkout");
        flow.steps.push(Step::new(1, "reserve_stock", "Product"));
        flow.steps.push(Step::new(2, "charge_card", "Payment"));
        behavior.flows.push(flow);
        behavior.canonicalize("A1");
        behavior
    }

    fn stamp() -> TemporalStamp {
        TemporalStamp::at(1_700_000_000_000, Actor::Pipeline)
    }

    #[test]
    fn test_plan_step_rows_are_keyed_by_order() {
        let plan = BehaviorRepository::plan("A1", &sample_behavior(), &stamp());
        let attach = plan
            .iter()
            .find(|s| s.text.contains("MERGE (c:Step"))
            .unwrap();
        let rows = attach.params["rows"].as_array().unwrap();
        assert_eq!(rows[0]["id"], "A1|behavior_model|flow|checkout|step|1");
        assert_eq!(rows[0]["props"]["order"], 1);
        assert_eq!(rows[1]["props"]["action"], "charge_card");
    }

    #[test]
    fn test_plan_replaces_flows_with_step_cascade() {
        let plan = BehaviorRepository::plan("A1", &sample_behavior(), &stamp());
        let delete = plan
            .iter()
            .find(|s| s.text.contains("WHERE NOT c.flow_id IN $keep_ids"))
            .unwrap();
        assert!(delete.text.contains("OPTIONAL MATCH (c)-[:HAS_STEP]->(g0:Step)"));
    }

    #[tokio::test]
    async fn test_save_rejects_gapped_steps() {
        let engine = Arc::new(RecordingEngine::new());
        let repository = BehaviorRepository::new(engine.clone() as Arc<dyn GraphEngine>);
        let mut behavior = BehaviorModelIr::default();
        let mut flow = Flow::new("f", "job", "t");
        flow.steps.push(Step::new(1, "a", "E"));
        flow.steps.push(Step::new(3, "b", "E"));
        behavior.flows.push(flow);
        behavior.canonicalize("A1");
        let err = repository
            .save("A1", &behavior, &ActorContext::new(Actor::Pipeline))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTRACT_NON_CONTIGUOUS_STEP_ORDER");
        assert!(engine.calls().is_empty());
    }
}
