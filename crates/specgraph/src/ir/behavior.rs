//! Behavior submodel: flows, steps, and invariants.

use crate::ids;
use serde::{Deserialize, Serialize};

/// Aggregates behavior: owned flows and invariants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorModelIr {
    /// Canonical submodel id (`{app_id}|behavior_model`).
    #[serde(default)]
    pub behavior_model_id: String,
    /// Owned flows.
    #[serde(default)]
    pub flows: Vec<Flow>,
    /// Owned invariants.
    #[serde(default)]
    pub invariants: Vec<Invariant>,
}

impl BehaviorModelIr {
    /// Recompute child ids from semantic keys and sort child collections.
    pub fn canonicalize(&mut self, app_id: &str) {
        self.behavior_model_id = ids::submodel_id(app_id, "behavior_model");
        self.flows.sort_by(|a, b| a.name.cmp(&b.name));
        self.invariants
            .sort_by(|a, b| (&a.entity, &a.expression).cmp(&(&b.entity, &b.expression)));
        for flow in &mut self.flows {
            flow.flow_id = ids::child_id(&self.behavior_model_id, "flow", &flow.name);
            flow.steps.sort_by_key(|s| s.order);
            for step in &mut flow.steps {
                step.step_id = ids::child_id(&flow.flow_id, "step", &step.order.to_string());
            }
        }
        for (index, invariant) in self.invariants.iter_mut().enumerate() {
            invariant.invariant_id = ids::indexed_child_id(
                &self.behavior_model_id,
                "invariant",
                &invariant.entity,
                index,
            );
        }
    }
}

/// A behavior flow. Step orders must be a contiguous `1..N` permutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Canonical flow id.
    #[serde(default)]
    pub flow_id: String,
    /// Flow name; unique per behavior model.
    pub name: String,
    /// Flow type, e.g. "user_journey" or "background_job".
    #[serde(rename = "type", default)]
    pub kind: String,
    /// What initiates the flow.
    #[serde(default)]
    pub trigger: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owned ordered steps.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Flow {
    /// A new flow with no steps.
    #[must_use]
    pub fn new(name: &str, kind: &str, trigger: &str) -> Self {
        Self {
            flow_id: String::new(),
            name: name.to_string(),
            kind: kind.to_string(),
            trigger: trigger.to_string(),
            description: String::new(),
            steps: Vec::new(),
        }
    }
}

/// One step inside a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Canonical step id.
    #[serde(default)]
    pub step_id: String,
    /// Position inside the flow, starting at 1.
    pub order: i64,
    /// The action performed.
    pub action: String,
    /// The entity the action operates on.
    #[serde(default)]
    pub target_entity: String,
}

impl Step {
    /// A step at the given order.
    #[must_use]
    pub fn new(order: i64, action: &str, target_entity: &str) -> Self {
        Self {
            step_id: String::new(),
            order,
            action: action.to_string(),
            target_entity: target_entity.to_string(),
        }
    }
}

/// A domain invariant attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    /// Canonical invariant id.
    #[serde(default)]
    pub invariant_id: String,
    /// Entity the invariant constrains.
    pub entity: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// The invariant expression.
    pub expression: String,
    /// How strictly the invariant is enforced (e.g. "strict", "advisory").
    #[serde(default)]
    pub enforcement_level: String,
}
