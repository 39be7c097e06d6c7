//! Validation submodel: rules and enforcement strategies.

use crate::ids;
use serde::{Deserialize, Serialize};

/// Aggregates validation rules and how they are enforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationModelIr {
    /// Canonical submodel id (`{app_id}|validation_model`).
    #[serde(default)]
    pub validation_model_id: String,
    /// Owned validation rules.
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
    /// Owned enforcement strategies.
    #[serde(default)]
    pub strategies: Vec<EnforcementStrategy>,
}

impl ValidationModelIr {
    /// Recompute child ids from semantic keys and sort child collections.
    pub fn canonicalize(&mut self, app_id: &str) {
        self.validation_model_id = ids::submodel_id(app_id, "validation_model");
        self.rules.sort_by(|a, b| {
            (&a.entity, &a.attribute, &a.kind, &a.condition)
                .cmp(&(&b.entity, &b.attribute, &b.kind, &b.condition))
        });
        self.strategies
            .sort_by(|a, b| (&a.kind, &a.implementation).cmp(&(&b.kind, &b.implementation)));
        for (index, rule) in self.rules.iter_mut().enumerate() {
            rule.rule_id = ids::indexed_child_id(
                &self.validation_model_id,
                "rule",
                &format!("{}.{}", rule.entity, rule.attribute),
                index,
            );
        }
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            strategy.strategy_id = ids::indexed_child_id(
                &self.validation_model_id,
                "strategy",
                &strategy.kind,
                index,
            );
        }
    }
}

/// A validation rule on an entity attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Canonical rule id.
    #[serde(default)]
    pub rule_id: String,
    /// Entity the rule applies to.
    pub entity: String,
    /// Attribute the rule constrains.
    pub attribute: String,
    /// Rule type, e.g. "range", "format", "presence".
    #[serde(rename = "type")]
    pub kind: String,
    /// The rule condition rendered as text.
    pub condition: String,
    /// Severity, e.g. "error" or "warning".
    #[serde(default)]
    pub severity: String,
    /// How the rule is enforced, e.g. "database", "application".
    #[serde(default)]
    pub enforcement_type: String,
}

/// How a class of rules is realized in generated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnforcementStrategy {
    /// Canonical strategy id.
    #[serde(default)]
    pub strategy_id: String,
    /// Strategy type, e.g. "check_constraint", "validator".
    #[serde(rename = "type")]
    pub kind: String,
    /// Concrete implementation hint for the generator.
    #[serde(default)]
    pub implementation: String,
    /// Layers the strategy is applied at (e.g. "api", "database").
    #[serde(default)]
    pub applied_at: Vec<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> ValidationRule {
        ValidationRule {
            rule_id: String::new(),
            entity: "Product".to_string(),
            attribute: "price".to_string(),
            kind: "range".to_string(),
            condition: "price >= 0".to_string(),
            severity: "error".to_string(),
            enforcement_type: "database".to_string(),
        }
    }

    #[test]
    fn test_canonicalize_rule_and_strategy_ids() {
        let mut model = ValidationModelIr::default();
        model.rules.push(sample_rule());
        model.strategies.push(EnforcementStrategy {
            strategy_id: String::new(),
            kind: "check_constraint".to_string(),
            implementation: "CHECK (price >= 0)".to_string(),
            applied_at: vec!["database".to_string()],
        });
        model.canonicalize("A1");
        assert_eq!(model.validation_model_id, "A1|validation_model");
        assert_eq!(
            model.rules[0].rule_id,
            "A1|validation_model|rule|Product.price|0"
        );
        assert_eq!(
            model.strategies[0].strategy_id,
            "A1|validation_model|strategy|check_constraint|0"
        );
    }

    #[test]
    fn test_rule_serde_uses_type_key() {
        let json = serde_json::to_value(sample_rule()).unwrap();
        assert_eq!(json["type"], "range");
    }

    #[test]
    fn test_roundtrip() {
        let mut model = ValidationModelIr::default();
        model.rules.push(sample_rule());
        model.canonicalize("A1");
        let json = serde_json::to_string(&model).unwrap();
        let back: ValidationModelIr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }
}
