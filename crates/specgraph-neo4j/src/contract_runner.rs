//! # Graph Shape Contract Runner
//!
//! Executes a declarative [`ShapeContract`] against the live graph: label
//! presence, required properties, enumerated properties, unique keys,
//! relationship cardinality bounds, undocumented labels, and the
//! contract's named validation queries. Runs automatically after each
//! migration and on demand as a health check.
//!
//! Violation reports carry bounded samples of offending identifiers; the
//! sample cap keeps reports small no matter how broken the graph is.

use crate::engine::GraphEngine;
use crate::statement::Statement;
use serde_json::Value;
use specgraph::contract::{
    ContractReport, LabelContract, QueryExpectation, RelationshipContract, ShapeContract,
    Violation, ViolationKind, MAX_VIOLATION_SAMPLES,
};
use specgraph::error::StoreResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes shape contracts against the graph.
#[derive(Clone)]
pub struct ContractRunner {
    engine: Arc<dyn GraphEngine>,
}

impl ContractRunner {
    /// A runner over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Run the full contract. The report lists every violation found; an
    /// empty report means the graph satisfies the contract.
    pub async fn run(&self, contract: &ShapeContract) -> StoreResult<ContractReport> {
        let mut violations = Vec::new();
        for label in &contract.labels {
            self.check_label(label, &mut violations).await?;
        }
        for relationship in &contract.relationships {
            self.check_relationship(relationship, &mut violations).await?;
        }
        self.check_undocumented_labels(contract, &mut violations)
            .await?;
        for query in &contract.queries {
            self.check_query(query, &mut violations).await?;
        }
        if violations.is_empty() {
            debug!("shape contract {} passed", contract.contract_id);
        } else {
            warn!(
                "shape contract {} found {} violation(s)",
                contract.contract_id,
                violations.len()
            );
        }
        Ok(ContractReport {
            contract_id: contract.contract_id.clone(),
            schema_version: contract.schema_version,
            violations,
        })
    }

    async fn count(&self, statement: Statement) -> StoreResult<i64> {
        let records = self.engine.execute(statement.returning(&["count"])).await?;
        Ok(records
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    async fn samples(&self, statement: Statement) -> StoreResult<Vec<String>> {
        let records = self.engine.execute(statement.returning(&["id"])).await?;
        Ok(records
            .iter()
            .filter_map(|r| r.get("id"))
            .map(|id| match id {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .take(MAX_VIOLATION_SAMPLES)
            .collect())
    }

    async fn check_label(
        &self,
        label: &LabelContract,
        violations: &mut Vec<Violation>,
    ) -> StoreResult<()> {
        let name = label.label.as_str();
        if label.required {
            let present = self
                .count(Statement::new(format!(
                    "MATCH (n:{name}) RETURN count(n) AS count"
                )))
                .await?;
            if present == 0 {
                violations.push(Violation {
                    kind: ViolationKind::MissingLabel,
                    subject: name.to_string(),
                    detail: format!("required label {name} has no nodes"),
                    samples: vec![],
                });
            }
        }
        for property in &label.required_properties {
            let missing = self
                .count(Statement::new(format!(
                    "MATCH (n:{name}) WHERE n.{property} IS NULL RETURN count(n) AS count"
                )))
                .await?;
            if missing > 0 {
                let samples = self
                    .samples(Statement::new(format!(
                        "MATCH (n:{name}) WHERE n.{property} IS NULL \
                         RETURN coalesce(toString(id(n)), '?') AS id LIMIT {MAX_VIOLATION_SAMPLES}"
                    )))
                    .await?;
                violations.push(Violation {
                    kind: ViolationKind::MissingRequiredProperty,
                    subject: name.to_string(),
                    detail: format!("{missing} {name} node(s) missing {property}"),
                    samples,
                });
            }
        }
        for enumerated in &label.enumerated {
            let property = enumerated.property.as_str();
            let invalid = self
                .count(
                    Statement::new(format!(
                        "MATCH (n:{name}) WHERE n.{property} IS NOT NULL \
                         AND NOT n.{property} IN $allowed RETURN count(n) AS count"
                    ))
                    .param(
                        "allowed",
                        Value::Array(
                            enumerated
                                .allowed
                                .iter()
                                .map(|v| Value::from(v.as_str()))
                                .collect(),
                        ),
                    ),
                )
                .await?;
            if invalid > 0 {
                violations.push(Violation {
                    kind: ViolationKind::MissingRequiredProperty,
                    subject: name.to_string(),
                    detail: format!(
                        "{invalid} {name} node(s) carry {property} outside {:?}",
                        enumerated.allowed
                    ),
                    samples: vec![],
                });
            }
        }
        if let Some(key) = &label.unique_key {
            let grouping = key
                .iter()
                .map(|property| format!("n.{property}"))
                .collect::<Vec<_>>()
                .join(", ");
            let duplicated = self
                .count(Statement::new(format!(
                    "MATCH (n:{name}) WITH [{grouping}] AS key, count(n) AS occurrences \
                     WHERE occurrences > 1 RETURN count(key) AS count"
                )))
                .await?;
            if duplicated > 0 {
                let samples = self
                    .samples(Statement::new(format!(
                        "MATCH (n:{name}) WITH [{grouping}] AS key, count(n) AS occurrences \
                         WHERE occurrences > 1 \
                         RETURN toString(key) AS id LIMIT {MAX_VIOLATION_SAMPLES}"
                    )))
                    .await?;
                violations.push(Violation {
                    kind: ViolationKind::CardinalityViolation,
                    subject: name.to_string(),
                    detail: format!("{duplicated} duplicated unique key(s) on {name}"),
                    samples,
                });
            }
        }
        Ok(())
    }

    async fn check_relationship(
        &self,
        relationship: &RelationshipContract,
        violations: &mut Vec<Violation>,
    ) -> StoreResult<()> {
        let rel_type = relationship.rel_type.as_str();
        let from = relationship.from.as_str();
        let to = relationship.to.as_str();
        let bounds = relationship.cardinality;
        if bounds.lower > 0 || bounds.upper.is_some() {
            let upper_clause = bounds
                .upper
                .map(|upper| format!(" OR degree > {upper}"))
                .unwrap_or_default();
            let out_of_bounds = self
                .count(Statement::new(format!(
                    "MATCH (p:{from}) \
                     OPTIONAL MATCH (p)-[:{rel_type}]->(c:{to}) \
                     WITH p, count(c) AS degree \
                     WHERE degree < {lower}{upper_clause} \
                     RETURN count(p) AS count",
                    lower = bounds.lower,
                )))
                .await?;
            if out_of_bounds > 0 {
                violations.push(Violation {
                    kind: ViolationKind::CardinalityViolation,
                    subject: rel_type.to_string(),
                    detail: format!(
                        "{out_of_bounds} {from} node(s) outside [{}, {}] for {rel_type}",
                        bounds.lower,
                        bounds
                            .upper
                            .map_or_else(|| "∞".to_string(), |u| u.to_string()),
                    ),
                    samples: vec![],
                });
            }
        }
        for enumerated in &relationship.enumerated {
            let property = enumerated.property.as_str();
            let invalid = self
                .count(
                    Statement::new(format!(
                        "MATCH (:{from})-[r:{rel_type}]->(:{to}) \
                         WHERE r.{property} IS NULL OR NOT r.{property} IN $allowed \
                         RETURN count(r) AS count"
                    ))
                    .param(
                        "allowed",
                        Value::Array(
                            enumerated
                                .allowed
                                .iter()
                                .map(|v| Value::from(v.as_str()))
                                .collect(),
                        ),
                    ),
                )
                .await?;
            if invalid > 0 {
                violations.push(Violation {
                    kind: ViolationKind::InvalidRelationshipProperty,
                    subject: rel_type.to_string(),
                    detail: format!(
                        "{invalid} {rel_type} edge(s) carry {property} outside {:?}",
                        enumerated.allowed
                    ),
                    samples: vec![],
                });
            }
        }
        Ok(())
    }

    async fn check_undocumented_labels(
        &self,
        contract: &ShapeContract,
        violations: &mut Vec<Violation>,
    ) -> StoreResult<()> {
        let records = self
            .engine
            .execute(
                Statement::new("CALL db.labels() YIELD label RETURN label")
                    .returning(&["label"])
                    .idempotent(),
            )
            .await?;
        let documented = contract.documented_labels();
        for record in records {
            let Some(label) = record.get("label").and_then(Value::as_str) else {
                continue;
            };
            if !documented.contains(&label) {
                violations.push(Violation {
                    kind: ViolationKind::UndocumentedLabel,
                    subject: label.to_string(),
                    detail: format!("label {label} exists but no contract documents it"),
                    samples: vec![],
                });
            }
        }
        Ok(())
    }

    async fn check_query(
        &self,
        query: &specgraph::contract::ValidationQuery,
        violations: &mut Vec<Violation>,
    ) -> StoreResult<()> {
        match query.expect {
            QueryExpectation::ZeroRows => {
                let samples = self
                    .samples(Statement::new(query.cypher.clone()))
                    .await?;
                if !samples.is_empty() {
                    violations.push(Violation {
                        kind: ViolationKind::QueryAssertionFailed,
                        subject: query.name.clone(),
                        detail: format!("assertion {} returned rows", query.name),
                        samples,
                    });
                }
            }
            QueryExpectation::Count(expected) => {
                let actual = self.count(Statement::new(query.cypher.clone())).await?;
                if actual != expected {
                    violations.push(Violation {
                        kind: ViolationKind::QueryAssertionFailed,
                        subject: query.name.clone(),
                        detail: format!(
                            "assertion {} expected count {expected}, found {actual}",
                            query.name
                        ),
                        samples: vec![],
                    });
                }
            }
        }
        Ok(())
    }
}
