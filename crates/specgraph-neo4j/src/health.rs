//! # Graph Health Monitor
//!
//! Scheduled and on-demand structural health checks: orphaned submodels,
//! missing required properties, high-degree nodes, duplicate unique keys,
//! invalid relationship payloads, undocumented labels, and stale IR
//! roots. Each check yields findings with a severity; the report's status
//! is the worst severity found.
//!
//! Critical findings can optionally be persisted as `HealthCheckResult`
//! nodes for trending; persistence is best-effort and never required for
//! correctness.

use crate::engine::GraphEngine;
use crate::statement::Statement;
use serde_json::Value;
use specgraph::contract::{contract_for_version, ShapeContract};
use specgraph::error::StoreResult;
use specgraph::health::{
    HealthCheck, HealthFinding, HealthReport, HealthSeverity, HealthThresholds,
};
use specgraph::time::now_millis;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Submodel labels and the incoming edge each expects from its parent.
const EXPECTED_PARENTS: &[(&str, &str, &str)] = &[
    ("DomainModelIR", "ApplicationIR", "HAS_DOMAIN_MODEL"),
    ("APIModelIR", "ApplicationIR", "HAS_API_MODEL"),
    ("BehaviorModelIR", "ApplicationIR", "HAS_BEHAVIOR_MODEL"),
    ("ValidationModelIR", "ApplicationIR", "HAS_VALIDATION_MODEL"),
    (
        "InfrastructureModelIR",
        "ApplicationIR",
        "HAS_INFRASTRUCTURE_MODEL",
    ),
    ("TestsModelIR", "ApplicationIR", "HAS_TESTS_MODEL"),
    ("Entity", "DomainModelIR", "HAS_ENTITY"),
    ("Attribute", "Entity", "HAS_ATTRIBUTE"),
    ("Endpoint", "APIModelIR", "HAS_ENDPOINT"),
    ("APISchema", "APIModelIR", "HAS_SCHEMA"),
    ("Flow", "BehaviorModelIR", "HAS_FLOW"),
    ("Step", "Flow", "HAS_STEP"),
    ("SeedEntityIR", "TestsModelIR", "HAS_SEED_ENTITY"),
];

/// Runs the health checks against the graph.
pub struct HealthMonitor {
    engine: Arc<dyn GraphEngine>,
    thresholds: HealthThresholds,
    persist_critical: bool,
}

impl HealthMonitor {
    /// A monitor over the given engine with the given thresholds.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>, thresholds: HealthThresholds) -> Self {
        Self {
            engine,
            thresholds,
            persist_critical: false,
        }
    }

    /// Persist critical findings as `HealthCheckResult` nodes.
    #[must_use]
    pub fn with_persistence(mut self) -> Self {
        self.persist_critical = true;
        self
    }

    /// Run every check and fold the findings into one report.
    pub async fn check(&self) -> StoreResult<HealthReport> {
        let contract = contract_for_version(1).unwrap_or_else(|| ShapeContract {
            contract_id: "empty".to_string(),
            schema_version: 0,
            labels: vec![],
            relationships: vec![],
            auxiliary_labels: vec![],
            queries: vec![],
        });
        let mut findings = Vec::new();
        let checks_run = vec![
            HealthCheck::OrphanNodes,
            HealthCheck::MissingRequiredProperties,
            HealthCheck::HighDegreeNodes,
            HealthCheck::DuplicateUniqueKeys,
            HealthCheck::InvalidRelationshipPayloads,
            HealthCheck::UndocumentedLabels,
            HealthCheck::StaleNodes,
        ];

        self.check_orphans(&mut findings).await?;
        self.check_missing_properties(&contract, &mut findings)
            .await?;
        self.check_high_degree(&mut findings).await?;
        self.check_duplicate_keys(&contract, &mut findings).await?;
        self.check_relationship_payloads(&mut findings).await?;
        self.check_undocumented_labels(&contract, &mut findings)
            .await?;
        self.check_stale_roots(&mut findings).await?;

        let report = HealthReport {
            findings,
            checks_run,
            generated_at: now_millis(),
        };
        match report.status() {
            HealthSeverity::Healthy => debug!("health check passed"),
            HealthSeverity::Warning => info!(
                "health check found {} warning(s)",
                report.findings.len()
            ),
            HealthSeverity::Critical => warn!(
                "health check found {} finding(s), {} critical",
                report.findings.len(),
                report.critical().len()
            ),
        }
        if self.persist_critical {
            self.persist(&report).await?;
        }
        Ok(report)
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
            .take(self.thresholds.max_samples)
            .collect())
    }

    async fn check_orphans(&self, findings: &mut Vec<HealthFinding>) -> StoreResult<()> {
        for (label, parent, rel_type) in EXPECTED_PARENTS {
            let orphaned = self
                .count(Statement::new(format!(
                    "MATCH (n:{label}) WHERE NOT ( (:{parent})-[:{rel_type}]->(n) ) \
                     RETURN count(n) AS count"
                )))
                .await?;
            if orphaned > 0 {
                findings.push(HealthFinding {
                    check: HealthCheck::OrphanNodes,
                    severity: HealthSeverity::Critical,
                    detail: format!(
                        "{orphaned} {label} node(s) lack the expected {rel_type} parent"
                    ),
                    samples: vec![],
                });
            }
        }
        Ok(())
    }

    async fn check_missing_properties(
        &self,
        contract: &ShapeContract,
        findings: &mut Vec<HealthFinding>,
    ) -> StoreResult<()> {
        for label in &contract.labels {
            for property in &label.required_properties {
                let missing = self
                    .count(Statement::new(format!(
                        "MATCH (n:{}) WHERE n.{property} IS NULL RETURN count(n) AS count",
                        label.label
                    )))
                    .await?;
                if missing > 0 {
                    findings.push(HealthFinding {
                        check: HealthCheck::MissingRequiredProperties,
                        severity: HealthSeverity::Warning,
                        detail: format!(
                            "{missing} {} node(s) missing {property}",
                            label.label
                        ),
                        samples: vec![],
                    });
                }
            }
        }
        Ok(())
    }

    async fn check_high_degree(&self, findings: &mut Vec<HealthFinding>) -> StoreResult<()> {
        let threshold = self.thresholds.high_degree;
        let hot = self
            .count(Statement::new(format!(
                "MATCH (n) WITH n, COUNT {{ (n)--() }} AS degree \
                 WHERE degree > {threshold} RETURN count(n) AS count"
            )))
            .await?;
        if hot > 0 {
            let samples = self
                .samples(Statement::new(format!(
                    "MATCH (n) WITH n, COUNT {{ (n)--() }} AS degree \
                     WHERE degree > {threshold} \
                     RETURN coalesce(toString(id(n)), '?') AS id LIMIT {}",
                    self.thresholds.max_samples
                )))
                .await?;
            findings.push(HealthFinding {
                check: HealthCheck::HighDegreeNodes,
                severity: HealthSeverity::Warning,
                detail: format!("{hot} node(s) exceed degree {threshold}"),
                samples,
            });
        }
        Ok(())
    }

    async fn check_duplicate_keys(
        &self,
        contract: &ShapeContract,
        findings: &mut Vec<HealthFinding>,
    ) -> StoreResult<()> {
        for label in &contract.labels {
            let Some(key) = &label.unique_key else {
                continue;
            };
            let grouping = key
                .iter()
                .map(|property| format!("n.{property}"))
                .collect::<Vec<_>>()
                .join(", ");
            let duplicated = self
                .count(Statement::new(format!(
                    "MATCH (n:{}) WITH [{grouping}] AS key, count(n) AS occurrences \
                     WHERE occurrences > 1 RETURN count(key) AS count",
                    label.label
                )))
                .await?;
            if duplicated > 0 {
                findings.push(HealthFinding {
                    check: HealthCheck::DuplicateUniqueKeys,
                    severity: HealthSeverity::Critical,
                    detail: format!(
                        "{duplicated} duplicated unique key(s) on {}",
                        label.label
                    ),
                    samples: vec![],
                });
            }
        }
        Ok(())
    }

    async fn check_relationship_payloads(
        &self,
        findings: &mut Vec<HealthFinding>,
    ) -> StoreResult<()> {
        let invalid = self
            .count(
                Statement::new(
                    "MATCH (:Entity)-[r:RELATES_TO]->(:Entity) \
                     WHERE r.type IS NULL OR NOT r.type IN $allowed \
                     RETURN count(r) AS count",
                )
                .param(
                    "allowed",
                    serde_json::json!(["one_to_one", "one_to_many", "many_to_many"]),
                ),
            )
            .await?;
        if invalid > 0 {
            findings.push(HealthFinding {
                check: HealthCheck::InvalidRelationshipPayloads,
                severity: HealthSeverity::Critical,
                detail: format!("{invalid} RELATES_TO edge(s) carry an invalid type"),
                samples: vec![],
            });
        }
        Ok(())
    }

    async fn check_undocumented_labels(
        &self,
        contract: &ShapeContract,
        findings: &mut Vec<HealthFinding>,
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
        let unknown: Vec<String> = records
            .iter()
            .filter_map(|record| record.get("label").and_then(Value::as_str))
            .filter(|label| !documented.contains(label))
            .map(String::from)
            .collect();
        if !unknown.is_empty() {
            findings.push(HealthFinding {
                check: HealthCheck::UndocumentedLabels,
                severity: HealthSeverity::Warning,
                detail: format!("{} undocumented label(s) present", unknown.len()),
                samples: unknown,
            });
        }
        Ok(())
    }

    async fn check_stale_roots(&self, findings: &mut Vec<HealthFinding>) -> StoreResult<()> {
        let horizon = now_millis() - self.thresholds.stale_after_days * 24 * 60 * 60 * 1_000;
        let stale = self
            .count(
                Statement::new(
                    "MATCH (app:ApplicationIR) WHERE app.updated_at < $horizon \
                     RETURN count(app) AS count",
                )
                .param("horizon", horizon),
            )
            .await?;
        if stale > 0 {
            let samples = self
                .samples(
                    Statement::new(format!(
                        "MATCH (app:ApplicationIR) WHERE app.updated_at < $horizon \
                         RETURN app.app_id AS id LIMIT {}",
                        self.thresholds.max_samples
                    ))
                    .param("horizon", horizon),
                )
                .await?;
            findings.push(HealthFinding {
                check: HealthCheck::StaleNodes,
                severity: HealthSeverity::Warning,
                detail: format!(
                    "{stale} application(s) untouched for more than {} day(s)",
                    self.thresholds.stale_after_days
                ),
                samples,
            });
        }
        Ok(())
    }

    async fn persist(&self, report: &HealthReport) -> StoreResult<()> {
        for finding in report.critical() {
            let statement = Statement::new(
                "CREATE (h:HealthCheckResult {check: $check, severity: $severity, \
                 detail: $detail, recorded_at: $recorded_at})",
            )
            .param("check", finding.check.as_str())
            .param("severity", "CRITICAL")
            .param("detail", finding.detail.as_str())
            .param("recorded_at", report.generated_at);
            self.engine.run(statement).await?;
        }
        Ok(())
    }
}
