//! Tests submodel repository.
//!
//! Seed entities, endpoint test suites, flow test suites, and their child
//! scenarios form a nested subgraph-replace. `DEPENDS_ON_SEED` is
//! validated for acyclicity before a single statement is issued;
//! `VALIDATES_ENDPOINT`, `VALIDATES_FLOW`, and `VALIDATES_RULE` are
//! merged.

use crate::engine::GraphEngine;
use crate::repository::{
    attach_children, child_row, connect, delete_absent_children, delete_absent_descendants,
    edge_row, json_string_property, upsert_submodel_root, CascadeHop,
};
use crate::statement::{JsonMap, Statement};
use crate::temporal::TemporalStamp;
use serde_json::Value;
use specgraph::actor::ActorContext;
use specgraph::error::StoreResult;
use specgraph::ids;
use specgraph::ir::validate::validate_tests;
use specgraph::ir::{TestScenario, TestsModelIr};
use std::sync::Arc;
use tracing::debug;

/// Repository for `TestsModelIR` subgraphs.
#[derive(Clone)]
pub struct TestsRepository {
    engine: Arc<dyn GraphEngine>,
}

impl TestsRepository {
    /// A repository over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Validate and persist one tests submodel in a single transaction.
    /// A `DEPENDS_ON_SEED` cycle fails before any statement is issued, so
    /// the prior state is untouched.
    pub async fn save(
        &self,
        app_id: &str,
        tests: &TestsModelIr,
        context: &ActorContext,
    ) -> StoreResult<()> {
        validate_tests(tests)?;
        let stamp = TemporalStamp::new(context)?;
        debug!(
            "saving tests model for {app_id}: {} seeds, {} endpoint suites, {} flow suites",
            tests.seeds.len(),
            tests.endpoint_suites.len(),
            tests.flow_suites.len()
        );
        self.engine
            .run_atomic(Self::plan(app_id, tests, &stamp))
            .await
            .map_err(crate::repository::surface_write_failure)
    }

    /// Statement plan for one tests submodel.
    #[must_use]
    pub fn plan(app_id: &str, tests: &TestsModelIr, stamp: &TemporalStamp) -> Vec<Statement> {
        let root_id = &tests.tests_model_id;
        let behavior_model_id = ids::submodel_id(app_id, "behavior_model");
        let mut statements = vec![upsert_submodel_root(
            app_id,
            "HAS_TESTS_MODEL",
            "TestsModelIR",
            "tests_model_id",
            root_id,
            stamp,
        )];

        let keep_seeds: Vec<String> = tests.seeds.iter().map(|s| s.seed_id.clone()).collect();
        statements.push(delete_absent_children(
            "TestsModelIR",
            "tests_model_id",
            root_id,
            "HAS_SEED_ENTITY",
            "SeedEntityIR",
            "seed_id",
            keep_seeds,
            &[],
        ));

        for (rel_type, label) in [
            ("HAS_ENDPOINT_SUITE", "EndpointTestSuite"),
            ("HAS_FLOW_SUITE", "FlowTestSuite"),
        ] {
            let keep: Vec<String> = match rel_type {
                "HAS_ENDPOINT_SUITE" => tests
                    .endpoint_suites
                    .iter()
                    .map(|s| s.suite_id.clone())
                    .collect(),
                _ => tests
                    .flow_suites
                    .iter()
                    .map(|s| s.suite_id.clone())
                    .collect(),
            };
            statements.push(delete_absent_children(
                "TestsModelIR",
                "tests_model_id",
                root_id,
                rel_type,
                label,
                "suite_id",
                keep,
                &[CascadeHop {
                    rel_type: "HAS_SCENARIO",
                    label: "TestScenarioIR",
                }],
            ));
        }
        let keep_scenarios: Vec<String> = tests
            .endpoint_suites
            .iter()
            .flat_map(|suite| suite.scenarios.iter().map(|s| s.scenario_id.clone()))
            .chain(
                tests
                    .flow_suites
                    .iter()
                    .flat_map(|suite| suite.scenarios.iter().map(|s| s.scenario_id.clone())),
            )
            .collect();
        statements.push(delete_absent_descendants(
            "TestsModelIR",
            "tests_model_id",
            root_id,
            &[
                ("HAS_ENDPOINT_SUITE", "EndpointTestSuite"),
                ("HAS_SCENARIO", "TestScenarioIR"),
            ],
            "scenario_id",
            keep_scenarios.clone(),
        ));
        statements.push(delete_absent_descendants(
            "TestsModelIR",
            "tests_model_id",
            root_id,
            &[
                ("HAS_FLOW_SUITE", "FlowTestSuite"),
                ("HAS_SCENARIO", "TestScenarioIR"),
            ],
            "scenario_id",
            keep_scenarios,
        ));

        if !tests.seeds.is_empty() {
            let seed_rows: Vec<Value> = tests
                .seeds
                .iter()
                .map(|seed| {
                    let mut props = JsonMap::new();
                    props.insert(
                        "entity_name".to_string(),
                        Value::from(seed.entity_name.as_str()),
                    );
                    props.insert(
                        "table_name".to_string(),
                        Value::from(seed.table_name.as_str()),
                    );
                    props.insert("count".to_string(), Value::from(seed.count));
                    props.insert(
                        "dependencies".to_string(),
                        Value::Array(
                            seed.dependencies
                                .iter()
                                .map(|name| Value::from(name.as_str()))
                                .collect(),
                        ),
                    );
                    child_row(root_id, &seed.seed_id, props)
                })
                .collect();
            statements.push(attach_children(
                "TestsModelIR",
                "tests_model_id",
                "HAS_SEED_ENTITY",
                "SeedEntityIR",
                "seed_id",
                seed_rows,
                stamp,
            ));

            let dependency_rows: Vec<Value> = tests
                .seeds
                .iter()
                .flat_map(|seed| {
                    seed.dependencies.iter().map(|dependency| {
                        edge_row(
                            &seed.seed_id,
                            &ids::child_id(root_id, "seed", dependency),
                            None,
                            JsonMap::new(),
                        )
                    })
                })
                .collect();
            if !dependency_rows.is_empty() {
                statements.push(connect(
                    "SeedEntityIR",
                    "seed_id",
                    "SeedEntityIR",
                    "seed_id",
                    "DEPENDS_ON_SEED",
                    None,
                    dependency_rows,
                    stamp,
                ));
            }
        }

        if !tests.endpoint_suites.is_empty() {
            let suite_rows: Vec<Value> = tests
                .endpoint_suites
                .iter()
                .map(|suite| {
                    let mut props = JsonMap::new();
                    props.insert(
                        "endpoint_path".to_string(),
                        Value::from(suite.endpoint_path.as_str()),
                    );
                    props.insert(
                        "http_method".to_string(),
                        Value::from(suite.http_method.as_str()),
                    );
                    props.insert(
                        "operation_id".to_string(),
                        Value::from(suite.operation_id.as_str()),
                    );
                    child_row(root_id, &suite.suite_id, props)
                })
                .collect();
            statements.push(attach_children(
                "TestsModelIR",
                "tests_model_id",
                "HAS_ENDPOINT_SUITE",
                "EndpointTestSuite",
                "suite_id",
                suite_rows,
                stamp,
            ));
        }

        if !tests.flow_suites.is_empty() {
            let suite_rows: Vec<Value> = tests
                .flow_suites
                .iter()
                .map(|suite| {
                    let mut props = JsonMap::new();
                    props.insert("name".to_string(), Value::from(suite.name.as_str()));
                    child_row(root_id, &suite.suite_id, props)
                })
                .collect();
            statements.push(attach_children(
                "TestsModelIR",
                "tests_model_id",
                "HAS_FLOW_SUITE",
                "FlowTestSuite",
                "suite_id",
                suite_rows,
                stamp,
            ));
        }

        let endpoint_scenario_rows: Vec<Value> = tests
            .endpoint_suites
            .iter()
            .flat_map(|suite| {
                suite
                    .scenarios
                    .iter()
                    .map(|scenario| {
                        child_row(&suite.suite_id, &scenario.scenario_id, scenario_props(scenario))
                    })
            })
            .collect();
        if !endpoint_scenario_rows.is_empty() {
            statements.push(attach_children(
                "EndpointTestSuite",
                "suite_id",
                "HAS_SCENARIO",
                "TestScenarioIR",
                "scenario_id",
                endpoint_scenario_rows,
                stamp,
            ));
        }
        let flow_scenario_rows: Vec<Value> = tests
            .flow_suites
            .iter()
            .flat_map(|suite| {
                suite
                    .scenarios
                    .iter()
                    .map(|scenario| {
                        child_row(&suite.suite_id, &scenario.scenario_id, scenario_props(scenario))
                    })
            })
            .collect();
        if !flow_scenario_rows.is_empty() {
            statements.push(attach_children(
                "FlowTestSuite",
                "suite_id",
                "HAS_SCENARIO",
                "TestScenarioIR",
                "scenario_id",
                flow_scenario_rows,
                stamp,
            ));
        }

        // Merged validation references.
        let all_scenarios = tests
            .endpoint_suites
            .iter()
            .flat_map(|suite| suite.scenarios.iter())
            .chain(tests.flow_suites.iter().flat_map(|suite| suite.scenarios.iter()));
        let mut endpoint_refs = Vec::new();
        let mut flow_refs = Vec::new();
        let mut rule_refs = Vec::new();
        for scenario in all_scenarios {
            if let Some(endpoint_id) = &scenario.source_endpoint_id {
                endpoint_refs.push(edge_row(
                    &scenario.scenario_id,
                    endpoint_id,
                    None,
                    JsonMap::new(),
                ));
            }
            for flow in &scenario.validates_flows {
                flow_refs.push(edge_row(
                    &scenario.scenario_id,
                    &ids::child_id(&behavior_model_id, "flow", flow),
                    None,
                    JsonMap::new(),
                ));
            }
            for rule_id in &scenario.validates_rules {
                rule_refs.push(edge_row(&scenario.scenario_id, rule_id, None, JsonMap::new()));
            }
        }
        for (rel_type, to_label, to_key, rows) in [
            ("VALIDATES_ENDPOINT", "Endpoint", "endpoint_id", endpoint_refs),
            ("VALIDATES_FLOW", "Flow", "flow_id", flow_refs),
            ("VALIDATES_RULE", "ValidationRule", "rule_id", rule_refs),
        ] {
            if !rows.is_empty() {
                statements.push(connect(
                    "TestScenarioIR",
                    "scenario_id",
                    to_label,
                    to_key,
                    rel_type,
                    None,
                    rows,
                    stamp,
                ));
            }
        }

        statements
    }
}

fn scenario_props(scenario: &TestScenario) -> JsonMap {
    let mut props = JsonMap::new();
    props.insert("name".to_string(), Value::from(scenario.name.as_str()));
    props.insert(
        "endpoint_path".to_string(),
        Value::from(scenario.endpoint_path.as_str()),
    );
    props.insert(
        "http_method".to_string(),
        Value::from(scenario.http_method.as_str()),
    );
    props.insert(
        "test_type".to_string(),
        Value::from(scenario.test_type.as_str()),
    );
    props.insert(
        "priority".to_string(),
        Value::from(scenario.priority.as_str()),
    );
    props.insert(
        "path_params".to_string(),
        json_string_property(&Value::Object(scenario.path_params.clone())),
    );
    props.insert(
        "query_params".to_string(),
        json_string_property(&Value::Object(scenario.query_params.clone())),
    );
    props.insert(
        "headers".to_string(),
        json_string_property(&Value::Object(scenario.headers.clone())),
    );
    props.insert(
        "request_body".to_string(),
        scenario
            .request_body
            .as_ref()
            .map(json_string_property)
            .unwrap_or(Value::Null),
    );
    props.insert(
        "expected_outcome".to_string(),
        Value::from(scenario.expected_outcome.as_str()),
    );
    props.insert(
        "expected_status_code".to_string(),
        Value::from(scenario.expected_status_code),
    );
    props.insert(
        "requires_auth".to_string(),
        Value::from(scenario.requires_auth),
    );
    props.insert(
        "source_endpoint_id".to_string(),
        scenario
            .source_endpoint_id
            .as_deref()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    props.insert(
        "validates_flows".to_string(),
        Value::Array(
            scenario
                .validates_flows
                .iter()
                .map(|name| Value::from(name.as_str()))
                .collect(),
        ),
    );
    props.insert(
        "validates_rules".to_string(),
        Value::Array(
            scenario
                .validates_rules
                .iter()
                .map(|rule| Value::from(rule.as_str()))
                .collect(),
        ),
    );
    props
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingEngine;
    use specgraph::actor::Actor;
    use specgraph::ir::{EndpointTestSuite, HttpMethod, SeedEntity};

    fn sample_tests() -> TestsModelIr {
        let mut tests = TestsModelIr::default();
        let mut product = SeedEntity::new("Product", "products", 10);
        product.dependencies.push("Category".to_string());
        tests.seeds.push(product);
        tests.seeds.push(SeedEntity::new("Category", "categories", 3));
        let mut scenario = TestScenario::new("lists products", HttpMethod::Get, "/products");
        scenario.source_endpoint_id = Some("A1|api_model|endpoint|GET:/products".to_string());
        scenario.validates_flows.push("checkout".to_string());
        tests.endpoint_suites.push(EndpointTestSuite {
            suite_id: String::new(),
            endpoint_path: "/products".to_string(),
            http_method: HttpMethod::Get,
            operation_id: "list_products".to_string(),
            scenarios: vec![scenario],
        });
        tests.canonicalize("A1");
        tests
    }

    fn stamp() -> TemporalStamp {
        TemporalStamp::at(1_700_000_000_000, Actor::Pipeline)
    }

    // ========== Plan Shape Tests ==========

    #[test]
    fn test_plan_merges_seed_dependencies_as_edges() {
        let plan = TestsRepository::plan("A1", &sample_tests(), &stamp());
        let merge = plan
            .iter()
            .find(|s| s.text.contains("MERGE (a)-[e:DEPENDS_ON_SEED]->(b)"))
            .unwrap();
        let rows = merge.params["rows"].as_array().unwrap();
        assert_eq!(rows[0]["from"], "A1|tests_model|seed|Product");
        assert_eq!(rows[0]["to"], "A1|tests_model|seed|Category");
    }

    #[test]
    fn test_plan_scenarios_pack_fixtures() {
        let plan = TestsRepository::plan("A1", &sample_tests(), &stamp());
        let attach = plan
            .iter()
            .find(|s| s.text.contains("MERGE (c:TestScenarioIR"))
            .unwrap();
        let rows = attach.params["rows"].as_array().unwrap();
        assert!(rows[0]["props"]["path_params"].is_string());
        assert_eq!(rows[0]["props"]["expected_status_code"], 200);
    }

    #[test]
    fn test_plan_validates_endpoint_uses_source_endpoint_id() {
        let plan = TestsRepository::plan("A1", &sample_tests(), &stamp());
        let merge = plan
            .iter()
            .find(|s| s.text.contains("MERGE (a)-[e:VALIDATES_ENDPOINT]->(b)"))
            .unwrap();
        let rows = merge.params["rows"].as_array().unwrap();
        assert_eq!(rows[0]["to"], "A1|api_model|endpoint|GET:/products");
    }

    #[test]
    fn test_plan_validates_flow_derives_flow_id() {
        let plan = TestsRepository::plan("A1", &sample_tests(), &stamp());
        let merge = plan
            .iter()
            .find(|s| s.text.contains("MERGE (a)-[e:VALIDATES_FLOW]->(b)"))
            .unwrap();
        let rows = merge.params["rows"].as_array().unwrap();
        assert_eq!(rows[0]["to"], "A1|behavior_model|flow|checkout");
    }

    // ========== Seed Cycle Tests ==========

    #[tokio::test]
    async fn test_save_rejects_seed_cycle_with_no_writes() {
        let engine = Arc::new(RecordingEngine::new());
        let repository = TestsRepository::new(engine.clone() as Arc<dyn GraphEngine>);
        let mut tests = TestsModelIr::default();
        let mut a = SeedEntity::new("A", "a", 1);
        a.dependencies.push("B".to_string());
        let mut b = SeedEntity::new("B", "b", 1);
        b.dependencies.push("A".to_string());
        tests.seeds.push(a);
        tests.seeds.push(b);
        tests.canonicalize("A1");
        let err = repository
            .save("A1", &tests, &ActorContext::new(Actor::Pipeline))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTRACT_SEED_CYCLE");
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_save_accepts_seed_dag() {
        let engine = Arc::new(RecordingEngine::new());
        let repository = TestsRepository::new(engine.clone() as Arc<dyn GraphEngine>);
        repository
            .save("A1", &sample_tests(), &ActorContext::new(Actor::Pipeline))
            .await
            .unwrap();
        assert_eq!(engine.calls().len(), 1);
    }
}
