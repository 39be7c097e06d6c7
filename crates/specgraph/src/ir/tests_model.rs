//! Tests submodel: seeds, test suites, and scenarios.

use crate::ids;
use crate::ir::api::HttpMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregates the tests model. Seeds, suites, and their scenarios form a
/// nested owned hierarchy; `VALIDATES_*` edges are merged, never replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestsModelIr {
    /// Canonical submodel id (`{app_id}|tests_model`).
    #[serde(default)]
    pub tests_model_id: String,
    /// Seed data declarations; `(tests_model_id, entity_name)` is unique and
    /// `DEPENDS_ON_SEED` must be acyclic.
    #[serde(default)]
    pub seeds: Vec<SeedEntity>,
    /// Per-endpoint test suites.
    #[serde(default)]
    pub endpoint_suites: Vec<EndpointTestSuite>,
    /// Per-flow test suites.
    #[serde(default)]
    pub flow_suites: Vec<FlowTestSuite>,
}

impl TestsModelIr {
    /// Recompute child ids from semantic keys and sort child collections.
    pub fn canonicalize(&mut self, app_id: &str) {
        self.tests_model_id = ids::submodel_id(app_id, "tests_model");
        self.seeds.sort_by(|a, b| a.entity_name.cmp(&b.entity_name));
        self.endpoint_suites.sort_by_key(|s| {
            format!("{}:{}", s.http_method.as_str(), s.endpoint_path)
        });
        self.flow_suites.sort_by(|a, b| a.name.cmp(&b.name));
        for seed in &mut self.seeds {
            seed.seed_id = ids::child_id(&self.tests_model_id, "seed", &seed.entity_name);
            seed.dependencies.sort();
        }
        for suite in &mut self.endpoint_suites {
            suite.suite_id = ids::child_id(
                &self.tests_model_id,
                "endpoint_suite",
                &format!("{}:{}", suite.http_method.as_str(), suite.endpoint_path),
            );
            suite.scenarios.sort_by(|a, b| a.name.cmp(&b.name));
            for scenario in &mut suite.scenarios {
                scenario.scenario_id = ids::child_id(&suite.suite_id, "scenario", &scenario.name);
                scenario.validates_flows.sort();
                scenario.validates_rules.sort();
            }
        }
        for suite in &mut self.flow_suites {
            suite.suite_id = ids::child_id(&self.tests_model_id, "flow_suite", &suite.name);
            suite.scenarios.sort_by(|a, b| a.name.cmp(&b.name));
            for scenario in &mut suite.scenarios {
                scenario.scenario_id = ids::child_id(&suite.suite_id, "scenario", &scenario.name);
                scenario.validates_flows.sort();
                scenario.validates_rules.sort();
            }
        }
    }
}

/// A seed-data declaration for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEntity {
    /// Canonical seed id.
    #[serde(default)]
    pub seed_id: String,
    /// Entity the seed populates; unique per tests model.
    pub entity_name: String,
    /// Backing table name.
    #[serde(default)]
    pub table_name: String,
    /// Number of rows to generate.
    #[serde(default)]
    pub count: i64,
    /// Other seeds (by entity name) that must load first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl SeedEntity {
    /// A seed for the given entity.
    #[must_use]
    pub fn new(entity_name: &str, table_name: &str, count: i64) -> Self {
        Self {
            seed_id: String::new(),
            entity_name: entity_name.to_string(),
            table_name: table_name.to_string(),
            count,
            dependencies: Vec::new(),
        }
    }
}

/// A suite of scenarios exercising one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointTestSuite {
    /// Canonical suite id.
    #[serde(default)]
    pub suite_id: String,
    /// Path of the endpoint under test.
    pub endpoint_path: String,
    /// Method of the endpoint under test.
    pub http_method: HttpMethod,
    /// Operation id of the endpoint under test.
    #[serde(default)]
    pub operation_id: String,
    /// Owned scenarios.
    #[serde(default)]
    pub scenarios: Vec<TestScenario>,
}

/// A suite of scenarios exercising one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTestSuite {
    /// Canonical suite id.
    #[serde(default)]
    pub suite_id: String,
    /// Name of the flow under test.
    pub name: String,
    /// Owned scenarios.
    #[serde(default)]
    pub scenarios: Vec<TestScenario>,
}

/// One concrete test scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScenario {
    /// Canonical scenario id.
    #[serde(default)]
    pub scenario_id: String,
    /// Scenario name; unique per suite.
    pub name: String,
    /// Path exercised by the scenario.
    #[serde(default)]
    pub endpoint_path: String,
    /// Method exercised by the scenario.
    pub http_method: HttpMethod,
    /// Scenario type, e.g. "happy_path", "auth_failure".
    #[serde(default)]
    pub test_type: String,
    /// Scheduling priority, e.g. "high".
    #[serde(default)]
    pub priority: String,
    /// Path parameter fixture.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub path_params: Map<String, Value>,
    /// Query parameter fixture.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub query_params: Map<String, Value>,
    /// Header fixture.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    /// Request body fixture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    /// Expected outcome description.
    #[serde(default)]
    pub expected_outcome: String,
    /// Expected HTTP status code.
    #[serde(default)]
    pub expected_status_code: i64,
    /// Whether the scenario authenticates first.
    #[serde(default)]
    pub requires_auth: bool,
    /// Endpoint id this scenario was generated from (`VALIDATES_ENDPOINT`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint_id: Option<String>,
    /// Flow names this scenario validates (`VALIDATES_FLOW`, merged).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validates_flows: Vec<String>,
    /// Validation rule ids this scenario validates (`VALIDATES_RULE`, merged).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validates_rules: Vec<String>,
}

impl TestScenario {
    /// A minimal scenario for the given endpoint.
    #[must_use]
    pub fn new(name: &str, http_method: HttpMethod, endpoint_path: &str) -> Self {
        Self {
            scenario_id: String::new(),
            name: name.to_string(),
            endpoint_path: endpoint_path.to_string(),
            http_method,
            test_type: String::new(),
            priority: String::new(),
            path_params: Map::new(),
            query_params: Map::new(),
            headers: Map::new(),
            request_body: None,
            expected_outcome: String::new(),
            expected_status_code: 200,
            requires_auth: false,
            source_endpoint_id: None,
            validates_flows: Vec::new(),
            validates_rules: Vec::new(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_seed_and_suite_ids() {
        let mut tests = TestsModelIr::default();
        tests.seeds.push(SeedEntity::new("Product", "products", 10));
        let mut suite = EndpointTestSuite {
            suite_id: String::new(),
            endpoint_path: "/products".to_string(),
            http_method: HttpMethod::Get,
            operation_id: "list_products".to_string(),
            scenarios: vec![TestScenario::new("lists products", HttpMethod::Get, "/products")],
        };
        suite.scenarios[0].expected_status_code = 200;
        tests.endpoint_suites.push(suite);
        tests.flow_suites.push(FlowTestSuite {
            suite_id: String::new(),
            name: "checkout".to_string(),
            scenarios: vec![],
        });
        tests.canonicalize("A1");
        assert_eq!(tests.tests_model_id, "A1|tests_model");
        assert_eq!(tests.seeds[0].seed_id, "A1|tests_model|seed|Product");
        assert_eq!(
            tests.endpoint_suites[0].suite_id,
            "A1|tests_model|endpoint_suite|GET:/products"
        );
        assert_eq!(
            tests.endpoint_suites[0].scenarios[0].scenario_id,
            "A1|tests_model|endpoint_suite|GET:/products|scenario|lists products"
        );
        assert_eq!(
            tests.flow_suites[0].suite_id,
            "A1|tests_model|flow_suite|checkout"
        );
    }

    #[test]
    fn test_scenario_fixture_maps_survive_serde() {
        let mut scenario = TestScenario::new("not found", HttpMethod::Get, "/products/{id}");
        scenario
            .path_params
            .insert("id".to_string(), serde_json::json!("missing"));
        scenario.expected_status_code = 404;
        let json = serde_json::to_string(&scenario).unwrap();
        let back: TestScenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scenario);
    }

    #[test]
    fn test_empty_fixtures_are_omitted() {
        let scenario = TestScenario::new("x", HttpMethod::Post, "/x");
        let json = serde_json::to_value(&scenario).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("path_params"));
        assert!(!obj.contains_key("request_body"));
        assert!(!obj.contains_key("validates_flows"));
    }
}
