//! Declarative graph shape contracts.
//!
//! A contract states, per schema version, which labels must exist, which
//! properties they require, which relationship types are allowed and at
//! what cardinality, which properties are enumerated, and a list of named
//! validation queries with expected results. Contracts are data: they can
//! be authored in YAML or built in code, and are executed by the store's
//! contract runner after every migration and on demand.

use serde::{Deserialize, Serialize};

/// Bounds on the number of children per parent across a relationship.
/// `upper: None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityBounds {
    /// Minimum required children per parent.
    pub lower: u64,
    /// Maximum allowed children per parent; `None` is unbounded.
    pub upper: Option<u64>,
}

impl CardinalityBounds {
    /// `[0, unbounded]`.
    #[must_use]
    pub fn any() -> Self {
        Self {
            lower: 0,
            upper: None,
        }
    }

    /// `[1, unbounded]`.
    #[must_use]
    pub fn at_least_one() -> Self {
        Self {
            lower: 1,
            upper: None,
        }
    }

    /// `[0, 1]`.
    #[must_use]
    pub fn at_most_one() -> Self {
        Self {
            lower: 0,
            upper: Some(1),
        }
    }

    /// Whether `count` satisfies the bounds.
    #[must_use]
    pub fn admits(&self, count: u64) -> bool {
        count >= self.lower && self.upper.map_or(true, |upper| count <= upper)
    }
}

/// A property restricted to an enumerated set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratedProperty {
    /// Property name.
    pub property: String,
    /// Allowed values.
    pub allowed: Vec<String>,
}

/// Contract for one node label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelContract {
    /// The label, e.g. `Entity`.
    pub label: String,
    /// Properties every node with this label must carry.
    #[serde(default)]
    pub required_properties: Vec<String>,
    /// Enumerated properties on this label.
    #[serde(default)]
    pub enumerated: Vec<EnumeratedProperty>,
    /// Property tuple that must be unique across nodes with this label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<Vec<String>>,
    /// Whether at least one node with this label must exist. Most IR
    /// labels are legitimately absent on an empty graph; the version
    /// singleton is not.
    #[serde(default)]
    pub required: bool,
}

impl LabelContract {
    /// A label with required properties and no further constraints.
    #[must_use]
    pub fn new(label: &str, required: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            required_properties: required.iter().map(|p| (*p).to_string()).collect(),
            enumerated: Vec::new(),
            unique_key: None,
            required: false,
        }
    }

    /// Require at least one node with this label to exist.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict a property to an enumerated set.
    #[must_use]
    pub fn with_enum(mut self, property: &str, allowed: &[&str]) -> Self {
        self.enumerated.push(EnumeratedProperty {
            property: property.to_string(),
            allowed: allowed.iter().map(|v| (*v).to_string()).collect(),
        });
        self
    }

    /// Declare the unique key tuple for this label.
    #[must_use]
    pub fn with_unique_key(mut self, key: &[&str]) -> Self {
        self.unique_key = Some(key.iter().map(|p| (*p).to_string()).collect());
        self
    }
}

/// Contract for one relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipContract {
    /// Relationship type, e.g. `HAS_ENTITY`.
    pub rel_type: String,
    /// Label of the start node.
    pub from: String,
    /// Label of the end node.
    pub to: String,
    /// Children-per-parent bounds.
    pub cardinality: CardinalityBounds,
    /// Properties every edge of this type must carry.
    #[serde(default)]
    pub required_properties: Vec<String>,
    /// Enumerated properties on this relationship.
    #[serde(default)]
    pub enumerated: Vec<EnumeratedProperty>,
}

impl RelationshipContract {
    /// A relationship with the given endpoints and bounds.
    #[must_use]
    pub fn new(rel_type: &str, from: &str, to: &str, cardinality: CardinalityBounds) -> Self {
        Self {
            rel_type: rel_type.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            cardinality,
            required_properties: Vec::new(),
            enumerated: Vec::new(),
        }
    }

    /// Restrict an edge property to an enumerated set.
    #[must_use]
    pub fn with_enum(mut self, property: &str, allowed: &[&str]) -> Self {
        self.enumerated.push(EnumeratedProperty {
            property: property.to_string(),
            allowed: allowed.iter().map(|v| (*v).to_string()).collect(),
        });
        self
    }
}

/// Expected result of a named validation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryExpectation {
    /// The query must return no rows.
    ZeroRows,
    /// The query must return a single `count` column with this value.
    Count(i64),
}

/// A named Cypher assertion run as part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationQuery {
    /// Assertion name for reports.
    pub name: String,
    /// The Cypher statement. Violating rows should return an `id` column so
    /// the report can carry bounded samples.
    pub cypher: String,
    /// Expected result.
    pub expect: QueryExpectation,
}

/// A complete shape contract for one schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeContract {
    /// Contract identifier, e.g. `ir_core_v1`.
    pub contract_id: String,
    /// Schema version this contract belongs to.
    pub schema_version: i64,
    /// Per-label contracts. Labels present in the graph but absent here
    /// (and in `auxiliary_labels`) are reported as undocumented.
    pub labels: Vec<LabelContract>,
    /// Per-relationship contracts.
    pub relationships: Vec<RelationshipContract>,
    /// Labels that are allowed but carry no constraints of their own.
    #[serde(default)]
    pub auxiliary_labels: Vec<String>,
    /// Named validation queries.
    #[serde(default)]
    pub queries: Vec<ValidationQuery>,
}

impl ShapeContract {
    /// Parse a contract authored in YAML.
    pub fn from_yaml(source: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(source)
    }

    /// Render this contract as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(self)
    }

    /// All labels the contract documents, contracted or auxiliary.
    #[must_use]
    pub fn documented_labels(&self) -> Vec<&str> {
        self.labels
            .iter()
            .map(|l| l.label.as_str())
            .chain(self.auxiliary_labels.iter().map(String::as_str))
            .collect()
    }

    /// Look up the contract for a label.
    #[must_use]
    pub fn label(&self, label: &str) -> Option<&LabelContract> {
        self.labels.iter().find(|l| l.label == label)
    }
}

/// Categories of contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// A relationship count fell outside its declared bounds.
    CardinalityViolation,
    /// A contracted label has no nodes at all.
    MissingLabel,
    /// A label exists in the graph but not in the contract.
    UndocumentedLabel,
    /// Nodes are missing a required property.
    MissingRequiredProperty,
    /// A relationship carries an invalid property value.
    InvalidRelationshipProperty,
    /// A named validation query did not return its expected result.
    QueryAssertionFailed,
}

/// One violation found by the contract runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Category of the violation.
    pub kind: ViolationKind,
    /// Label or relationship type involved.
    pub subject: String,
    /// Human-readable description.
    pub detail: String,
    /// Bounded sample of offending node/edge identifiers.
    #[serde(default)]
    pub samples: Vec<String>,
}

/// Outcome of running a contract against the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractReport {
    /// The contract that was run.
    pub contract_id: String,
    /// Schema version the contract belongs to.
    pub schema_version: i64,
    /// Violations found; empty means the contract passed.
    pub violations: Vec<Violation>,
}

impl ContractReport {
    /// Whether the graph satisfied the contract.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Maximum offending samples carried per violation.
pub const MAX_VIOLATION_SAMPLES: usize = 10;

/// The shape contract for schema version 1: the full IR model.
#[must_use]
pub fn ir_core_v1() -> ShapeContract {
    let temporal = ["created_at", "updated_at", "updated_by"];
    let with_temporal = |mut required: Vec<&'static str>| -> Vec<&'static str> {
        required.extend(temporal);
        required
    };
    ShapeContract {
        contract_id: "ir_core_v1".to_string(),
        schema_version: 1,
        labels: vec![
            LabelContract::new(
                "ApplicationIR",
                &with_temporal(vec!["app_id", "name", "version", "spec_hash"]),
            )
            .with_unique_key(&["app_id"]),
            LabelContract::new("DomainModelIR", &with_temporal(vec!["domain_model_id"]))
                .with_unique_key(&["domain_model_id"]),
            LabelContract::new("APIModelIR", &with_temporal(vec!["api_model_id"]))
                .with_unique_key(&["api_model_id"]),
            LabelContract::new("BehaviorModelIR", &with_temporal(vec!["behavior_model_id"])),
            LabelContract::new(
                "ValidationModelIR",
                &with_temporal(vec!["validation_model_id"]),
            ),
            LabelContract::new(
                "InfrastructureModelIR",
                &with_temporal(vec!["infrastructure_model_id"]),
            ),
            LabelContract::new("TestsModelIR", &with_temporal(vec!["tests_model_id"])),
            LabelContract::new("Entity", &with_temporal(vec!["entity_id", "name"]))
                .with_unique_key(&["entity_id"]),
            LabelContract::new(
                "Attribute",
                &with_temporal(vec!["attribute_id", "name", "data_type"]),
            )
            .with_unique_key(&["attribute_id"]),
            LabelContract::new(
                "Endpoint",
                &with_temporal(vec!["endpoint_id", "path", "method"]),
            )
            .with_enum("method", &["GET", "POST", "PUT", "PATCH", "DELETE"])
            .with_unique_key(&["endpoint_id"]),
            LabelContract::new("APIParameter", &with_temporal(vec!["name", "location"]))
                .with_enum("location", &["path", "query", "header", "body"]),
            LabelContract::new("APISchema", &with_temporal(vec!["schema_id", "name", "source"]))
                .with_enum("source", &["openapi", "inferred", "crud_pattern", "manual"])
                .with_unique_key(&["schema_id"]),
            LabelContract::new("APISchemaField", &with_temporal(vec!["name", "type"])),
            LabelContract::new("Flow", &with_temporal(vec!["flow_id", "name"])),
            LabelContract::new("Step", &with_temporal(vec!["step_id", "order", "action"])),
            LabelContract::new(
                "Invariant",
                &with_temporal(vec!["invariant_id", "entity", "expression"]),
            ),
            LabelContract::new(
                "ValidationRule",
                &with_temporal(vec!["rule_id", "entity", "attribute", "type", "condition"]),
            ),
            LabelContract::new(
                "EnforcementStrategy",
                &with_temporal(vec!["strategy_id", "type"]),
            ),
            LabelContract::new("DatabaseConfig", &with_temporal(vec!["config_id", "engine"])),
            LabelContract::new(
                "ContainerService",
                &with_temporal(vec!["service_id", "name", "image"]),
            ),
            LabelContract::new("ObservabilityConfig", &with_temporal(vec!["config_id"])),
            LabelContract::new(
                "SeedEntityIR",
                &with_temporal(vec!["seed_id", "entity_name", "count"]),
            )
            .with_unique_key(&["seed_id"]),
            LabelContract::new(
                "EndpointTestSuite",
                &with_temporal(vec!["suite_id", "endpoint_path", "http_method"]),
            ),
            LabelContract::new("FlowTestSuite", &with_temporal(vec!["suite_id", "name"])),
            LabelContract::new(
                "TestScenarioIR",
                &with_temporal(vec!["scenario_id", "name", "http_method"]),
            ),
            LabelContract::new(
                "GraphSchemaVersion",
                &["singleton", "current_version"],
            )
            .required(),
            LabelContract::new(
                "MigrationRun",
                &["migration_id", "migration_name", "status", "started_at"],
            )
            .with_enum(
                "status",
                &["running", "completed", "failed", "rolled_back", "dry_run"],
            ),
            LabelContract::new("MigrationCheckpoint", &["batch", "records_processed"]),
        ],
        relationships: vec![
            RelationshipContract::new(
                "HAS_DOMAIN_MODEL",
                "ApplicationIR",
                "DomainModelIR",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_API_MODEL",
                "ApplicationIR",
                "APIModelIR",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_BEHAVIOR_MODEL",
                "ApplicationIR",
                "BehaviorModelIR",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_VALIDATION_MODEL",
                "ApplicationIR",
                "ValidationModelIR",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_INFRASTRUCTURE_MODEL",
                "ApplicationIR",
                "InfrastructureModelIR",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_TESTS_MODEL",
                "ApplicationIR",
                "TestsModelIR",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_ENTITY",
                "DomainModelIR",
                "Entity",
                CardinalityBounds::at_least_one(),
            ),
            RelationshipContract::new(
                "HAS_ATTRIBUTE",
                "Entity",
                "Attribute",
                CardinalityBounds::at_least_one(),
            ),
            RelationshipContract::new(
                "RELATES_TO",
                "Entity",
                "Entity",
                CardinalityBounds::any(),
            )
            .with_enum("type", &["one_to_one", "one_to_many", "many_to_many"]),
            RelationshipContract::new(
                "HAS_ENDPOINT",
                "APIModelIR",
                "Endpoint",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_PARAMETER",
                "Endpoint",
                "APIParameter",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "REQUEST_SCHEMA",
                "Endpoint",
                "APISchema",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "RESPONSE_SCHEMA",
                "Endpoint",
                "APISchema",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_SCHEMA",
                "APIModelIR",
                "APISchema",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_FIELD",
                "APISchema",
                "APISchemaField",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "TARGETS_ENTITY",
                "Endpoint",
                "Entity",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "USES_FIELD",
                "Endpoint",
                "Attribute",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_FLOW",
                "BehaviorModelIR",
                "Flow",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_INVARIANT",
                "BehaviorModelIR",
                "Invariant",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new("HAS_STEP", "Flow", "Step", CardinalityBounds::any()),
            RelationshipContract::new(
                "HAS_RULE",
                "ValidationModelIR",
                "ValidationRule",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_STRATEGY",
                "ValidationModelIR",
                "EnforcementStrategy",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_DATABASE_CONFIG",
                "InfrastructureModelIR",
                "DatabaseConfig",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "HAS_SERVICE",
                "InfrastructureModelIR",
                "ContainerService",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_OBSERVABILITY_CONFIG",
                "InfrastructureModelIR",
                "ObservabilityConfig",
                CardinalityBounds::at_most_one(),
            ),
            RelationshipContract::new(
                "DEPENDS_ON",
                "ContainerService",
                "ContainerService",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_SEED_ENTITY",
                "TestsModelIR",
                "SeedEntityIR",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "DEPENDS_ON_SEED",
                "SeedEntityIR",
                "SeedEntityIR",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_ENDPOINT_SUITE",
                "TestsModelIR",
                "EndpointTestSuite",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_FLOW_SUITE",
                "TestsModelIR",
                "FlowTestSuite",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_SCENARIO",
                "EndpointTestSuite",
                "TestScenarioIR",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_SCENARIO",
                "FlowTestSuite",
                "TestScenarioIR",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "VALIDATES_ENDPOINT",
                "TestScenarioIR",
                "Endpoint",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "VALIDATES_FLOW",
                "TestScenarioIR",
                "Flow",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "VALIDATES_RULE",
                "TestScenarioIR",
                "ValidationRule",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "AFFECTED",
                "MigrationRun",
                "ApplicationIR",
                CardinalityBounds::any(),
            ),
            RelationshipContract::new(
                "HAS_CHECKPOINT",
                "MigrationRun",
                "MigrationCheckpoint",
                CardinalityBounds::any(),
            ),
        ],
        auxiliary_labels: vec![
            "Spec".to_string(),
            "GeneratedFile".to_string(),
            "Pattern".to_string(),
            "GenerationError".to_string(),
            "TestExecutionIR".to_string(),
            "HealthCheckResult".to_string(),
            "StaleLockCleared".to_string(),
        ],
        queries: vec![
            ValidationQuery {
                name: "singleton_is_unique".to_string(),
                cypher: "MATCH (v:GraphSchemaVersion {singleton: true}) RETURN count(v) AS count"
                    .to_string(),
                expect: QueryExpectation::Count(1),
            },
            ValidationQuery {
                name: "entities_have_attributes".to_string(),
                cypher: "MATCH (e:Entity) WHERE NOT (e)-[:HAS_ATTRIBUTE]->(:Attribute) \
                         RETURN e.entity_id AS id"
                    .to_string(),
                expect: QueryExpectation::ZeroRows,
            },
            ValidationQuery {
                name: "updated_at_not_before_created_at".to_string(),
                cypher: "MATCH (n) WHERE n.created_at IS NOT NULL \
                         AND n.updated_at < n.created_at RETURN n.created_at AS id LIMIT 25"
                    .to_string(),
                expect: QueryExpectation::ZeroRows,
            },
        ],
    }
}

/// Look up the contract shipped for a schema version.
#[must_use]
pub fn contract_for_version(schema_version: i64) -> Option<ShapeContract> {
    match schema_version {
        // The temporal backfill (version 2) leaves the shape unchanged.
        1 | 2 => Some(ir_core_v1()),
        _ => None,
    }
}
