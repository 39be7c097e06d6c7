//! Shared fixtures: a populated application tree and a simulated loader
//! record — the row the breadth query would produce for that tree once the
//! repositories have persisted it.

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use specgraph::ir::{
    ApiModelIr, ApiParameter, ApiSchema, ApiSchemaField, ApplicationIr, Attribute,
    BehaviorModelIr, ContainerService, DomainModelIr, Endpoint, Entity, EntityRelation,
    EntityTarget, Flow, HttpMethod, Invariant, ParameterLocation, RelationKind, SchemaSource,
    SeedEntity, Step, TestScenario, TestsModelIr, ValidationModelIr, ValidationRule,
};
use specgraph::ir::{EndpointTestSuite, FlowTestSuite};
use specgraph_neo4j::JsonMap;

/// A fully populated canonical application tree.
pub fn sample_application() -> ApplicationIr {
    let mut app = ApplicationIr::new("A1", "shop", "1.0.0", "sha256:abc");

    let mut domain = DomainModelIr::default();
    let mut product = Entity::new("Product", "a product for sale", true);
    product.attributes.push(Attribute::new("name", "string"));
    let mut price = Attribute::new("price", "decimal");
    price
        .constraints
        .insert("min".to_string(), json!(0));
    product.attributes.push(price);
    let mut order = Entity::new("Order", "an order", true);
    order.attributes.push(Attribute::new("total", "decimal"));
    domain.entities.push(product);
    domain.entities.push(order);
    domain.relations.push(EntityRelation {
        source: "Order".to_string(),
        target: "Product".to_string(),
        kind: RelationKind::OneToMany,
        field_name: "items".to_string(),
        back_populates: Some("order".to_string()),
    });
    app.domain = Some(domain);

    let mut api = ApiModelIr::default();
    let mut get = Endpoint::new(HttpMethod::Get, "/products/{id}", "get_product");
    get.parameters.push(ApiParameter {
        name: "id".to_string(),
        location: ParameterLocation::Path,
        data_type: "string".to_string(),
        required: true,
    });
    get.response_schema = Some("ProductOut".to_string());
    get.targets.push(EntityTarget {
        entity: "Product".to_string(),
        confidence: 0.9,
        inferred: true,
    });
    get.uses_fields
        .push(("Product".to_string(), "name".to_string()));
    api.endpoints.push(get);
    let mut schema = ApiSchema::new("ProductOut", SchemaSource::Openapi);
    schema.fields.push(ApiSchemaField {
        name: "name".to_string(),
        field_type: "string".to_string(),
        required: true,
    });
    api.schemas.push(schema);
    app.api = Some(api);

    let mut behavior = BehaviorModelIr::default();
    let mut checkout = Flow::new("checkout", "user_journey", "POST /checkout");
    checkout.steps.push(Step::new(1, "reserve_stock", "Product"));
    checkout.steps.push(Step::new(2, "charge_card", "Order"));
    behavior.flows.push(checkout);
    behavior.invariants.push(Invariant {
        invariant_id: String::new(),
        entity: "Order".to_string(),
        description: "totals never negative".to_string(),
        expression: "total >= 0".to_string(),
        enforcement_level: "strict".to_string(),
    });
    app.behavior = Some(behavior);

    let mut validation = ValidationModelIr::default();
    validation.rules.push(ValidationRule {
        rule_id: String::new(),
        entity: "Product".to_string(),
        attribute: "price".to_string(),
        kind: "range".to_string(),
        condition: "price >= 0".to_string(),
        severity: "error".to_string(),
        enforcement_type: "database".to_string(),
    });
    app.validation = Some(validation);

    let mut infrastructure = specgraph::ir::InfrastructureModelIr::default();
    infrastructure.services.push(ContainerService {
        service_id: String::new(),
        name: "api".to_string(),
        image: "shop-api:latest".to_string(),
        ports: vec![8080],
        environment: Map::new(),
        depends_on: vec![],
    });
    app.infrastructure = Some(infrastructure);

    let mut tests = TestsModelIr::default();
    let mut product_seed = SeedEntity::new("Product", "products", 10);
    product_seed.dependencies.push("Category".to_string());
    tests.seeds.push(product_seed);
    tests.seeds.push(SeedEntity::new("Category", "categories", 3));
    let mut scenario = TestScenario::new("returns a product", HttpMethod::Get, "/products/{id}");
    scenario
        .path_params
        .insert("id".to_string(), json!("seed-1"));
    scenario.expected_status_code = 200;
    tests.endpoint_suites.push(EndpointTestSuite {
        suite_id: String::new(),
        endpoint_path: "/products/{id}".to_string(),
        http_method: HttpMethod::Get,
        operation_id: "get_product".to_string(),
        scenarios: vec![scenario],
    });
    tests.flow_suites.push(FlowTestSuite {
        suite_id: String::new(),
        name: "checkout".to_string(),
        scenarios: vec![],
    });
    app.tests = Some(tests);

    app.canonicalize();
    app
}

fn packed(value: &Value) -> Value {
    Value::String(value.to_string())
}

/// The single loader record the breadth query would return for `app`
/// after a save: node property maps (temporal metadata included) plus the
/// parent keys the loader groups by.
pub fn loader_record(app: &ApplicationIr) -> JsonMap {
    let mut record = JsonMap::new();
    record.insert(
        "application".to_string(),
        json!({
            "app_id": app.app_id, "name": app.name, "version": app.version,
            "spec_hash": app.spec_hash,
            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
        }),
    );

    if let Some(domain) = &app.domain {
        record.insert(
            "domain_model".to_string(),
            json!({"domain_model_id": domain.domain_model_id,
                   "created_at": 1, "updated_at": 1, "updated_by": "pipeline"}),
        );
        record.insert(
            "entities".to_string(),
            Value::Array(
                domain
                    .entities
                    .iter()
                    .map(|entity| {
                        json!({
                            "entity_id": entity.entity_id, "name": entity.name,
                            "description": entity.description,
                            "is_aggregate_root": entity.is_aggregate_root,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "attributes".to_string(),
            Value::Array(
                domain
                    .entities
                    .iter()
                    .flat_map(|entity| {
                        entity.attributes.iter().map(|attribute| {
                            json!({
                                "attribute_id": attribute.attribute_id,
                                "entity_id": entity.entity_id,
                                "name": attribute.name,
                                "data_type": attribute.data_type,
                                "is_primary_key": attribute.is_primary_key,
                                "is_nullable": attribute.is_nullable,
                                "is_unique": attribute.is_unique,
                                "default_value": attribute.default_value,
                                "constraints":
                                    packed(&Value::Object(attribute.constraints.clone())),
                                "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                            })
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "relations".to_string(),
            Value::Array(
                domain
                    .relations
                    .iter()
                    .map(|relation| {
                        json!({
                            "source": relation.source, "target": relation.target,
                            "type": relation.kind.as_str(),
                            "field_name": relation.field_name,
                            "back_populates": relation.back_populates
                        })
                    })
                    .collect(),
            ),
        );
    }

    if let Some(api) = &app.api {
        record.insert(
            "api_model".to_string(),
            json!({"api_model_id": api.api_model_id,
                   "created_at": 1, "updated_at": 1, "updated_by": "pipeline"}),
        );
        record.insert(
            "endpoints".to_string(),
            Value::Array(
                api.endpoints
                    .iter()
                    .map(|endpoint| {
                        json!({
                            "endpoint_id": endpoint.endpoint_id, "path": endpoint.path,
                            "method": endpoint.method.as_str(),
                            "operation_id": endpoint.operation_id,
                            "auth_required": endpoint.auth_required,
                            "inferred": endpoint.inferred,
                            "inference_source": endpoint.inference_source,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "parameters".to_string(),
            Value::Array(
                api.endpoints
                    .iter()
                    .flat_map(|endpoint| {
                        endpoint.parameters.iter().map(|parameter| {
                            json!({
                                "endpoint_id": endpoint.endpoint_id,
                                "name": parameter.name,
                                "location": parameter.location.as_str(),
                                "data_type": parameter.data_type,
                                "required": parameter.required,
                                "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                            })
                        })
                    })
                    .collect(),
            ),
        );
        let mut bindings = Vec::new();
        for endpoint in &api.endpoints {
            if let Some(schema) = &endpoint.request_schema {
                bindings.push(json!({"endpoint_id": endpoint.endpoint_id,
                                     "schema_name": schema, "kind": "REQUEST_SCHEMA"}));
            }
            if let Some(schema) = &endpoint.response_schema {
                bindings.push(json!({"endpoint_id": endpoint.endpoint_id,
                                     "schema_name": schema, "kind": "RESPONSE_SCHEMA"}));
            }
        }
        record.insert("schema_bindings".to_string(), Value::Array(bindings));
        record.insert(
            "endpoint_targets".to_string(),
            Value::Array(
                api.endpoints
                    .iter()
                    .flat_map(|endpoint| {
                        endpoint.targets.iter().map(|target| {
                            json!({
                                "endpoint_id": endpoint.endpoint_id,
                                "entity": target.entity,
                                "confidence": target.confidence,
                                "inferred": target.inferred
                            })
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "endpoint_fields".to_string(),
            Value::Array(
                api.endpoints
                    .iter()
                    .flat_map(|endpoint| {
                        endpoint.uses_fields.iter().map(|(entity, attribute)| {
                            json!({
                                "endpoint_id": endpoint.endpoint_id,
                                "entity": entity, "attribute": attribute
                            })
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "schemas".to_string(),
            Value::Array(
                api.schemas
                    .iter()
                    .map(|schema| {
                        json!({
                            "schema_id": schema.schema_id, "name": schema.name,
                            "source": schema.source.as_str(),
                            "source_metadata": schema.source_metadata.as_ref()
                                .map(|m| packed(&Value::Object(m.clone()))),
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "schema_fields".to_string(),
            Value::Array(
                api.schemas
                    .iter()
                    .flat_map(|schema| {
                        schema.fields.iter().map(|field| {
                            json!({
                                "schema_id": schema.schema_id,
                                "name": field.name, "type": field.field_type,
                                "required": field.required,
                                "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                            })
                        })
                    })
                    .collect(),
            ),
        );
    }

    if let Some(behavior) = &app.behavior {
        record.insert(
            "behavior_model".to_string(),
            json!({"behavior_model_id": behavior.behavior_model_id,
                   "created_at": 1, "updated_at": 1, "updated_by": "pipeline"}),
        );
        record.insert(
            "flows".to_string(),
            Value::Array(
                behavior
                    .flows
                    .iter()
                    .map(|flow| {
                        json!({
                            "flow_id": flow.flow_id, "name": flow.name,
                            "type": flow.kind, "trigger": flow.trigger,
                            "description": flow.description,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "steps".to_string(),
            Value::Array(
                behavior
                    .flows
                    .iter()
                    .flat_map(|flow| {
                        flow.steps.iter().map(|step| {
                            json!({
                                "flow_id": flow.flow_id, "step_id": step.step_id,
                                "order": step.order, "action": step.action,
                                "target_entity": step.target_entity,
                                "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                            })
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "invariants".to_string(),
            Value::Array(
                behavior
                    .invariants
                    .iter()
                    .map(|invariant| {
                        json!({
                            "invariant_id": invariant.invariant_id,
                            "entity": invariant.entity,
                            "description": invariant.description,
                            "expression": invariant.expression,
                            "enforcement_level": invariant.enforcement_level,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
    }

    if let Some(validation) = &app.validation {
        record.insert(
            "validation_model".to_string(),
            json!({"validation_model_id": validation.validation_model_id,
                   "created_at": 1, "updated_at": 1, "updated_by": "pipeline"}),
        );
        record.insert(
            "rules".to_string(),
            Value::Array(
                validation
                    .rules
                    .iter()
                    .map(|rule| {
                        json!({
                            "rule_id": rule.rule_id, "entity": rule.entity,
                            "attribute": rule.attribute, "type": rule.kind,
                            "condition": rule.condition, "severity": rule.severity,
                            "enforcement_type": rule.enforcement_type,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "strategies".to_string(),
            Value::Array(
                validation
                    .strategies
                    .iter()
                    .map(|strategy| {
                        json!({
                            "strategy_id": strategy.strategy_id, "type": strategy.kind,
                            "implementation": strategy.implementation,
                            "applied_at": strategy.applied_at,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
    }

    if let Some(infrastructure) = &app.infrastructure {
        record.insert(
            "infrastructure_model".to_string(),
            json!({"infrastructure_model_id": infrastructure.infrastructure_model_id,
                   "created_at": 1, "updated_at": 1, "updated_by": "pipeline"}),
        );
        record.insert(
            "database_configs".to_string(),
            Value::Array(
                infrastructure
                    .database
                    .iter()
                    .map(|database| {
                        json!({
                            "config_id": database.config_id, "engine": database.engine,
                            "version": database.version, "host": database.host,
                            "port": database.port, "database_name": database.database_name,
                            "options": packed(&Value::Object(database.options.clone())),
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "services".to_string(),
            Value::Array(
                infrastructure
                    .services
                    .iter()
                    .map(|service| {
                        json!({
                            "service_id": service.service_id, "name": service.name,
                            "image": service.image, "ports": service.ports,
                            "environment": packed(&Value::Object(service.environment.clone())),
                            "depends_on": service.depends_on,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "observability_configs".to_string(),
            Value::Array(
                infrastructure
                    .observability
                    .iter()
                    .map(|observability| {
                        json!({
                            "config_id": observability.config_id,
                            "logging_level": observability.logging_level,
                            "metrics_enabled": observability.metrics_enabled,
                            "tracing_enabled": observability.tracing_enabled,
                            "options": packed(&Value::Object(observability.options.clone())),
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
    }

    if let Some(tests) = &app.tests {
        record.insert(
            "tests_model".to_string(),
            json!({"tests_model_id": tests.tests_model_id,
                   "created_at": 1, "updated_at": 1, "updated_by": "pipeline"}),
        );
        record.insert(
            "seeds".to_string(),
            Value::Array(
                tests
                    .seeds
                    .iter()
                    .map(|seed| {
                        json!({
                            "seed_id": seed.seed_id, "entity_name": seed.entity_name,
                            "table_name": seed.table_name, "count": seed.count,
                            "dependencies": seed.dependencies,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "endpoint_suites".to_string(),
            Value::Array(
                tests
                    .endpoint_suites
                    .iter()
                    .map(|suite| {
                        json!({
                            "suite_id": suite.suite_id,
                            "endpoint_path": suite.endpoint_path,
                            "http_method": suite.http_method.as_str(),
                            "operation_id": suite.operation_id,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        record.insert(
            "flow_suites".to_string(),
            Value::Array(
                tests
                    .flow_suites
                    .iter()
                    .map(|suite| {
                        json!({
                            "suite_id": suite.suite_id, "name": suite.name,
                            "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
                        })
                    })
                    .collect(),
            ),
        );
        let mut scenarios = Vec::new();
        for (suite_id, scenario) in tests
            .endpoint_suites
            .iter()
            .flat_map(|suite| suite.scenarios.iter().map(move |s| (&suite.suite_id, s)))
            .chain(
                tests
                    .flow_suites
                    .iter()
                    .flat_map(|suite| suite.scenarios.iter().map(move |s| (&suite.suite_id, s))),
            )
        {
            scenarios.push(scenario_record(suite_id, scenario));
        }
        record.insert("scenarios".to_string(), Value::Array(scenarios));
    }

    record
}

fn scenario_record(suite_id: &str, scenario: &TestScenario) -> Value {
    json!({
        "suite_id": suite_id,
        "scenario_id": scenario.scenario_id,
        "name": scenario.name,
        "endpoint_path": scenario.endpoint_path,
        "http_method": scenario.http_method.as_str(),
        "test_type": scenario.test_type,
        "priority": scenario.priority,
        "path_params": packed(&Value::Object(scenario.path_params.clone())),
        "query_params": packed(&Value::Object(scenario.query_params.clone())),
        "headers": packed(&Value::Object(scenario.headers.clone())),
        "request_body": scenario.request_body.as_ref().map(packed),
        "expected_outcome": scenario.expected_outcome,
        "expected_status_code": scenario.expected_status_code,
        "requires_auth": scenario.requires_auth,
        "source_endpoint_id": scenario.source_endpoint_id,
        "validates_flows": scenario.validates_flows,
        "validates_rules": scenario.validates_rules,
        "created_at": 1, "updated_at": 1, "updated_by": "pipeline"
    })
}
