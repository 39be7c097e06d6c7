//! # Full IR Loader
//!
//! Materializes a complete `ApplicationIr` in one round trip: a single
//! breadth-covering statement built from `CALL { ... }` collection
//! subqueries, so every collection is read from the same engine snapshot.
//! Assembly groups children by parent identifier and re-canonicalizes, so
//! a loaded tree is equal to the canonical tree that was saved.
//!
//! An optional in-process cache serves snapshots keyed by `app_id`. Every
//! successful write path through the store facade invalidates the entry;
//! a conservative TTL (default one hour) is the fallback for writes the
//! process did not see.

use crate::engine::GraphEngine;
use crate::statement::{JsonMap, Statement};
use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use specgraph::error::{LoaderError, StoreResult};
use specgraph::ir::validate::validate_application;
use specgraph::ir::{
    ApiModelIr, ApplicationIr, BehaviorModelIr, DomainModelIr, EndpointTestSuite, EntityTarget,
    FlowTestSuite, InfrastructureModelIr, TestsModelIr, ValidationModelIr,
};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default snapshot TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cached snapshots held per process.
const CACHE_CAPACITY: usize = 64;

struct CacheEntry {
    ir: Arc<ApplicationIr>,
    inserted_at: Instant,
}

/// Loader with an in-process LRU+TTL snapshot cache.
pub struct IrLoader {
    engine: Arc<dyn GraphEngine>,
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl IrLoader {
    /// A loader over the given engine with the given snapshot TTL.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            engine,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Load the full IR for `app_id`, serving a cached snapshot when one
    /// is fresh.
    pub async fn load(&self, app_id: &str) -> StoreResult<Arc<ApplicationIr>> {
        if let Some(entry) = self.cache.lock().get(app_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                trace!("ir snapshot cache hit for {app_id}");
                return Ok(Arc::clone(&entry.ir));
            }
        }
        let ir = Arc::new(self.load_uncached(app_id).await?);
        self.cache.lock().put(
            app_id.to_string(),
            CacheEntry {
                ir: Arc::clone(&ir),
                inserted_at: Instant::now(),
            },
        );
        Ok(ir)
    }

    /// Load the full IR for `app_id`, bypassing the cache.
    pub async fn load_uncached(&self, app_id: &str) -> StoreResult<ApplicationIr> {
        let records = self.engine.execute(Self::statement(app_id)).await?;
        let Some(record) = records.into_iter().next() else {
            return Err(LoaderError::NotFound {
                app_id: app_id.to_string(),
            }
            .into());
        };
        let ir = assemble(app_id, &record)?;
        debug!("loaded ir snapshot for {app_id}");
        Ok(ir)
    }

    /// Drop the cached snapshot for `app_id`. Called by every successful
    /// write path.
    pub fn invalidate(&self, app_id: &str) {
        if self.cache.lock().pop(app_id).is_some() {
            trace!("ir snapshot cache invalidated for {app_id}");
        }
    }

    /// The single breadth-covering load statement.
    #[must_use]
    pub fn statement(app_id: &str) -> Statement {
        Statement::new(LOAD_QUERY)
            .param("app_id", app_id)
            .returning(&[
                "application",
                "domain_model",
                "entities",
                "attributes",
                "relations",
                "api_model",
                "endpoints",
                "parameters",
                "schema_bindings",
                "endpoint_targets",
                "endpoint_fields",
                "schemas",
                "schema_fields",
                "behavior_model",
                "flows",
                "steps",
                "invariants",
                "validation_model",
                "rules",
                "strategies",
                "infrastructure_model",
                "database_configs",
                "services",
                "observability_configs",
                "tests_model",
                "seeds",
                "endpoint_suites",
                "flow_suites",
                "scenarios",
            ])
            .idempotent()
    }
}

const LOAD_QUERY: &str = "\
MATCH (app:ApplicationIR {app_id: $app_id}) \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_DOMAIN_MODEL]->(m:DomainModelIR) \
  RETURN head(collect(m {.*})) AS domain_model } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_DOMAIN_MODEL]->(:DomainModelIR)-[:HAS_ENTITY]->(e:Entity) \
  RETURN collect(e {.*}) AS entities } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_DOMAIN_MODEL]->(:DomainModelIR)-[:HAS_ENTITY]->(e:Entity)-[:HAS_ATTRIBUTE]->(a:Attribute) \
  RETURN collect(a {.*, entity_id: e.entity_id}) AS attributes } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_DOMAIN_MODEL]->(:DomainModelIR)-[:HAS_ENTITY]->(s:Entity)-[r:RELATES_TO]->(t:Entity) \
  RETURN collect({source: s.name, target: t.name, type: r.type, field_name: r.field_name, back_populates: r.back_populates}) AS relations } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(m:APIModelIR) \
  RETURN head(collect(m {.*})) AS api_model } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(:APIModelIR)-[:HAS_ENDPOINT]->(e:Endpoint) \
  RETURN collect(e {.*}) AS endpoints } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(:APIModelIR)-[:HAS_ENDPOINT]->(e:Endpoint)-[:HAS_PARAMETER]->(p:APIParameter) \
  RETURN collect(p {.*, endpoint_id: e.endpoint_id}) AS parameters } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(:APIModelIR)-[:HAS_ENDPOINT]->(e:Endpoint)-[b:REQUEST_SCHEMA|RESPONSE_SCHEMA]->(s:APISchema) \
  RETURN collect({endpoint_id: e.endpoint_id, schema_name: s.name, kind: type(b)}) AS schema_bindings } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(:APIModelIR)-[:HAS_ENDPOINT]->(e:Endpoint)-[r:TARGETS_ENTITY]->(t:Entity) \
  RETURN collect({endpoint_id: e.endpoint_id, entity: t.name, confidence: r.confidence, inferred: r.inferred}) AS endpoint_targets } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(:APIModelIR)-[:HAS_ENDPOINT]->(e:Endpoint)-[:USES_FIELD]->(a:Attribute)<-[:HAS_ATTRIBUTE]-(ae:Entity) \
  RETURN collect({endpoint_id: e.endpoint_id, entity: ae.name, attribute: a.name}) AS endpoint_fields } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(:APIModelIR)-[:HAS_SCHEMA]->(s:APISchema) \
  RETURN collect(s {.*}) AS schemas } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_API_MODEL]->(:APIModelIR)-[:HAS_SCHEMA]->(s:APISchema)-[:HAS_FIELD]->(f:APISchemaField) \
  RETURN collect(f {.*, schema_id: s.schema_id}) AS schema_fields } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_BEHAVIOR_MODEL]->(m:BehaviorModelIR) \
  RETURN head(collect(m {.*})) AS behavior_model } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_BEHAVIOR_MODEL]->(:BehaviorModelIR)-[:HAS_FLOW]->(f:Flow) \
  RETURN collect(f {.*}) AS flows } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_BEHAVIOR_MODEL]->(:BehaviorModelIR)-[:HAS_FLOW]->(f:Flow)-[:HAS_STEP]->(s:Step) \
  RETURN collect(s {.*, flow_id: f.flow_id}) AS steps } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_BEHAVIOR_MODEL]->(:BehaviorModelIR)-[:HAS_INVARIANT]->(i:Invariant) \
  RETURN collect(i {.*}) AS invariants } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_VALIDATION_MODEL]->(m:ValidationModelIR) \
  RETURN head(collect(m {.*})) AS validation_model } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_VALIDATION_MODEL]->(:ValidationModelIR)-[:HAS_RULE]->(r:ValidationRule) \
  RETURN collect(r {.*}) AS rules } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_VALIDATION_MODEL]->(:ValidationModelIR)-[:HAS_STRATEGY]->(s:EnforcementStrategy) \
  RETURN collect(s {.*}) AS strategies } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_INFRASTRUCTURE_MODEL]->(m:InfrastructureModelIR) \
  RETURN head(collect(m {.*})) AS infrastructure_model } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_INFRASTRUCTURE_MODEL]->(:InfrastructureModelIR)-[:HAS_DATABASE_CONFIG]->(d:DatabaseConfig) \
  RETURN collect(d {.*}) AS database_configs } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_INFRASTRUCTURE_MODEL]->(:InfrastructureModelIR)-[:HAS_SERVICE]->(s:ContainerService) \
  RETURN collect(s {.*}) AS services } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_INFRASTRUCTURE_MODEL]->(:InfrastructureModelIR)-[:HAS_OBSERVABILITY_CONFIG]->(o:ObservabilityConfig) \
  RETURN collect(o {.*}) AS observability_configs } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_TESTS_MODEL]->(m:TestsModelIR) \
  RETURN head(collect(m {.*})) AS tests_model } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_TESTS_MODEL]->(:TestsModelIR)-[:HAS_SEED_ENTITY]->(s:SeedEntityIR) \
  RETURN collect(s {.*}) AS seeds } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_TESTS_MODEL]->(:TestsModelIR)-[:HAS_ENDPOINT_SUITE]->(s:EndpointTestSuite) \
  RETURN collect(s {.*}) AS endpoint_suites } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_TESTS_MODEL]->(:TestsModelIR)-[:HAS_FLOW_SUITE]->(s:FlowTestSuite) \
  RETURN collect(s {.*}) AS flow_suites } \
CALL { WITH app OPTIONAL MATCH (app)-[:HAS_TESTS_MODEL]->(:TestsModelIR)-[:HAS_ENDPOINT_SUITE|HAS_FLOW_SUITE]->(su)-[:HAS_SCENARIO]->(sc:TestScenarioIR) \
  RETURN collect(sc {.*, suite_id: su.suite_id}) AS scenarios } \
RETURN app {.*} AS application, domain_model, entities, attributes, relations, \
api_model, endpoints, parameters, schema_bindings, endpoint_targets, endpoint_fields, \
schemas, schema_fields, behavior_model, flows, steps, invariants, \
validation_model, rules, strategies, \
infrastructure_model, database_configs, services, observability_configs, \
tests_model, seeds, endpoint_suites, flow_suites, scenarios";

fn list<'a>(record: &'a JsonMap, column: &str) -> Vec<&'a JsonMap> {
    record
        .get(column)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn object<'a>(record: &'a JsonMap, column: &str) -> Option<&'a JsonMap> {
    record.get(column).and_then(Value::as_object)
}

fn inconsistent(app_id: &str, reason: impl Into<String>) -> LoaderError {
    LoaderError::InconsistentSnapshot {
        app_id: app_id.to_string(),
        reason: reason.into(),
    }
}

/// Strip nulls and unpack JSON-string properties, then deserialize.
fn parse<T: DeserializeOwned>(
    app_id: &str,
    label: &str,
    props: &JsonMap,
    packed_keys: &[&str],
) -> Result<T, LoaderError> {
    let mut cleaned = JsonMap::new();
    for (key, value) in props {
        if value.is_null() {
            continue;
        }
        if packed_keys.contains(&key.as_str()) {
            let text = value.as_str().unwrap_or("null");
            let unpacked: Value = serde_json::from_str(text)
                .map_err(|e| inconsistent(app_id, format!("{label}.{key} is not JSON: {e}")))?;
            if !unpacked.is_null() {
                cleaned.insert(key.clone(), unpacked);
            }
            continue;
        }
        cleaned.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(cleaned))
        .map_err(|e| inconsistent(app_id, format!("malformed {label} node: {e}")))
}

fn string_prop(props: &JsonMap, key: &str) -> String {
    props
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn assemble(app_id: &str, record: &JsonMap) -> Result<ApplicationIr, LoaderError> {
    let application = object(record, "application")
        .ok_or_else(|| inconsistent(app_id, "application root missing from record"))?;
    let mut app = ApplicationIr::new(
        app_id,
        &string_prop(application, "name"),
        &string_prop(application, "version"),
        &string_prop(application, "spec_hash"),
    );

    if let Some(domain_root) = object(record, "domain_model") {
        let mut domain: DomainModelIr = parse(app_id, "DomainModelIR", domain_root, &[])?;
        for entity_props in list(record, "entities") {
            domain
                .entities
                .push(parse(app_id, "Entity", entity_props, &[])?);
        }
        for attribute_props in list(record, "attributes") {
            let parent = string_prop(attribute_props, "entity_id");
            let attribute = parse(app_id, "Attribute", attribute_props, &["constraints"])?;
            let entity = domain
                .entities
                .iter_mut()
                .find(|e| e.entity_id == parent)
                .ok_or_else(|| {
                    inconsistent(app_id, format!("attribute under unknown entity {parent}"))
                })?;
            entity.attributes.push(attribute);
        }
        for relation_props in list(record, "relations") {
            domain
                .relations
                .push(parse(app_id, "RELATES_TO", relation_props, &[])?);
        }
        app.domain = Some(domain);
    }

    if let Some(api_root) = object(record, "api_model") {
        let mut api: ApiModelIr = parse(app_id, "APIModelIR", api_root, &[])?;
        for endpoint_props in list(record, "endpoints") {
            api.endpoints
                .push(parse(app_id, "Endpoint", endpoint_props, &[])?);
        }
        for parameter_props in list(record, "parameters") {
            let parent = string_prop(parameter_props, "endpoint_id");
            let parameter = parse(app_id, "APIParameter", parameter_props, &[])?;
            endpoint_mut(&mut api, app_id, &parent)?.parameters.push(parameter);
        }
        for binding in list(record, "schema_bindings") {
            let parent = string_prop(binding, "endpoint_id");
            let schema_name = string_prop(binding, "schema_name");
            let endpoint = endpoint_mut(&mut api, app_id, &parent)?;
            match string_prop(binding, "kind").as_str() {
                "REQUEST_SCHEMA" => endpoint.request_schema = Some(schema_name),
                "RESPONSE_SCHEMA" => endpoint.response_schema = Some(schema_name),
                other => {
                    return Err(inconsistent(
                        app_id,
                        format!("unexpected schema binding {other}"),
                    ))
                }
            }
        }
        for target in list(record, "endpoint_targets") {
            let parent = string_prop(target, "endpoint_id");
            let entity_target = EntityTarget {
                entity: string_prop(target, "entity"),
                confidence: target
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                inferred: target
                    .get("inferred")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            };
            endpoint_mut(&mut api, app_id, &parent)?.targets.push(entity_target);
        }
        for field_ref in list(record, "endpoint_fields") {
            let parent = string_prop(field_ref, "endpoint_id");
            let pair = (
                string_prop(field_ref, "entity"),
                string_prop(field_ref, "attribute"),
            );
            endpoint_mut(&mut api, app_id, &parent)?.uses_fields.push(pair);
        }
        for schema_props in list(record, "schemas") {
            api.schemas.push(parse(
                app_id,
                "APISchema",
                schema_props,
                &["source_metadata"],
            )?);
        }
        for field_props in list(record, "schema_fields") {
            let parent = string_prop(field_props, "schema_id");
            let field = parse(app_id, "APISchemaField", field_props, &[])?;
            let schema = api
                .schemas
                .iter_mut()
                .find(|s| s.schema_id == parent)
                .ok_or_else(|| {
                    inconsistent(app_id, format!("field under unknown schema {parent}"))
                })?;
            schema.fields.push(field);
        }
        app.api = Some(api);
    }

    if let Some(behavior_root) = object(record, "behavior_model") {
        let mut behavior: BehaviorModelIr = parse(app_id, "BehaviorModelIR", behavior_root, &[])?;
        for flow_props in list(record, "flows") {
            behavior.flows.push(parse(app_id, "Flow", flow_props, &[])?);
        }
        for step_props in list(record, "steps") {
            let parent = string_prop(step_props, "flow_id");
            let step = parse(app_id, "Step", step_props, &[])?;
            let flow = behavior
                .flows
                .iter_mut()
                .find(|f| f.flow_id == parent)
                .ok_or_else(|| inconsistent(app_id, format!("step under unknown flow {parent}")))?;
            flow.steps.push(step);
        }
        for invariant_props in list(record, "invariants") {
            behavior
                .invariants
                .push(parse(app_id, "Invariant", invariant_props, &[])?);
        }
        app.behavior = Some(behavior);
    }

    if let Some(validation_root) = object(record, "validation_model") {
        let mut validation: ValidationModelIr =
            parse(app_id, "ValidationModelIR", validation_root, &[])?;
        for rule_props in list(record, "rules") {
            validation
                .rules
                .push(parse(app_id, "ValidationRule", rule_props, &[])?);
        }
        for strategy_props in list(record, "strategies") {
            validation
                .strategies
                .push(parse(app_id, "EnforcementStrategy", strategy_props, &[])?);
        }
        app.validation = Some(validation);
    }

    if let Some(infrastructure_root) = object(record, "infrastructure_model") {
        let mut infrastructure: InfrastructureModelIr =
            parse(app_id, "InfrastructureModelIR", infrastructure_root, &[])?;
        if let Some(database_props) = list(record, "database_configs").into_iter().next() {
            infrastructure.database =
                Some(parse(app_id, "DatabaseConfig", database_props, &["options"])?);
        }
        for service_props in list(record, "services") {
            infrastructure.services.push(parse(
                app_id,
                "ContainerService",
                service_props,
                &["environment"],
            )?);
        }
        if let Some(observability_props) =
            list(record, "observability_configs").into_iter().next()
        {
            infrastructure.observability = Some(parse(
                app_id,
                "ObservabilityConfig",
                observability_props,
                &["options"],
            )?);
        }
        app.infrastructure = Some(infrastructure);
    }

    // An application without HAS_TESTS_MODEL simply has no tests submodel.
    if let Some(tests_root) = object(record, "tests_model") {
        let mut tests: TestsModelIr = parse(app_id, "TestsModelIR", tests_root, &[])?;
        for seed_props in list(record, "seeds") {
            tests
                .seeds
                .push(parse(app_id, "SeedEntityIR", seed_props, &[])?);
        }
        for suite_props in list(record, "endpoint_suites") {
            let suite: EndpointTestSuite =
                parse(app_id, "EndpointTestSuite", suite_props, &[])?;
            tests.endpoint_suites.push(suite);
        }
        for suite_props in list(record, "flow_suites") {
            let suite: FlowTestSuite = parse(app_id, "FlowTestSuite", suite_props, &[])?;
            tests.flow_suites.push(suite);
        }
        for scenario_props in list(record, "scenarios") {
            let parent = string_prop(scenario_props, "suite_id");
            let scenario = parse(
                app_id,
                "TestScenarioIR",
                scenario_props,
                &["path_params", "query_params", "headers", "request_body"],
            )?;
            if let Some(suite) = tests
                .endpoint_suites
                .iter_mut()
                .find(|s| s.suite_id == parent)
            {
                suite.scenarios.push(scenario);
            } else if let Some(suite) =
                tests.flow_suites.iter_mut().find(|s| s.suite_id == parent)
            {
                suite.scenarios.push(scenario);
            } else {
                return Err(inconsistent(
                    app_id,
                    format!("scenario under unknown suite {parent}"),
                ));
            }
        }
        app.tests = Some(tests);
    }

    app.canonicalize();
    validate_application(&app)
        .map_err(|violation| inconsistent(app_id, format!("loaded tree invalid: {violation}")))?;
    Ok(app)
}

fn endpoint_mut<'a>(
    api: &'a mut ApiModelIr,
    app_id: &str,
    endpoint_id: &str,
) -> Result<&'a mut specgraph::ir::Endpoint, LoaderError> {
    api.endpoints
        .iter_mut()
        .find(|e| e.endpoint_id == endpoint_id)
        .ok_or_else(|| inconsistent(app_id, format!("reference to unknown endpoint {endpoint_id}")))
}
