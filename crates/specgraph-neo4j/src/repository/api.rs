//! API submodel repository.
//!
//! Endpoints are subgraph-replaced with cascade on `APIParameter` and the
//! `REQUEST_SCHEMA` / `RESPONSE_SCHEMA` bindings; schemas and their fields
//! are subgraph-replaced independently. `TARGETS_ENTITY` and `USES_FIELD`
//! are curated by multiple inference passes, so they are merged, never
//! replaced: a save touches only the references present in the tree and a
//! surviving endpoint keeps whatever earlier passes attached.

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
use specgraph::ir::validate::validate_api;
use specgraph::ir::{ApiModelIr, ApiSchema, Endpoint, HttpMethod};
use std::sync::Arc;
use tracing::debug;

/// Repository for `APIModelIR` subgraphs.
#[derive(Clone)]
pub struct ApiRepository {
    engine: Arc<dyn GraphEngine>,
}

impl ApiRepository {
    /// A repository over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Validate and persist one API submodel in a single transaction.
    pub async fn save(
        &self,
        app_id: &str,
        api: &ApiModelIr,
        context: &ActorContext,
    ) -> StoreResult<()> {
        validate_api(api)?;
        let stamp = TemporalStamp::new(context)?;
        debug!(
            "saving api model for {app_id}: {} endpoints, {} schemas",
            api.endpoints.len(),
            api.schemas.len()
        );
        self.engine
            .run_atomic(Self::plan(app_id, api, &stamp))
            .await
            .map_err(crate::repository::surface_write_failure)
    }

    /// Merge one `TARGETS_ENTITY` reference produced by an inference pass.
    /// Re-merging the same `(endpoint, entity)` pair updates `confidence`
    /// and refreshes `updated_at` without creating a second edge.
    pub async fn merge_endpoint_target(
        &self,
        app_id: &str,
        method: HttpMethod,
        path: &str,
        entity: &str,
        confidence: f64,
        inferred: bool,
        context: &ActorContext,
    ) -> StoreResult<()> {
        let stamp = TemporalStamp::new(context)?;
        let endpoint_id = ids::child_id(
            &ids::submodel_id(app_id, "api_model"),
            "endpoint",
            &format!("{}:{}", method.as_str(), path),
        );
        let entity_id = ids::child_id(
            &ids::submodel_id(app_id, "domain_model"),
            "entity",
            entity,
        );
        let mut props = JsonMap::new();
        props.insert("confidence".to_string(), Value::from(confidence));
        props.insert("inferred".to_string(), Value::from(inferred));
        let statement = connect(
            "Endpoint",
            "endpoint_id",
            "Entity",
            "entity_id",
            "TARGETS_ENTITY",
            None,
            vec![edge_row(&endpoint_id, &entity_id, None, props)],
            &stamp,
        );
        self.engine.run(statement).await
    }

    /// Statement plan for one API submodel.
    #[must_use]
    pub fn plan(app_id: &str, api: &ApiModelIr, stamp: &TemporalStamp) -> Vec<Statement> {
        let root_id = &api.api_model_id;
        let domain_model_id = ids::submodel_id(app_id, "domain_model");
        let mut statements = vec![upsert_submodel_root(
            app_id,
            "HAS_API_MODEL",
            "APIModelIR",
            "api_model_id",
            root_id,
            stamp,
        )];

        // Subgraph-replace endpoints, cascading to owned parameters. Schema
        // binding edges die with the DELETE below or are re-pointed for
        // survivors; TARGETS_ENTITY / USES_FIELD on survivors are kept.
        let keep_endpoints: Vec<String> = api
            .endpoints
            .iter()
            .map(|e| e.endpoint_id.clone())
            .collect();
        statements.push(delete_absent_children(
            "APIModelIR",
            "api_model_id",
            root_id,
            "HAS_ENDPOINT",
            "Endpoint",
            "endpoint_id",
            keep_endpoints,
            &[CascadeHop {
                rel_type: "HAS_PARAMETER",
                label: "APIParameter",
            }],
        ));
        let keep_parameters: Vec<String> = api
            .endpoints
            .iter()
            .flat_map(|endpoint| {
                endpoint.parameters.iter().map(|parameter| {
                    ids::child_id(&endpoint.endpoint_id, "parameter", &parameter.name)
                })
            })
            .collect();
        statements.push(delete_absent_descendants(
            "APIModelIR",
            "api_model_id",
            root_id,
            &[("HAS_ENDPOINT", "Endpoint"), ("HAS_PARAMETER", "APIParameter")],
            "param_id",
            keep_parameters,
        ));

        // Subgraph-replace schemas and their fields.
        let keep_schemas: Vec<String> = api.schemas.iter().map(|s| s.schema_id.clone()).collect();
        statements.push(delete_absent_children(
            "APIModelIR",
            "api_model_id",
            root_id,
            "HAS_SCHEMA",
            "APISchema",
            "schema_id",
            keep_schemas,
            &[CascadeHop {
                rel_type: "HAS_FIELD",
                label: "APISchemaField",
            }],
        ));
        let keep_fields: Vec<String> = api
            .schemas
            .iter()
            .flat_map(|schema| {
                schema
                    .fields
                    .iter()
                    .map(|field| ids::child_id(&schema.schema_id, "field", &field.name))
            })
            .collect();
        statements.push(delete_absent_descendants(
            "APIModelIR",
            "api_model_id",
            root_id,
            &[("HAS_SCHEMA", "APISchema"), ("HAS_FIELD", "APISchemaField")],
            "field_id",
            keep_fields,
        ));

        // Schema bindings of surviving endpoints are replaced wholesale.
        statements.push(
            Statement::new(
                "MATCH (m:APIModelIR {api_model_id: $root_id})-[:HAS_ENDPOINT]->(:Endpoint)\
                 -[binding:REQUEST_SCHEMA|RESPONSE_SCHEMA]->(:APISchema) \
                 DELETE binding",
            )
            .param("root_id", root_id.as_str())
            .idempotent(),
        );

        if !api.endpoints.is_empty() {
            let endpoint_rows: Vec<Value> = api
                .endpoints
                .iter()
                .map(|endpoint| {
                    child_row(root_id, &endpoint.endpoint_id, endpoint_props(endpoint))
                })
                .collect();
            statements.push(attach_children(
                "APIModelIR",
                "api_model_id",
                "HAS_ENDPOINT",
                "Endpoint",
                "endpoint_id",
                endpoint_rows,
                stamp,
            ));
        }

        let parameter_rows: Vec<Value> = api
            .endpoints
            .iter()
            .flat_map(|endpoint| {
                endpoint.parameters.iter().map(|parameter| {
                    let mut props = JsonMap::new();
                    props.insert("name".to_string(), Value::from(parameter.name.as_str()));
                    props.insert(
                        "location".to_string(),
                        Value::from(parameter.location.as_str()),
                    );
                    props.insert(
                        "data_type".to_string(),
                        Value::from(parameter.data_type.as_str()),
                    );
                    props.insert("required".to_string(), Value::from(parameter.required));
                    child_row(
                        &endpoint.endpoint_id,
                        &ids::child_id(&endpoint.endpoint_id, "parameter", &parameter.name),
                        props,
                    )
                })
            })
            .collect();
        if !parameter_rows.is_empty() {
            statements.push(attach_children(
                "Endpoint",
                "endpoint_id",
                "HAS_PARAMETER",
                "APIParameter",
                "param_id",
                parameter_rows,
                stamp,
            ));
        }

        if !api.schemas.is_empty() {
            let schema_rows: Vec<Value> = api
                .schemas
                .iter()
                .map(|schema| child_row(root_id, &schema.schema_id, schema_props(schema)))
                .collect();
            statements.push(attach_children(
                "APIModelIR",
                "api_model_id",
                "HAS_SCHEMA",
                "APISchema",
                "schema_id",
                schema_rows,
                stamp,
            ));
        }

        let field_rows: Vec<Value> = api
            .schemas
            .iter()
            .flat_map(|schema| {
                schema.fields.iter().map(|field| {
                    let mut props = JsonMap::new();
                    props.insert("name".to_string(), Value::from(field.name.as_str()));
                    props.insert("type".to_string(), Value::from(field.field_type.as_str()));
                    props.insert("required".to_string(), Value::from(field.required));
                    child_row(
                        &schema.schema_id,
                        &ids::child_id(&schema.schema_id, "field", &field.name),
                        props,
                    )
                })
            })
            .collect();
        if !field_rows.is_empty() {
            statements.push(attach_children(
                "APISchema",
                "schema_id",
                "HAS_FIELD",
                "APISchemaField",
                "field_id",
                field_rows,
                stamp,
            ));
        }

        for (rel_type, binding) in [
            ("REQUEST_SCHEMA", request_bindings(api)),
            ("RESPONSE_SCHEMA", response_bindings(api)),
        ] {
            if !binding.is_empty() {
                statements.push(connect(
                    "Endpoint",
                    "endpoint_id",
                    "APISchema",
                    "schema_id",
                    rel_type,
                    None,
                    binding,
                    stamp,
                ));
            }
        }

        // Merged cross-entity references.
        let target_rows: Vec<Value> = api
            .endpoints
            .iter()
            .flat_map(|endpoint| {
                endpoint.targets.iter().map(|target| {
                    let mut props = JsonMap::new();
                    props.insert("confidence".to_string(), Value::from(target.confidence));
                    props.insert("inferred".to_string(), Value::from(target.inferred));
                    edge_row(
                        &endpoint.endpoint_id,
                        &ids::child_id(&domain_model_id, "entity", &target.entity),
                        None,
                        props,
                    )
                })
            })
            .collect();
        if !target_rows.is_empty() {
            statements.push(connect(
                "Endpoint",
                "endpoint_id",
                "Entity",
                "entity_id",
                "TARGETS_ENTITY",
                None,
                target_rows,
                stamp,
            ));
        }

        let field_ref_rows: Vec<Value> = api
            .endpoints
            .iter()
            .flat_map(|endpoint| {
                endpoint.uses_fields.iter().map(|(entity, attribute)| {
                    let entity_id = ids::child_id(&domain_model_id, "entity", entity);
                    edge_row(
                        &endpoint.endpoint_id,
                        &ids::child_id(&entity_id, "attribute", attribute),
                        None,
                        JsonMap::new(),
                    )
                })
            })
            .collect();
        if !field_ref_rows.is_empty() {
            statements.push(connect(
                "Endpoint",
                "endpoint_id",
                "Attribute",
                "attribute_id",
                "USES_FIELD",
                None,
                field_ref_rows,
                stamp,
            ));
        }

        statements
    }
}

fn endpoint_props(endpoint: &Endpoint) -> JsonMap {
    let mut props = JsonMap::new();
    props.insert("path".to_string(), Value::from(endpoint.path.as_str()));
    props.insert(
        "method".to_string(),
        Value::from(endpoint.method.as_str()),
    );
    props.insert(
        "operation_id".to_string(),
        Value::from(endpoint.operation_id.as_str()),
    );
    props.insert(
        "auth_required".to_string(),
        Value::from(endpoint.auth_required),
    );
    props.insert("inferred".to_string(), Value::from(endpoint.inferred));
    props.insert(
        "inference_source".to_string(),
        endpoint
            .inference_source
            .as_deref()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    props
}

fn schema_props(schema: &ApiSchema) -> JsonMap {
    let mut props = JsonMap::new();
    props.insert("name".to_string(), Value::from(schema.name.as_str()));
    props.insert(
        "source".to_string(),
        Value::from(schema.source.as_str()),
    );
    props.insert(
        "source_metadata".to_string(),
        schema
            .source_metadata
            .as_ref()
            .map(|metadata| json_string_property(&Value::Object(metadata.clone())))
            .unwrap_or(Value::Null),
    );
    props
}

fn request_bindings(api: &ApiModelIr) -> Vec<Value> {
    bindings(api, |endpoint| endpoint.request_schema.as_deref())
}

fn response_bindings(api: &ApiModelIr) -> Vec<Value> {
    bindings(api, |endpoint| endpoint.response_schema.as_deref())
}

fn bindings<'a>(
    api: &'a ApiModelIr,
    select: impl Fn(&'a Endpoint) -> Option<&'a str>,
) -> Vec<Value> {
    api.endpoints
        .iter()
        .filter_map(|endpoint| {
            select(endpoint).map(|schema_name| {
                edge_row(
                    &endpoint.endpoint_id,
                    &ids::child_id(&api.api_model_id, "schema", schema_name),
                    None,
                    JsonMap::new(),
                )
            })
        })
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingEngine;
    use specgraph::actor::Actor;
    use specgraph::ir::{ApiParameter, ApiSchemaField, EntityTarget, ParameterLocation, SchemaSource};

    fn sample_api() -> ApiModelIr {
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
        api.canonicalize("A1");
        api
    }

    fn stamp() -> TemporalStamp {
        TemporalStamp::at(1_700_000_000_000, Actor::Pipeline)
    }

    // ========== Plan Shape Tests ==========

    #[test]
    fn test_plan_replaces_endpoints_with_parameter_cascade() {
        let plan = ApiRepository::plan("A1", &sample_api(), &stamp());
        let delete = plan
            .iter()
            .find(|s| s.text.contains("WHERE NOT c.endpoint_id IN $keep_ids"))
            .unwrap();
        assert!(delete
            .text
            .contains("OPTIONAL MATCH (c)-[:HAS_PARAMETER]->(g0:APIParameter)"));
    }

    #[test]
    fn test_plan_clears_schema_bindings_before_rebinding() {
        let plan = ApiRepository::plan("A1", &sample_api(), &stamp());
        let clear = plan
            .iter()
            .position(|s| s.text.contains("DELETE binding"))
            .unwrap();
        let rebind = plan
            .iter()
            .position(|s| s.text.contains("MERGE (a)-[e:RESPONSE_SCHEMA]->(b)"))
            .unwrap();
        assert!(clear < rebind);
    }

    #[test]
    fn test_plan_binds_response_schema_by_id() {
        let plan = ApiRepository::plan("A1", &sample_api(), &stamp());
        let rebind = plan
            .iter()
            .find(|s| s.text.contains("MERGE (a)-[e:RESPONSE_SCHEMA]->(b)"))
            .unwrap();
        let rows = rebind.params["rows"].as_array().unwrap();
        assert_eq!(rows[0]["from"], "A1|api_model|endpoint|GET:/products/{id}");
        assert_eq!(rows[0]["to"], "A1|api_model|schema|ProductOut");
    }

    #[test]
    fn test_plan_has_no_request_binding_when_absent() {
        let plan = ApiRepository::plan("A1", &sample_api(), &stamp());
        assert!(!plan
            .iter()
            .any(|s| s.text.contains("MERGE (a)-[e:REQUEST_SCHEMA]->(b)")));
    }

    #[test]
    fn test_plan_merges_targets_to_domain_entities() {
        let plan = ApiRepository::plan("A1", &sample_api(), &stamp());
        let targets = plan
            .iter()
            .find(|s| s.text.contains("MERGE (a)-[e:TARGETS_ENTITY]->(b)"))
            .unwrap();
        let rows = targets.params["rows"].as_array().unwrap();
        assert_eq!(rows[0]["to"], "A1|domain_model|entity|Product");
        assert!((rows[0]["props"]["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(rows[0]["props"]["inferred"], true);
    }

    #[test]
    fn test_plan_never_deletes_target_edges() {
        // Merged cross-references must survive a save that keeps the
        // endpoint; only owned children and bindings are cleared.
        let plan = ApiRepository::plan("A1", &sample_api(), &stamp());
        for statement in &plan {
            if statement.text.contains("TARGETS_ENTITY") || statement.text.contains("USES_FIELD")
            {
                assert!(!statement.text.contains("DELETE"));
            }
        }
    }

    #[test]
    fn test_plan_uses_field_rows_point_at_attributes() {
        let plan = ApiRepository::plan("A1", &sample_api(), &stamp());
        let uses = plan
            .iter()
            .find(|s| s.text.contains("MERGE (a)-[e:USES_FIELD]->(b)"))
            .unwrap();
        let rows = uses.params["rows"].as_array().unwrap();
        assert_eq!(
            rows[0]["to"],
            "A1|domain_model|entity|Product|attribute|name"
        );
    }

    // ========== Inference Merge Tests ==========

    #[tokio::test]
    async fn test_merge_endpoint_target_is_single_merge() {
        let engine = Arc::new(RecordingEngine::new());
        let repository = ApiRepository::new(engine.clone() as Arc<dyn GraphEngine>);
        repository
            .merge_endpoint_target(
                "A1",
                HttpMethod::Get,
                "/products/{id}",
                "Product",
                0.95,
                true,
                &ActorContext::new(Actor::Agent),
            )
            .await
            .unwrap();
        let statements = engine.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0]
            .text
            .contains("MERGE (a)-[e:TARGETS_ENTITY]->(b)"));
        let rows = statements[0].params["rows"].as_array().unwrap();
        assert_eq!(
            rows[0]["from"],
            "A1|api_model|endpoint|GET:/products/{id}"
        );
        assert!((rows[0]["props"]["confidence"].as_f64().unwrap() - 0.95).abs() < 1e-9);
        assert_eq!(statements[0].params["actor"], "agent");
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_endpoint_keys() {
        let engine = Arc::new(RecordingEngine::new());
        let repository = ApiRepository::new(engine.clone() as Arc<dyn GraphEngine>);
        let mut api = ApiModelIr::default();
        api.endpoints.push(Endpoint::new(HttpMethod::Get, "/p", "a"));
        api.endpoints.push(Endpoint::new(HttpMethod::Get, "/p", "b"));
        api.canonicalize("A1");
        let err = repository
            .save("A1", &api, &ActorContext::new(Actor::Pipeline))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTRACT_DUPLICATE_UNIQUE_KEY");
        assert!(engine.calls().is_empty());
    }
}
