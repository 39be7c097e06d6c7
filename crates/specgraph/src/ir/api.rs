//! API submodel: endpoints, parameters, and schemas.

use crate::error::ContractError;
use crate::ids;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregates the API surface. Owns `Endpoint` and `ApiSchema` children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiModelIr {
    /// Canonical submodel id (`{app_id}|api_model`).
    #[serde(default)]
    pub api_model_id: String,
    /// Owned endpoints; `(api_model_id, path, method)` is unique.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Owned named schemas.
    #[serde(default)]
    pub schemas: Vec<ApiSchema>,
}

impl ApiModelIr {
    /// Recompute child ids from semantic keys and sort child collections.
    pub fn canonicalize(&mut self, app_id: &str) {
        self.api_model_id = ids::submodel_id(app_id, "api_model");
        self.endpoints.sort_by_key(Endpoint::semantic_key);
        self.schemas.sort_by(|a, b| a.name.cmp(&b.name));
        for endpoint in &mut self.endpoints {
            endpoint.endpoint_id =
                ids::child_id(&self.api_model_id, "endpoint", &endpoint.semantic_key());
            endpoint.parameters.sort_by(|a, b| a.name.cmp(&b.name));
            endpoint.targets.sort_by(|a, b| a.entity.cmp(&b.entity));
            endpoint.uses_fields.sort();
        }
        for schema in &mut self.schemas {
            schema.schema_id = ids::child_id(&self.api_model_id, "schema", &schema.name);
            schema.fields.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }
}

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP PUT.
    Put,
    /// HTTP PATCH.
    Patch,
    /// HTTP DELETE.
    Delete,
}

impl HttpMethod {
    /// Wire representation stored on nodes.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parse the wire representation.
    pub fn parse(value: &str) -> Result<Self, ContractError> {
        match value {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ContractError::UnknownEnumValue {
                label: "Endpoint".to_string(),
                property: "method".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an API parameter is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Path segment parameter.
    Path,
    /// Query string parameter.
    Query,
    /// HTTP header.
    Header,
    /// Request body field.
    Body,
}

impl ParameterLocation {
    /// Wire representation stored on nodes.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Body => "body",
        }
    }
}

/// Provenance of an API schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    /// Parsed from an OpenAPI document.
    Openapi,
    /// Inferred by an analysis pass.
    Inferred,
    /// Generated from a CRUD pattern.
    CrudPattern,
    /// Authored by hand.
    Manual,
}

impl SchemaSource {
    /// Wire representation stored on nodes.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaSource::Openapi => "openapi",
            SchemaSource::Inferred => "inferred",
            SchemaSource::CrudPattern => "crud_pattern",
            SchemaSource::Manual => "manual",
        }
    }
}

/// One HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Canonical endpoint id.
    #[serde(default)]
    pub endpoint_id: String,
    /// Route path, e.g. `/products/{id}`.
    pub path: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Operation identifier for generated clients.
    #[serde(default)]
    pub operation_id: String,
    /// Whether the endpoint requires authentication.
    #[serde(default)]
    pub auth_required: bool,
    /// Whether the endpoint was inferred rather than declared.
    #[serde(default)]
    pub inferred: bool,
    /// Which pass inferred it, when `inferred` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_source: Option<String>,
    /// Owned parameters; names unique per endpoint.
    #[serde(default)]
    pub parameters: Vec<ApiParameter>,
    /// Name of the request schema, when one is bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<String>,
    /// Name of the response schema, when one is bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<String>,
    /// `TARGETS_ENTITY` references; merged, never replaced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<EntityTarget>,
    /// `USES_FIELD` references as `(entity, attribute)` name pairs; merged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses_fields: Vec<(String, String)>,
}

impl Endpoint {
    /// A new endpoint with no parameters or schema bindings.
    #[must_use]
    pub fn new(method: HttpMethod, path: &str, operation_id: &str) -> Self {
        Self {
            endpoint_id: String::new(),
            path: path.to_string(),
            method,
            operation_id: operation_id.to_string(),
            auth_required: false,
            inferred: false,
            inference_source: None,
            parameters: Vec::new(),
            request_schema: None,
            response_schema: None,
            targets: Vec::new(),
            uses_fields: Vec::new(),
        }
    }

    /// Semantic key within the API model: `{METHOD}:{path}`.
    #[must_use]
    pub fn semantic_key(&self) -> String {
        format!("{}:{}", self.method.as_str(), self.path)
    }
}

/// A `TARGETS_ENTITY` reference from an endpoint, curated by inference
/// passes and therefore merged on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTarget {
    /// Target entity name.
    pub entity: String,
    /// Inference confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether the edge was inferred rather than declared.
    #[serde(default)]
    pub inferred: bool,
}

/// One parameter of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiParameter {
    /// Parameter name; unique per endpoint.
    pub name: String,
    /// Where the parameter is carried.
    pub location: ParameterLocation,
    /// Declared data type.
    pub data_type: String,
    /// Whether the parameter is mandatory.
    #[serde(default)]
    pub required: bool,
}

/// A named request/response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSchema {
    /// Canonical schema id.
    #[serde(default)]
    pub schema_id: String,
    /// Schema name; unique per API model.
    pub name: String,
    /// Provenance of the schema.
    pub source: SchemaSource,
    /// Opaque provenance details (e.g. the OpenAPI component pointer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<Map<String, Value>>,
    /// Owned fields; names unique per schema.
    #[serde(default)]
    pub fields: Vec<ApiSchemaField>,
}

impl ApiSchema {
    /// A new schema with no fields.
    #[must_use]
    pub fn new(name: &str, source: SchemaSource) -> Self {
        Self {
            schema_id: String::new(),
            name: name.to_string(),
            source,
            source_metadata: None,
            fields: Vec::new(),
        }
    }
}

/// One field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSchemaField {
    /// Field name; unique per schema.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether the field is mandatory.
    #[serde(default)]
    pub required: bool,
}
