//! Typed intermediate representation of one application.
//!
//! The IR tree is the in-process exchange format between the spec parser,
//! the repositories, and the loader. It is plain owned data: temporal
//! metadata (`created_at` / `updated_at` / `updated_by`) is injected at the
//! persistence boundary and is deliberately not modeled here, so round-trip
//! equality is over domain fields only.

pub mod api;
pub mod behavior;
pub mod domain;
pub mod infrastructure;
pub mod tests_model;
pub mod validate;
pub mod validation;

pub use api::{
    ApiModelIr, ApiParameter, ApiSchema, ApiSchemaField, Endpoint, EntityTarget, HttpMethod,
    ParameterLocation, SchemaSource,
};
pub use behavior::{BehaviorModelIr, Flow, Invariant, Step};
pub use domain::{Attribute, DomainModelIr, Entity, EntityRelation, RelationKind};
pub use infrastructure::{
    ContainerService, DatabaseConfig, InfrastructureModelIr, ObservabilityConfig,
};
pub use tests_model::{
    EndpointTestSuite, FlowTestSuite, SeedEntity, TestScenario, TestsModelIr,
};
pub use validation::{EnforcementStrategy, ValidationModelIr, ValidationRule};

use crate::ids;
use serde::{Deserialize, Serialize};

/// Root of one application's intermediate representation.
///
/// Created once per application and updated when the spec changes. Each
/// submodel is optional; an application with no API simply has `api: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationIr {
    /// Stable application identifier; the unique key of the root node.
    pub app_id: String,
    /// Human-readable application name.
    pub name: String,
    /// Application version string as stated in the spec.
    pub version: String,
    /// Hash of the source specification, provided by the parser.
    pub spec_hash: String,
    /// Domain submodel (`HAS_DOMAIN_MODEL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainModelIr>,
    /// API submodel (`HAS_API_MODEL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiModelIr>,
    /// Behavior submodel (`HAS_BEHAVIOR_MODEL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<BehaviorModelIr>,
    /// Validation submodel (`HAS_VALIDATION_MODEL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationModelIr>,
    /// Infrastructure submodel (`HAS_INFRASTRUCTURE_MODEL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<InfrastructureModelIr>,
    /// Tests submodel (`HAS_TESTS_MODEL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestsModelIr>,
}

impl ApplicationIr {
    /// An empty root with no submodels.
    #[must_use]
    pub fn new(app_id: &str, name: &str, version: &str, spec_hash: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            spec_hash: spec_hash.to_string(),
            domain: None,
            api: None,
            behavior: None,
            validation: None,
            infrastructure: None,
            tests: None,
        }
    }

    /// Recompute every child identifier from its semantic key and sort
    /// every child collection by it.
    ///
    /// Identifiers follow `{parent_id}|{component}|{key[|index]}`, so the
    /// canonical form of a tree is fully determined by `app_id` and the
    /// semantic keys of its children. Repositories persist the canonical
    /// form and the loader assembles in the same order, so loading a saved
    /// tree yields a tree equal to the canonical input.
    pub fn canonicalize(&mut self) {
        let app_id = self.app_id.clone();
        if let Some(domain) = &mut self.domain {
            domain.canonicalize(&app_id);
        }
        if let Some(api) = &mut self.api {
            api.canonicalize(&app_id);
        }
        if let Some(behavior) = &mut self.behavior {
            behavior.canonicalize(&app_id);
        }
        if let Some(validation) = &mut self.validation {
            validation.canonicalize(&app_id);
        }
        if let Some(infrastructure) = &mut self.infrastructure {
            infrastructure.canonicalize(&app_id);
        }
        if let Some(tests) = &mut self.tests {
            tests.canonicalize(&app_id);
        }
    }

    /// The canonical domain submodel id for this application.
    #[must_use]
    pub fn domain_model_id(&self) -> String {
        ids::submodel_id(&self.app_id, "domain_model")
    }

    /// The canonical API submodel id for this application.
    #[must_use]
    pub fn api_model_id(&self) -> String {
        ids::submodel_id(&self.app_id, "api_model")
    }

    /// The canonical tests submodel id for this application.
    #[must_use]
    pub fn tests_model_id(&self) -> String {
        ids::submodel_id(&self.app_id, "tests_model")
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_app() -> ApplicationIr {
        let mut app = ApplicationIr::new("A1", "shop", "1.0.0", "sha256:abc");
        let mut domain = DomainModelIr::default();
        let mut product = Entity::new("Product", "A product for sale", true);
        product.attributes.push(Attribute::new("name", "string"));
        product.attributes.push(Attribute::new("price", "decimal"));
        domain.entities.push(product);
        app.domain = Some(domain);
        app
    }

    // ========== Construction Tests ==========

    #[test]
    fn test_new_has_no_submodels() {
        let app = ApplicationIr::new("A1", "shop", "1.0.0", "h");
        assert!(app.domain.is_none());
        assert!(app.api.is_none());
        assert!(app.behavior.is_none());
        assert!(app.validation.is_none());
        assert!(app.infrastructure.is_none());
        assert!(app.tests.is_none());
    }

    #[test]
    fn test_submodel_id_helpers() {
        let app = ApplicationIr::new("A1", "shop", "1.0.0", "h");
        assert_eq!(app.domain_model_id(), "A1|domain_model");
        assert_eq!(app.api_model_id(), "A1|api_model");
        assert_eq!(app.tests_model_id(), "A1|tests_model");
    }

    // ========== Canonicalize Tests ==========

    #[test]
    fn test_canonicalize_assigns_entity_ids() {
        let mut app = sample_app();
        app.canonicalize();
        let domain = app.domain.as_ref().unwrap();
        assert_eq!(domain.domain_model_id, "A1|domain_model");
        assert_eq!(domain.entities[0].entity_id, "A1|domain_model|entity|Product");
        assert_eq!(
            domain.entities[0].attributes[0].attribute_id,
            "A1|domain_model|entity|Product|attribute|name"
        );
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let mut app = sample_app();
        app.canonicalize();
        let once = app.clone();
        app.canonicalize();
        assert_eq!(app, once);
    }

    #[test]
    fn test_canonicalize_overrides_stale_ids() {
        let mut app = sample_app();
        app.domain.as_mut().unwrap().entities[0].entity_id = "bogus".to_string();
        app.canonicalize();
        assert_eq!(
            app.domain.as_ref().unwrap().entities[0].entity_id,
            "A1|domain_model|entity|Product"
        );
    }

    // ========== Serde Tests ==========

    #[test]
    fn test_serde_roundtrip() {
        let mut app = sample_app();
        app.canonicalize();
        let json = serde_json::to_string(&app).unwrap();
        let back: ApplicationIr = serde_json::from_str(&json).unwrap();
        assert_eq!(app, back);
    }

    #[test]
    fn test_absent_submodels_are_omitted() {
        let app = ApplicationIr::new("A1", "shop", "1.0.0", "h");
        let json = serde_json::to_value(&app).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("domain"));
        assert!(!obj.contains_key("tests"));
    }
}
