//! Infrastructure submodel: database, container services, observability.

use crate::ids;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregates infrastructure descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureModelIr {
    /// Canonical submodel id (`{app_id}|infrastructure_model`).
    #[serde(default)]
    pub infrastructure_model_id: String,
    /// Primary database configuration, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
    /// Container services; `DEPENDS_ON` edges between them are merged.
    #[serde(default)]
    pub services: Vec<ContainerService>,
    /// Observability configuration, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

impl InfrastructureModelIr {
    /// Recompute child ids from semantic keys and sort child collections.
    pub fn canonicalize(&mut self, app_id: &str) {
        self.infrastructure_model_id = ids::submodel_id(app_id, "infrastructure_model");
        self.services.sort_by(|a, b| a.name.cmp(&b.name));
        for service in &mut self.services {
            service.depends_on.sort();
        }
        if let Some(database) = &mut self.database {
            database.config_id = ids::child_id(
                &self.infrastructure_model_id,
                "database_config",
                &database.engine,
            );
        }
        for service in &mut self.services {
            service.service_id =
                ids::child_id(&self.infrastructure_model_id, "service", &service.name);
        }
        if let Some(observability) = &mut self.observability {
            observability.config_id = ids::child_id(
                &self.infrastructure_model_id,
                "observability_config",
                "default",
            );
        }
    }
}

/// Database descriptor for the generated application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Canonical config id.
    #[serde(default)]
    pub config_id: String,
    /// Database engine, e.g. "postgresql".
    pub engine: String,
    /// Engine version.
    #[serde(default)]
    pub version: String,
    /// Hostname for the generated connection string.
    #[serde(default)]
    pub host: String,
    /// Port for the generated connection string.
    #[serde(default)]
    pub port: i64,
    /// Database name.
    #[serde(default)]
    pub database_name: String,
    /// Engine-specific options.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

/// One container service in the generated deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerService {
    /// Canonical service id.
    #[serde(default)]
    pub service_id: String,
    /// Service name; unique per infrastructure model.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Exposed ports.
    #[serde(default)]
    pub ports: Vec<i64>,
    /// Environment variables as a flat map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub environment: Map<String, Value>,
    /// Names of services this one depends on (`DEPENDS_ON`, merged).
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Observability settings of the generated application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Canonical config id.
    #[serde(default)]
    pub config_id: String,
    /// Log level, e.g. "info".
    #[serde(default)]
    pub logging_level: String,
    /// Whether metrics export is enabled.
    #[serde(default)]
    pub metrics_enabled: bool,
    /// Whether distributed tracing is enabled.
    #[serde(default)]
    pub tracing_enabled: bool,
    /// Stack-specific options.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_ids() {
        let mut infra = InfrastructureModelIr::default();
        infra.database = Some(DatabaseConfig {
            config_id: String::new(),
            engine: "postgresql".to_string(),
            version: "16".to_string(),
            host: "db".to_string(),
            port: 5432,
            database_name: "shop".to_string(),
            options: Map::new(),
        });
        infra.services.push(ContainerService {
            service_id: String::new(),
            name: "api".to_string(),
            image: "shop-api:latest".to_string(),
            ports: vec![8080],
            environment: Map::new(),
            depends_on: vec!["db".to_string()],
        });
        infra.observability = Some(ObservabilityConfig {
            config_id: String::new(),
            logging_level: "info".to_string(),
            metrics_enabled: true,
            tracing_enabled: false,
            options: Map::new(),
        });
        infra.canonicalize("A1");
        assert_eq!(infra.infrastructure_model_id, "A1|infrastructure_model");
        assert_eq!(
            infra.database.as_ref().unwrap().config_id,
            "A1|infrastructure_model|database_config|postgresql"
        );
        assert_eq!(
            infra.services[0].service_id,
            "A1|infrastructure_model|service|api"
        );
        assert_eq!(
            infra.observability.as_ref().unwrap().config_id,
            "A1|infrastructure_model|observability_config|default"
        );
    }

    #[test]
    fn test_roundtrip() {
        let mut infra = InfrastructureModelIr::default();
        infra.services.push(ContainerService {
            service_id: String::new(),
            name: "worker".to_string(),
            image: "worker:1".to_string(),
            ports: vec![],
            environment: Map::new(),
            depends_on: vec![],
        });
        infra.canonicalize("A1");
        let json = serde_json::to_string(&infra).unwrap();
        let back: InfrastructureModelIr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, infra);
    }
}
