//! Infrastructure submodel repository.
//!
//! Configurations and services are subgraph-replaced; `DEPENDS_ON` between
//! services is merged.

use crate::engine::GraphEngine;
use crate::repository::{
    attach_children, child_row, connect, delete_absent_children, edge_row, json_string_property,
    upsert_submodel_root,
};
use crate::statement::{JsonMap, Statement};
use crate::temporal::TemporalStamp;
use serde_json::Value;
use specgraph::actor::ActorContext;
use specgraph::error::StoreResult;
use specgraph::ids;
use specgraph::ir::InfrastructureModelIr;
use std::sync::Arc;
use tracing::debug;

/// Repository for `InfrastructureModelIR` subgraphs.
#[derive(Clone)]
pub struct InfrastructureRepository {
    engine: Arc<dyn GraphEngine>,
}

impl InfrastructureRepository {
    /// A repository over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Persist one infrastructure submodel in a single transaction.
    pub async fn save(
        &self,
        app_id: &str,
        infrastructure: &InfrastructureModelIr,
        context: &ActorContext,
    ) -> StoreResult<()> {
        let stamp = TemporalStamp::new(context)?;
        debug!(
            "saving infrastructure model for {app_id}: {} services",
            infrastructure.services.len()
        );
        self.engine
            .run_atomic(Self::plan(app_id, infrastructure, &stamp))
            .await
            .map_err(crate::repository::surface_write_failure)
    }

    /// Statement plan for one infrastructure submodel.
    #[must_use]
    pub fn plan(
        app_id: &str,
        infrastructure: &InfrastructureModelIr,
        stamp: &TemporalStamp,
    ) -> Vec<Statement> {
        let root_id = &infrastructure.infrastructure_model_id;
        let mut statements = vec![upsert_submodel_root(
            app_id,
            "HAS_INFRASTRUCTURE_MODEL",
            "InfrastructureModelIR",
            "infrastructure_model_id",
            root_id,
            stamp,
        )];

        let keep_database: Vec<String> = infrastructure
            .database
            .iter()
            .map(|d| d.config_id.clone())
            .collect();
        statements.push(delete_absent_children(
            "InfrastructureModelIR",
            "infrastructure_model_id",
            root_id,
            "HAS_DATABASE_CONFIG",
            "DatabaseConfig",
            "config_id",
            keep_database,
            &[],
        ));
        let keep_services: Vec<String> = infrastructure
            .services
            .iter()
            .map(|s| s.service_id.clone())
            .collect();
        statements.push(delete_absent_children(
            "InfrastructureModelIR",
            "infrastructure_model_id",
            root_id,
            "HAS_SERVICE",
            "ContainerService",
            "service_id",
            keep_services,
            &[],
        ));
        let keep_observability: Vec<String> = infrastructure
            .observability
            .iter()
            .map(|o| o.config_id.clone())
            .collect();
        statements.push(delete_absent_children(
            "InfrastructureModelIR",
            "infrastructure_model_id",
            root_id,
            "HAS_OBSERVABILITY_CONFIG",
            "ObservabilityConfig",
            "config_id",
            keep_observability,
            &[],
        ));

        if let Some(database) = &infrastructure.database {
            let mut props = JsonMap::new();
            props.insert("engine".to_string(), Value::from(database.engine.as_str()));
            props.insert(
                "version".to_string(),
                Value::from(database.version.as_str()),
            );
            props.insert("host".to_string(), Value::from(database.host.as_str()));
            props.insert("port".to_string(), Value::from(database.port));
            props.insert(
                "database_name".to_string(),
                Value::from(database.database_name.as_str()),
            );
            props.insert(
                "options".to_string(),
                json_string_property(&Value::Object(database.options.clone())),
            );
            statements.push(attach_children(
                "InfrastructureModelIR",
                "infrastructure_model_id",
                "HAS_DATABASE_CONFIG",
                "DatabaseConfig",
                "config_id",
                vec![child_row(root_id, &database.config_id, props)],
                stamp,
            ));
        }

        if !infrastructure.services.is_empty() {
            let service_rows: Vec<Value> = infrastructure
                .services
                .iter()
                .map(|service| {
                    let mut props = JsonMap::new();
                    props.insert("name".to_string(), Value::from(service.name.as_str()));
                    props.insert("image".to_string(), Value::from(service.image.as_str()));
                    props.insert(
                        "ports".to_string(),
                        Value::Array(service.ports.iter().map(|p| Value::from(*p)).collect()),
                    );
                    props.insert(
                        "environment".to_string(),
                        json_string_property(&Value::Object(service.environment.clone())),
                    );
                    props.insert(
                        "depends_on".to_string(),
                        Value::Array(
                            service
                                .depends_on
                                .iter()
                                .map(|name| Value::from(name.as_str()))
                                .collect(),
                        ),
                    );
                    child_row(root_id, &service.service_id, props)
                })
                .collect();
            statements.push(attach_children(
                "InfrastructureModelIR",
                "infrastructure_model_id",
                "HAS_SERVICE",
                "ContainerService",
                "service_id",
                service_rows,
                stamp,
            ));

            let dependency_rows: Vec<Value> = infrastructure
                .services
                .iter()
                .flat_map(|service| {
                    service.depends_on.iter().map(|dependency| {
                        edge_row(
                            &service.service_id,
                            &ids::child_id(root_id, "service", dependency),
                            None,
                            JsonMap::new(),
                        )
                    })
                })
                .collect();
            if !dependency_rows.is_empty() {
                statements.push(connect(
                    "ContainerService",
                    "service_id",
                    "ContainerService",
                    "service_id",
                    "DEPENDS_ON",
                    None,
                    dependency_rows,
                    stamp,
                ));
            }
        }

        if let Some(observability) = &infrastructure.observability {
            let mut props = JsonMap::new();
            props.insert(
                "logging_level".to_string(),
                Value::from(observability.logging_level.as_str()),
            );
            props.insert(
                "metrics_enabled".to_string(),
                Value::from(observability.metrics_enabled),
            );
            props.insert(
                "tracing_enabled".to_string(),
                Value::from(observability.tracing_enabled),
            );
            props.insert(
                "options".to_string(),
                json_string_property(&Value::Object(observability.options.clone())),
            );
            statements.push(attach_children(
                "InfrastructureModelIR",
                "infrastructure_model_id",
                "HAS_OBSERVABILITY_CONFIG",
                "ObservabilityConfig",
                "config_id",
                vec![child_row(root_id, &observability.config_id, props)],
                stamp,
            ));
        }

        statements
    }
}
