//! Domain submodel repository.
//!
//! Entities are a subgraph-replace set with cascade on `Attribute`;
//! deleting an entity also removes every `RELATES_TO` edge it sources
//! (DETACH DELETE). Surviving entities and attributes are updated in
//! place, and `RELATES_TO` edges are merged by
//! `(source entity, field_name, target entity)`.

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
use specgraph::ir::validate::validate_domain;
use specgraph::ir::{Attribute, DomainModelIr, Entity};
use std::sync::Arc;
use tracing::debug;

/// Repository for `DomainModelIR` subgraphs.
#[derive(Clone)]
pub struct DomainRepository {
    engine: Arc<dyn GraphEngine>,
}

impl DomainRepository {
    /// A repository over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Validate and persist one domain submodel in a single transaction.
    /// The model must be canonical (see `DomainModelIr::canonicalize`).
    pub async fn save(
        &self,
        app_id: &str,
        domain: &DomainModelIr,
        context: &ActorContext,
    ) -> StoreResult<()> {
        validate_domain(domain)?;
        let stamp = TemporalStamp::new(context)?;
        let statements = Self::plan(app_id, domain, &stamp);
        debug!(
            "saving domain model for {app_id}: {} entities, {} relations",
            domain.entities.len(),
            domain.relations.len()
        );
        self.engine
            .run_atomic(statements)
            .await
            .map_err(crate::repository::surface_write_failure)
    }

    /// Statement plan for one domain submodel. Pure; composed by the store
    /// facade into the application-wide save transaction.
    #[must_use]
    pub fn plan(app_id: &str, domain: &DomainModelIr, stamp: &TemporalStamp) -> Vec<Statement> {
        let root_id = &domain.domain_model_id;
        let mut statements = vec![upsert_submodel_root(
            app_id,
            "HAS_DOMAIN_MODEL",
            "DomainModelIR",
            "domain_model_id",
            root_id,
            stamp,
        )];

        // Remove entities absent from the new tree, with their attributes.
        let keep_entities: Vec<String> =
            domain.entities.iter().map(|e| e.entity_id.clone()).collect();
        statements.push(delete_absent_children(
            "DomainModelIR",
            "domain_model_id",
            root_id,
            "HAS_ENTITY",
            "Entity",
            "entity_id",
            keep_entities,
            &[CascadeHop {
                rel_type: "HAS_ATTRIBUTE",
                label: "Attribute",
            }],
        ));

        // Remove attributes absent from surviving entities.
        let keep_attributes: Vec<String> = domain
            .entities
            .iter()
            .flat_map(|e| e.attributes.iter().map(|a| a.attribute_id.clone()))
            .collect();
        statements.push(delete_absent_descendants(
            "DomainModelIR",
            "domain_model_id",
            root_id,
            &[("HAS_ENTITY", "Entity"), ("HAS_ATTRIBUTE", "Attribute")],
            "attribute_id",
            keep_attributes,
        ));

        // Entity relationships are re-derived from the tree on every save;
        // edges from deleted entities died with their source above, and
        // edges between surviving entities not present in the new tree are
        // removed here before the merge pass.
        let keep_relations: Vec<String> = domain
            .relations
            .iter()
            .map(|r| format!("{}|{}|{}", r.source, r.field_name, r.target))
            .collect();
        statements.push(
            Statement::new(
                "MATCH (dm:DomainModelIR {domain_model_id: $root_id})-[:HAS_ENTITY]->(s:Entity) \
                 MATCH (s)-[rel:RELATES_TO]->(t:Entity) \
                 WHERE NOT s.name + '|' + rel.field_name + '|' + t.name IN $keep_keys \
                 DELETE rel",
            )
            .param("root_id", root_id.as_str())
            .param(
                "keep_keys",
                Value::Array(keep_relations.into_iter().map(Value::from).collect()),
            )
            .idempotent(),
        );

        if !domain.entities.is_empty() {
            let entity_rows: Vec<Value> = domain
                .entities
                .iter()
                .map(|entity| child_row(root_id, &entity.entity_id, entity_props(entity)))
                .collect();
            statements.push(attach_children(
                "DomainModelIR",
                "domain_model_id",
                "HAS_ENTITY",
                "Entity",
                "entity_id",
                entity_rows,
                stamp,
            ));
        }

        let attribute_rows: Vec<Value> = domain
            .entities
            .iter()
            .flat_map(|entity| {
                entity.attributes.iter().map(|attribute| {
                    child_row(
                        &entity.entity_id,
                        &attribute.attribute_id,
                        attribute_props(attribute),
                    )
                })
            })
            .collect();
        if !attribute_rows.is_empty() {
            statements.push(attach_children(
                "Entity",
                "entity_id",
                "HAS_ATTRIBUTE",
                "Attribute",
                "attribute_id",
                attribute_rows,
                stamp,
            ));
        }

        if !domain.relations.is_empty() {
            let relation_rows: Vec<Value> = domain
                .relations
                .iter()
                .map(|relation| {
                    let mut props = JsonMap::new();
                    props.insert("type".to_string(), Value::from(relation.kind.as_str()));
                    props.insert(
                        "back_populates".to_string(),
                        relation
                            .back_populates
                            .as_deref()
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    );
                    edge_row(
                        &ids::child_id(root_id, "entity", &relation.source),
                        &ids::child_id(root_id, "entity", &relation.target),
                        Some(&relation.field_name),
                        props,
                    )
                })
                .collect();
            statements.push(connect(
                "Entity",
                "entity_id",
                "Entity",
                "entity_id",
                "RELATES_TO",
                Some("field_name"),
                relation_rows,
                stamp,
            ));
        }

        statements
    }
}

fn entity_props(entity: &Entity) -> JsonMap {
    let mut props = JsonMap::new();
    props.insert("name".to_string(), Value::from(entity.name.as_str()));
    props.insert(
        "description".to_string(),
        Value::from(entity.description.as_str()),
    );
    props.insert(
        "is_aggregate_root".to_string(),
        Value::from(entity.is_aggregate_root),
    );
    props
}

fn attribute_props(attribute: &Attribute) -> JsonMap {
    let mut props = JsonMap::new();
    props.insert("name".to_string(), Value::from(attribute.name.as_str()));
    props.insert(
        "data_type".to_string(),
        Value::from(attribute.data_type.as_str()),
    );
    props.insert(
        "is_primary_key".to_string(),
        Value::from(attribute.is_primary_key),
    );
    props.insert(
        "is_nullable".to_string(),
        Value::from(attribute.is_nullable),
    );
    props.insert("is_unique".to_string(), Value::from(attribute.is_unique));
    props.insert(
        "default_value".to_string(),
        attribute
            .default_value
            .as_deref()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    props.insert(
        "constraints".to_string(),
        json_string_property(&Value::Object(attribute.constraints.clone())),
    );
    props
}
