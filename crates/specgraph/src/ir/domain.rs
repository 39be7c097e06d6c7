//! Domain submodel: entities, attributes, and entity relationships.

use crate::error::ContractError;
use crate::ids;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregates the domain model. Owns its `Entity` children; entity
/// relationships are cross-entity reference edges and are merged, never
/// replaced, by the repositories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainModelIr {
    /// Canonical submodel id (`{app_id}|domain_model`).
    #[serde(default)]
    pub domain_model_id: String,
    /// Owned entities. A fully populated domain has at least one.
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// `RELATES_TO` edges keyed by (source, field_name, target).
    #[serde(default)]
    pub relations: Vec<EntityRelation>,
}

impl DomainModelIr {
    /// Recompute child ids from semantic keys and sort child collections.
    pub fn canonicalize(&mut self, app_id: &str) {
        self.domain_model_id = ids::submodel_id(app_id, "domain_model");
        self.entities.sort_by(|a, b| a.name.cmp(&b.name));
        self.relations.sort_by(|a, b| {
            (&a.source, &a.field_name, &a.target).cmp(&(&b.source, &b.field_name, &b.target))
        });
        for entity in &mut self.entities {
            entity.entity_id = ids::child_id(&self.domain_model_id, "entity", &entity.name);
            entity.attributes.sort_by(|a, b| a.name.cmp(&b.name));
            for attribute in &mut entity.attributes {
                attribute.attribute_id =
                    ids::child_id(&entity.entity_id, "attribute", &attribute.name);
            }
        }
    }

    /// Look up an owned entity by name.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// A domain entity. Every entity must own at least one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical entity id.
    #[serde(default)]
    pub entity_id: String,
    /// Entity name; unique within the domain model.
    pub name: String,
    /// Free-form description from the spec.
    #[serde(default)]
    pub description: String,
    /// Whether this entity is an aggregate root.
    #[serde(default)]
    pub is_aggregate_root: bool,
    /// Owned attributes.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Entity {
    /// A new entity with no attributes. The id is assigned by
    /// canonicalization.
    #[must_use]
    pub fn new(name: &str, description: &str, is_aggregate_root: bool) -> Self {
        Self {
            entity_id: String::new(),
            name: name.to_string(),
            description: description.to_string(),
            is_aggregate_root,
            attributes: Vec::new(),
        }
    }
}

/// A single attribute of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Canonical attribute id.
    #[serde(default)]
    pub attribute_id: String,
    /// Attribute name; unique within its entity.
    pub name: String,
    /// Declared data type (spec-level, e.g. "string", "decimal").
    pub data_type: String,
    /// Whether this attribute is part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
    /// Whether null values are permitted.
    #[serde(default)]
    pub is_nullable: bool,
    /// Whether values must be unique across the entity.
    #[serde(default)]
    pub is_unique: bool,
    /// Optional default value rendered as text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Opaque constraint bag; validated structurally, not interpreted.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub constraints: Map<String, Value>,
}

impl Attribute {
    /// A plain attribute with the given name and type.
    #[must_use]
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            attribute_id: String::new(),
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_primary_key: false,
            is_nullable: false,
            is_unique: false,
            default_value: None,
            constraints: Map::new(),
        }
    }
}

/// Cardinality of a `RELATES_TO` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// One source row maps to at most one target row.
    OneToOne,
    /// One source row maps to many target rows.
    OneToMany,
    /// Many-to-many through an implicit association.
    ManyToMany,
}

impl RelationKind {
    /// Wire representation stored on the relationship.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneToOne => "one_to_one",
            RelationKind::OneToMany => "one_to_many",
            RelationKind::ManyToMany => "many_to_many",
        }
    }

    /// Parse the wire representation.
    pub fn parse(value: &str) -> Result<Self, ContractError> {
        match value {
            "one_to_one" => Ok(RelationKind::OneToOne),
            "one_to_many" => Ok(RelationKind::OneToMany),
            "many_to_many" => Ok(RelationKind::ManyToMany),
            other => Err(ContractError::UnknownEnumValue {
                label: "RELATES_TO".to_string(),
                property: "type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A `RELATES_TO` edge between two entities, keyed by
/// (source entity, field name, target entity). Never keyed by
/// engine-internal node handles; cycles between entities are expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelation {
    /// Source entity name.
    pub source: String,
    /// Target entity name.
    pub target: String,
    /// Relationship cardinality.
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Field on the source side holding the reference.
    pub field_name: String,
    /// Optional reverse field on the target side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_populates: Option<String>,
}
