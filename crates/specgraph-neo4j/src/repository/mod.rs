//! # IR Repositories
//!
//! One repository per IR submodel, all built on the same base: batched
//! MERGE upserts keyed on deterministic identifiers, subgraph-replace for
//! owned hierarchies, and merge-only semantics for cross-entity reference
//! edges.
//!
//! Subgraph-replace here keeps node identity stable: children whose
//! semantic id survives are updated in place (preserving `created_at`),
//! children absent from the new tree are detach-deleted together with
//! their owned descendants. Cross-entity edges (`RELATES_TO`,
//! `TARGETS_ENTITY`, `USES_FIELD`, `VALIDATES_*`, `DEPENDS_ON`) are merged
//! so curated metadata on surviving nodes is never silently lost.
//!
//! Every repository exposes a pure `plan` producing the statement list for
//! one submodel; the store facade concatenates the plans of all submodels
//! and commits them in a single transaction, which is what guarantees
//! readers see either the full pre-image or the full post-image of a save.

pub mod api;
pub mod behavior;
pub mod domain;
pub mod infrastructure;
pub mod tests_model;

pub use api::ApiRepository;
pub use behavior::BehaviorRepository;
pub use domain::DomainRepository;
pub use infrastructure::InfrastructureRepository;
pub use tests_model::TestsRepository;
pub mod validation;
pub use validation::ValidationRepository;

use crate::statement::{JsonMap, Statement};
use crate::temporal::{on_create_fragment, on_write_fragment, TemporalStamp};
use serde_json::Value;
use specgraph::error::{EngineError, PersistenceError, StoreError};

/// Map an engine failure that survived the retry budget onto the
/// persistence taxonomy: the engine rolled the transaction back, so the
/// caller sees an invariant-preserving `WriteFailed`.
pub(crate) fn surface_write_failure(error: StoreError) -> StoreError {
    match error {
        StoreError::Engine(EngineError::Transient { reason }) => {
            PersistenceError::WriteFailed {
                reason: format!("retry budget exhausted: {reason}"),
            }
            .into()
        }
        other => other,
    }
}

/// Whether `name` is safe to splice into Cypher as a label, relationship
/// type, or property name. Parameterization does not cover identifiers, so
/// everything spliced goes through this guard.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn guard(name: &str) {
    debug_assert!(is_valid_identifier(name), "invalid identifier: {name}");
}

/// Row for [`attach_children`]: the parent's key value, the child's id,
/// and the child's scalar properties.
#[must_use]
pub fn child_row(parent: &str, id: &str, props: JsonMap) -> Value {
    let mut row = JsonMap::new();
    row.insert("parent".to_string(), Value::from(parent));
    row.insert("id".to_string(), Value::from(id));
    row.insert("props".to_string(), Value::Object(props));
    Value::Object(row)
}

/// Row for [`connect`]: semantic keys of both ends, an optional edge key,
/// and edge properties.
#[must_use]
pub fn edge_row(from: &str, to: &str, key: Option<&str>, props: JsonMap) -> Value {
    let mut row = JsonMap::new();
    row.insert("from".to_string(), Value::from(from));
    row.insert("to".to_string(), Value::from(to));
    if let Some(key) = key {
        row.insert("key".to_string(), Value::from(key));
    }
    row.insert("props".to_string(), Value::Object(props));
    Value::Object(row)
}

/// Pack a JSON object into a single string property. Graph properties are
/// scalars or arrays of scalars; opaque maps (constraint bags, fixtures)
/// are stored as JSON text and unpacked by the loader.
#[must_use]
pub fn json_string_property(value: &Value) -> Value {
    Value::String(value.to_string())
}

/// Upsert the `ApplicationIR` root in place. The root is never part of a
/// subgraph-replace.
#[must_use]
pub fn upsert_application_root(app_id: &str, props: JsonMap, stamp: &TemporalStamp) -> Statement {
    let statement = Statement::new(format!(
        "MERGE (app:ApplicationIR {{app_id: $app_id}}) \
         ON CREATE SET {} \
         SET app += $props, {}",
        on_create_fragment("app"),
        on_write_fragment("app"),
    ))
    .param("app_id", app_id)
    .param("props", Value::Object(props))
    .idempotent();
    stamp.bind(statement)
}

/// Upsert a submodel root and its `HAS_*` edge from the application root.
#[must_use]
pub fn upsert_submodel_root(
    app_id: &str,
    rel_type: &str,
    label: &str,
    key_prop: &str,
    root_id: &str,
    stamp: &TemporalStamp,
) -> Statement {
    guard(rel_type);
    guard(label);
    guard(key_prop);
    let statement = Statement::new(format!(
        "MATCH (app:ApplicationIR {{app_id: $app_id}}) \
         MERGE (m:{label} {{{key_prop}: $root_id}}) \
         ON CREATE SET {} \
         SET {} \
         MERGE (app)-[:{rel_type}]->(m)",
        on_create_fragment("m"),
        on_write_fragment("m"),
    ))
    .param("app_id", app_id)
    .param("root_id", root_id)
    .idempotent();
    stamp.bind(statement)
}

/// One cascade hop below a deleted child: descendants reached through
/// `rel_type` are deleted together with the child.
#[derive(Debug, Clone, Copy)]
pub struct CascadeHop {
    /// Relationship from the child to the descendant.
    pub rel_type: &'static str,
    /// Label of the descendant.
    pub label: &'static str,
}

/// Delete children absent from the new tree, cascading to their owned
/// descendants. Children whose id is in `keep_ids` survive untouched.
#[must_use]
pub fn delete_absent_children(
    parent_label: &str,
    parent_key: &str,
    parent_id: &str,
    rel_type: &str,
    child_label: &str,
    child_key: &str,
    keep_ids: Vec<String>,
    cascade: &[CascadeHop],
) -> Statement {
    for name in [parent_label, parent_key, rel_type, child_label, child_key] {
        guard(name);
    }
    let mut text = format!(
        "MATCH (p:{parent_label} {{{parent_key}: $parent_id}})-[:{rel_type}]->(c:{child_label}) \
         WHERE NOT c.{child_key} IN $keep_ids"
    );
    let mut doomed = Vec::new();
    for (index, hop) in cascade.iter().enumerate() {
        guard(hop.rel_type);
        guard(hop.label);
        let alias = format!("g{index}");
        text.push_str(&format!(
            " OPTIONAL MATCH (c)-[:{}]->({alias}:{})",
            hop.rel_type, hop.label
        ));
        doomed.push(alias);
    }
    doomed.push("c".to_string());
    text.push_str(&format!(" DETACH DELETE {}", doomed.join(", ")));
    Statement::new(text)
        .param("parent_id", parent_id)
        .param(
            "keep_ids",
            Value::Array(keep_ids.into_iter().map(Value::from).collect()),
        )
        .idempotent()
}

/// Delete descendants at the end of `path` that are absent from the new
/// tree, scoped to one submodel root. Used for grandchildren whose parent
/// survives a replace (e.g. attributes of a kept entity).
#[must_use]
pub fn delete_absent_descendants(
    root_label: &str,
    root_key: &str,
    root_id: &str,
    path: &[(&str, &str)],
    target_key: &str,
    keep_ids: Vec<String>,
) -> Statement {
    for name in [root_label, root_key, target_key] {
        guard(name);
    }
    let mut pattern = format!("(r:{root_label} {{{root_key}: $root_id}})");
    for (index, (rel_type, label)) in path.iter().enumerate() {
        guard(rel_type);
        guard(label);
        if index + 1 == path.len() {
            pattern.push_str(&format!("-[:{rel_type}]->(t:{label})"));
        } else {
            pattern.push_str(&format!("-[:{rel_type}]->(:{label})"));
        }
    }
    Statement::new(format!(
        "MATCH {pattern} WHERE NOT t.{target_key} IN $keep_ids DETACH DELETE t"
    ))
    .param("root_id", root_id)
    .param(
        "keep_ids",
        Value::Array(keep_ids.into_iter().map(Value::from).collect()),
    )
    .idempotent()
}

/// Batched child upsert under per-row parents. Rows come from
/// [`child_row`]; create paths set `created_at`, update paths refresh
/// `updated_at` / `updated_by` and leave `created_at` alone.
#[must_use]
pub fn attach_children(
    parent_label: &str,
    parent_key: &str,
    rel_type: &str,
    child_label: &str,
    child_key: &str,
    rows: Vec<Value>,
    stamp: &TemporalStamp,
) -> Statement {
    for name in [parent_label, parent_key, rel_type, child_label, child_key] {
        guard(name);
    }
    let statement = Statement::new(format!(
        "UNWIND $rows AS row \
         MATCH (p:{parent_label} {{{parent_key}: row.parent}}) \
         MERGE (c:{child_label} {{{child_key}: row.id}}) \
         ON CREATE SET {} \
         SET c += row.props, {} \
         MERGE (p)-[:{rel_type}]->(c)",
        on_create_fragment("c"),
        on_write_fragment("c"),
    ))
    .param("rows", Value::Array(rows))
    .idempotent();
    stamp.bind(statement)
}

/// Batched MERGE of a homogeneous node set keyed by `key_prop`.
#[must_use]
pub fn batch_upsert(
    label: &str,
    key_prop: &str,
    rows: Vec<Value>,
    stamp: &TemporalStamp,
) -> Statement {
    guard(label);
    guard(key_prop);
    let statement = Statement::new(format!(
        "UNWIND $rows AS row \
         MERGE (n:{label} {{{key_prop}: row.id}}) \
         ON CREATE SET {} \
         SET n += row.props, {}",
        on_create_fragment("n"),
        on_write_fragment("n"),
    ))
    .param("rows", Value::Array(rows))
    .idempotent();
    stamp.bind(statement)
}

/// Batched relationship merge keyed by semantic identifiers, never by
/// engine-internal handles. With `rel_key`, the edge identity includes the
/// row's `key` value (e.g. `RELATES_TO {field_name}`), so parallel edges
/// with distinct keys coexist.
#[must_use]
pub fn connect(
    from_label: &str,
    from_key: &str,
    to_label: &str,
    to_key: &str,
    rel_type: &str,
    rel_key: Option<&str>,
    rows: Vec<Value>,
    stamp: &TemporalStamp,
) -> Statement {
    for name in [from_label, from_key, to_label, to_key, rel_type] {
        guard(name);
    }
    let edge_pattern = match rel_key {
        Some(key) => {
            guard(key);
            format!("[e:{rel_type} {{{key}: row.key}}]")
        }
        None => format!("[e:{rel_type}]"),
    };
    let statement = Statement::new(format!(
        "UNWIND $rows AS row \
         MATCH (a:{from_label} {{{from_key}: row.from}}) \
         MATCH (b:{to_label} {{{to_key}: row.to}}) \
         MERGE (a)-{edge_pattern}->(b) \
         ON CREATE SET {} \
         SET e += row.props, {}",
        on_create_fragment("e"),
        on_write_fragment("e"),
    ))
    .param("rows", Value::Array(rows))
    .idempotent();
    stamp.bind(statement)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use specgraph::actor::Actor;

    fn stamp() -> TemporalStamp {
        TemporalStamp::at(1_700_000_000_000, Actor::Pipeline)
    }

    // ========== Identifier Guard Tests ==========

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("Entity"));
        assert!(is_valid_identifier("HAS_ATTRIBUTE"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("entity_id"));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("has-attr"));
        assert!(!is_valid_identifier("a b"));
        assert!(!is_valid_identifier("n` DETACH DELETE x //"));
    }

    // ========== Row Helper Tests ==========

    #[test]
    fn test_child_row_shape() {
        let mut props = JsonMap::new();
        props.insert("name".to_string(), Value::from("price"));
        let row = child_row("E1", "A1", props);
        assert_eq!(row["parent"], "E1");
        assert_eq!(row["id"], "A1");
        assert_eq!(row["props"]["name"], "price");
    }

    #[test]
    fn test_edge_row_with_and_without_key() {
        let with_key = edge_row("a", "b", Some("items"), JsonMap::new());
        assert_eq!(with_key["key"], "items");
        let without = edge_row("a", "b", None, JsonMap::new());
        assert!(without.get("key").is_none());
    }

    #[test]
    fn test_json_string_property_packs_compactly() {
        let value = serde_json::json!({"min": 0, "max": 10});
        let packed = json_string_property(&value);
        let text = packed.as_str().unwrap();
        let back: Value = serde_json::from_str(text).unwrap();
        assert_eq!(back, value);
    }

    // ========== Root Upsert Tests ==========

    #[test]
    fn test_application_root_preserves_created_at() {
        let statement = upsert_application_root("A1", JsonMap::new(), &stamp());
        assert!(statement.text.contains("MERGE (app:ApplicationIR {app_id: $app_id})"));
        assert!(statement.text.contains("ON CREATE SET app.created_at = $now"));
        assert!(statement.text.contains("app.updated_at = $now"));
        assert!(!statement.text.contains("SET app.created_at = $now,"));
        assert_eq!(statement.params["now"], 1_700_000_000_000i64);
        assert_eq!(statement.params["actor"], "pipeline");
    }

    #[test]
    fn test_submodel_root_links_to_application() {
        let statement = upsert_submodel_root(
            "A1",
            "HAS_DOMAIN_MODEL",
            "DomainModelIR",
            "domain_model_id",
            "A1|domain_model",
            &stamp(),
        );
        assert!(statement.text.contains("MATCH (app:ApplicationIR {app_id: $app_id})"));
        assert!(statement.text.contains("MERGE (m:DomainModelIR {domain_model_id: $root_id})"));
        assert!(statement.text.contains("MERGE (app)-[:HAS_DOMAIN_MODEL]->(m)"));
        assert_eq!(statement.params["root_id"], "A1|domain_model");
    }

    // ========== Replace / Delete Tests ==========

    #[test]
    fn test_delete_absent_children_cascades() {
        let statement = delete_absent_children(
            "DomainModelIR",
            "domain_model_id",
            "A1|domain_model",
            "HAS_ENTITY",
            "Entity",
            "entity_id",
            vec!["A1|domain_model|entity|Product".to_string()],
            &[CascadeHop {
                rel_type: "HAS_ATTRIBUTE",
                label: "Attribute",
            }],
        );
        assert!(statement.text.contains("WHERE NOT c.entity_id IN $keep_ids"));
        assert!(statement.text.contains("OPTIONAL MATCH (c)-[:HAS_ATTRIBUTE]->(g0:Attribute)"));
        assert!(statement.text.contains("DETACH DELETE g0, c"));
        assert_eq!(
            statement.params["keep_ids"],
            serde_json::json!(["A1|domain_model|entity|Product"])
        );
    }

    #[test]
    fn test_delete_absent_children_without_cascade() {
        let statement = delete_absent_children(
            "BehaviorModelIR",
            "behavior_model_id",
            "x",
            "HAS_INVARIANT",
            "Invariant",
            "invariant_id",
            vec![],
            &[],
        );
        assert!(statement.text.ends_with("DETACH DELETE c"));
        assert!(!statement.text.contains("OPTIONAL MATCH"));
    }

    #[test]
    fn test_delete_absent_descendants_builds_path() {
        let statement = delete_absent_descendants(
            "DomainModelIR",
            "domain_model_id",
            "A1|domain_model",
            &[("HAS_ENTITY", "Entity"), ("HAS_ATTRIBUTE", "Attribute")],
            "attribute_id",
            vec!["keep".to_string()],
        );
        assert!(statement.text.contains(
            "(r:DomainModelIR {domain_model_id: $root_id})-[:HAS_ENTITY]->(:Entity)-[:HAS_ATTRIBUTE]->(t:Attribute)"
        ));
        assert!(statement.text.contains("WHERE NOT t.attribute_id IN $keep_ids"));
    }

    // ========== Attach / Connect Tests ==========

    #[test]
    fn test_attach_children_statement_shape() {
        let rows = vec![child_row("E1", "A1", JsonMap::new())];
        let statement = attach_children(
            "Entity",
            "entity_id",
            "HAS_ATTRIBUTE",
            "Attribute",
            "attribute_id",
            rows,
            &stamp(),
        );
        assert!(statement.text.starts_with("UNWIND $rows AS row"));
        assert!(statement.text.contains("MATCH (p:Entity {entity_id: row.parent})"));
        assert!(statement.text.contains("MERGE (c:Attribute {attribute_id: row.id})"));
        assert!(statement.text.contains("ON CREATE SET c.created_at = $now"));
        assert!(statement.text.contains("SET c += row.props, c.updated_at = $now"));
        assert!(statement.text.contains("MERGE (p)-[:HAS_ATTRIBUTE]->(c)"));
        assert!(statement.idempotent);
    }

    #[test]
    fn test_batch_upsert_statement_shape() {
        let statement = batch_upsert("Pattern", "pattern_id", vec![], &stamp());
        assert!(statement.text.contains("MERGE (n:Pattern {pattern_id: row.id})"));
    }

    #[test]
    fn test_connect_without_rel_key() {
        let statement = connect(
            "Endpoint",
            "endpoint_id",
            "APISchema",
            "schema_id",
            "REQUEST_SCHEMA",
            None,
            vec![],
            &stamp(),
        );
        assert!(statement.text.contains("MERGE (a)-[e:REQUEST_SCHEMA]->(b)"));
        assert!(statement.text.contains("ON CREATE SET e.created_at = $now"));
    }

    #[test]
    fn test_connect_with_rel_key_scopes_edge_identity() {
        let statement = connect(
            "Entity",
            "entity_id",
            "Entity",
            "entity_id",
            "RELATES_TO",
            Some("field_name"),
            vec![],
            &stamp(),
        );
        assert!(statement
            .text
            .contains("MERGE (a)-[e:RELATES_TO {field_name: row.key}]->(b)"));
    }
}
