//! Pre-write validation of an IR tree.
//!
//! Repositories refuse to issue a single statement for a tree that violates
//! the structural invariants, so a failed save leaves the graph untouched.
//! These checks are pure; the shape contract re-verifies the same
//! invariants against the persisted graph after migrations.

use crate::error::ContractError;
use crate::ir::{ApplicationIr, BehaviorModelIr, DomainModelIr, TestsModelIr};
use std::collections::{HashMap, HashSet};

/// Validate a full IR tree. Returns the first violation found, walking
/// submodels in declaration order.
pub fn validate_application(app: &ApplicationIr) -> Result<(), ContractError> {
    if let Some(domain) = &app.domain {
        validate_domain(domain)?;
    }
    if let Some(api) = &app.api {
        validate_api(api)?;
    }
    if let Some(behavior) = &app.behavior {
        validate_behavior(behavior)?;
    }
    if let Some(tests) = &app.tests {
        validate_tests(tests)?;
    }
    Ok(())
}

/// Every entity owns at least one attribute, entity names are unique, and
/// relations reference entities that exist.
pub fn validate_domain(domain: &DomainModelIr) -> Result<(), ContractError> {
    let mut names: HashSet<&str> = HashSet::new();
    for entity in &domain.entities {
        if !names.insert(entity.name.as_str()) {
            return Err(ContractError::DuplicateUniqueKey {
                label: "Entity".to_string(),
                key: entity.name.clone(),
            });
        }
        if entity.attributes.is_empty() {
            return Err(ContractError::Cardinality {
                label: "Entity".to_string(),
                detail: format!("entity {} has no attributes (requires at least 1)", entity.name),
            });
        }
        let mut attribute_names: HashSet<&str> = HashSet::new();
        for attribute in &entity.attributes {
            if !attribute_names.insert(attribute.name.as_str()) {
                return Err(ContractError::DuplicateUniqueKey {
                    label: "Attribute".to_string(),
                    key: format!("{}.{}", entity.name, attribute.name),
                });
            }
        }
    }
    for relation in &domain.relations {
        for endpoint in [&relation.source, &relation.target] {
            if !names.contains(endpoint.as_str()) {
                return Err(ContractError::MissingRequiredProperty {
                    label: "RELATES_TO".to_string(),
                    id: format!(
                        "{}-[{}]->{}",
                        relation.source, relation.field_name, relation.target
                    ),
                    property: "entity".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// `(path, method)` unique per API model; parameter, schema, and field
/// names unique within their parents; schema bindings resolve.
pub fn validate_api(api: &crate::ir::ApiModelIr) -> Result<(), ContractError> {
    let mut endpoint_keys: HashSet<String> = HashSet::new();
    let schema_names: HashSet<&str> = api.schemas.iter().map(|s| s.name.as_str()).collect();
    if schema_names.len() != api.schemas.len() {
        let mut seen = HashSet::new();
        for schema in &api.schemas {
            if !seen.insert(schema.name.as_str()) {
                return Err(ContractError::DuplicateUniqueKey {
                    label: "APISchema".to_string(),
                    key: schema.name.clone(),
                });
            }
        }
    }
    for schema in &api.schemas {
        let mut field_names: HashSet<&str> = HashSet::new();
        for field in &schema.fields {
            if !field_names.insert(field.name.as_str()) {
                return Err(ContractError::DuplicateUniqueKey {
                    label: "APISchemaField".to_string(),
                    key: format!("{}.{}", schema.name, field.name),
                });
            }
        }
    }
    for endpoint in &api.endpoints {
        if !endpoint_keys.insert(endpoint.semantic_key()) {
            return Err(ContractError::DuplicateUniqueKey {
                label: "Endpoint".to_string(),
                key: endpoint.semantic_key(),
            });
        }
        let mut parameter_names: HashSet<&str> = HashSet::new();
        for parameter in &endpoint.parameters {
            if !parameter_names.insert(parameter.name.as_str()) {
                return Err(ContractError::DuplicateUniqueKey {
                    label: "APIParameter".to_string(),
                    key: format!("{} {}", endpoint.semantic_key(), parameter.name),
                });
            }
        }
        for binding in [&endpoint.request_schema, &endpoint.response_schema]
            .into_iter()
            .flatten()
        {
            if !schema_names.contains(binding.as_str()) {
                return Err(ContractError::MissingRequiredProperty {
                    label: "APISchema".to_string(),
                    id: binding.clone(),
                    property: "name".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Step orders form a contiguous `1..N` permutation per flow; flow names
/// are unique.
pub fn validate_behavior(behavior: &BehaviorModelIr) -> Result<(), ContractError> {
    let mut flow_names: HashSet<&str> = HashSet::new();
    for flow in &behavior.flows {
        if !flow_names.insert(flow.name.as_str()) {
            return Err(ContractError::DuplicateUniqueKey {
                label: "Flow".to_string(),
                key: flow.name.clone(),
            });
        }
        let mut orders: Vec<i64> = flow.steps.iter().map(|s| s.order).collect();
        orders.sort_unstable();
        let contiguous = orders
            .iter()
            .enumerate()
            .all(|(index, order)| *order == index as i64 + 1);
        if !contiguous {
            return Err(ContractError::NonContiguousStepOrder {
                flow: flow.name.clone(),
                orders,
            });
        }
    }
    Ok(())
}

/// Seed entity names unique, dependencies resolve, and `DEPENDS_ON_SEED`
/// forms a DAG.
pub fn validate_tests(tests: &TestsModelIr) -> Result<(), ContractError> {
    let mut seed_names: HashSet<&str> = HashSet::new();
    for seed in &tests.seeds {
        if !seed_names.insert(seed.entity_name.as_str()) {
            return Err(ContractError::DuplicateUniqueKey {
                label: "SeedEntityIR".to_string(),
                key: seed.entity_name.clone(),
            });
        }
    }
    for seed in &tests.seeds {
        for dependency in &seed.dependencies {
            if !seed_names.contains(dependency.as_str()) {
                return Err(ContractError::MissingRequiredProperty {
                    label: "SeedEntityIR".to_string(),
                    id: dependency.clone(),
                    property: "entity_name".to_string(),
                });
            }
        }
    }
    if let Some(cycle) = find_seed_cycle(tests) {
        return Err(ContractError::SeedCycle { cycle });
    }
    Ok(())
}

/// Depth-first cycle search over `DEPENDS_ON_SEED`. Returns the cycle as a
/// closed path of entity names, or `None` for a DAG.
fn find_seed_cycle(tests: &TestsModelIr) -> Option<Vec<String>> {
    let adjacency: HashMap<&str, &[String]> = tests
        .seeds
        .iter()
        .map(|seed| (seed.entity_name.as_str(), seed.dependencies.as_slice()))
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, &'a [String]>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(node, Mark::InProgress);
        path.push(node);
        if let Some(deps) = adjacency.get(node) {
            for dep in deps.iter() {
                if let Some(cycle) = visit(dep.as_str(), adjacency, marks, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut path = Vec::new();
    for seed in &tests.seeds {
        if let Some(cycle) = visit(seed.entity_name.as_str(), &adjacency, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        ApiModelIr, ApiSchema, Attribute, Endpoint, Entity, EntityRelation, Flow, HttpMethod,
        RelationKind, SchemaSource, SeedEntity, Step,
    };

    fn domain_with(entities: Vec<Entity>) -> DomainModelIr {
        DomainModelIr {
            domain_model_id: String::new(),
            entities,
            relations: Vec::new(),
        }
    }

    fn entity_with_attr(name: &str) -> Entity {
        let mut entity = Entity::new(name, "", false);
        entity.attributes.push(Attribute::new("id", "uuid"));
        entity
    }

    // ========== Domain Tests ==========

    #[test]
    fn test_entity_without_attributes_is_rejected() {
        let domain = domain_with(vec![Entity::new("Product", "", true)]);
        let err = validate_domain(&domain).unwrap_err();
        assert!(matches!(err, ContractError::Cardinality { .. }));
    }

    #[test]
    fn test_duplicate_entity_name_is_rejected() {
        let domain = domain_with(vec![entity_with_attr("Product"), entity_with_attr("Product")]);
        let err = validate_domain(&domain).unwrap_err();
        assert!(matches!(err, ContractError::DuplicateUniqueKey { ref label, .. } if label == "Entity"));
    }

    #[test]
    fn test_duplicate_attribute_name_is_rejected() {
        let mut entity = entity_with_attr("Product");
        entity.attributes.push(Attribute::new("id", "uuid"));
        let domain = domain_with(vec![entity]);
        let err = validate_domain(&domain).unwrap_err();
        assert!(matches!(err, ContractError::DuplicateUniqueKey { ref label, .. } if label == "Attribute"));
    }

    #[test]
    fn test_relation_to_unknown_entity_is_rejected() {
        let mut domain = domain_with(vec![entity_with_attr("Order")]);
        domain.relations.push(EntityRelation {
            source: "Order".to_string(),
            target: "Ghost".to_string(),
            kind: RelationKind::OneToMany,
            field_name: "items".to_string(),
            back_populates: None,
        });
        let err = validate_domain(&domain).unwrap_err();
        assert!(matches!(err, ContractError::MissingRequiredProperty { .. }));
    }

    #[test]
    fn test_valid_domain_with_cyclic_relations_passes() {
        // RELATES_TO cycles between entities are legal; only seed
        // dependencies must be acyclic.
        let mut domain = domain_with(vec![entity_with_attr("A"), entity_with_attr("B")]);
        domain.relations.push(EntityRelation {
            source: "A".to_string(),
            target: "B".to_string(),
            kind: RelationKind::OneToMany,
            field_name: "bs".to_string(),
            back_populates: None,
        });
        domain.relations.push(EntityRelation {
            source: "B".to_string(),
            target: "A".to_string(),
            kind: RelationKind::OneToOne,
            field_name: "a".to_string(),
            back_populates: None,
        });
        assert!(validate_domain(&domain).is_ok());
    }

    // ========== API Tests ==========

    #[test]
    fn test_duplicate_endpoint_key_is_rejected() {
        let mut api = ApiModelIr::default();
        api.endpoints.push(Endpoint::new(HttpMethod::Get, "/p", "a"));
        api.endpoints.push(Endpoint::new(HttpMethod::Get, "/p", "b"));
        let err = validate_api(&api).unwrap_err();
        assert!(matches!(err, ContractError::DuplicateUniqueKey { ref label, .. } if label == "Endpoint"));
    }

    #[test]
    fn test_same_path_different_method_is_fine() {
        let mut api = ApiModelIr::default();
        api.endpoints.push(Endpoint::new(HttpMethod::Get, "/p", "a"));
        api.endpoints.push(Endpoint::new(HttpMethod::Post, "/p", "b"));
        assert!(validate_api(&api).is_ok());
    }

    #[test]
    fn test_unresolved_schema_binding_is_rejected() {
        let mut api = ApiModelIr::default();
        let mut endpoint = Endpoint::new(HttpMethod::Post, "/p", "create");
        endpoint.request_schema = Some("Missing".to_string());
        api.endpoints.push(endpoint);
        let err = validate_api(&api).unwrap_err();
        assert!(matches!(err, ContractError::MissingRequiredProperty { .. }));
    }

    #[test]
    fn test_resolved_schema_binding_passes() {
        let mut api = ApiModelIr::default();
        api.schemas.push(ApiSchema::new("In", SchemaSource::Manual));
        let mut endpoint = Endpoint::new(HttpMethod::Post, "/p", "create");
        endpoint.request_schema = Some("In".to_string());
        api.endpoints.push(endpoint);
        assert!(validate_api(&api).is_ok());
    }

    // ========== Behavior Tests ==========

    fn flow_with_orders(orders: &[i64]) -> BehaviorModelIr {
        let mut behavior = BehaviorModelIr::default();
        let mut flow = Flow::new("f", "job", "t");
        for order in orders {
            flow.steps.push(Step::new(*order, "act", "E"));
        }
        behavior.flows.push(flow);
        behavior
    }

    #[test]
    fn test_contiguous_steps_pass() {
        assert!(validate_behavior(&flow_with_orders(&[1, 2, 3])).is_ok());
    }

    #[test]
    fn test_unordered_but_contiguous_steps_pass() {
        assert!(validate_behavior(&flow_with_orders(&[3, 1, 2])).is_ok());
    }

    #[test]
    fn test_gap_in_steps_is_rejected() {
        let err = validate_behavior(&flow_with_orders(&[1, 3])).unwrap_err();
        assert!(matches!(err, ContractError::NonContiguousStepOrder { .. }));
    }

    #[test]
    fn test_zero_based_steps_are_rejected() {
        let err = validate_behavior(&flow_with_orders(&[0, 1])).unwrap_err();
        assert!(matches!(err, ContractError::NonContiguousStepOrder { .. }));
    }

    #[test]
    fn test_duplicate_step_order_is_rejected() {
        let err = validate_behavior(&flow_with_orders(&[1, 2, 2])).unwrap_err();
        assert!(matches!(err, ContractError::NonContiguousStepOrder { .. }));
    }

    #[test]
    fn test_empty_flow_passes() {
        assert!(validate_behavior(&flow_with_orders(&[])).is_ok());
    }

    // ========== Tests-Model Tests ==========

    fn seeds(defs: &[(&str, &[&str])]) -> TestsModelIr {
        let mut tests = TestsModelIr::default();
        for (name, deps) in defs {
            let mut seed = SeedEntity::new(name, name, 1);
            seed.dependencies = deps.iter().map(|d| (*d).to_string()).collect();
            tests.seeds.push(seed);
        }
        tests
    }

    #[test]
    fn test_seed_dag_passes() {
        let tests = seeds(&[("A", &[]), ("B", &["A"]), ("C", &["A", "B"])]);
        assert!(validate_tests(&tests).is_ok());
    }

    #[test]
    fn test_seed_two_cycle_is_rejected() {
        let tests = seeds(&[("A", &["B"]), ("B", &["A"])]);
        let err = validate_tests(&tests).unwrap_err();
        match err {
            ContractError::SeedCycle { cycle } => {
                assert!(cycle.len() >= 3);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_seed_self_cycle_is_rejected() {
        let tests = seeds(&[("A", &["A"])]);
        assert!(matches!(
            validate_tests(&tests).unwrap_err(),
            ContractError::SeedCycle { .. }
        ));
    }

    #[test]
    fn test_seed_unknown_dependency_is_rejected() {
        let tests = seeds(&[("A", &["Ghost"])]);
        assert!(matches!(
            validate_tests(&tests).unwrap_err(),
            ContractError::MissingRequiredProperty { .. }
        ));
    }

    #[test]
    fn test_duplicate_seed_entity_is_rejected() {
        let tests = seeds(&[("A", &[]), ("A", &[])]);
        assert!(matches!(
            validate_tests(&tests).unwrap_err(),
            ContractError::DuplicateUniqueKey { .. }
        ));
    }

    // ========== Whole-Tree Tests ==========

    #[test]
    fn test_validate_application_walks_submodels() {
        let mut app = ApplicationIr::new("A1", "shop", "1.0.0", "h");
        app.domain = Some(domain_with(vec![Entity::new("Bare", "", false)]));
        assert!(validate_application(&app).is_err());
        app.domain = Some(domain_with(vec![entity_with_attr("Ok")]));
        assert!(validate_application(&app).is_ok());
    }
}
