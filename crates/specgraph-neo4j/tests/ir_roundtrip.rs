//! Round-trip behavior of save and load: a saved canonical tree, read
//! back through the breadth query, is field-for-field equal to its input;
//! re-saving the same tree issues only MERGE-based statements.

mod common;

use common::{loader_record, sample_application};
use specgraph::actor::{Actor, ActorContext};
use specgraph_neo4j::test_support::{RecordedCall, RecordingEngine};
use specgraph_neo4j::{GraphEngine, IrGraphStore, StoreConfig};
use std::sync::Arc;

fn store(engine: &Arc<RecordingEngine>) -> IrGraphStore {
    IrGraphStore::with_engine(
        Arc::clone(engine) as Arc<dyn GraphEngine>,
        StoreConfig::default(),
        specgraph_neo4j::builtin_registry(),
    )
}

#[tokio::test]
async fn save_then_load_returns_equal_tree() {
    let engine = Arc::new(RecordingEngine::new());
    let store = store(&engine);
    let saved = store
        .save_application_ir(&sample_application(), &ActorContext::new(Actor::Pipeline))
        .await
        .unwrap();

    // Serve the breadth query with exactly the row the persisted graph
    // would produce for the saved tree.
    engine.respond_with(
        "MATCH (app:ApplicationIR {app_id: $app_id})",
        vec![loader_record(&saved)],
    );

    let loaded = store.load_application_ir("A1").await.unwrap();
    assert_eq!(*loaded, saved);
}

#[tokio::test]
async fn loaded_tree_preserves_merge_edge_payloads() {
    let engine = Arc::new(RecordingEngine::new());
    let store = store(&engine);
    let saved = store
        .save_application_ir(&sample_application(), &ActorContext::new(Actor::Pipeline))
        .await
        .unwrap();
    engine.respond_with(
        "MATCH (app:ApplicationIR {app_id: $app_id})",
        vec![loader_record(&saved)],
    );
    let loaded = store.load_application_ir("A1").await.unwrap();
    let endpoint = &loaded.api.as_ref().unwrap().endpoints[0];
    assert_eq!(endpoint.targets.len(), 1);
    assert!((endpoint.targets[0].confidence - 0.9).abs() < 1e-9);
    assert!(endpoint.targets[0].inferred);
    assert_eq!(
        endpoint.uses_fields,
        vec![("Product".to_string(), "name".to_string())]
    );
    assert_eq!(endpoint.response_schema.as_deref(), Some("ProductOut"));
}

#[tokio::test]
async fn repeated_save_issues_only_merge_writes() {
    // Saving the same tree twice must not create anything new: every
    // write statement merges on a deterministic key, and the delete
    // statements keep the full id set.
    let engine = Arc::new(RecordingEngine::new());
    let store = store(&engine);
    let context = ActorContext::new(Actor::Pipeline);
    let app = sample_application();
    store.save_application_ir(&app, &context).await.unwrap();
    store.save_application_ir(&app, &context).await.unwrap();

    for call in engine.calls() {
        let RecordedCall::Atomic(group) = call else {
            panic!("saves must be atomic");
        };
        for statement in group {
            // `ON CREATE SET` is the merge path; a bare CREATE clause
            // would mint new nodes on every save.
            if statement.text.contains("CREATE (") {
                panic!("save used CREATE instead of MERGE: {}", statement.text);
            }
            assert!(statement.idempotent, "non-idempotent: {}", statement.text);
        }
    }
}

#[tokio::test]
async fn second_save_with_extra_attribute_keeps_and_extends() {
    // Adding `sku` to Product must keep the existing attribute ids in the
    // keep set and add the new one, so `name`/`price` survive in place.
    let engine = Arc::new(RecordingEngine::new());
    let store = store(&engine);
    let context = ActorContext::new(Actor::Pipeline);
    let mut app = sample_application();
    store.save_application_ir(&app, &context).await.unwrap();

    app.domain.as_mut().unwrap().entities[1]
        .attributes
        .push(specgraph::ir::Attribute::new("sku", "string"));
    let saved = store.save_application_ir(&app, &context).await.unwrap();

    let calls = engine.calls();
    let RecordedCall::Atomic(group) = &calls[1] else {
        panic!("expected atomic save");
    };
    let delete_absent = group
        .iter()
        .find(|s| s.text.contains("WHERE NOT t.attribute_id IN $keep_ids"))
        .unwrap();
    let keep: Vec<&str> = delete_absent.params["keep_ids"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(keep.contains(&"A1|domain_model|entity|Product|attribute|name"));
    assert!(keep.contains(&"A1|domain_model|entity|Product|attribute|price"));
    assert!(keep.contains(&"A1|domain_model|entity|Product|attribute|sku"));

    // And the loaded post-image shows exactly the three attributes.
    engine.respond_with(
        "MATCH (app:ApplicationIR {app_id: $app_id})",
        vec![loader_record(&saved)],
    );
    let loaded = store.load_application_ir_uncached("A1").await.unwrap();
    let product = loaded
        .domain
        .as_ref()
        .unwrap()
        .entity("Product")
        .unwrap();
    let names: Vec<&str> = product.attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["name", "price", "sku"]);
}
