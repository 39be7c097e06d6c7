//! # Lineage Tracker
//!
//! Write primitives attaching provenance to the IR graph: spec artifacts
//! to IR roots, IR roots to generated files, and generated files to the
//! patterns they used. Hashes are opaque strings computed by the
//! collaborators; every write here is a MERGE keyed on them, so repeated
//! links are idempotent.
//!
//! The core only provides these primitives; downstream tooling drives
//! them.

use crate::engine::GraphEngine;
use crate::repository::edge_row;
use crate::statement::{JsonMap, Statement};
use crate::temporal::TemporalStamp;
use serde_json::Value;
use specgraph::actor::ActorContext;
use specgraph::error::StoreResult;
use std::sync::Arc;
use tracing::debug;

/// Lineage write primitives.
#[derive(Clone)]
pub struct LineageTracker {
    engine: Arc<dyn GraphEngine>,
}

impl LineageTracker {
    /// A tracker over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    /// Merge a `Spec {hash}` node and its `PRODUCES` edge to the IR root.
    pub async fn link_spec_to_ir(
        &self,
        spec_hash: &str,
        app_id: &str,
        context: &ActorContext,
    ) -> StoreResult<()> {
        let stamp = TemporalStamp::new(context)?;
        let statement = stamp.bind(
            Statement::new(
                "MATCH (app:ApplicationIR {app_id: $app_id}) \
                 MERGE (s:Spec {hash: $spec_hash}) \
                 ON CREATE SET s.created_at = $now \
                 SET s.updated_at = $now, s.updated_by = $actor \
                 MERGE (s)-[:PRODUCES]->(app)",
            )
            .param("app_id", app_id)
            .param("spec_hash", spec_hash)
            .idempotent(),
        );
        self.engine.run(statement).await?;
        debug!("linked spec {spec_hash} to application {app_id}");
        Ok(())
    }

    /// Merge a `GeneratedFile {path, content_hash}` node, its `GENERATES`
    /// edge from the IR root, and `USED_PATTERN` edges to each pattern.
    pub async fn link_generation(
        &self,
        app_id: &str,
        file_path: &str,
        content_hash: &str,
        patterns_used: &[String],
        context: &ActorContext,
    ) -> StoreResult<()> {
        let stamp = TemporalStamp::new(context)?;
        let file_statement = stamp.bind(
            Statement::new(
                "MATCH (app:ApplicationIR {app_id: $app_id}) \
                 MERGE (f:GeneratedFile {path: $path}) \
                 ON CREATE SET f.created_at = $now \
                 SET f.content_hash = $content_hash, f.updated_at = $now, \
                 f.updated_by = $actor \
                 MERGE (app)-[:GENERATES]->(f)",
            )
            .param("app_id", app_id)
            .param("path", file_path)
            .param("content_hash", content_hash)
            .idempotent(),
        );
        let mut statements = vec![file_statement];
        if !patterns_used.is_empty() {
            let rows: Vec<Value> = patterns_used
                .iter()
                .map(|pattern| edge_row(file_path, pattern, None, JsonMap::new()))
                .collect();
            statements.push(stamp.bind(
                Statement::new(
                    "UNWIND $rows AS row \
                     MATCH (f:GeneratedFile {path: row.from}) \
                     MERGE (p:Pattern {pattern_id: row.to}) \
                     ON CREATE SET p.created_at = $now \
                     SET p.updated_at = $now, p.updated_by = $actor \
                     MERGE (f)-[:USED_PATTERN]->(p)",
                )
                .param("rows", Value::Array(rows))
                .idempotent(),
            ));
        }
        self.engine.run_atomic(statements).await?;
        debug!("linked generated file {file_path} for {app_id}");
        Ok(())
    }

    /// Record a generation or repair error against a generated file, and
    /// optionally against the pattern that produced it.
    pub async fn link_error(
        &self,
        file_path: &str,
        error_type: &str,
        message: &str,
        pattern_id: Option<&str>,
        context: &ActorContext,
    ) -> StoreResult<()> {
        let stamp = TemporalStamp::new(context)?;
        let mut text = String::from(
            "MATCH (f:GeneratedFile {path: $path}) \
             CREATE (e:GenerationError {error_type: $error_type, message: $message, \
             created_at: $now, updated_at: $now, updated_by: $actor}) \
             CREATE (f)-[:HAD_ERROR]->(e)",
        );
        if pattern_id.is_some() {
            text.push_str(
                " WITH e MATCH (p:Pattern {pattern_id: $pattern_id}) \
                 MERGE (e)-[:BLAMES_PATTERN]->(p)",
            );
        }
        let mut statement = Statement::new(text)
            .param("path", file_path)
            .param("error_type", error_type)
            .param("message", message);
        if let Some(pattern) = pattern_id {
            statement = statement.param("pattern_id", pattern);
        }
        self.engine.run(stamp.bind(statement)).await
    }
}
