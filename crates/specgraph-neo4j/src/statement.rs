//! Parameterized Cypher statements.
//!
//! A [`Statement`] is what crosses the engine seam: Cypher text, a JSON
//! parameter map, the columns the caller wants back, an optional timeout
//! override, and an idempotency marker. Keeping parameters as JSON makes
//! statements inspectable in tests without a live database; conversion to
//! Bolt happens inside the Neo4j engine.

use serde_json::{Map, Value};
use std::time::Duration;

/// JSON object used for statement parameters and result records.
pub type JsonMap = Map<String, Value>;

/// One parameterized Cypher statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Cypher text with `$name` placeholders.
    pub text: String,
    /// Parameter bindings.
    pub params: JsonMap,
    /// Columns to extract from each result row, in `RETURN` alias order.
    pub columns: Vec<String>,
    /// Per-statement timeout override.
    pub timeout: Option<Duration>,
    /// Whether re-running the statement is a no-op. Controls whether a
    /// timeout is classified as transient.
    pub idempotent: bool,
}

impl Statement {
    /// A statement with no parameters.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: JsonMap::new(),
            columns: Vec::new(),
            timeout: None,
            idempotent: false,
        }
    }

    /// Bind one parameter.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Merge a parameter map.
    #[must_use]
    pub fn params(mut self, params: JsonMap) -> Self {
        self.params.extend(params);
        self
    }

    /// Declare the columns to extract from result rows.
    #[must_use]
    pub fn returning(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Override the statement timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the statement as safe to re-run (MERGE-style semantics).
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_statement_is_bare() {
        let stmt = Statement::new("RETURN 1 AS one");
        assert_eq!(stmt.text, "RETURN 1 AS one");
        assert!(stmt.params.is_empty());
        assert!(stmt.columns.is_empty());
        assert!(stmt.timeout.is_none());
        assert!(!stmt.idempotent);
    }

    #[test]
    fn test_param_binding() {
        let stmt = Statement::new("MATCH (n {id: $id}) RETURN n")
            .param("id", "A1")
            .param("limit", 10);
        assert_eq!(stmt.params["id"], "A1");
        assert_eq!(stmt.params["limit"], 10);
    }

    #[test]
    fn test_params_merge_overwrites() {
        let mut extra = JsonMap::new();
        extra.insert("id".to_string(), Value::from("B2"));
        let stmt = Statement::new("x").param("id", "A1").params(extra);
        assert_eq!(stmt.params["id"], "B2");
    }

    #[test]
    fn test_returning_sets_columns() {
        let stmt = Statement::new("RETURN 1 AS one, 2 AS two").returning(&["one", "two"]);
        assert_eq!(stmt.columns, vec!["one", "two"]);
    }

    #[test]
    fn test_builder_flags() {
        let stmt = Statement::new("MERGE (n:X {id: $id})")
            .with_timeout(Duration::from_secs(5))
            .idempotent();
        assert_eq!(stmt.timeout, Some(Duration::from_secs(5)));
        assert!(stmt.idempotent);
    }
}
