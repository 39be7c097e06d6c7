//! Scriptable in-memory engine for statement-level tests.
//!
//! [`RecordingEngine`] implements [`GraphEngine`] without a database: it
//! records every statement it is handed, serves canned records matched by
//! substring, and injects failures on demand. Repository, migration,
//! loader, and facade tests assert against the recorded Cypher and
//! parameters the way the driver would see them.

use crate::engine::GraphEngine;
use crate::statement::{JsonMap, Statement};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use specgraph::error::{StoreError, StoreResult};

/// One call observed by the engine.
#[derive(Debug, Clone)]
pub enum RecordedCall {
    /// `execute` with one statement.
    Execute(Statement),
    /// `run` with one statement.
    Run(Statement),
    /// `run_atomic` with a statement group.
    Atomic(Vec<Statement>),
    /// `run_batched` with the template statement and full row set.
    Batched {
        /// The template statement.
        statement: Statement,
        /// All rows, before chunking.
        rows: Vec<Value>,
        /// The configured chunk size.
        batch_size: usize,
    },
}

enum Response {
    /// Canned records.
    Records(Vec<JsonMap>),
    /// A single record with `column` set to the statement's `param` value,
    /// for conditional-update handshakes (e.g. the migration lock).
    ParamEcho {
        column: String,
        param: String,
    },
}

struct ExecRule {
    needle: String,
    response: Response,
    once: bool,
    used: bool,
}

struct FailRule {
    needle: String,
    skip: usize,
    error: Option<StoreError>,
}

/// Scriptable [`GraphEngine`] double.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<RecordedCall>>,
    exec_rules: Mutex<Vec<ExecRule>>,
    fail_rules: Mutex<Vec<FailRule>>,
}

impl RecordingEngine {
    /// An engine that records everything and returns empty results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` for every executed statement whose text contains
    /// `needle`. Later rules win over earlier ones.
    pub fn respond_with(&self, needle: &str, records: Vec<JsonMap>) {
        self.exec_rules.lock().push(ExecRule {
            needle: needle.to_string(),
            response: Response::Records(records),
            once: false,
            used: false,
        });
    }

    /// Serve `records` for the first matching statement only; subsequent
    /// matches fall through to other rules. One-shot rules are consumed in
    /// registration order.
    pub fn respond_once(&self, needle: &str, records: Vec<JsonMap>) {
        self.exec_rules.lock().push(ExecRule {
            needle: needle.to_string(),
            response: Response::Records(records),
            once: true,
            used: false,
        });
    }

    /// Serve a single record whose `column` mirrors the statement's
    /// `param` binding. This is how conditional-update handshakes (the
    /// migration lock returning `locked_by = $owner`) are scripted without
    /// knowing the caller's generated owner id.
    pub fn respond_with_param_echo(&self, needle: &str, column: &str, param: &str) {
        self.exec_rules.lock().push(ExecRule {
            needle: needle.to_string(),
            response: Response::ParamEcho {
                column: column.to_string(),
                param: param.to_string(),
            },
            once: false,
            used: false,
        });
    }

    /// Fail the first call whose statement text contains `needle`.
    pub fn fail_matching(&self, needle: &str, error: StoreError) {
        self.fail_on_nth(needle, 1, error);
    }

    /// Fail the `nth` (1-based) call whose statement text contains
    /// `needle`; earlier matches succeed.
    pub fn fail_on_nth(&self, needle: &str, nth: usize, error: StoreError) {
        self.fail_rules.lock().push(FailRule {
            needle: needle.to_string(),
            skip: nth.saturating_sub(1),
            error: Some(error),
        });
    }

    /// All recorded calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Every statement seen, flattened in order.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.calls
            .lock()
            .iter()
            .flat_map(|call| match call {
                RecordedCall::Execute(s) | RecordedCall::Run(s) => vec![s.clone()],
                RecordedCall::Atomic(group) => group.clone(),
                RecordedCall::Batched { statement, .. } => vec![statement.clone()],
            })
            .collect()
    }

    /// Number of recorded statements whose text contains `needle`.
    #[must_use]
    pub fn count_matching(&self, needle: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.text.contains(needle))
            .count()
    }

    /// Whether any recorded statement's text contains `needle`.
    #[must_use]
    pub fn saw(&self, needle: &str) -> bool {
        self.count_matching(needle) > 0
    }

    fn check_fail(&self, text: &str) -> StoreResult<()> {
        let mut rules = self.fail_rules.lock();
        for rule in rules.iter_mut() {
            if rule.error.is_some() && text.contains(&rule.needle) {
                if rule.skip > 0 {
                    rule.skip -= 1;
                } else if let Some(error) = rule.error.take() {
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, statement: &Statement) -> Vec<JsonMap> {
        let mut rules = self.exec_rules.lock();
        // One-shot rules are consumed in registration order before the
        // persistent rules are consulted (latest persistent rule wins).
        let once_index = rules
            .iter()
            .position(|rule| rule.once && !rule.used && statement.text.contains(&rule.needle));
        let rule = match once_index {
            Some(index) => {
                rules[index].used = true;
                &rules[index]
            }
            None => {
                let Some(rule) = rules
                    .iter()
                    .rev()
                    .find(|rule| !rule.once && statement.text.contains(&rule.needle))
                else {
                    return Vec::new();
                };
                rule
            }
        };
        match &rule.response {
            Response::Records(records) => records.clone(),
            Response::ParamEcho { column, param } => {
                let mut record = JsonMap::new();
                record.insert(
                    column.clone(),
                    statement.params.get(param).cloned().unwrap_or(Value::Null),
                );
                vec![record]
            }
        }
    }
}

#[async_trait]
impl GraphEngine for RecordingEngine {
    async fn execute(&self, statement: Statement) -> StoreResult<Vec<JsonMap>> {
        self.check_fail(&statement.text)?;
        let records = self.lookup(&statement);
        self.calls.lock().push(RecordedCall::Execute(statement));
        Ok(records)
    }

    async fn run(&self, statement: Statement) -> StoreResult<()> {
        self.check_fail(&statement.text)?;
        self.calls.lock().push(RecordedCall::Run(statement));
        Ok(())
    }

    async fn run_atomic(&self, statements: Vec<Statement>) -> StoreResult<()> {
        for statement in &statements {
            self.check_fail(&statement.text)?;
        }
        self.calls.lock().push(RecordedCall::Atomic(statements));
        Ok(())
    }

    async fn run_batched(
        &self,
        statement: Statement,
        rows: Vec<Value>,
        batch_size: usize,
    ) -> StoreResult<u64> {
        // Chunk-level failure injection mirrors the real engine: each chunk
        // is checked (and recorded) separately through the fail rules.
        let chunk_size = batch_size.max(1);
        let mut processed = 0u64;
        for chunk in rows.chunks(chunk_size) {
            self.check_fail(&statement.text)?;
            processed += chunk.len() as u64;
        }
        self.calls.lock().push(RecordedCall::Batched {
            statement,
            rows,
            batch_size,
        });
        Ok(processed)
    }
}
