//! # Graph Engine Client
//!
//! Single point of access to the underlying property graph database.
//!
//! The [`GraphEngine`] trait is the seam every store component writes
//! through: one-shot statements, all-or-nothing statement groups via
//! [`run_atomic`], and UNWIND-expanded batches via [`run_batched`]. The
//! production implementation is [`Neo4jEngine`] on top of `neo4rs`; tests
//! substitute a recording engine.
//!
//! Engine failures are folded into two kinds: transient (safe to retry)
//! and fatal. Transient failures retry with bounded exponential backoff;
//! a timeout counts as transient only when the statement is idempotent.
//!
//! [`run_atomic`]: GraphEngine::run_atomic
//! [`run_batched`]: GraphEngine::run_batched

use crate::params::json_to_bolt;
use crate::statement::{JsonMap, Statement};
use async_trait::async_trait;
use futures::future::BoxFuture;
use neo4rs::{Graph, Query};
use serde_json::Value;
use specgraph::error::{EngineError, StoreError, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Default per-statement timeout.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for transient failures.
const MAX_RETRIES: usize = 4;

/// Base backoff delay in milliseconds.
const RETRY_BASE_MILLIS: u64 = 50;

tokio::task_local! {
    static IN_TRANSACTION: ();
}

/// Generic interface to the property graph database.
///
/// Implementations must be safe to share across tasks; the store holds one
/// engine per process.
#[async_trait]
pub trait GraphEngine: Send + Sync {
    /// Run a statement and collect its result records. Each record carries
    /// the columns declared on the statement.
    async fn execute(&self, statement: Statement) -> StoreResult<Vec<JsonMap>>;

    /// Run a statement, discarding results.
    async fn run(&self, statement: Statement) -> StoreResult<()>;

    /// Run all statements inside one transaction with commit-or-rollback
    /// on every exit path.
    async fn run_atomic(&self, statements: Vec<Statement>) -> StoreResult<()>;

    /// Expand the statement once per element of `rows`, chunked into
    /// batches. The statement must `UNWIND $rows AS row`. Each chunk runs
    /// in its own transaction; returns the number of rows processed.
    async fn run_batched(
        &self,
        statement: Statement,
        rows: Vec<Value>,
        batch_size: usize,
    ) -> StoreResult<u64>;
}

/// Whether a driver failure message indicates a retryable condition.
///
/// Neo4j encodes retryability in its error codes (`Neo.TransientError.*`);
/// connection-level failures from the driver are retryable as well.
fn is_transient_message(message: &str) -> bool {
    message.contains("TransientError")
        || message.contains("deadlock")
        || message.contains("Deadlock")
        || message.contains("connection")
        || message.contains("Connection")
        || message.contains("broken pipe")
        || message.contains("timed out")
}

fn classify(error: &neo4rs::Error) -> EngineError {
    let rendered = error.to_string();
    if is_transient_message(&rendered) {
        EngineError::Transient { reason: rendered }
    } else {
        EngineError::Fatal { reason: rendered }
    }
}

fn to_query(statement: &Statement) -> Query {
    let mut query = Query::new(statement.text.clone());
    for (name, value) in &statement.params {
        query = query.param(name, json_to_bolt(value));
    }
    query
}

/// Neo4j implementation of [`GraphEngine`].
///
/// Wraps a shared `neo4rs::Graph` connection pool. Cloning is cheap; all
/// clones share the pool.
#[derive(Clone)]
pub struct Neo4jEngine {
    graph: Arc<Graph>,
    statement_timeout: Duration,
}

impl Neo4jEngine {
    /// Connect to Neo4j.
    ///
    /// # Arguments
    ///
    /// * `uri` - Bolt URI, e.g. `bolt://localhost:7687`
    /// * `user` / `password` - credentials
    ///
    /// # Errors
    ///
    /// Returns a fatal engine error when the connection cannot be
    /// established.
    pub async fn connect(uri: &str, user: &str, password: &str) -> StoreResult<Self> {
        debug!("connecting to graph engine at {uri}");
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| EngineError::Fatal {
                reason: format!("failed to connect to Neo4j: {e}"),
            })?;
        Ok(Self {
            graph: Arc::new(graph),
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        })
    }

    /// Override the default statement timeout.
    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Run `work` inside one transaction. The transaction commits when
    /// `work` returns `Ok` and rolls back otherwise. Opening a second
    /// transaction inside `work` fails with
    /// `EngineError::NestedTransaction`.
    pub async fn with_transaction<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut GraphTransaction) -> BoxFuture<'t, StoreResult<T>> + Send,
    {
        if IN_TRANSACTION.try_with(|_| ()).is_ok() {
            return Err(EngineError::NestedTransaction.into());
        }
        let txn = self.graph.start_txn().await.map_err(|e| classify(&e))?;
        let mut transaction = GraphTransaction { txn: Some(txn) };
        IN_TRANSACTION
            .scope((), async move {
                match work(&mut transaction).await {
                    Ok(value) => {
                        transaction.commit().await?;
                        Ok(value)
                    }
                    Err(error) => {
                        transaction.rollback().await.ok();
                        Err(error)
                    }
                }
            })
            .await
    }

    fn timeout_for(&self, statement: &Statement) -> Duration {
        statement.timeout.unwrap_or(self.statement_timeout)
    }

    fn timeout_error(&self, statement: &Statement) -> EngineError {
        // A timed-out idempotent statement can simply be re-issued.
        if statement.idempotent {
            EngineError::Transient {
                reason: format!(
                    "statement timed out after {} ms",
                    self.timeout_for(statement).as_millis()
                ),
            }
        } else {
            EngineError::Timeout {
                timeout_ms: self.timeout_for(statement).as_millis() as u64,
            }
        }
    }

    async fn execute_once(&self, statement: &Statement) -> StoreResult<Vec<JsonMap>> {
        let work = async {
            let mut stream = self
                .graph
                .execute(to_query(statement))
                .await
                .map_err(|e| classify(&e))?;
            let mut records = Vec::new();
            while let Some(row) = stream.next().await.map_err(|e| classify(&e))? {
                let mut record = JsonMap::new();
                for column in &statement.columns {
                    let value: Value = row.get::<Value>(column).unwrap_or(Value::Null);
                    record.insert(column.clone(), value);
                }
                records.push(record);
            }
            Ok(records)
        };
        match tokio::time::timeout(self.timeout_for(statement), work).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error(statement).into()),
        }
    }

    async fn run_once(&self, statement: &Statement) -> StoreResult<()> {
        let work = async {
            self.graph
                .run(to_query(statement))
                .await
                .map_err(|e| classify(&e).into())
        };
        match tokio::time::timeout(self.timeout_for(statement), work).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error(statement).into()),
        }
    }

    fn retry_strategy() -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(RETRY_BASE_MILLIS)
            .map(jitter)
            .take(MAX_RETRIES)
    }
}

#[async_trait]
impl GraphEngine for Neo4jEngine {
    async fn execute(&self, statement: Statement) -> StoreResult<Vec<JsonMap>> {
        RetryIf::spawn(
            Self::retry_strategy(),
            || async {
                let result = self.execute_once(&statement).await;
                if let Err(error) = &result {
                    if error.is_retryable() {
                        warn!("retrying transient engine failure: {error}");
                    }
                }
                result
            },
            |error: &StoreError| error.is_retryable(),
        )
        .await
    }

    async fn run(&self, statement: Statement) -> StoreResult<()> {
        RetryIf::spawn(
            Self::retry_strategy(),
            || async {
                let result = self.run_once(&statement).await;
                if let Err(error) = &result {
                    if error.is_retryable() {
                        warn!("retrying transient engine failure: {error}");
                    }
                }
                result
            },
            |error: &StoreError| error.is_retryable(),
        )
        .await
    }

    async fn run_atomic(&self, statements: Vec<Statement>) -> StoreResult<()> {
        self.with_transaction(move |transaction| {
            Box::pin(async move {
                for statement in statements {
                    transaction.run(statement).await?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn run_batched(
        &self,
        statement: Statement,
        rows: Vec<Value>,
        batch_size: usize,
    ) -> StoreResult<u64> {
        let chunk_size = batch_size.max(1);
        let mut processed = 0u64;
        for chunk in rows.chunks(chunk_size) {
            let chunk_statement = statement
                .clone()
                .param("rows", Value::Array(chunk.to_vec()));
            self.run(chunk_statement).await?;
            processed += chunk.len() as u64;
            debug!(
                "batched statement applied to {} rows ({processed} total)",
                chunk.len()
            );
        }
        Ok(processed)
    }
}

/// A scoped transaction with explicit commit or rollback.
///
/// Obtained through [`Neo4jEngine::with_transaction`]; the engine commits
/// or rolls back on every exit path. Abandoned server-side transactions
/// time out and roll back on their own.
pub struct GraphTransaction {
    txn: Option<neo4rs::Txn>,
}

impl GraphTransaction {
    /// Run a statement inside the transaction, discarding results.
    pub async fn run(&mut self, statement: Statement) -> StoreResult<()> {
        let txn = self.txn.as_mut().ok_or(EngineError::Fatal {
            reason: "transaction already closed".to_string(),
        })?;
        txn.run(to_query(&statement))
            .await
            .map_err(|e| classify(&e).into())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let txn = self.txn.take().ok_or(EngineError::Fatal {
            reason: "transaction already closed".to_string(),
        })?;
        txn.commit().await.map_err(|e| classify(&e).into())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let txn = self.txn.take().ok_or(EngineError::Fatal {
            reason: "transaction already closed".to_string(),
        })?;
        txn.rollback().await.map_err(|e| classify(&e).into())
    }
}
