//! # SpecGraph Neo4j store
//!
//! Neo4j-backed persistence for the SpecGraph intermediate representation:
//! a versioned graph of every IR submodel plus the machinery that keeps it
//! consistent across concurrent generation runs, repair cycles, and schema
//! migrations.
//!
//! ## Layers
//!
//! - [`engine`] — graph engine client on `neo4rs`: parameterized
//!   statements, timeouts, transient/fatal classification with bounded
//!   backoff, scoped transactions, UNWIND batching.
//! - [`temporal`] — `created_at` / `updated_at` / `updated_by` stamping on
//!   every write path.
//! - [`version`] — the `GraphSchemaVersion` singleton and migration lock.
//! - [`migration`] — ordered, idempotent migrations in single-transaction,
//!   checkpoint, or shadow-graph mode, with stamped rollback and resume.
//! - [`repository`] — one repository per IR submodel: subgraph-replace for
//!   owned hierarchies, merge for cross-entity references.
//! - [`contract_runner`] — executes declarative shape contracts.
//! - [`health`] — structural health monitor.
//! - [`loader`] — single-round-trip full IR loads with a TTL cache.
//! - [`lineage`] — provenance write primitives.
//! - [`store`] — the [`IrGraphStore`] facade.
//!
//! ## Example
//!
//! ```rust,ignore
//! use specgraph::actor::{Actor, ActorContext};
//! use specgraph_neo4j::{IrGraphStore, StoreConfig};
//!
//! # async fn example(ir: specgraph::ApplicationIr) -> specgraph::StoreResult<()> {
//! let store = IrGraphStore::connect(StoreConfig::from_env().unwrap()).await?;
//! store.migrate_to_latest().await?;
//! let saved = store
//!     .save_application_ir(&ir, &ActorContext::new(Actor::Pipeline))
//!     .await?;
//! let loaded = store.load_application_ir(&saved.app_id).await?;
//! assert_eq!(*loaded, saved);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod contract_runner;
pub mod engine;
pub mod health;
pub mod lineage;
pub mod loader;
pub mod migration;
pub mod params;
pub mod repository;
pub mod statement;
pub mod store;
pub mod temporal;
pub mod test_support;
pub mod version;

pub use config::{ConfigError, StoreConfig};
pub use contract_runner::ContractRunner;
pub use engine::{GraphEngine, GraphTransaction, Neo4jEngine};
pub use health::HealthMonitor;
pub use lineage::LineageTracker;
pub use loader::IrLoader;
pub use migration::{
    builtin_registry, Migration, MigrationBatch, MigrationContext, MigrationEngine,
    MigrationOptions, MigrationPlan, MigrationRegistry, PlannedMigration, ShadowCheck, ShadowPlan,
};
pub use statement::{JsonMap, Statement};
pub use store::IrGraphStore;
pub use temporal::TemporalStamp;
pub use version::{MigrationLock, VersionCoordinator, VersionState};
