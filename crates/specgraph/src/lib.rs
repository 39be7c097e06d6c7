//! # SpecGraph core
//!
//! Engine-independent model of the SpecGraph IR store: the typed
//! intermediate representation one application compiles to, the
//! deterministic identifier scheme, the error taxonomy shared by every
//! store backend, declarative shape contracts, health-report types, and
//! migration descriptors.
//!
//! The companion crate `specgraph-neo4j` persists this model in a property
//! graph and implements the migration engine, repositories, loader, and
//! monitors on top of it.
//!
//! ## Example
//!
//! ```rust
//! use specgraph::ir::{ApplicationIr, Attribute, DomainModelIr, Entity};
//! use specgraph::ir::validate::validate_application;
//!
//! let mut app = ApplicationIr::new("A1", "shop", "1.0.0", "sha256:abc");
//! let mut domain = DomainModelIr::default();
//! let mut product = Entity::new("Product", "a product", true);
//! product.attributes.push(Attribute::new("name", "string"));
//! domain.entities.push(product);
//! app.domain = Some(domain);
//! app.canonicalize();
//! assert!(validate_application(&app).is_ok());
//! ```

pub mod actor;
pub mod contract;
pub mod error;
pub mod health;
pub mod ids;
pub mod ir;
pub mod migration;
pub mod time;

pub use actor::{Actor, ActorContext};
pub use contract::{ContractReport, ShapeContract, Violation, ViolationKind};
pub use error::{
    ContractError, EngineError, ErrorPayload, LoaderError, LockError, MigrationError,
    PersistenceError, StoreError, StoreResult,
};
pub use health::{HealthFinding, HealthReport, HealthSeverity, HealthThresholds};
pub use ir::ApplicationIr;
pub use migration::{
    AtomicMode, CheckpointRecord, MigrationDescriptor, MigrationRunRecord, MigrationStatus,
};
