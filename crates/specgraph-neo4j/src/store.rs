//! # IR Graph Store Facade
//!
//! The surface external collaborators call: save and load complete IR
//! trees, drive migrations, validate the shape contract, run the health
//! monitor, and attach lineage.
//!
//! A full save is one transaction across every submodel, which is what
//! guarantees concurrent loaders see either the complete pre-image or the
//! complete post-image of the application — never old entities with new
//! endpoints. Every successful write invalidates the loader cache for the
//! touched `app_id`.

use crate::config::StoreConfig;
use crate::contract_runner::ContractRunner;
use crate::engine::{GraphEngine, Neo4jEngine};
use crate::health::HealthMonitor;
use crate::lineage::LineageTracker;
use crate::loader::IrLoader;
use crate::migration::{builtin_registry, MigrationEngine, MigrationOptions, MigrationRegistry};
use crate::repository::{
    upsert_application_root, ApiRepository, BehaviorRepository, DomainRepository,
    InfrastructureRepository, TestsRepository, ValidationRepository,
};
use crate::statement::{JsonMap, Statement};
use crate::temporal::TemporalStamp;
use crate::version::VersionCoordinator;
use serde_json::Value;
use specgraph::actor::ActorContext;
use specgraph::contract::{contract_for_version, ContractReport};
use specgraph::error::StoreResult;
use specgraph::health::HealthReport;
use specgraph::ir::validate::validate_application;
use specgraph::ir::ApplicationIr;
use specgraph::migration::{AtomicMode, MigrationRunRecord};
use std::sync::Arc;
use tracing::{debug, info};

/// The graph-backed IR store.
pub struct IrGraphStore {
    engine: Arc<dyn GraphEngine>,
    config: StoreConfig,
    loader: IrLoader,
    migrations: MigrationEngine,
    contracts: ContractRunner,
    lineage: LineageTracker,
}

impl IrGraphStore {
    /// Connect to the configured Neo4j instance with the built-in
    /// migration registry.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let engine = Neo4jEngine::connect(&config.uri, &config.user, &config.password).await?;
        Ok(Self::with_engine(Arc::new(engine), config, builtin_registry()))
    }

    /// Assemble the store over an arbitrary engine (tests, alternative
    /// drivers) and migration registry.
    #[must_use]
    pub fn with_engine(
        engine: Arc<dyn GraphEngine>,
        config: StoreConfig,
        registry: MigrationRegistry,
    ) -> Self {
        let loader = IrLoader::new(Arc::clone(&engine), config.cache_ttl);
        let migrations = MigrationEngine::new(
            Arc::clone(&engine),
            registry,
            config.stale_lock_timeout,
            config.migration_batch_size,
        );
        let contracts = ContractRunner::new(Arc::clone(&engine));
        let lineage = LineageTracker::new(Arc::clone(&engine));
        Self {
            engine,
            config,
            loader,
            migrations,
            contracts,
            lineage,
        }
    }

    /// The actor context implied by configuration, for callers that do
    /// not carry one of their own.
    #[must_use]
    pub fn default_actor(&self) -> ActorContext {
        ActorContext::new(self.config.default_actor)
    }

    /// The lineage primitives.
    #[must_use]
    pub fn lineage(&self) -> &LineageTracker {
        &self.lineage
    }

    /// The version coordinator (read-only view of the singleton).
    #[must_use]
    pub fn version(&self) -> &VersionCoordinator {
        self.migrations.coordinator()
    }

    /// Upsert a complete IR tree in one transaction.
    ///
    /// The tree is canonicalized (ids re-derived, children sorted) and
    /// validated before a single statement is issued; owned hierarchies
    /// are subgraph-replaced, cross-entity references merged.
    pub async fn save_application_ir(
        &self,
        ir: &ApplicationIr,
        context: &ActorContext,
    ) -> StoreResult<ApplicationIr> {
        let mut canonical = ir.clone();
        canonical.canonicalize();
        validate_application(&canonical)?;
        let stamp = TemporalStamp::new(context)?;

        let mut root_props = JsonMap::new();
        root_props.insert("name".to_string(), Value::from(canonical.name.as_str()));
        root_props.insert(
            "version".to_string(),
            Value::from(canonical.version.as_str()),
        );
        root_props.insert(
            "spec_hash".to_string(),
            Value::from(canonical.spec_hash.as_str()),
        );
        let mut statements: Vec<Statement> = vec![upsert_application_root(
            &canonical.app_id,
            root_props,
            &stamp,
        )];
        if let Some(domain) = &canonical.domain {
            statements.extend(DomainRepository::plan(&canonical.app_id, domain, &stamp));
        }
        if let Some(api) = &canonical.api {
            statements.extend(ApiRepository::plan(&canonical.app_id, api, &stamp));
        }
        if let Some(behavior) = &canonical.behavior {
            statements.extend(BehaviorRepository::plan(&canonical.app_id, behavior, &stamp));
        }
        if let Some(validation) = &canonical.validation {
            statements.extend(ValidationRepository::plan(
                &canonical.app_id,
                validation,
                &stamp,
            ));
        }
        if let Some(infrastructure) = &canonical.infrastructure {
            statements.extend(InfrastructureRepository::plan(
                &canonical.app_id,
                infrastructure,
                &stamp,
            ));
        }
        if let Some(tests) = &canonical.tests {
            statements.extend(TestsRepository::plan(&canonical.app_id, tests, &stamp));
        }

        debug!(
            "saving application {} in {} statements",
            canonical.app_id,
            statements.len()
        );
        self.engine
            .run_atomic(statements)
            .await
            .map_err(crate::repository::surface_write_failure)?;
        self.loader.invalidate(&canonical.app_id);
        info!("saved application ir {}", canonical.app_id);
        Ok(canonical)
    }

    /// Upsert a complete IR tree, refusing the write when the caller's
    /// snapshot was loaded at an older graph schema version.
    ///
    /// # Errors
    ///
    /// `PersistenceError::StaleWrite` when the singleton's current version
    /// no longer matches `held_schema_version`.
    pub async fn save_application_ir_checked(
        &self,
        ir: &ApplicationIr,
        context: &ActorContext,
        held_schema_version: i64,
    ) -> StoreResult<ApplicationIr> {
        let current = self.version().current_version().await?;
        if current != held_schema_version {
            return Err(specgraph::error::PersistenceError::StaleWrite {
                held: held_schema_version,
                current,
            }
            .into());
        }
        self.save_application_ir(ir, context).await
    }

    /// Load the complete IR for `app_id` from one consistent snapshot.
    pub async fn load_application_ir(&self, app_id: &str) -> StoreResult<Arc<ApplicationIr>> {
        self.loader.load(app_id).await
    }

    /// Load, bypassing the snapshot cache.
    pub async fn load_application_ir_uncached(
        &self,
        app_id: &str,
    ) -> StoreResult<ApplicationIr> {
        self.loader.load_uncached(app_id).await
    }

    /// Run one migration.
    pub async fn run_migration(
        &self,
        migration_id: &str,
        mode: Option<AtomicMode>,
        dry_run: bool,
    ) -> StoreResult<MigrationRunRecord> {
        self.migrations
            .run_migration(migration_id, MigrationOptions { mode, dry_run })
            .await
    }

    /// Resume an abandoned checkpoint-mode migration.
    pub async fn resume_migration(&self, migration_id: &str) -> StoreResult<MigrationRunRecord> {
        self.migrations.resume_migration(migration_id).await
    }

    /// Apply every pending migration in order.
    pub async fn migrate_to_latest(&self) -> StoreResult<Vec<MigrationRunRecord>> {
        self.migrations.migrate_to_latest().await
    }

    /// Run the shape contract for the current schema version (or for an
    /// explicit version when given).
    pub async fn validate_graph(&self, schema_version: Option<i64>) -> StoreResult<ContractReport> {
        let version = match schema_version {
            Some(version) => version,
            None => self.version().current_version().await?,
        };
        let contract = contract_for_version(version).unwrap_or_else(|| {
            // No contract shipped for this version: an empty contract
            // still reports undocumented labels.
            specgraph::contract::ShapeContract {
                contract_id: format!("unversioned_v{version}"),
                schema_version: version,
                labels: vec![],
                relationships: vec![],
                auxiliary_labels: vec![],
                queries: vec![],
            }
        });
        self.contracts.run(&contract).await
    }

    /// Run the health monitor.
    pub async fn health_check(&self) -> StoreResult<HealthReport> {
        HealthMonitor::new(Arc::clone(&self.engine), self.config.health.clone())
            .check()
            .await
    }
}
