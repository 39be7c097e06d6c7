//! Store configuration.
//!
//! The store reads its environment contract once at startup:
//!
//! | Variable | Default |
//! |---|---|
//! | `DB_URI` | `bolt://localhost:7687` |
//! | `DB_USER` | `neo4j` |
//! | `DB_PASSWORD` | (empty) |
//! | `DB_NAME` | `neo4j` |
//! | `MIGRATION_STALE_LOCK_MINUTES` | `30` |
//! | `MIGRATION_DEFAULT_BATCH_SIZE` | `100` |
//! | `LOADER_CACHE_TTL_SECONDS` | `3600` |
//! | `HEALTH_HIGH_DEGREE_THRESHOLD` | `10000` |
//! | `ACTOR_DEFAULT` | `pipeline` |
//!
//! Builder-style `with_*` methods override individual values in code.

use specgraph::actor::Actor;
use specgraph::health::HealthThresholds;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An environment variable held a value that failed to parse.
    #[error("invalid value {value:?} for {variable}: {reason}")]
    InvalidVariable {
        /// The offending variable name.
        variable: String,
        /// The raw value found.
        value: String,
        /// Why it failed to parse.
        reason: String,
    },
}

/// Fully resolved store configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Bolt URI of the graph engine.
    pub uri: String,
    /// Engine user.
    pub user: String,
    /// Engine password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Migration locks older than this are considered abandoned.
    pub stale_lock_timeout: Duration,
    /// Default checkpoint batch size.
    pub migration_batch_size: usize,
    /// Loader snapshot TTL.
    pub cache_ttl: Duration,
    /// Health monitor thresholds.
    pub health: HealthThresholds,
    /// Actor assumed when a caller supplies none explicitly.
    pub default_actor: Actor,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            stale_lock_timeout: Duration::from_secs(30 * 60),
            migration_batch_size: 100,
            cache_ttl: Duration::from_secs(3600),
            health: HealthThresholds::default(),
            default_actor: Actor::Pipeline,
        }
    }
}

impl StoreConfig {
    /// Resolve the configuration from the process environment, with
    /// defaults for everything not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(uri) = std::env::var("DB_URI") {
            config.uri = uri;
        }
        if let Ok(user) = std::env::var("DB_USER") {
            config.user = user;
        }
        if let Ok(password) = std::env::var("DB_PASSWORD") {
            config.password = password;
        }
        if let Ok(database) = std::env::var("DB_NAME") {
            config.database = database;
        }
        if let Some(minutes) = parse_var::<u64>("MIGRATION_STALE_LOCK_MINUTES")? {
            config.stale_lock_timeout = Duration::from_secs(minutes * 60);
        }
        if let Some(batch_size) = parse_var::<usize>("MIGRATION_DEFAULT_BATCH_SIZE")? {
            config.migration_batch_size = batch_size.max(1);
        }
        if let Some(seconds) = parse_var::<u64>("LOADER_CACHE_TTL_SECONDS")? {
            config.cache_ttl = Duration::from_secs(seconds);
        }
        if let Some(threshold) = parse_var::<u64>("HEALTH_HIGH_DEGREE_THRESHOLD")? {
            config.health.high_degree = threshold;
        }
        if let Ok(actor) = std::env::var("ACTOR_DEFAULT") {
            config.default_actor =
                Actor::parse(&actor).map_err(|_| ConfigError::InvalidVariable {
                    variable: "ACTOR_DEFAULT".to_string(),
                    value: actor,
                    reason: "expected one of pipeline, agent, manual, migration".to_string(),
                })?;
        }
        Ok(config)
    }

    /// Override the engine connection.
    #[must_use]
    pub fn with_connection(mut self, uri: &str, user: &str, password: &str) -> Self {
        self.uri = uri.to_string();
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    /// Override the stale-lock timeout.
    #[must_use]
    pub fn with_stale_lock_timeout(mut self, timeout: Duration) -> Self {
        self.stale_lock_timeout = timeout;
        self
    }

    /// Override the migration batch size.
    #[must_use]
    pub fn with_migration_batch_size(mut self, batch_size: usize) -> Self {
        self.migration_batch_size = batch_size.max(1);
        self
    }

    /// Override the loader cache TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Override the default actor.
    #[must_use]
    pub fn with_default_actor(mut self, actor: Actor) -> Self {
        self.default_actor = actor;
        self
    }
}

fn parse_var<T: std::str::FromStr>(variable: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(variable) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVariable {
                variable: variable.to_string(),
                value: raw,
                reason: "not a valid number".to_string(),
            }),
        Err(_) => Ok(None),
    }
}
