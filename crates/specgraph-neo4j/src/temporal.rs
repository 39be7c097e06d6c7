//! # Temporal Metadata Service
//!
//! Every IR node and IR-producing edge carries `created_at`, `updated_at`,
//! and `updated_by`. Write statements built by the repositories run through
//! a [`TemporalStamp`]: it binds the `$now` and `$actor` parameters and
//! supplies the canonical `ON CREATE` / `SET` fragments, so create paths
//! set both timestamps and update paths preserve `created_at`.
//!
//! The retroactive backfill for graphs written before this service existed
//! ships as the built-in migration `0002_backfill_temporal`.

use crate::statement::Statement;
use specgraph::actor::{Actor, ActorContext};
use specgraph::error::ContractError;
use specgraph::time::now_millis;

/// A write-scoped stamp: one timestamp and one actor for every statement
/// in the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalStamp {
    now: i64,
    actor: Actor,
}

impl TemporalStamp {
    /// Stamp for the current instant. Fails when the context carries no
    /// actor.
    pub fn new(context: &ActorContext) -> Result<Self, ContractError> {
        Ok(Self {
            now: now_millis(),
            actor: context.require()?,
        })
    }

    /// Stamp at an explicit instant (tests, backfills).
    #[must_use]
    pub fn at(now: i64, actor: Actor) -> Self {
        Self { now, actor }
    }

    /// The stamp's timestamp (epoch milliseconds).
    #[must_use]
    pub fn now(&self) -> i64 {
        self.now
    }

    /// The stamp's actor.
    #[must_use]
    pub fn actor(&self) -> Actor {
        self.actor
    }

    /// Bind `$now` and `$actor` on a statement.
    #[must_use]
    pub fn bind(&self, statement: Statement) -> Statement {
        statement
            .param("now", self.now)
            .param("actor", self.actor.as_str())
    }
}

/// `ON CREATE` fragment: set `created_at` once.
#[must_use]
pub fn on_create_fragment(alias: &str) -> String {
    format!("{alias}.created_at = $now")
}

/// Unconditional write fragment: refresh `updated_at` and `updated_by`.
/// `created_at` is never touched on the update path.
#[must_use]
pub fn on_write_fragment(alias: &str) -> String {
    format!("{alias}.updated_at = $now, {alias}.updated_by = $actor")
}
