//! Write-origin tracking.
//!
//! Every write path stamps `updated_by` with the actor that produced it. The
//! actor is carried by an [`ActorContext`] supplied by the caller; writes
//! without one fail with `ContractError::MissingActor`.

use crate::error::ContractError;
use serde::{Deserialize, Serialize};

/// Origin of a write, persisted verbatim as `updated_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// The generation pipeline itself.
    Pipeline,
    /// A repair or inference agent.
    Agent,
    /// A human operator.
    Manual,
    /// The migration engine.
    Migration,
}

impl Actor {
    /// Wire representation stored on nodes and edges.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Pipeline => "pipeline",
            Actor::Agent => "agent",
            Actor::Manual => "manual",
            Actor::Migration => "migration",
        }
    }

    /// Parse the wire representation.
    pub fn parse(value: &str) -> Result<Self, ContractError> {
        match value {
            "pipeline" => Ok(Actor::Pipeline),
            "agent" => Ok(Actor::Agent),
            "manual" => Ok(Actor::Manual),
            "migration" => Ok(Actor::Migration),
            other => Err(ContractError::UnknownEnumValue {
                label: "*".to_string(),
                property: "updated_by".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoped actor context threaded through every write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    actor: Option<Actor>,
}

impl ActorContext {
    /// Context for the given actor.
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self { actor: Some(actor) }
    }

    /// An empty context; any write through it fails with `MissingActor`.
    #[must_use]
    pub fn missing() -> Self {
        Self { actor: None }
    }

    /// The actor, or `ContractError::MissingActor` when absent.
    pub fn require(&self) -> Result<Actor, ContractError> {
        self.actor.ok_or(ContractError::MissingActor)
    }
}

impl From<Actor> for ActorContext {
    fn from(actor: Actor) -> Self {
        ActorContext::new(actor)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    // ========== Wire Format Tests ==========

    #[test]
    fn test_actor_as_str() {
        assert_eq!(Actor::Pipeline.as_str(), "pipeline");
        assert_eq!(Actor::Agent.as_str(), "agent");
        assert_eq!(Actor::Manual.as_str(), "manual");
        assert_eq!(Actor::Migration.as_str(), "migration");
    }

    #[test]
    fn test_actor_display_matches_as_str() {
        for actor in [Actor::Pipeline, Actor::Agent, Actor::Manual, Actor::Migration] {
            assert_eq!(actor.to_string(), actor.as_str());
        }
    }

    #[test]
    fn test_actor_serde_lowercase() {
        let json = serde_json::to_string(&Actor::Migration).unwrap();
        assert_eq!(json, "\"migration\"");
        let back: Actor = serde_json::from_str("\"pipeline\"").unwrap();
        assert_eq!(back, Actor::Pipeline);
    }

    // ========== Parse Tests ==========

    #[test]
    fn test_parse_all_variants() {
        assert_eq!(Actor::parse("pipeline").unwrap(), Actor::Pipeline);
        assert_eq!(Actor::parse("agent").unwrap(), Actor::Agent);
        assert_eq!(Actor::parse("manual").unwrap(), Actor::Manual);
        assert_eq!(Actor::parse("migration").unwrap(), Actor::Migration);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = Actor::parse("cron").unwrap_err();
        assert!(matches!(err, ContractError::UnknownEnumValue { .. }));
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!(Actor::parse("Pipeline").is_err());
        assert!(Actor::parse("MIGRATION").is_err());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Actor::parse("").is_err());
    }

    // ========== Context Tests ==========

    #[test]
    fn test_context_require_present() {
        let ctx = ActorContext::new(Actor::Agent);
        assert_eq!(ctx.require().unwrap(), Actor::Agent);
    }

    #[test]
    fn test_context_require_missing() {
        let ctx = ActorContext::missing();
        assert!(matches!(ctx.require(), Err(ContractError::MissingActor)));
    }

    #[test]
    fn test_context_from_actor() {
        let ctx: ActorContext = Actor::Manual.into();
        assert_eq!(ctx.require().unwrap(), Actor::Manual);
    }
}
