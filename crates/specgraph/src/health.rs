//! Health report model.
//!
//! The store's health monitor runs a fixed set of structural checks and
//! folds the findings into a single report with an aggregated status.

use serde::{Deserialize, Serialize};

/// Severity of a finding or of the aggregated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthSeverity {
    /// Nothing to act on.
    Healthy,
    /// Worth investigating, not blocking.
    Warning,
    /// Broken structure; writes may be producing inconsistent data.
    Critical,
}

/// The structural checks the monitor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheck {
    /// IR submodel nodes with no expected parent.
    OrphanNodes,
    /// Nodes missing properties their contract requires.
    MissingRequiredProperties,
    /// Nodes whose relationship degree exceeds the threshold.
    HighDegreeNodes,
    /// Unique keys appearing on more than one node.
    DuplicateUniqueKeys,
    /// Relationship properties outside their enumerated sets.
    InvalidRelationshipPayloads,
    /// Labels present in the graph but documented by no contract.
    UndocumentedLabels,
    /// IR nodes not touched since the staleness horizon.
    StaleNodes,
}

impl HealthCheck {
    /// Stable name used in reports and persisted results.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheck::OrphanNodes => "orphan_nodes",
            HealthCheck::MissingRequiredProperties => "missing_required_properties",
            HealthCheck::HighDegreeNodes => "high_degree_nodes",
            HealthCheck::DuplicateUniqueKeys => "duplicate_unique_keys",
            HealthCheck::InvalidRelationshipPayloads => "invalid_relationship_payloads",
            HealthCheck::UndocumentedLabels => "undocumented_labels",
            HealthCheck::StaleNodes => "stale_nodes",
        }
    }
}

/// One finding produced by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFinding {
    /// The check that produced this finding.
    pub check: HealthCheck,
    /// Severity assigned under the configured thresholds.
    pub severity: HealthSeverity,
    /// Human-readable description.
    pub detail: String,
    /// Bounded sample of offending identifiers.
    #[serde(default)]
    pub samples: Vec<String>,
}

/// Aggregated health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Findings with severity above `Healthy`.
    pub findings: Vec<HealthFinding>,
    /// Checks that ran.
    pub checks_run: Vec<HealthCheck>,
    /// When the report was generated (epoch milliseconds).
    pub generated_at: i64,
}

impl HealthReport {
    /// The worst severity across all findings; `Healthy` when empty.
    #[must_use]
    pub fn status(&self) -> HealthSeverity {
        self.findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(HealthSeverity::Healthy)
    }

    /// Findings at `Critical` severity.
    #[must_use]
    pub fn critical(&self) -> Vec<&HealthFinding> {
        self.findings
            .iter()
            .filter(|f| f.severity == HealthSeverity::Critical)
            .collect()
    }
}

/// Tunable thresholds for the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Degree above which a node is reported (default 10 000).
    pub high_degree: u64,
    /// Days without an `updated_at` touch before an IR root counts as stale.
    pub stale_after_days: i64,
    /// Maximum offending samples carried per finding.
    pub max_samples: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            high_degree: 10_000,
            stale_after_days: 90,
            max_samples: 10,
        }
    }
}
