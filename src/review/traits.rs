//! Data model for the review pipeline.
//!
//! A [`Finding`] is one role's observation about one artifact. Findings
//! are consolidated into exactly one [`ReviewReport`] per artifact, and
//! the reports of a run are summarised into a [`ProjectSummary`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ── Categories ───────────────────────────────────────────────────

/// Well-known finding categories.
pub mod category {
    /// A role failed (provider error, timeout, panic-free bail).
    pub const ANALYSIS_ERROR: &str = "analysis-error";
    /// The model answered, but not in a parseable form.
    pub const LOW_CONFIDENCE: &str = "low-confidence";
    /// The artifact has no documentation to check.
    pub const MISSING_DOCUMENTATION: &str = "missing-documentation";
    /// Documentation exists but is not valid YAML.
    pub const UNPARSEABLE_DOCUMENTATION: &str = "unparseable-documentation";
    pub const UNDOCUMENTED_COLUMN: &str = "undocumented-column";
    pub const STALE_COLUMN: &str = "stale-column-documentation";
    pub const COLUMN_CASE_MISMATCH: &str = "column-case-mismatch";
    pub const UNVERIFIABLE_COLUMNS: &str = "unverifiable-columns";
    pub const MATERIALIZATION: &str = "materialization";
    pub const DOCUMENTATION: &str = "documentation";
    pub const DESCRIPTION: &str = "description";
    pub const TESTS: &str = "tests";
    // Discovery warnings.
    pub const UNMATCHED_DOCUMENTATION: &str = "unmatched-documentation";
    pub const EMPTY_DEFINITION: &str = "empty-definition";
    pub const DUPLICATE_DEFINITION: &str = "duplicate-definition";
    pub const UNREADABLE_FILE: &str = "unreadable-file";
}

// ── Severity ─────────────────────────────────────────────────────

/// Severity level for a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Observation only.
    Info,
    /// Advisory suggestion.
    Low,
    /// Should be addressed.
    Medium,
    /// Important issue, likely to break docs or downstream consumers.
    High,
    /// Must-fix.
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a model-supplied severity. Unknown values map to `Low`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Self::Critical,
            "high" | "error" | "major" => Self::High,
            "medium" | "warning" | "warn" | "moderate" => Self::Medium,
            "info" | "informational" | "note" => Self::Info,
            _ => Self::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Finding ──────────────────────────────────────────────────────

/// A single observation emitted by one role for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Id of the role that produced this finding.
    pub role: String,
    pub severity: Severity,
    pub category: String,
    pub description: String,
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(
        role: impl Into<String>,
        severity: Severity,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            severity,
            category: category.into(),
            description: description.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Finding recording that `role` failed for this artifact.
    pub fn analysis_error(role: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            role,
            Severity::Medium,
            category::ANALYSIS_ERROR,
            format!("Analysis failed: {reason}"),
        )
    }

    /// Finding recording that there is no documentation for `role` to check.
    pub fn missing_documentation(role: &str) -> Self {
        Self::new(
            role,
            Severity::Low,
            category::MISSING_DOCUMENTATION,
            "No documentation file found for this model",
        )
        .with_suggestion("Add a schema file declaring the model, its description and its columns")
    }

    pub fn is_error(&self) -> bool {
        self.category == category::ANALYSIS_ERROR
    }

    /// Whether this finding is something an optimizer could address.
    pub fn is_actionable(&self) -> bool {
        self.severity > Severity::Info && !self.is_error() && self.category != category::LOW_CONFIDENCE
    }
}

// ── Review report ────────────────────────────────────────────────

/// Findings from one role, in the order the role emitted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSection {
    pub role: String,
    pub findings: Vec<Finding>,
}

/// Whether every role produced an opinion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ReviewStatus {
    Complete,
    /// At least one role failed; its failure is recorded as an
    /// `analysis-error` finding.
    Degraded { failed_roles: Vec<String> },
}

/// All findings for one artifact across all roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub artifact: String,
    pub sections: Vec<RoleSection>,
    pub status: ReviewStatus,
}

impl ReviewReport {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.sections.iter().flat_map(|s| s.findings.iter())
    }

    pub fn section(&self, role: &str) -> Option<&RoleSection> {
        self.sections.iter().find(|s| s.role == role)
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings().filter(|f| f.severity == severity).count()
    }

    /// Findings above `Info`.
    pub fn issue_count(&self) -> usize {
        self.findings().filter(|f| f.severity > Severity::Info).count()
    }

    pub fn has_critical(&self) -> bool {
        self.findings().any(|f| f.severity == Severity::Critical)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, ReviewStatus::Degraded { .. })
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings().map(|f| f.severity).max()
    }

    pub fn actionable(&self) -> Vec<&Finding> {
        self.findings().filter(|f| f.is_actionable()).collect()
    }
}

// ── Project summary ──────────────────────────────────────────────

/// Per-artifact line in the project summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTally {
    pub artifact: String,
    pub issues: usize,
    pub highest: Option<Severity>,
    pub degraded: bool,
}

/// Aggregate over every report in a run. Recomputed each run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub root: PathBuf,
    pub artifacts_reviewed: usize,
    pub total_findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub critical_artifacts: Vec<String>,
    pub degraded_artifacts: Vec<String>,
    /// Artifacts reviewed without documentation.
    pub undocumented: Vec<String>,
    /// Discovery warnings for documentation that matched nothing.
    pub unmatched: Vec<Finding>,
    pub artifacts: Vec<ArtifactTally>,
}

impl ProjectSummary {
    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}
