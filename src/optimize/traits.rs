//! Data model for the optimization pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::review::ReviewReport;

/// The part of an artifact an optimizer role may edit.
///
/// Each role owns exactly one target, so proposals merge by union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditTarget {
    /// SQL below the `{{ config(...) }}` block.
    DefinitionBody,
    /// The `{{ config(...) }}` block of the definition.
    ConfigBlock,
    /// The YAML documentation file.
    Documentation,
}

impl EditTarget {
    pub fn label(self) -> &'static str {
        match self {
            Self::DefinitionBody => "SQL body",
            Self::ConfigBlock => "config block",
            Self::Documentation => "documentation",
        }
    }

    /// Whether edits to this target land in the definition file.
    pub fn in_definition(self) -> bool {
        matches!(self, Self::DefinitionBody | Self::ConfigBlock)
    }
}

/// One concrete edit suggested by an optimizer role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    pub summary: String,
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub replacement: Option<String>,
    /// The review finding this change addresses.
    #[serde(default)]
    pub addresses: Option<String>,
}

/// A role-scoped set of edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProposal {
    pub role: String,
    pub target: EditTarget,
    pub changes: Vec<ProposedChange>,
    pub rationale: String,
}

impl ChangeProposal {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// An optimizer role that produced no proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFailure {
    pub role: String,
    pub reason: String,
}

/// Two proposals claimed the same target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{first} and {second} both target the {target:?}")]
pub struct PlanConflict {
    pub target: EditTarget,
    pub first: String,
    pub second: String,
}

/// Every proposal for one artifact plus the review it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationPlan {
    pub artifact: String,
    pub review: ReviewReport,
    pub proposals: Vec<ChangeProposal>,
    /// Roles that failed; their dimension is missing from the plan.
    pub failures: Vec<RoleFailure>,
}

impl OptimizationPlan {
    /// Union of role proposals. Targets must be disjoint.
    pub fn merge(
        review: &ReviewReport,
        proposals: Vec<ChangeProposal>,
        failures: Vec<RoleFailure>,
    ) -> Result<Self, PlanConflict> {
        for (i, proposal) in proposals.iter().enumerate() {
            if let Some(other) = proposals[..i].iter().find(|p| p.target == proposal.target) {
                return Err(PlanConflict {
                    target: proposal.target,
                    first: other.role.clone(),
                    second: proposal.role.clone(),
                });
            }
        }
        Ok(Self {
            artifact: review.artifact.clone(),
            review: review.clone(),
            proposals,
            failures,
        })
    }

    /// Targets with at least one change.
    pub fn targets(&self) -> BTreeSet<EditTarget> {
        self.proposals
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.target)
            .collect()
    }

    pub fn change_count(&self) -> usize {
        self.proposals.iter().map(|p| p.changes.len()).sum()
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// New artifact content produced by the apply step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedContent {
    pub definition: String,
    pub documentation: Option<String>,
    pub definition_changed: bool,
    pub documentation_changed: bool,
}

impl AppliedContent {
    pub fn is_unchanged(&self) -> bool {
        !self.definition_changed && !self.documentation_changed
    }
}

/// Advisory judgement of how well the applied content answers the review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    /// Fraction of original issues addressed, in `[0, 1]`.
    pub coverage: f64,
    pub rationale: String,
    #[serde(default)]
    pub addressed: Vec<String>,
    #[serde(default)]
    pub unaddressed: Vec<String>,
}

impl EvaluationScore {
    pub fn percent(&self) -> u32 {
        (self.coverage * 100.0).round() as u32
    }
}

// ── Lifecycle ────────────────────────────────────────────────────

/// Per-artifact optimization state.
///
/// `Planned -> Applying -> Applied -> Evaluating -> Evaluated`, with
/// `ApplyFailed` and `EvalSkipped` as the failure terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationState {
    Planned,
    Applying,
    Applied,
    Evaluating,
    Evaluated,
    ApplyFailed,
    EvalSkipped,
}

impl OptimizationState {
    pub const TERMINAL: [OptimizationState; 3] = [Self::Evaluated, Self::ApplyFailed, Self::EvalSkipped];

    pub fn label(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Evaluating => "evaluating",
            Self::Evaluated => "evaluated",
            Self::ApplyFailed => "apply-failed",
            Self::EvalSkipped => "eval-skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Planned, Self::Applying)
                | (Self::Planned, Self::ApplyFailed)
                | (Self::Applying, Self::Applied)
                | (Self::Applying, Self::ApplyFailed)
                | (Self::Applied, Self::Evaluating)
                | (Self::Evaluating, Self::Evaluated)
                | (Self::Evaluating, Self::EvalSkipped)
        )
    }
}

impl std::fmt::Display for OptimizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal outcome of optimizing one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub artifact: String,
    pub state: OptimizationState,
    /// Every state the artifact passed through, ending with `state`.
    pub history: Vec<OptimizationState>,
    pub plan: Option<OptimizationPlan>,
    pub applied: Option<AppliedContent>,
    pub score: Option<EvaluationScore>,
    /// Why the artifact ended in a failure terminal.
    pub error: Option<String>,
}

impl OptimizationResult {
    pub(crate) fn planned(artifact: &str, plan: Option<OptimizationPlan>) -> Self {
        Self {
            artifact: artifact.to_string(),
            state: OptimizationState::Planned,
            history: vec![OptimizationState::Planned],
            plan,
            applied: None,
            score: None,
            error: None,
        }
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub(crate) fn advance(&mut self, next: OptimizationState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!(
                artifact = %self.artifact,
                from = self.state.label(),
                to = next.label(),
                "Ignoring illegal optimization transition"
            );
            return;
        }
        tracing::debug!(artifact = %self.artifact, state = next.label(), "Optimization state");
        self.state = next;
        self.history.push(next);
    }

    pub(crate) fn fail(&mut self, next: OptimizationState, reason: String) {
        self.advance(next);
        self.error = Some(reason);
    }

    pub fn coverage(&self) -> Option<f64> {
        self.score.as_ref().map(|s| s.coverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{ReviewStatus, RoleSection};

    fn review() -> ReviewReport {
        ReviewReport {
            artifact: "orders".into(),
            sections: vec![RoleSection {
                role: "materialization".into(),
                findings: vec![],
            }],
            status: ReviewStatus::Complete,
        }
    }

    fn proposal(role: &str, target: EditTarget, changes: usize) -> ChangeProposal {
        ChangeProposal {
            role: role.into(),
            target,
            changes: (0..changes)
                .map(|i| ProposedChange {
                    summary: format!("change {i}"),
                    original: None,
                    replacement: None,
                    addresses: None,
                })
                .collect(),
            rationale: String::new(),
        }
    }

    #[test]
    fn merge_is_union_of_disjoint_targets() {
        let plan = OptimizationPlan::merge(
            &review(),
            vec![
                proposal("definition_rewrite", EditTarget::DefinitionBody, 2),
                proposal("documentation_rewrite", EditTarget::Documentation, 0),
            ],
            vec![RoleFailure {
                role: "materialization_tuning".into(),
                reason: "timeout".into(),
            }],
        )
        .unwrap();
        assert_eq!(plan.change_count(), 2);
        assert_eq!(plan.targets().into_iter().collect::<Vec<_>>(), vec![EditTarget::DefinitionBody]);
        assert!(plan.is_degraded());
    }

    #[test]
    fn merge_rejects_overlapping_targets() {
        let err = OptimizationPlan::merge(
            &review(),
            vec![
                proposal("a", EditTarget::ConfigBlock, 1),
                proposal("b", EditTarget::ConfigBlock, 1),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err.first, "a");
        assert_eq!(err.second, "b");
    }

    #[test]
    fn lifecycle_transitions() {
        let mut result = OptimizationResult::planned("orders", None);
        result.advance(OptimizationState::Applying);
        result.advance(OptimizationState::Applied);
        // Skipping evaluation is not a legal edge.
        result.advance(OptimizationState::Evaluated);
        assert_eq!(result.state, OptimizationState::Applied);
        result.advance(OptimizationState::Evaluating);
        result.fail(OptimizationState::EvalSkipped, "no coverage".into());
        assert_eq!(result.state, OptimizationState::EvalSkipped);
        assert!(result.state.is_terminal());
        assert_eq!(result.history.len(), 5);
        assert_eq!(result.error.as_deref(), Some("no coverage"));
    }
}
