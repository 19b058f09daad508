//! Plan, apply and evaluate automated edits to reviewed artifacts.
//!
//! ```text
//! (Artifact, ReviewReport) ─┬─▸ definition_rewrite     ─┐
//!                           ├─▸ documentation_rewrite  ├─▸ OptimizationPlan ─▸ apply ─▸ evaluate
//!                           └─▸ materialization_tuning ─┘
//! ```
//!
//! Optimizer roles own disjoint [`EditTarget`]s, so their proposals are
//! merged by union. A role that introduces a new target must keep that
//! property; [`OptimizationPlan::merge`] rejects overlapping proposals.

pub mod apply;
pub mod coordinator;
pub mod evaluate;
pub mod roles;
pub mod traits;

pub use coordinator::{OptimizationCoordinator, OptimizationOutcome};
pub use roles::OptimizerRole;
pub use traits::{
    AppliedContent, ChangeProposal, EditTarget, EvaluationScore, OptimizationPlan,
    OptimizationResult, OptimizationState, PlanConflict, ProposedChange, RoleFailure,
};
