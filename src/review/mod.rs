//! Multi-role review of dbt model artifacts.
//!
//! Every artifact is examined by each [`AnalysisRole`] independently;
//! the [`ReviewCoordinator`] fans the roles out per batch and folds the
//! findings into one [`ReviewReport`] per artifact.
//!
//! ## Architecture
//!
//! ```text
//! batch of artifacts ─┬─▸ column_consistency    ─┐
//!                     ├─▸ materialization        ├─▸ consolidate ─▸ ReviewReport
//!                     ├─▸ documentation_quality  │
//!                     └─▸ description_quality   ─┘
//!                                   ...next batch only after all settle
//! ```
//!
//! ## Extension
//!
//! Add new roles by extending [`AnalysisRole`]. A role must not depend on
//! another role's output and must not fail when documentation is absent.

pub mod columns;
pub mod coordinator;
pub mod materialization;
pub mod roles;
pub mod sql;
pub mod traits;

pub use coordinator::{consolidate, summarize, ReviewCoordinator, ReviewOutcome, ReviewPhase};
pub use roles::AnalysisRole;
pub use traits::{
    category, ArtifactTally, Finding, ProjectSummary, ReviewReport, ReviewStatus, RoleSection,
    Severity,
};
