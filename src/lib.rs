//! Review and optimize dbt model files with a fan-out of specialised
//! reviewer roles backed by a language-model completion service.
//!
//! ```text
//! models dir ─▸ discovery ─▸ [Artifact] ─▸ ReviewCoordinator ─▸ [ReviewReport] ─▸ report
//!                                               │
//!                                               └─▸ OptimizationCoordinator ─▸ [OptimizationResult] ─▸ report
//! ```

pub mod batch;
pub mod config;
pub mod discovery;
pub mod error;
pub mod optimize;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod review;

pub use config::Config;
pub use error::{RunError, RunResult};
pub use pipeline::{run, RunOptions, RunSummary};
