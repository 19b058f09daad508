//! End-to-end run: discover, review, optionally optimize, write reports.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::discovery::{discover, Artifact};
use crate::error::RunResult;
use crate::optimize::{OptimizationCoordinator, OptimizationResult, OptimizationState};
use crate::provider::Completion;
use crate::report::{ReportWriter, WriteFailure, WriteLog};
use crate::review::{ProjectSummary, ReviewCoordinator};

/// Per-invocation options that are not part of the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub models_dir: PathBuf,
    pub optimize: bool,
}

/// What a run did, for the console summary.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub review: ProjectSummary,
    pub review_batches: usize,
    /// Empty unless optimization was requested.
    pub optimization: Vec<OptimizationResult>,
    pub optimization_batches: usize,
    pub documents_written: usize,
    pub write_failures: Vec<WriteFailure>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn degraded(&self) -> usize {
        self.review.degraded_artifacts.len()
    }

    pub fn optimization_count(&self, state: OptimizationState) -> usize {
        self.optimization.iter().filter(|r| r.state == state).count()
    }
}

/// Run the whole workflow.
///
/// Only discovery and output-directory failures are errors; everything
/// per-artifact is reported inside the returned summary.
pub async fn run(
    config: &Config,
    options: &RunOptions,
    completion: Arc<dyn Completion>,
    cancel: &CancellationToken,
) -> RunResult<RunSummary> {
    let discovery = discover(&options.models_dir, &config.discovery).await?;

    let writer = ReportWriter::from_config(&config.output);
    writer.prepare(options.optimize).await?;
    let mut log = WriteLog::default();

    let model = config.provider.model_config();

    // ── Review ───────────────────────────────────────────────────
    let outcome = ReviewCoordinator::new(completion.clone(), model.clone())
        .with_roles(config.review.roles.clone())
        .review(&discovery.artifacts, config.review.batch_size, cancel)
        .await;

    let mut summary = outcome.summary;
    summary.root = discovery.root.clone();
    summary.unmatched = discovery.unmatched.clone();
    let reviewed: Vec<&str> = outcome.reports.iter().map(|r| r.artifact.as_str()).collect();
    summary.undocumented = discovery
        .undocumented()
        .into_iter()
        .filter(|name| reviewed.contains(&name.as_str()))
        .collect();

    for report in &outcome.reports {
        writer.write_review(report, &mut log).await;
    }
    writer.write_summary(&summary, &mut log).await;
    tracing::info!(
        reviewed = summary.artifacts_reviewed,
        findings = summary.total_findings,
        degraded = summary.degraded_artifacts.len(),
        dir = %writer.review_dir().display(),
        "Review complete"
    );

    let mut cancelled = outcome.cancelled;
    let mut optimization = Vec::new();
    let mut optimization_batches = 0;

    // ── Optimization ─────────────────────────────────────────────
    if options.optimize && !cancelled {
        let optimized = OptimizationCoordinator::new(
            completion,
            model,
            config.optimize.apply_temperature,
        )
        .with_roles(config.optimize.roles.clone())
        .optimize(
            &discovery.artifacts,
            &outcome.reports,
            config.optimize.batch_size,
            cancel,
        )
        .await;

        let by_name: HashMap<&str, &Artifact> = discovery
            .artifacts
            .iter()
            .map(|a| (a.name.as_str(), a))
            .collect();
        for result in &optimized.results {
            if let Some(artifact) = by_name.get(result.artifact.as_str()) {
                writer.write_optimization(artifact, result, &mut log).await;
            }
        }
        writer
            .write_optimization_summary(&optimized.results, &mut log)
            .await;

        tracing::info!(
            optimized = optimized.results.len(),
            apply_failed = optimized.count(OptimizationState::ApplyFailed),
            eval_skipped = optimized.count(OptimizationState::EvalSkipped),
            dir = %writer.optimization_dir().display(),
            "Optimization complete"
        );
        cancelled |= optimized.cancelled;
        optimization_batches = optimized.batches.len();
        optimization = optimized.results;
    }

    Ok(RunSummary {
        review: summary,
        review_batches: outcome.batches.len(),
        optimization,
        optimization_batches,
        documents_written: log.written.len(),
        write_failures: log.failed,
        cancelled,
    })
}
