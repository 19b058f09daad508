//! Batched optimization coordinator.
//!
//! For each batch: every optimizer role runs concurrently for every
//! artifact, proposals are merged into one plan per artifact, then each
//! artifact is applied and evaluated concurrently with the others. The
//! next batch starts only once every artifact of the current one has
//! reached a terminal state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::apply::apply;
use super::evaluate::evaluate;
use super::roles::OptimizerRole;
use super::traits::{
    ChangeProposal, OptimizationPlan, OptimizationResult, OptimizationState, RoleFailure,
};
use crate::batch::{batch_count, partition, BatchRecord, TaskGroup};
use crate::discovery::Artifact;
use crate::provider::{Completion, ModelConfig};
use crate::review::ReviewReport;

/// Everything an optimization run produced.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// One result per optimized artifact, in input order.
    pub results: Vec<OptimizationResult>,
    pub batches: Vec<BatchRecord>,
    pub cancelled: bool,
}

impl OptimizationOutcome {
    pub fn count(&self, state: OptimizationState) -> usize {
        self.results.iter().filter(|r| r.state == state).count()
    }
}

pub struct OptimizationCoordinator {
    roles: Vec<OptimizerRole>,
    completion: Arc<dyn Completion>,
    model: ModelConfig,
    apply_model: ModelConfig,
}

impl OptimizationCoordinator {
    /// Coordinator running every optimizer role. `apply_temperature`
    /// is used for the apply step only.
    pub fn new(completion: Arc<dyn Completion>, model: ModelConfig, apply_temperature: f64) -> Self {
        Self {
            roles: OptimizerRole::ALL.to_vec(),
            apply_model: model.with_temperature(apply_temperature),
            completion,
            model,
        }
    }

    pub fn with_roles(mut self, roles: Vec<OptimizerRole>) -> Self {
        self.roles = roles;
        self
    }

    /// Optimize every artifact that has a review report.
    pub async fn optimize(
        &self,
        artifacts: &[Artifact],
        reports: &[ReviewReport],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> OptimizationOutcome {
        let by_name: HashMap<&str, &ReviewReport> =
            reports.iter().map(|r| (r.artifact.as_str(), r)).collect();
        let work: Vec<(usize, &Artifact, &ReviewReport)> = artifacts
            .iter()
            .enumerate()
            .filter_map(|(i, a)| match by_name.get(a.name.as_str()) {
                Some(report) => Some((i, a, *report)),
                None => {
                    tracing::debug!(artifact = %a.name, "No review report, not optimizing");
                    None
                }
            })
            .collect();

        let total_batches = batch_count(work.len(), batch_size);
        tracing::info!(
            artifacts = work.len(),
            batch_size,
            batches = total_batches,
            roles = self.roles.len(),
            "Starting optimization"
        );

        let mut indexed: Vec<(usize, OptimizationResult)> = Vec::with_capacity(work.len());
        let mut batches = Vec::with_capacity(total_batches);
        let mut cancelled = false;

        for (index, batch) in partition(&work, batch_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(batch = index, "Optimization cancelled before batch");
                cancelled = true;
                break;
            }

            let started = Instant::now();
            let plans = self.plan_batch(batch).await;

            let mut group = TaskGroup::new();
            for (&(input_index, artifact, report), plan) in batch.iter().zip(plans) {
                group.spawn(input_index, async move {
                    Ok(self.finish(artifact, report, plan).await)
                });
            }
            for settled in group.settle().await {
                // `finish` is infallible; the group only carries its timing.
                if let Ok(result) = settled.result {
                    tracing::info!(
                        artifact = %result.artifact,
                        state = result.state.label(),
                        coverage = result.coverage(),
                        elapsed_ms = settled.elapsed.as_millis() as u64,
                        "Artifact optimization finished"
                    );
                    indexed.push((settled.key, result));
                }
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(
                batch = index + 1,
                of = total_batches,
                size = batch.len(),
                elapsed_ms,
                "Optimization batch settled"
            );
            batches.push(BatchRecord {
                index,
                artifacts: batch.iter().map(|(_, a, _)| a.name.clone()).collect(),
                elapsed_ms,
            });
        }

        indexed.sort_by_key(|(i, _)| *i);
        OptimizationOutcome {
            results: indexed.into_iter().map(|(_, r)| r).collect(),
            batches,
            cancelled,
        }
    }

    /// Run every optimizer role for every artifact of the batch and merge
    /// the proposals per artifact.
    async fn plan_batch(
        &self,
        batch: &[(usize, &Artifact, &ReviewReport)],
    ) -> Vec<Result<OptimizationPlan, String>> {
        let completion = self.completion.as_ref();
        let model = &self.model;

        let mut group = TaskGroup::new();
        for (offset, &(_, artifact, report)) in batch.iter().enumerate() {
            for &role in &self.roles {
                group.spawn((offset, role), async move {
                    role.propose(artifact, report, completion, model).await
                });
            }
        }

        let mut proposals: Vec<Vec<ChangeProposal>> = vec![Vec::new(); batch.len()];
        let mut failures: Vec<Vec<RoleFailure>> = vec![Vec::new(); batch.len()];
        for settled in group.settle().await {
            let (offset, role) = settled.key;
            match settled.result {
                Ok(proposal) => proposals[offset].push(proposal),
                Err(e) => {
                    tracing::warn!(
                        artifact = %batch[offset].1.name,
                        role = role.id(),
                        error = %e,
                        "Optimizer role failed, plan degraded"
                    );
                    failures[offset].push(RoleFailure {
                        role: role.id().to_string(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        batch
            .iter()
            .zip(proposals.into_iter().zip(failures))
            .map(|(&(_, _, report), (proposals, failures))| {
                OptimizationPlan::merge(report, proposals, failures).map_err(|e| e.to_string())
            })
            .collect()
    }

    /// Drive one artifact from `Planned` to a terminal state.
    async fn finish(
        &self,
        artifact: &Artifact,
        report: &ReviewReport,
        plan: Result<OptimizationPlan, String>,
    ) -> OptimizationResult {
        let plan = match plan {
            Ok(plan) => plan,
            Err(conflict) => {
                let mut result = OptimizationResult::planned(&artifact.name, None);
                result.fail(OptimizationState::ApplyFailed, conflict);
                return result;
            }
        };

        let mut result = OptimizationResult::planned(&artifact.name, None);
        result.advance(OptimizationState::Applying);
        let applied = match apply(artifact, &plan, self.completion.as_ref(), &self.apply_model).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(artifact = %artifact.name, error = %e, "Apply failed");
                result.plan = Some(plan);
                result.fail(OptimizationState::ApplyFailed, format!("{e:#}"));
                return result;
            }
        };
        result.advance(OptimizationState::Applied);
        result.plan = Some(plan);

        result.advance(OptimizationState::Evaluating);
        match evaluate(artifact, report, &applied, self.completion.as_ref(), &self.model).await {
            Ok(score) => {
                result.score = Some(score);
                result.advance(OptimizationState::Evaluated);
            }
            Err(e) => {
                tracing::warn!(artifact = %artifact.name, error = %e, "Evaluation skipped");
                result.fail(OptimizationState::EvalSkipped, format!("{e:#}"));
            }
        }
        result.applied = Some(applied);
        result
    }
}
