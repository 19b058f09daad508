//! Batched review coordinator.
//!
//! Per run: `Pending -> Batching -> PerArtifactFanOut -> Consolidating ->
//! Summarizing -> Done`. Batches run strictly one after another; inside a
//! batch every `(artifact, role)` pair runs concurrently and the batch
//! ends only once all of them have settled.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::roles::AnalysisRole;
use super::traits::{
    ArtifactTally, Finding, ProjectSummary, ReviewReport, ReviewStatus, RoleSection,
};
use crate::batch::{batch_count, partition, BatchRecord, TaskGroup};
use crate::discovery::Artifact;
use crate::provider::{Completion, ModelConfig};

/// Run-level progress of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPhase {
    Pending,
    Batching,
    PerArtifactFanOut,
    Consolidating,
    Summarizing,
    Done,
}

impl ReviewPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Batching => "batching",
            Self::PerArtifactFanOut => "fan-out",
            Self::Consolidating => "consolidating",
            Self::Summarizing => "summarizing",
            Self::Done => "done",
        }
    }
}

fn enter(phase: ReviewPhase, batch: Option<usize>) {
    tracing::debug!(phase = phase.label(), batch, "Review phase");
}

/// Everything a review run produced.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// One report per reviewed artifact, in input order.
    pub reports: Vec<ReviewReport>,
    pub summary: ProjectSummary,
    pub batches: Vec<BatchRecord>,
    /// The run was abandoned at a batch boundary.
    pub cancelled: bool,
}

pub struct ReviewCoordinator {
    roles: Vec<AnalysisRole>,
    completion: Arc<dyn Completion>,
    model: ModelConfig,
}

impl ReviewCoordinator {
    /// Coordinator running every analysis role.
    pub fn new(completion: Arc<dyn Completion>, model: ModelConfig) -> Self {
        Self {
            roles: AnalysisRole::ALL.to_vec(),
            completion,
            model,
        }
    }

    /// Restrict the coordinator to `roles`, in the given order.
    pub fn with_roles(mut self, roles: Vec<AnalysisRole>) -> Self {
        self.roles = roles;
        self
    }

    /// Review `artifacts` in batches of `batch_size`.
    ///
    /// Cancellation is checked before each batch; reports from batches
    /// that already settled are kept.
    pub async fn review(
        &self,
        artifacts: &[Artifact],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> ReviewOutcome {
        enter(ReviewPhase::Pending, None);
        let role_ids: Vec<&str> = self.roles.iter().map(|r| r.id()).collect();
        let total_batches = batch_count(artifacts.len(), batch_size);

        enter(ReviewPhase::Batching, None);
        tracing::info!(
            artifacts = artifacts.len(),
            batch_size,
            batches = total_batches,
            roles = self.roles.len(),
            provider = self.completion.name(),
            "Starting review"
        );

        let mut reports = Vec::with_capacity(artifacts.len());
        let mut batches = Vec::with_capacity(total_batches);
        let mut cancelled = false;

        for (index, batch) in partition(artifacts, batch_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    batch = index,
                    remaining = artifacts.len() - reports.len(),
                    "Review cancelled before batch"
                );
                cancelled = true;
                break;
            }

            enter(ReviewPhase::PerArtifactFanOut, Some(index));
            let started = Instant::now();
            let per_artifact = self.run_batch(batch).await;

            enter(ReviewPhase::Consolidating, Some(index));
            for (artifact, findings) in batch.iter().zip(per_artifact) {
                let report = consolidate(&artifact.name, &role_ids, &findings);
                tracing::info!(
                    artifact = %artifact.name,
                    batch = index,
                    findings = findings.len(),
                    degraded = report.is_degraded(),
                    "Artifact reviewed"
                );
                reports.push(report);
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(
                batch = index + 1,
                of = total_batches,
                size = batch.len(),
                elapsed_ms,
                "Review batch settled"
            );
            batches.push(BatchRecord {
                index,
                artifacts: batch.iter().map(|a| a.name.clone()).collect(),
                elapsed_ms,
            });
        }

        enter(ReviewPhase::Summarizing, None);
        let summary = summarize(&reports);
        enter(ReviewPhase::Done, None);

        ReviewOutcome {
            reports,
            summary,
            batches,
            cancelled,
        }
    }

    /// Fan out every role over every artifact of one batch. Returns the
    /// raw findings per artifact, in batch order.
    async fn run_batch(&self, batch: &[Artifact]) -> Vec<Vec<Finding>> {
        let completion = self.completion.as_ref();
        let model = &self.model;

        let mut group = TaskGroup::new();
        for (offset, artifact) in batch.iter().enumerate() {
            for &role in &self.roles {
                group.spawn((offset, role), async move {
                    role.evaluate(artifact, completion, model).await
                });
            }
        }

        let mut per_artifact: Vec<Vec<Finding>> = vec![Vec::new(); batch.len()];
        for settled in group.settle().await {
            let (offset, role) = settled.key;
            match settled.result {
                Ok(findings) => {
                    tracing::debug!(
                        artifact = %batch[offset].name,
                        role = role.id(),
                        findings = findings.len(),
                        elapsed_ms = settled.elapsed.as_millis() as u64,
                        "Role completed"
                    );
                    per_artifact[offset].extend(findings);
                }
                Err(e) => {
                    tracing::warn!(
                        artifact = %batch[offset].name,
                        role = role.id(),
                        error = %e,
                        "Role failed, recording analysis error"
                    );
                    per_artifact[offset].push(Finding::analysis_error(role.id(), format!("{e:#}")));
                }
            }
        }
        per_artifact
    }
}

// ── Consolidation ────────────────────────────────────────────────

/// Fold the findings of one artifact into a report.
///
/// Sections follow `role_order`; each configured role gets a section even
/// if it found nothing. Findings from roles outside `role_order` get
/// trailing sections in first-seen order.
pub fn consolidate(artifact: &str, role_order: &[&str], findings: &[Finding]) -> ReviewReport {
    let mut sections: Vec<RoleSection> = role_order
        .iter()
        .map(|role| RoleSection {
            role: role.to_string(),
            findings: Vec::new(),
        })
        .collect();

    for finding in findings {
        match sections.iter_mut().find(|s| s.role == finding.role) {
            Some(section) => section.findings.push(finding.clone()),
            None => sections.push(RoleSection {
                role: finding.role.clone(),
                findings: vec![finding.clone()],
            }),
        }
    }

    let failed: BTreeSet<&str> = findings
        .iter()
        .filter(|f| f.is_error())
        .map(|f| f.role.as_str())
        .collect();
    let status = if failed.is_empty() {
        ReviewStatus::Complete
    } else {
        // Keep role order rather than alphabetical order.
        let failed_roles = sections
            .iter()
            .filter(|s| failed.contains(s.role.as_str()))
            .map(|s| s.role.clone())
            .collect();
        ReviewStatus::Degraded { failed_roles }
    };

    ReviewReport {
        artifact: artifact.to_string(),
        sections,
        status,
    }
}

// ── Summarization ────────────────────────────────────────────────

/// Aggregate counts over every report.
///
/// Discovery-level context (root, undocumented and unmatched lists) is
/// left empty for the caller to fill in.
pub fn summarize(reports: &[ReviewReport]) -> ProjectSummary {
    let mut summary = ProjectSummary {
        artifacts_reviewed: reports.len(),
        ..Default::default()
    };

    for report in reports {
        for finding in report.findings() {
            summary.total_findings += 1;
            *summary.by_severity.entry(finding.severity).or_default() += 1;
        }
        if report.has_critical() {
            summary.critical_artifacts.push(report.artifact.clone());
        }
        if report.is_degraded() {
            summary.degraded_artifacts.push(report.artifact.clone());
        }
        summary.artifacts.push(ArtifactTally {
            artifact: report.artifact.clone(),
            issues: report.issue_count(),
            highest: report.highest_severity(),
            degraded: report.is_degraded(),
        });
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedCompletion;
    use crate::review::traits::{category, Severity};
    use std::path::PathBuf;

    const EMPTY: &str = r#"{"findings": []}"#;
    const DOC_ROLE: &str = "You review dbt column documentation";

    fn model() -> ModelConfig {
        ModelConfig {
            model: "test-model".into(),
            temperature: 0.2,
            max_tokens: 512,
        }
    }

    fn artifact(name: &str) -> Artifact {
        Artifact {
            name: name.into(),
            definition: format!(
                "{{{{ config(materialized='view', schema='marts') }}}}\nselect id from {{{{ ref('stg_{name}') }}}}"
            ),
            documentation: Some(format!(
                "models:\n  - name: {name}\n    description: test\n    columns:\n      - name: id\n"
            )),
            definition_path: PathBuf::from(format!("{name}.sql")),
            documentation_path: Some(PathBuf::from(format!("{name}.yml"))),
        }
    }

    fn artifacts(n: usize) -> Vec<Artifact> {
        (0..n).map(|i| artifact(&format!("model_{i:02}"))).collect()
    }

    fn coordinator(completion: Arc<ScriptedCompletion>) -> ReviewCoordinator {
        ReviewCoordinator::new(completion, model())
    }

    #[tokio::test]
    async fn one_report_per_artifact_in_input_order() {
        let completion = Arc::new(ScriptedCompletion::new(EMPTY));
        let input = artifacts(4);
        let outcome = coordinator(completion)
            .review(&input, 2, &CancellationToken::new())
            .await;

        let names: Vec<&str> = outcome.reports.iter().map(|r| r.artifact.as_str()).collect();
        assert_eq!(names, vec!["model_00", "model_01", "model_02", "model_03"]);
        for report in &outcome.reports {
            assert_eq!(report.sections.len(), AnalysisRole::ALL.len());
            assert_eq!(report.status, ReviewStatus::Complete);
        }
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn irregular_sql_reviews_without_errors() {
        let documented = |name: &str, columns: &[&str]| {
            let mut yaml = format!("models:\n  - name: {name}\n    description: test\n    columns:\n");
            for c in columns {
                yaml.push_str(&format!("      - name: {c}\n"));
            }
            Some(yaml)
        };
        let input = vec![
            Artifact {
                definition: "select '€' as currency, amount from {{ ref('fx') }}".into(),
                documentation: documented("currencies", &["currency", "amount"]),
                ..artifact("currencies")
            },
            Artifact {
                definition: "select {{ dbt_utils.star(ref('stg_orders')) }} from {{ ref('stg_orders') }}".into(),
                documentation: documented("orders", &["id"]),
                ..artifact("orders")
            },
            Artifact {
                definition: r#"{{ config(
    materialized='incremental',
    unique_key='id',
    schema='marts',
    meta={'owner': {'team': 'finance'}},
    post_hook="grant select on {{ this }} to role(reporter)"
) }}
select id, ümlaut_label as label from {{ ref('stg_payments') }}
{% if is_incremental() %} where id > (select max(id) from {{ this }}) {% endif %}"#
                    .into(),
                documentation: documented("payments", &["id", "label"]),
                ..artifact("payments")
            },
        ];

        let completion = Arc::new(ScriptedCompletion::new(EMPTY));
        let outcome = coordinator(completion)
            .review(&input, 2, &CancellationToken::new())
            .await;

        assert_eq!(outcome.reports.len(), 3);
        for report in &outcome.reports {
            assert_eq!(report.status, ReviewStatus::Complete, "{}", report.artifact);
        }

        let columns = |i: usize| {
            outcome.reports[i]
                .section("column_consistency")
                .map(|s| s.findings.iter().map(|f| f.category.as_str()).collect::<Vec<_>>())
                .unwrap_or_default()
        };
        assert!(columns(0).is_empty());
        assert_eq!(columns(1), vec![category::UNVERIFIABLE_COLUMNS]);
        assert!(columns(2).is_empty());

        let payments = outcome.reports[2].section("materialization").unwrap();
        assert!(payments.findings.is_empty(), "{:?}", payments.findings);
    }

    #[tokio::test]
    async fn seven_artifacts_in_batches_of_three() {
        let completion = Arc::new(ScriptedCompletion::new(EMPTY));
        let outcome = coordinator(completion.clone())
            .review(&artifacts(7), 3, &CancellationToken::new())
            .await;

        let sizes: Vec<usize> = outcome.batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(outcome.batches[2].artifacts, vec!["model_06"]);
        // Two completion-backed roles per artifact.
        assert_eq!(completion.call_count(), 14);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_batch() {
        let completion = Arc::new(
            ScriptedCompletion::new(EMPTY).delay(&["MODEL NAME"], std::time::Duration::from_millis(10)),
        );
        coordinator(completion.clone())
            .review(&artifacts(8), 3, &CancellationToken::new())
            .await;

        let completion_roles = AnalysisRole::ALL.iter().filter(|r| r.uses_completion()).count();
        assert!(completion.max_in_flight() <= 3 * completion_roles);
        assert!(completion.max_in_flight() > 1, "batch work should overlap");
    }

    #[tokio::test]
    async fn role_failure_is_isolated_to_one_artifact() {
        let completion = Arc::new(
            ScriptedCompletion::new(EMPTY).fail(&[DOC_ROLE, "MODEL NAME: orders"], "503 upstream"),
        );
        let input = vec![artifact("customers"), artifact("orders"), artifact("payments")];
        let outcome = coordinator(completion)
            .review(&input, 3, &CancellationToken::new())
            .await;

        let orders = &outcome.reports[1];
        assert_eq!(
            orders.status,
            ReviewStatus::Degraded {
                failed_roles: vec!["documentation_quality".into()]
            }
        );
        let error = orders
            .section("documentation_quality")
            .and_then(|s| s.findings.first())
            .unwrap();
        assert_eq!(error.category, category::ANALYSIS_ERROR);
        assert!(error.description.contains("503 upstream"));

        for other in [&outcome.reports[0], &outcome.reports[2]] {
            assert!(other.findings().all(|f| f.category != category::ANALYSIS_ERROR));
        }
        assert_eq!(outcome.summary.degraded_artifacts, vec!["orders"]);
    }

    #[tokio::test]
    async fn cancelled_run_stops_at_batch_boundary() {
        let completion = Arc::new(ScriptedCompletion::new(EMPTY));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = coordinator(completion.clone()).review(&artifacts(5), 2, &cancel).await;

        assert!(outcome.cancelled);
        assert!(outcome.reports.is_empty());
        assert!(outcome.batches.is_empty());
        assert_eq!(completion.call_count(), 0);
    }

    #[test]
    fn consolidation_is_idempotent() {
        let findings = vec![
            Finding::new("materialization", Severity::Low, category::MATERIALIZATION, "a"),
            Finding::new("column_consistency", Severity::High, category::UNDOCUMENTED_COLUMN, "b"),
            Finding::analysis_error("description_quality", "timeout"),
            Finding::new("column_consistency", Severity::Medium, category::STALE_COLUMN, "c"),
        ];
        let order = ["column_consistency", "materialization", "description_quality"];
        let first = consolidate("orders", &order, &findings);
        let second = consolidate("orders", &order, &findings);
        assert_eq!(first, second);

        let cols = first.section("column_consistency").unwrap();
        assert_eq!(cols.findings.len(), 2);
        assert_eq!(cols.findings[0].description, "b");
        assert!(first.is_degraded());
    }

    #[test]
    fn consolidation_keeps_unknown_roles() {
        let findings = vec![Finding::new("custom", Severity::Info, "note", "x")];
        let report = consolidate("orders", &["materialization"], &findings);
        assert_eq!(report.sections.len(), 2);
        assert!(report.section("materialization").unwrap().findings.is_empty());
        assert_eq!(report.sections[1].role, "custom");
    }

    #[test]
    fn summary_counts() {
        let reports = vec![
            consolidate(
                "a",
                &["r"],
                &[
                    Finding::new("r", Severity::Critical, "x", "1"),
                    Finding::new("r", Severity::Low, "x", "2"),
                ],
            ),
            consolidate("b", &["r"], &[Finding::new("r", Severity::Info, "x", "3")]),
        ];
        let summary = summarize(&reports);
        assert_eq!(summary.artifacts_reviewed, 2);
        assert_eq!(summary.total_findings, 3);
        assert_eq!(summary.count(Severity::Critical), 1);
        assert_eq!(summary.count(Severity::High), 0);
        assert_eq!(summary.critical_artifacts, vec!["a"]);
        assert_eq!(summary.artifacts[0].issues, 2);
        assert_eq!(summary.artifacts[1].issues, 0);
        assert_eq!(summary.artifacts[1].highest, Some(Severity::Info));
    }
}
