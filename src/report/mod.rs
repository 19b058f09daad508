//! Report writer: serializes reviews, summaries and optimization results.
//!
//! The writer is a sink. Each document is written independently; a
//! failed write is recorded in the [`WriteLog`] and the remaining
//! documents are still written.
//!
//! ## Layout
//!
//! ```text
//! <review_dir>/<model>_review.{md,json}
//! <review_dir>/summary.{md,json}
//! <optimization_dir>/<model>.<sql ext>            (when the definition changed)
//! <optimization_dir>/<model>.<yml ext>            (when the documentation changed)
//! <optimization_dir>/<model>_optimization.{md,json}
//! <optimization_dir>/optimization_summary.{md,json}
//! ```

pub mod markdown;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{OutputConfig, ReportFormat};
use crate::discovery::Artifact;
use crate::error::{RunError, RunResult};
use crate::optimize::OptimizationResult;
use crate::review::{ProjectSummary, ReviewReport};

/// A document that could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Record of every write attempted in a run.
#[derive(Debug, Clone, Default)]
pub struct WriteLog {
    pub written: Vec<PathBuf>,
    pub failed: Vec<WriteFailure>,
}

impl WriteLog {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// JSON wrapper around every document.
#[derive(Serialize)]
struct Envelope<'a, T> {
    kind: &'a str,
    generated_at: DateTime<Utc>,
    report: &'a T,
}

pub struct ReportWriter {
    review_dir: PathBuf,
    optimization_dir: PathBuf,
    format: ReportFormat,
    generated_at: DateTime<Utc>,
}

impl ReportWriter {
    pub fn new(review_dir: PathBuf, optimization_dir: PathBuf, format: ReportFormat) -> Self {
        Self {
            review_dir,
            optimization_dir,
            format,
            generated_at: Utc::now(),
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(
            output.review_dir.clone(),
            output.optimization_dir.clone(),
            output.format,
        )
    }

    pub fn review_dir(&self) -> &Path {
        &self.review_dir
    }

    pub fn optimization_dir(&self) -> &Path {
        &self.optimization_dir
    }

    /// Create the output directories. Failing here is fatal for the run.
    pub async fn prepare(&self, optimize: bool) -> RunResult<()> {
        let mut dirs = vec![&self.review_dir];
        if optimize {
            dirs.push(&self.optimization_dir);
        }
        for dir in dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| RunError::OutputDir {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn document_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{stem}.{}", self.format.extension()))
    }

    fn render<T: Serialize>(&self, kind: &str, value: &T, markdown: impl FnOnce() -> String) -> Result<String, String> {
        match self.format {
            ReportFormat::Markdown => Ok(markdown()),
            ReportFormat::Json => serde_json::to_string_pretty(&Envelope {
                kind,
                generated_at: self.generated_at,
                report: value,
            })
            .map_err(|e| format!("serialization failed: {e}")),
        }
    }

    async fn write_document(&self, path: PathBuf, contents: Result<String, String>, log: &mut WriteLog) {
        let result = match contents {
            Ok(text) => tokio::fs::write(&path, text).await.map_err(|e| e.to_string()),
            Err(reason) => Err(reason),
        };
        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Wrote document");
                log.written.push(path);
            }
            Err(reason) => {
                tracing::warn!(path = %path.display(), error = %reason, "Failed to write document");
                log.failed.push(WriteFailure { path, reason });
            }
        }
    }

    // ── Review documents ─────────────────────────────────────────

    pub async fn write_review(&self, report: &ReviewReport, log: &mut WriteLog) {
        let path = self.document_path(&self.review_dir, &format!("{}_review", report.artifact));
        let contents = self.render("review", report, || markdown::review(report, &self.generated_at));
        self.write_document(path, contents, log).await;
    }

    pub async fn write_summary(&self, summary: &ProjectSummary, log: &mut WriteLog) {
        let path = self.document_path(&self.review_dir, "summary");
        let contents = self.render("summary", summary, || markdown::summary(summary, &self.generated_at));
        self.write_document(path, contents, log).await;
    }

    // ── Optimization documents ───────────────────────────────────

    /// Write the optimized content files (only those that changed) and
    /// the per-artifact optimization report.
    pub async fn write_optimization(
        &self,
        artifact: &Artifact,
        result: &OptimizationResult,
        log: &mut WriteLog,
    ) {
        if let Some(applied) = &result.applied {
            if applied.definition_changed {
                let path = self
                    .optimization_dir
                    .join(format!("{}.{}", artifact.name, artifact.definition_extension()));
                self.write_document(path, Ok(applied.definition.clone()), log).await;
            }
            if applied.documentation_changed {
                if let Some(doc) = &applied.documentation {
                    let path = self
                        .optimization_dir
                        .join(format!("{}.{}", artifact.name, artifact.documentation_extension()));
                    self.write_document(path, Ok(doc.clone()), log).await;
                }
            }
        }

        let path = self.document_path(
            &self.optimization_dir,
            &format!("{}_optimization", result.artifact),
        );
        let contents = self.render("optimization", result, || {
            markdown::optimization(result, &self.generated_at)
        });
        self.write_document(path, contents, log).await;
    }

    pub async fn write_optimization_summary(&self, results: &[OptimizationResult], log: &mut WriteLog) {
        let path = self.document_path(&self.optimization_dir, "optimization_summary");
        let contents = self.render("optimization_summary", &results, || {
            markdown::optimization_summary(results, &self.generated_at)
        });
        self.write_document(path, contents, log).await;
    }
}
