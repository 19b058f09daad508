//! Markdown rendering of review and optimization documents.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::optimize::{OptimizationResult, OptimizationState};
use crate::review::{AnalysisRole, Finding, ProjectSummary, ReviewReport, ReviewStatus, Severity};

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Model-supplied text on one line, so it cannot end a list item early.
fn inline(text: &str) -> String {
    text.trim().replace(['\r', '\n'], " ")
}

/// Text for a table cell: one line, with `|` escaped.
fn cell(text: &str) -> String {
    inline(text).replace('|', "\\|")
}

fn finding_line(out: &mut String, finding: &Finding) {
    let _ = writeln!(
        out,
        "- **{}** `{}`: {}",
        finding.severity,
        finding.category,
        inline(&finding.description)
    );
    if let Some(suggestion) = &finding.suggestion {
        let _ = writeln!(out, "  - Suggestion: {}", inline(suggestion));
    }
}

// ── Review ───────────────────────────────────────────────────────

pub fn review(report: &ReviewReport, at: &DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Review: {}\n", report.artifact);
    let _ = writeln!(out, "_Generated {}_\n", timestamp(at));

    match &report.status {
        ReviewStatus::Complete => {
            let _ = writeln!(out, "**Status:** complete");
        }
        ReviewStatus::Degraded { failed_roles } => {
            let _ = writeln!(
                out,
                "**Status:** degraded (failed: {})",
                failed_roles.join(", ")
            );
        }
    }
    let _ = writeln!(out, "**Issues:** {}\n", report.issue_count());

    for section in &report.sections {
        let _ = writeln!(out, "## {}\n", AnalysisRole::title_for(&section.role));
        if section.findings.is_empty() {
            let _ = writeln!(out, "No findings.\n");
            continue;
        }
        for finding in &section.findings {
            finding_line(&mut out, finding);
        }
        out.push('\n');
    }
    out
}

pub fn summary(summary: &ProjectSummary, at: &DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Project Review Summary\n");
    let _ = writeln!(out, "_Generated {}_\n", timestamp(at));
    let _ = writeln!(out, "- Models directory: `{}`", summary.root.display());
    let _ = writeln!(out, "- Models reviewed: {}", summary.artifacts_reviewed);
    let _ = writeln!(out, "- Total findings: {}\n", summary.total_findings);

    let _ = writeln!(out, "## Findings by severity\n");
    let _ = writeln!(out, "| Severity | Count |\n|----------|-------|");
    for severity in Severity::ALL {
        let _ = writeln!(out, "| {} | {} |", severity, summary.count(severity));
    }
    out.push('\n');

    let _ = writeln!(out, "## Models\n");
    let _ = writeln!(out, "| Model | Issues | Highest | Status |\n|-------|--------|---------|--------|");
    for tally in &summary.artifacts {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            cell(&tally.artifact),
            tally.issues,
            tally.highest.map_or("-", Severity::label),
            if tally.degraded { "degraded" } else { "complete" }
        );
    }
    out.push('\n');

    list_section(&mut out, "Models with critical issues", &summary.critical_artifacts);
    list_section(&mut out, "Models with failed analyses", &summary.degraded_artifacts);
    list_section(&mut out, "Models missing documentation", &summary.undocumented);

    if !summary.unmatched.is_empty() {
        let _ = writeln!(out, "## Discovery warnings\n");
        for finding in &summary.unmatched {
            finding_line(&mut out, finding);
        }
        out.push('\n');
    }
    out
}

fn list_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "## {title}\n");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
    out.push('\n');
}

// ── Optimization ─────────────────────────────────────────────────

fn coverage_cell(result: &OptimizationResult) -> String {
    match &result.score {
        Some(score) => format!("{}%", score.percent()),
        None => "unscored".into(),
    }
}

pub fn optimization(result: &OptimizationResult, at: &DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Optimization: {}\n", result.artifact);
    let _ = writeln!(out, "_Generated {}_\n", timestamp(at));
    let _ = writeln!(out, "**Status:** {}", result.state);
    if let Some(error) = &result.error {
        let _ = writeln!(out, "**Error:** {}", inline(error));
    }
    out.push('\n');

    if let Some(plan) = &result.plan {
        let _ = writeln!(out, "## Plan\n");
        for proposal in &plan.proposals {
            let _ = writeln!(out, "### {} ({})\n", proposal.target.label(), proposal.role);
            if proposal.is_empty() {
                let _ = writeln!(out, "No changes proposed.\n");
                continue;
            }
            for change in &proposal.changes {
                let _ = writeln!(out, "- {}", inline(&change.summary));
                if let Some(addresses) = &change.addresses {
                    let _ = writeln!(out, "  - Addresses: {}", inline(addresses));
                }
            }
            if !proposal.rationale.is_empty() {
                let _ = writeln!(out, "\n{}", proposal.rationale);
            }
            out.push('\n');
        }
        for failure in &plan.failures {
            let _ = writeln!(out, "- _{} failed:_ {}", failure.role, inline(&failure.reason));
        }
        if !plan.failures.is_empty() {
            out.push('\n');
        }
    }

    if let Some(applied) = &result.applied {
        let _ = writeln!(out, "## Applied changes\n");
        let _ = writeln!(
            out,
            "- Definition: {}",
            if applied.definition_changed { "rewritten" } else { "unchanged" }
        );
        let _ = writeln!(
            out,
            "- Documentation: {}\n",
            if applied.documentation_changed { "rewritten" } else { "unchanged" }
        );
    }

    let _ = writeln!(out, "## Evaluation\n");
    match &result.score {
        Some(score) => {
            let _ = writeln!(out, "**Coverage:** {}% (advisory)\n", score.percent());
            if !score.rationale.is_empty() {
                let _ = writeln!(out, "{}\n", score.rationale);
            }
            for item in &score.addressed {
                let _ = writeln!(out, "- [x] {}", inline(item));
            }
            for item in &score.unaddressed {
                let _ = writeln!(out, "- [ ] {}", inline(item));
            }
        }
        None if result.state == OptimizationState::ApplyFailed => {
            let _ = writeln!(out, "Not evaluated: apply failed.");
        }
        None => {
            let _ = writeln!(out, "Unscored: evaluation could not run.");
        }
    }
    out
}

pub fn optimization_summary(results: &[OptimizationResult], at: &DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Optimization Summary\n");
    let _ = writeln!(out, "_Generated {}_\n", timestamp(at));

    for state in OptimizationState::TERMINAL {
        let n = results.iter().filter(|r| r.state == state).count();
        let _ = writeln!(out, "- {}: {}", state, n);
    }
    out.push('\n');

    let _ = writeln!(out, "| Model | Status | Changes | Coverage |\n|-------|--------|---------|----------|");
    for result in results {
        let changes = result.plan.as_ref().map_or(0, |p| p.change_count());
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            cell(&result.artifact),
            result.state,
            changes,
            coverage_cell(result)
        );
    }
    out
}
