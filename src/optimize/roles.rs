//! Optimizer role registry.
//!
//! Each [`OptimizerRole`] reads the review of one artifact, picks out the
//! findings in its own dimension and proposes edits to exactly one
//! [`EditTarget`].

use serde::{Deserialize, Serialize};

use super::traits::{ChangeProposal, EditTarget, ProposedChange};
use crate::discovery::Artifact;
use crate::provider::response::{extract_json_block, preview};
use crate::provider::{Completion, CompletionRequest, ModelConfig};
use crate::review::{category, materialization, Finding, ReviewReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerRole {
    DefinitionRewrite,
    DocumentationRewrite,
    MaterializationTuning,
}

impl OptimizerRole {
    pub const ALL: [OptimizerRole; 3] = [
        Self::DefinitionRewrite,
        Self::DocumentationRewrite,
        Self::MaterializationTuning,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::DefinitionRewrite => "definition_rewrite",
            Self::DocumentationRewrite => "documentation_rewrite",
            Self::MaterializationTuning => "materialization_tuning",
        }
    }

    /// The only region this role may edit.
    pub fn target(self) -> EditTarget {
        match self {
            Self::DefinitionRewrite => EditTarget::DefinitionBody,
            Self::DocumentationRewrite => EditTarget::Documentation,
            Self::MaterializationTuning => EditTarget::ConfigBlock,
        }
    }

    /// Whether `finding` falls in this role's dimension.
    pub fn addresses(self, finding: &Finding) -> bool {
        if !finding.is_actionable() {
            return false;
        }
        let documentation_side = matches!(
            finding.category.as_str(),
            category::MISSING_DOCUMENTATION
                | category::UNPARSEABLE_DOCUMENTATION
                | category::UNDOCUMENTED_COLUMN
                | category::STALE_COLUMN
                | category::DOCUMENTATION
                | category::DESCRIPTION
                | category::TESTS
        );
        match self {
            Self::MaterializationTuning => finding.role == materialization::ROLE_ID,
            Self::DocumentationRewrite => {
                finding.role != materialization::ROLE_ID && documentation_side
            }
            Self::DefinitionRewrite => {
                finding.role != materialization::ROLE_ID && !documentation_side
            }
        }
    }

    /// Propose edits for one artifact.
    ///
    /// A role with nothing to address returns an empty proposal without
    /// calling the model. Unparseable output is an error.
    pub async fn propose(
        self,
        artifact: &Artifact,
        review: &ReviewReport,
        completion: &dyn Completion,
        model: &ModelConfig,
    ) -> anyhow::Result<ChangeProposal> {
        let relevant: Vec<&Finding> = review.findings().filter(|f| self.addresses(f)).collect();
        if relevant.is_empty() {
            return Ok(ChangeProposal {
                role: self.id().to_string(),
                target: self.target(),
                changes: Vec::new(),
                rationale: "No findings in this dimension".into(),
            });
        }

        let request = CompletionRequest {
            instruction: self.instruction().to_string(),
            prompt: build_prompt(artifact, &relevant),
            model: model.clone(),
        };
        let text = completion.complete(&request).await?;
        parse_proposal(self, &text)
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::DefinitionRewrite => DEFINITION_INSTRUCTION,
            Self::DocumentationRewrite => DOCUMENTATION_INSTRUCTION,
            Self::MaterializationTuning => MATERIALIZATION_INSTRUCTION,
        }
    }
}

impl std::fmt::Display for OptimizerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

// ── Prompt templates ─────────────────────────────────────────────

const DEFINITION_INSTRUCTION: &str = "You improve the SQL of dbt models.\n\n\
For each review issue listed, propose a specific change to the SQL select body. \
Do not touch the config block and do not edit documentation. Include the original \
and the suggested snippet and name the issue each change addresses.";

const DOCUMENTATION_INSTRUCTION: &str = "You improve the YAML documentation of dbt models.\n\n\
For each review issue listed, propose a specific change to the schema YAML: add missing \
columns and descriptions, sharpen generic descriptions, add appropriate tests. Do not \
edit the SQL. Include the original and the suggested snippet.";

const MATERIALIZATION_INSTRUCTION: &str = "You tune the materialization of dbt models.\n\n\
For each review issue listed, propose a specific change to the `{{ config(...) }}` block \
only: materialization, unique_key, schema or tags. Explain the performance implication.";

const RESPONSE_FORMAT: &str = r#"Respond in EXACTLY this JSON format:

```json
{
  "changes": [
    {
      "summary": "one-line description of the change",
      "original": "snippet being replaced or null",
      "replacement": "new snippet",
      "addresses": "the review issue this resolves"
    }
  ],
  "rationale": "overall reasoning"
}
```"#;

fn build_prompt(artifact: &Artifact, findings: &[&Finding]) -> String {
    let issues: String = findings
        .iter()
        .map(|f| {
            let mut line = format!("- [{}] ({}) {}", f.severity, f.category, f.description);
            if let Some(s) = &f.suggestion {
                line.push_str(&format!(" | suggestion: {s}"));
            }
            line.push('\n');
            line
        })
        .collect();

    format!(
        r#"MODEL NAME: {name}

REVIEW ISSUES:
{issues}
SQL MODEL:
```sql
{sql}
```

YAML DOCUMENTATION:
```yaml
{yaml}
```

{format}"#,
        name = artifact.name,
        sql = artifact.definition.trim_end(),
        yaml = artifact.documentation_text().trim_end(),
        format = RESPONSE_FORMAT,
    )
}

// ── Response parsing ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProposalResponse {
    changes: Vec<ProposedChange>,
    #[serde(default)]
    rationale: String,
}

fn parse_proposal(role: OptimizerRole, text: &str) -> anyhow::Result<ChangeProposal> {
    let parsed: ProposalResponse = serde_json::from_str(extract_json_block(text)).map_err(|e| {
        anyhow::anyhow!(
            "{} returned an unparseable proposal ({e}): {}",
            role.id(),
            preview(text, 120)
        )
    })?;
    Ok(ChangeProposal {
        role: role.id().to_string(),
        target: role.target(),
        changes: parsed
            .changes
            .into_iter()
            .filter(|c| !c.summary.trim().is_empty())
            .collect(),
        rationale: parsed.rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedCompletion;
    use crate::review::{consolidate, Severity};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn artifact() -> Artifact {
        Artifact {
            name: "orders".into(),
            definition: "{{ config(materialized='table') }}\nselect id, total from {{ ref('stg_orders') }}".into(),
            documentation: Some("models:\n  - name: orders\n    columns:\n      - name: id\n".into()),
            definition_path: PathBuf::from("orders.sql"),
            documentation_path: Some(PathBuf::from("orders.yml")),
        }
    }

    fn review() -> ReviewReport {
        consolidate(
            "orders",
            &["column_consistency", "materialization"],
            &[
                Finding::new(
                    "column_consistency",
                    Severity::High,
                    category::UNDOCUMENTED_COLUMN,
                    "Column `total` is not documented",
                ),
                Finding::new(
                    "materialization",
                    Severity::Medium,
                    category::MATERIALIZATION,
                    "Consider view",
                ),
            ],
        )
    }

    fn model() -> ModelConfig {
        ModelConfig {
            model: "m".into(),
            temperature: 0.2,
            max_tokens: 256,
        }
    }

    #[test]
    fn targets_are_disjoint() {
        let targets: BTreeSet<_> = OptimizerRole::ALL.iter().map(|r| r.target()).collect();
        assert_eq!(targets.len(), OptimizerRole::ALL.len());
        for role in OptimizerRole::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.id()));
        }
    }

    #[test]
    fn findings_route_to_their_dimension() {
        let report = review();
        let undocumented = report.findings().next().unwrap();
        assert!(OptimizerRole::DocumentationRewrite.addresses(undocumented));
        assert!(!OptimizerRole::DefinitionRewrite.addresses(undocumented));
        let mat = report.findings().nth(1).unwrap();
        assert!(OptimizerRole::MaterializationTuning.addresses(mat));
        assert!(!OptimizerRole::DocumentationRewrite.addresses(mat));
        assert!(!OptimizerRole::MaterializationTuning
            .addresses(&Finding::analysis_error("materialization", "x")));
    }

    #[tokio::test]
    async fn nothing_to_address_skips_the_model() {
        let completion = ScriptedCompletion::new("not json");
        let proposal = OptimizerRole::DefinitionRewrite
            .propose(&artifact(), &review(), &completion, &model())
            .await
            .unwrap();
        assert!(proposal.is_empty());
        assert_eq!(proposal.target, EditTarget::DefinitionBody);
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn parses_proposal() {
        let completion = ScriptedCompletion::new("not json").reply(
            &["You improve the YAML documentation"],
            r#"```json
{"changes": [{"summary": "Document total", "replacement": "- name: total", "addresses": "Column `total` is not documented"}], "rationale": "coverage"}
```"#,
        );
        let proposal = OptimizerRole::DocumentationRewrite
            .propose(&artifact(), &review(), &completion, &model())
            .await
            .unwrap();
        assert_eq!(proposal.changes.len(), 1);
        assert_eq!(proposal.target, EditTarget::Documentation);
        assert_eq!(completion.prompts_containing("Column `total` is not documented"), 1);
        // The materialization finding is not part of the documentation prompt.
        assert_eq!(completion.prompts_containing("Consider view"), 0);
    }

    #[tokio::test]
    async fn malformed_proposal_is_an_error() {
        let completion = ScriptedCompletion::new("I would change the materialization.");
        let err = OptimizerRole::MaterializationTuning
            .propose(&artifact(), &review(), &completion, &model())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("materialization_tuning"));
    }
}
