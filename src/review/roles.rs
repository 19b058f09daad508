//! Analysis role registry.
//!
//! The set of reviewer roles is closed: each variant of [`AnalysisRole`]
//! owns one narrow concern and maps `(definition, documentation)` to a
//! list of findings. Roles never see each other's output.
//!
//! | Role | Backend |
//! |------|---------|
//! | `column_consistency` | local SQL/YAML comparison |
//! | `materialization` | local config heuristics |
//! | `documentation_quality` | completion service |
//! | `description_quality` | completion service |

use serde::{Deserialize, Serialize};

use super::traits::{category, Finding, Severity};
use super::{columns, materialization};
use crate::discovery::Artifact;
use crate::provider::response::{extract_json_block, preview};
use crate::provider::{Completion, CompletionRequest, ModelConfig};

/// Characters of malformed output echoed into a low-confidence finding.
const MALFORMED_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisRole {
    ColumnConsistency,
    Materialization,
    DocumentationQuality,
    DescriptionQuality,
}

impl AnalysisRole {
    /// Every role, in report order.
    pub const ALL: [AnalysisRole; 4] = [
        Self::ColumnConsistency,
        Self::Materialization,
        Self::DocumentationQuality,
        Self::DescriptionQuality,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::ColumnConsistency => columns::ROLE_ID,
            Self::Materialization => materialization::ROLE_ID,
            Self::DocumentationQuality => "documentation_quality",
            Self::DescriptionQuality => "description_quality",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::ColumnConsistency => "Column Consistency",
            Self::Materialization => "Materialization",
            Self::DocumentationQuality => "Column Documentation",
            Self::DescriptionQuality => "Model Description",
        }
    }

    /// Title for a role id, falling back to the id itself.
    pub fn title_for(id: &str) -> &str {
        Self::ALL
            .iter()
            .find(|r| r.id() == id)
            .map_or(id, |r| r.title())
    }

    /// Whether this role calls the completion service.
    pub fn uses_completion(self) -> bool {
        matches!(self, Self::DocumentationQuality | Self::DescriptionQuality)
    }

    /// Run this role against one artifact.
    pub async fn evaluate(
        self,
        artifact: &Artifact,
        completion: &dyn Completion,
        model: &ModelConfig,
    ) -> anyhow::Result<Vec<Finding>> {
        match self {
            Self::ColumnConsistency => Ok(columns::check(artifact)),
            Self::Materialization => Ok(materialization::check(artifact)),
            Self::DocumentationQuality | Self::DescriptionQuality => {
                if !artifact.has_documentation() {
                    return Ok(vec![Finding::missing_documentation(self.id())]);
                }
                let request = CompletionRequest {
                    instruction: self.instruction().to_string(),
                    prompt: build_prompt(artifact),
                    model: model.clone(),
                };
                let text = completion.complete(&request).await?;
                Ok(parse_quality_response(self, &text))
            }
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::DocumentationQuality => DOCUMENTATION_QUALITY_INSTRUCTION,
            Self::DescriptionQuality => DESCRIPTION_QUALITY_INSTRUCTION,
            Self::ColumnConsistency | Self::Materialization => "",
        }
    }
}

impl std::fmt::Display for AnalysisRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

// ── Prompt templates ─────────────────────────────────────────────

const RESPONSE_FORMAT: &str = r#"Respond in EXACTLY this JSON format:

```json
{
  "findings": [
    {
      "severity": "critical" | "high" | "medium" | "low" | "info",
      "category": "documentation" | "description" | "tests",
      "description": "what the issue is, naming the column or section",
      "suggestion": "concrete improvement or null"
    }
  ]
}
```

Return an empty findings list if the documentation is good."#;

const DOCUMENTATION_QUALITY_INSTRUCTION: &str = "You review dbt column documentation.\n\n\
Check that every column has a description, that descriptions are specific rather than generic, \
and that columns carry tests appropriate to their nature (keys unique and not_null, enums \
accepted_values, foreign keys relationships). Verify the logic of any conditional tests.";

const DESCRIPTION_QUALITY_INSTRUCTION: &str = "You review the model-level documentation of dbt models.\n\n\
Check that the model description states its purpose, grain and business context, mentions its \
upstream and downstream dependencies, and explains non-obvious logic. Review model-level tests \
for appropriateness.";

fn build_prompt(artifact: &Artifact) -> String {
    format!(
        r#"Please review the following dbt model.

MODEL NAME: {name}

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
struct QualityResponse {
    #[serde(default)]
    findings: Vec<QualityFinding>,
}

#[derive(Debug, Deserialize)]
struct QualityFinding {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    category: Option<String>,
    description: String,
    #[serde(default)]
    suggestion: Option<String>,
}

/// Parse a quality-role response. Malformed output becomes a single
/// low-confidence finding rather than an error.
fn parse_quality_response(role: AnalysisRole, text: &str) -> Vec<Finding> {
    let default_category = match role {
        AnalysisRole::DescriptionQuality => category::DESCRIPTION,
        _ => category::DOCUMENTATION,
    };

    match serde_json::from_str::<QualityResponse>(extract_json_block(text)) {
        Ok(parsed) => parsed
            .findings
            .into_iter()
            .filter(|f| !f.description.trim().is_empty())
            .map(|f| Finding {
                role: role.id().to_string(),
                severity: Severity::parse_lenient(&f.severity),
                category: f
                    .category
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| default_category.to_string()),
                description: f.description,
                suggestion: f.suggestion.filter(|s| !s.trim().is_empty()),
            })
            .collect(),
        Err(e) => {
            tracing::warn!(role = role.id(), error = %e, "Unparseable review response");
            vec![Finding::new(
                role.id(),
                Severity::Medium,
                category::LOW_CONFIDENCE,
                format!(
                    "Reviewer response could not be parsed ({e}); raw output: {}",
                    preview(text, MALFORMED_PREVIEW_CHARS)
                ),
            )]
        }
    }
}
