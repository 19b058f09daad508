//! Evaluation step: judge how much of the original review the applied
//! content addresses.
//!
//! The score is a delegated judgement, not an exact match, and is
//! reported as advisory.

use serde::Deserialize;

use super::traits::{AppliedContent, EvaluationScore};
use crate::discovery::Artifact;
use crate::provider::response::{extract_json_block, preview};
use crate::provider::{Completion, CompletionRequest, ModelConfig};
use crate::review::{Finding, ReviewReport};

pub(crate) const EVALUATE_INSTRUCTION: &str = "You evaluate optimizations of dbt models against their original review.\n\n\
For each issue in the original review decide whether the optimized files address it. \
Report the fraction of issues resolved and note any new problems the changes introduce.";

#[derive(Debug, Deserialize)]
struct EvaluationResponse {
    coverage: Option<f64>,
    #[serde(default)]
    addressed: Vec<String>,
    #[serde(default)]
    unaddressed: Vec<String>,
    #[serde(default)]
    rationale: String,
}

/// Score `applied` against the actionable findings of `review`.
pub async fn evaluate(
    artifact: &Artifact,
    review: &ReviewReport,
    applied: &AppliedContent,
    completion: &dyn Completion,
    model: &ModelConfig,
) -> anyhow::Result<EvaluationScore> {
    let issues = review.actionable();
    if issues.is_empty() {
        return Ok(EvaluationScore {
            coverage: 1.0,
            rationale: "The review raised no actionable issues".into(),
            addressed: Vec::new(),
            unaddressed: Vec::new(),
        });
    }

    let request = CompletionRequest {
        instruction: EVALUATE_INSTRUCTION.to_string(),
        prompt: build_prompt(artifact, &issues, applied),
        model: model.clone(),
    };
    let text = completion.complete(&request).await?;
    parse_evaluation(&text)
}

fn build_prompt(artifact: &Artifact, issues: &[&Finding], applied: &AppliedContent) -> String {
    let issues: String = issues
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. [{}] {}\n", i + 1, f.severity, f.description))
        .collect();
    let optimized_yaml = applied.documentation.as_deref().unwrap_or("");

    format!(
        r#"MODEL NAME: {name}

ORIGINAL REVIEW ISSUES:
{issues}
ORIGINAL SQL:
```sql
{orig_sql}
```

OPTIMIZED SQL:
```sql
{new_sql}
```

ORIGINAL YAML:
```yaml
{orig_yaml}
```

OPTIMIZED YAML:
```yaml
{new_yaml}
```

Respond in EXACTLY this JSON format:

```json
{{
  "coverage": 0.0-1.0,
  "addressed": ["issue descriptions resolved"],
  "unaddressed": ["issue descriptions remaining"],
  "rationale": "short justification"
}}
```"#,
        name = artifact.name,
        orig_sql = artifact.definition.trim_end(),
        new_sql = applied.definition.trim_end(),
        orig_yaml = artifact.documentation_text().trim_end(),
        new_yaml = optimized_yaml.trim_end(),
    )
}

/// Parse an evaluator response into a score in `[0, 1]`.
///
/// Percentages (values in `(1, 100]`) are scaled down.
fn parse_evaluation(text: &str) -> anyhow::Result<EvaluationScore> {
    let parsed: EvaluationResponse = serde_json::from_str(extract_json_block(text)).map_err(|e| {
        anyhow::anyhow!("Unparseable evaluation ({e}): {}", preview(text, 120))
    })?;
    let raw = parsed
        .coverage
        .filter(|c| c.is_finite())
        .ok_or_else(|| anyhow::anyhow!("Evaluation has no numeric coverage"))?;
    let coverage = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };

    Ok(EvaluationScore {
        coverage: coverage.clamp(0.0, 1.0),
        rationale: parsed.rationale,
        addressed: parsed.addressed,
        unaddressed: parsed.unaddressed,
    })
}
