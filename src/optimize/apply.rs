//! Apply step: turn a merged plan into new artifact content.
//!
//! The model returns complete files in fenced blocks. Only targeted
//! regions are taken from the response; untargeted ones keep their
//! original text even if the model rewrote them. Inside the definition
//! the `{{ config(...) }}` block and the body are separate regions.

use super::traits::{AppliedContent, EditTarget, OptimizationPlan};
use crate::discovery::Artifact;
use crate::provider::response::extract_fenced;
use crate::provider::{Completion, CompletionRequest, ModelConfig};
use crate::review::sql::{config_block, with_config_block};

pub(crate) const APPLY_INSTRUCTION: &str = "You apply optimization plans to dbt model files.\n\n\
Apply every change in the plan to the original files, keep everything else as it is, and \
make sure the result is valid SQL/Jinja and valid YAML. Return the complete files: the SQL in \
one ```sql block and the YAML documentation in one ```yaml block.";

/// Materialize `plan` into new content for `artifact`.
pub async fn apply(
    artifact: &Artifact,
    plan: &OptimizationPlan,
    completion: &dyn Completion,
    model: &ModelConfig,
) -> anyhow::Result<AppliedContent> {
    if plan.proposals.is_empty() {
        anyhow::bail!(
            "No optimizer proposals to apply ({} role(s) failed)",
            plan.failures.len()
        );
    }

    let targets = plan.targets();
    if targets.is_empty() {
        tracing::debug!(artifact = %artifact.name, "Plan has no changes, keeping original content");
        return Ok(unchanged(artifact));
    }

    let request = CompletionRequest {
        instruction: APPLY_INSTRUCTION.to_string(),
        prompt: build_prompt(artifact, plan),
        model: model.clone(),
    };
    let text = completion.complete(&request).await?;

    let mut content = unchanged(artifact);

    if targets.iter().any(|t| t.in_definition()) {
        let sql = extract_fenced(&text, &["sql", "jinja", "jinja2"])
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Apply output has no ```sql block"))?;
        let sql = confine_definition(
            &artifact.definition,
            &sql,
            targets.contains(&EditTarget::DefinitionBody),
            targets.contains(&EditTarget::ConfigBlock),
        );
        content.definition_changed = sql.trim() != artifact.definition.trim();
        content.definition = sql;
    }

    if targets.contains(&EditTarget::Documentation) {
        let yaml = extract_fenced(&text, &["yaml", "yml"])
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Apply output has no ```yaml block"))?;
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml)
            .map_err(|e| anyhow::anyhow!("Applied documentation is not valid YAML: {e}"))?;
        if !value.is_mapping() {
            anyhow::bail!("Applied documentation is not a YAML mapping");
        }
        content.documentation_changed = artifact
            .documentation
            .as_deref()
            .is_none_or(|orig| orig.trim() != yaml.trim());
        content.documentation = Some(yaml);
    }

    Ok(content)
}

/// Combine the original and rewritten definition so only targeted regions
/// change.
fn confine_definition(original: &str, rewritten: &str, body: bool, config: bool) -> String {
    match (body, config) {
        (true, true) => rewritten.to_string(),
        (true, false) => with_config_block(rewritten, config_block(original)),
        (false, true) => with_config_block(original, config_block(rewritten)),
        (false, false) => original.to_string(),
    }
}

fn unchanged(artifact: &Artifact) -> AppliedContent {
    AppliedContent {
        definition: artifact.definition.clone(),
        documentation: artifact.documentation.clone(),
        definition_changed: false,
        documentation_changed: false,
    }
}

fn build_prompt(artifact: &Artifact, plan: &OptimizationPlan) -> String {
    let mut changes = String::new();
    for proposal in plan.proposals.iter().filter(|p| !p.is_empty()) {
        changes.push_str(&format!("\n### {} ({})\n", proposal.target.label(), proposal.role));
        for change in &proposal.changes {
            changes.push_str(&format!("- {}\n", change.summary));
            if let Some(original) = &change.original {
                changes.push_str(&format!("  original: {original}\n"));
            }
            if let Some(replacement) = &change.replacement {
                changes.push_str(&format!("  replacement: {replacement}\n"));
            }
        }
    }

    format!(
        r#"MODEL NAME: {name}

ORIGINAL SQL:
```sql
{sql}
```

ORIGINAL YAML:
```yaml
{yaml}
```

OPTIMIZATION PLAN:
{changes}
Please provide the complete optimized SQL and YAML files."#,
        name = artifact.name,
        sql = artifact.definition.trim_end(),
        yaml = artifact.documentation_text().trim_end(),
    )
}
