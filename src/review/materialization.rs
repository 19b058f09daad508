//! Materialization-strategy heuristics.
//!
//! Reads the model's `{{ config(...) }}` block and compares the declared
//! materialization with cost signals in the SQL body.

use regex::Regex;
use std::sync::LazyLock;

use super::sql::{config_arguments, strip_sql, top_level_keyword_positions};
use super::traits::{category, Finding, Severity};
use crate::discovery::Artifact;

pub const ROLE_ID: &str = "materialization";

static RELATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(ref|source)\s*\(").unwrap());
static JOIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bjoin\b").unwrap());
static AGGREGATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(group\s+by|count\s*\(|sum\s*\(|avg\s*\(|min\s*\(|max\s*\(|over\s*\()").unwrap()
});
static INCREMENTAL_GUARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"is_incremental\s*\(\s*\)").unwrap());

/// Relations joined before a `view` is considered expensive.
const VIEW_JOIN_THRESHOLD: usize = 3;

/// Parsed `{{ config(...) }}` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelConfigBlock {
    pub materialized: Option<String>,
    pub schema: Option<String>,
    pub unique_key: Option<String>,
}

fn string_arg(args: &str, key: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"\b{key}\s*=\s*['"]([^'"]*)['"]"#)).ok()?;
    re.captures(args).map(|c| c[1].to_string())
}

fn list_arg(args: &str, key: &str) -> Vec<String> {
    let Ok(re) = Regex::new(&format!(r#"\b{key}\s*=\s*\[([^\]]*)\]"#)) else {
        return Vec::new();
    };
    match re.captures(args) {
        Some(c) => c[1]
            .split(',')
            .map(|t| t.trim().trim_matches(|ch| ch == '\'' || ch == '"').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        None => string_arg(args, key).into_iter().collect(),
    }
}

/// Parse the first config block in `sql`, if any.
pub fn parse_config_block(sql: &str) -> Option<ModelConfigBlock> {
    let args = config_arguments(sql)?;
    Some(ModelConfigBlock {
        materialized: string_arg(args, "materialized"),
        schema: string_arg(args, "schema"),
        unique_key: string_arg(args, "unique_key").or_else(|| {
            let keys = list_arg(args, "unique_key");
            (!keys.is_empty()).then(|| keys.join(", "))
        }),
    })
}

/// Evaluate the materialization strategy of one artifact.
pub fn check(artifact: &Artifact) -> Vec<Finding> {
    let config = parse_config_block(&artifact.definition).unwrap_or_default();
    let body = strip_sql(&artifact.definition);
    let relations = RELATION.find_iter(&artifact.definition).count();
    let joins = JOIN.find_iter(&body).count();
    let aggregates = AGGREGATE.is_match(&body);
    let unions = top_level_keyword_positions(&body, "union").len();

    let mut findings = Vec::new();
    let advise = |severity, description: String, suggestion: &str| {
        Finding::new(ROLE_ID, severity, category::MATERIALIZATION, description)
            .with_suggestion(suggestion)
    };

    match config.materialized.as_deref() {
        None => findings.push(advise(
            Severity::Low,
            "No materialization declared; the project default applies".into(),
            "Declare `materialized` explicitly in the model config",
        )),
        Some("table") if !aggregates && relations <= 1 && joins == 0 && unions == 0 => {
            findings.push(advise(
                Severity::Medium,
                "Materialized as `table` but only selects from a single relation without aggregation; a full rebuild is paid on every run".into(),
                "Consider `materialized='view'` for simple pass-through transformations",
            ))
        }
        Some("view") if aggregates || joins + 1 >= VIEW_JOIN_THRESHOLD => findings.push(advise(
            Severity::Medium,
            format!(
                "Materialized as `view` but performs {}; every downstream query recomputes it",
                if aggregates { "aggregation or window functions" } else { "several joins" }
            ),
            "Consider `materialized='table'` (or `incremental` for append-only sources)",
        )),
        Some("incremental") => {
            if !INCREMENTAL_GUARD.is_match(&artifact.definition) {
                findings.push(advise(
                    Severity::High,
                    "Incremental model has no `is_incremental()` filter; every run reprocesses the full source".into(),
                    "Wrap the new-rows filter in `{% if is_incremental() %} ... {% endif %}`",
                ));
            }
            if config.unique_key.is_none() {
                findings.push(advise(
                    Severity::Medium,
                    "Incremental model has no `unique_key`; late-arriving updates produce duplicates".into(),
                    "Set `unique_key` to the model's grain",
                ));
            }
        }
        Some(m @ ("table" | "view" | "ephemeral")) => {
            tracing::debug!(artifact = %artifact.name, materialized = m, "Materialization looks appropriate");
        }
        Some(other) => findings.push(Finding::new(
            ROLE_ID,
            Severity::Info,
            category::MATERIALIZATION,
            format!("Uses custom materialization `{other}`; heuristics not applied"),
        )),
    }

    if config.schema.is_none() {
        findings.push(advise(
            Severity::Low,
            "No target schema configured; the model builds into the default schema".into(),
            "Set `schema` in the model config or the folder-level project config",
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact(sql: &str) -> Artifact {
        Artifact {
            name: "orders".into(),
            definition: sql.into(),
            documentation: None,
            definition_path: PathBuf::from("orders.sql"),
            documentation_path: None,
        }
    }

    fn descriptions(findings: &[Finding]) -> String {
        findings.iter().map(|f| f.description.as_str()).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn parses_config_block() {
        let sql = "{{ config(materialized='incremental', schema=\"marts\", unique_key=['id','day'], tags=['daily', 'finance']) }}\nselect 1";
        let cfg = parse_config_block(sql).unwrap();
        assert_eq!(cfg.materialized.as_deref(), Some("incremental"));
        assert_eq!(cfg.schema.as_deref(), Some("marts"));
        assert_eq!(cfg.unique_key.as_deref(), Some("id, day"));
    }

    #[test]
    fn nested_config_arguments_are_read() {
        let sql = r#"{{ config(
    materialized='incremental',
    unique_key='order_id',
    partition_by={'field': 'ordered_at', 'granularity': 'day'},
    post_hook=["grant select on {{ this }} to role reporter"],
    schema='marts'
) }}
select order_id, ordered_at from {{ ref('stg_orders') }}
{% if is_incremental() %}
where ordered_at > (select max(ordered_at) from {{ this }})
{% endif %}"#;
        let cfg = parse_config_block(sql).unwrap();
        assert_eq!(cfg.materialized.as_deref(), Some("incremental"));
        assert_eq!(cfg.unique_key.as_deref(), Some("order_id"));
        assert_eq!(cfg.schema.as_deref(), Some("marts"));
        assert!(check(&artifact(sql)).is_empty());
    }

    #[test]
    fn missing_config_is_advisory() {
        let findings = check(&artifact("select id from {{ ref('a') }}"));
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Low));
    }

    #[test]
    fn simple_table_suggests_view() {
        let sql = "{{ config(materialized='table', schema='staging') }}\nselect id, name from {{ source('crm', 'users') }}";
        let findings = check(&artifact(sql));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert!(findings[0].suggestion.as_deref().unwrap().contains("view"));
    }

    #[test]
    fn aggregating_view_suggests_table() {
        let sql = "{{ config(materialized='view', schema='marts') }}\nselect customer_id, sum(total) as revenue from {{ ref('orders') }} group by 1";
        let findings = check(&artifact(sql));
        assert_eq!(findings.len(), 1);
        assert!(descriptions(&findings).contains("aggregation"));
    }

    #[test]
    fn incremental_without_guard_or_key() {
        let sql = "{{ config(materialized='incremental', schema='marts') }}\nselect * from {{ ref('events') }}";
        let findings = check(&artifact(sql));
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(descriptions(&findings).contains("unique_key"));
    }

    #[test]
    fn well_formed_incremental_is_clean() {
        let sql = r#"{{ config(materialized='incremental', unique_key='event_id', schema='marts') }}
select * from {{ ref('events') }}
{% if is_incremental() %}
where loaded_at > (select max(loaded_at) from {{ this }})
{% endif %}"#;
        assert!(check(&artifact(sql)).is_empty());
    }

    #[test]
    fn custom_materialization_is_info() {
        let sql = "{{ config(materialized='materialized_view', schema='x') }}\nselect 1 as a";
        let findings = check(&artifact(sql));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
    }
}
