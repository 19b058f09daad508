//! Column-consistency analysis.
//!
//! Extracts the output columns of a model's final top-level `SELECT` and
//! compares them, case-sensitively, with the columns declared in its
//! documentation.

use regex::Regex;
use std::sync::LazyLock;

use super::sql::{strip_sql, top_level_keyword_positions, JINJA_PLACEHOLDER};
use super::traits::{category, Finding, Severity};
use crate::discovery::schema::SchemaFile;
use crate::discovery::Artifact;

pub const ROLE_ID: &str = "column_consistency";

static ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bas\s+([`"\[]?[A-Za-z_][A-Za-z0-9_$]*[`"\]]?)\s*$"#).unwrap()
});
static BARE_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[)\w`"\]]\s+([A-Za-z_][A-Za-z0-9_$]*)\s*$"#).unwrap()
});
static DOTTED_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[`"\[]?[A-Za-z_][A-Za-z0-9_$]*[`"\]]?(\.[`"\[]?[A-Za-z_][A-Za-z0-9_$]*[`"\]]?)*$"#)
        .unwrap()
});

/// Output columns of a model's final projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Named output columns, in select order, de-duplicated.
    pub columns: Vec<String>,
    /// The projection contains `*` or `alias.*`.
    pub has_star: bool,
    /// An item is a Jinja expression with no alias, so its output
    /// columns are unknown (`{{ dbt_utils.star(...) }}`).
    pub has_macro: bool,
}

impl Projection {
    /// Whether the named columns are the complete output.
    pub fn is_closed(&self) -> bool {
        !self.has_star && !self.has_macro
    }
}

/// Split on commas at parenthesis depth 0.
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

fn unquote(ident: &str) -> String {
    ident
        .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
        .to_string()
}

/// Output column name of one projection item, if it has one.
fn output_name(item: &str) -> Option<String> {
    let item = item.trim();
    if let Some(c) = ALIAS.captures(item) {
        return Some(unquote(&c[1]));
    }
    if DOTTED_IDENT.is_match(item) {
        let last = item.rsplit('.').next().unwrap_or(item);
        return Some(unquote(last));
    }
    // `expr alias` without AS, e.g. `count(*) order_count`.
    if let Some(c) = BARE_ALIAS.captures(item) {
        let alias = &c[1];
        let reserved = ["end", "asc", "desc", "null", "true", "false"];
        if !reserved.iter().any(|r| r.eq_ignore_ascii_case(alias)) {
            return Some(alias.to_string());
        }
    }
    None
}

/// Extract the final top-level projection of `sql`.
///
/// Returns `None` when no top-level `SELECT` can be found.
pub fn extract_projection(sql: &str) -> Option<Projection> {
    let cleaned = strip_sql(sql);
    let select_at = *top_level_keyword_positions(&cleaned, "select").last()?;
    let list_start = select_at + "select".len();
    let list_end = top_level_keyword_positions(&cleaned[list_start..], "from")
        .first()
        .map_or(cleaned.len(), |p| list_start + p);
    let mut list = cleaned[list_start..list_end].trim();

    for modifier in ["distinct", "all"] {
        let prefixed = list
            .get(..modifier.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(modifier))
            && list
                .as_bytes()
                .get(modifier.len())
                .is_some_and(u8::is_ascii_whitespace);
        if prefixed {
            list = list[modifier.len()..].trim_start();
        }
    }

    let mut projection = Projection::default();
    for item in split_top_level(list) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if item == "*" || item.ends_with(".*") {
            projection.has_star = true;
            continue;
        }
        match output_name(item) {
            Some(name) if name == JINJA_PLACEHOLDER => projection.has_macro = true,
            Some(name) => {
                if !projection.columns.contains(&name) {
                    projection.columns.push(name);
                }
            }
            None if item.contains(JINJA_PLACEHOLDER) => projection.has_macro = true,
            None => {}
        }
    }
    Some(projection)
}

/// Compare definition columns with documented columns.
pub fn check(artifact: &Artifact) -> Vec<Finding> {
    if !artifact.has_documentation() {
        return vec![Finding::missing_documentation(ROLE_ID)];
    }

    let schema = match SchemaFile::parse(artifact.documentation_text()) {
        Ok(s) => s,
        Err(e) => {
            return vec![Finding::new(
                ROLE_ID,
                Severity::Medium,
                category::UNPARSEABLE_DOCUMENTATION,
                format!("Documentation is not valid YAML: {e}"),
            )]
        }
    };
    let Some(model) = schema.model(&artifact.name) else {
        return vec![Finding::new(
            ROLE_ID,
            Severity::Medium,
            category::MISSING_DOCUMENTATION,
            format!("Documentation does not declare model `{}`", artifact.name),
        )
        .with_suggestion(format!("Add a `models:` entry named `{}`", artifact.name))];
    };

    let Some(projection) = extract_projection(&artifact.definition) else {
        return vec![Finding::new(
            ROLE_ID,
            Severity::Info,
            category::UNVERIFIABLE_COLUMNS,
            "No top-level SELECT found; output columns cannot be verified",
        )];
    };

    let documented = model.column_names();
    let mut findings = Vec::new();

    for col in &projection.columns {
        if documented.contains(&col.as_str()) {
            continue;
        }
        if let Some(doc) = documented.iter().find(|d| d.eq_ignore_ascii_case(col)) {
            findings.push(
                Finding::new(
                    ROLE_ID,
                    Severity::Medium,
                    category::COLUMN_CASE_MISMATCH,
                    format!("Column `{col}` is documented as `{doc}` (case differs)"),
                )
                .with_suggestion(format!("Rename the documented column to `{col}`")),
            );
            continue;
        }
        findings.push(
            Finding::new(
                ROLE_ID,
                Severity::High,
                category::UNDOCUMENTED_COLUMN,
                format!("Column `{col}` is selected by the model but not documented"),
            )
            .with_suggestion(format!("Add `{col}` with a description to the model's columns")),
        );
    }

    if !projection.is_closed() {
        let source = if projection.has_star {
            "uses `*`"
        } else {
            "selects Jinja-generated columns"
        };
        findings.push(Finding::new(
            ROLE_ID,
            Severity::Info,
            category::UNVERIFIABLE_COLUMNS,
            format!("Final SELECT {source}; documented columns cannot be fully verified"),
        ));
    } else {
        for doc in &documented {
            let matched = projection.columns.iter().any(|c| c.eq_ignore_ascii_case(doc));
            if !matched {
                findings.push(
                    Finding::new(
                        ROLE_ID,
                        Severity::Medium,
                        category::STALE_COLUMN,
                        format!("Column `{doc}` is documented but not produced by the model"),
                    )
                    .with_suggestion(format!("Remove `{doc}` from the documentation or select it")),
                );
            }
        }
    }

    findings
}
