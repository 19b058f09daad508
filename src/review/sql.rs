//! Lexical helpers for dbt model SQL.
//!
//! Everything here works on byte offsets of ASCII delimiters, so every
//! returned position is a char boundary even when the SQL contains
//! non-ASCII text.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static JINJA_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{#.*?#\}").unwrap());
static JINJA_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{%.*?%\}").unwrap());
static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--[^\n]*").unwrap());
static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

/// Identifier that replaces every `{{ ... }}` expression in [`strip_sql`].
pub const JINJA_PLACEHOLDER: &str = "__jinja__";

/// Byte ranges of the `{{ ... }}` expressions in `sql`, outermost only.
///
/// Braces are counted, so dict literals and nested expressions inside an
/// expression (`{{ config(meta={'a': {'b': 1}}) }}`) stay in one span.
/// An unterminated expression ends the scan.
pub fn jinja_expression_spans(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] != b'{' || bytes[i + 1] != b'{' {
            i += 1;
            continue;
        }
        let mut depth = 0usize;
        let mut end = None;
        for (j, &b) in bytes.iter().enumerate().skip(i) {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        end = Some(j + 1);
                        break;
                    }
                }
                _ => {}
            }
        }
        match end {
            Some(end) => {
                spans.push(i..end);
                i = end;
            }
            None => break,
        }
    }
    spans
}

/// Span of the first `{{ config(...) }}` expression.
pub fn config_block_span(sql: &str) -> Option<Range<usize>> {
    jinja_expression_spans(sql).into_iter().find(|span| {
        let inner = sql[span.start + 2..span.end - 2].trim_start();
        inner
            .strip_prefix("config")
            .is_some_and(|rest| rest.trim_start().starts_with('('))
    })
}

/// Text of the first `{{ config(...) }}` expression.
pub fn config_block(sql: &str) -> Option<&str> {
    config_block_span(sql).map(|span| &sql[span])
}

/// Arguments of the config call: the text between its outer parentheses.
pub fn config_arguments(sql: &str) -> Option<&str> {
    let block = config_block(sql)?;
    let open = block.find('(')?;
    let close = block.rfind(')')?;
    (open < close).then(|| &block[open + 1..close])
}

/// Replace (or insert, or drop) the config block of `sql`.
pub fn with_config_block(sql: &str, block: Option<&str>) -> String {
    match (config_block_span(sql), block) {
        (Some(span), Some(block)) => format!("{}{block}{}", &sql[..span.start], &sql[span.end..]),
        (Some(span), None) => format!("{}{}", &sql[..span.start], sql[span.end..].trim_start()),
        (None, Some(block)) => format!("{block}\n{sql}"),
        (None, None) => sql.to_string(),
    }
}

/// Remove comments and Jinja so the SQL can be scanned.
///
/// Jinja expressions become [`JINJA_PLACEHOLDER`] so `from {{ ref('x') }}`
/// still reads as a relation.
pub fn strip_sql(sql: &str) -> String {
    let s = JINJA_COMMENT.replace_all(sql, " ");
    let s = JINJA_BLOCK.replace_all(&s, " ");

    let mut replaced = String::with_capacity(s.len());
    let mut last = 0;
    for span in jinja_expression_spans(&s) {
        replaced.push_str(&s[last..span.start]);
        replaced.push(' ');
        replaced.push_str(JINJA_PLACEHOLDER);
        replaced.push(' ');
        last = span.end;
    }
    replaced.push_str(&s[last..]);

    let s = BLOCK_COMMENT.replace_all(&replaced, " ");
    LINE_COMMENT.replace_all(&s, " ").into_owned()
}

/// Byte offsets of `keyword` at parenthesis depth 0, outside string literals.
///
/// Unbalanced closing parentheses are ignored rather than pushing the
/// depth negative.
pub fn top_level_keyword_positions(sql: &str, keyword: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let kw = keyword.as_bytes();
    let mut positions = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0
                && i + kw.len() <= bytes.len()
                && bytes[i..i + kw.len()].eq_ignore_ascii_case(kw)
                && (i == 0 || !is_ident(bytes[i - 1]))
                && (i + kw.len() == bytes.len() || !is_ident(bytes[i + kw.len()])) =>
            {
                positions.push(i);
                i += kw.len();
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    positions
}
