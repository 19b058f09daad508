//! Helpers for pulling structured content out of free-form model output.

use regex::Regex;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").unwrap());

/// Extract JSON content from a response that may be wrapped in ```json blocks.
pub fn extract_json_block(text: &str) -> &str {
    // Try to find ```json ... ``` block
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return text[json_start..json_start + end].trim();
        }
    }
    // Try plain ``` block
    if let Some(start) = text.find("```") {
        let block_start = start + 3;
        if let Some(end) = text[block_start..].find("```") {
            let candidate = text[block_start..block_start + end].trim();
            // Skip the language identifier line if present
            if let Some(nl) = candidate.find('\n') {
                let first_line = &candidate[..nl];
                if !first_line.starts_with('{') && !first_line.starts_with('[') {
                    return candidate[nl + 1..].trim();
                }
            }
            return candidate;
        }
    }
    // Fall back to the outermost braces, if any.
    match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if open < close => text[open..=close].trim(),
        _ => text.trim(),
    }
}

/// First fenced block whose language tag is one of `languages`
/// (case-insensitive).
pub fn extract_fenced(text: &str, languages: &[&str]) -> Option<String> {
    FENCE
        .captures_iter(text)
        .find(|c| {
            let lang = c.get(1).map_or("", |m| m.as_str());
            languages.iter().any(|l| l.eq_ignore_ascii_case(lang))
        })
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim().to_string())
}

/// First `max` characters of `text`, for echoing malformed output.
pub fn preview(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    let mut out: String = trimmed.chars().take(max).collect();
    if trimmed.chars().count() > max {
        out.push('…');
    }
    out
}
