//! Artifact discovery: pair model definition files with their documentation.
//!
//! ## Pairing rules
//!
//! - Every definition file (`*.sql` by default) becomes one [`Artifact`],
//!   identified by its case-sensitive, extension-stripped base name.
//! - A documentation file (`*.yml` / `*.yaml`) in the same directory with
//!   the same base name is attached as the artifact's documentation.
//! - With schema lookup enabled, remaining documentation files are parsed
//!   and each `models:` entry that names an undocumented artifact is
//!   attached to it.
//! - Documentation that attaches to nothing is reported as an
//!   `unmatched-documentation` warning and never becomes an artifact.
//!
//! Artifacts are returned in lexicographic order of base name.

pub mod schema;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::DiscoveryConfig;
use crate::error::{RunError, RunResult};
use crate::review::{category, Finding, Severity};

use self::schema::SchemaFile;

/// Role id used for findings raised during discovery.
pub const DISCOVERY_ROLE: &str = "discovery";

// ── Artifact ─────────────────────────────────────────────────────

/// One reviewable unit: a definition file plus optional documentation.
///
/// Immutable after discovery. Optimization produces new content next to
/// the artifact, never in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Base name, unique within a run.
    pub name: String,
    pub definition: String,
    pub documentation: Option<String>,
    pub definition_path: PathBuf,
    pub documentation_path: Option<PathBuf>,
}

impl Artifact {
    pub fn has_documentation(&self) -> bool {
        self.documentation
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// Documentation text, empty when absent.
    pub fn documentation_text(&self) -> &str {
        self.documentation.as_deref().unwrap_or("")
    }

    /// Extension of the definition file (`sql` when unknown).
    pub fn definition_extension(&self) -> &str {
        self.definition_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("sql")
    }

    /// Extension to use for documentation output (`yml` when none exists yet).
    pub fn documentation_extension(&self) -> &str {
        self.documentation_path
            .as_deref()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .unwrap_or("yml")
    }
}

// ── Discovery result ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Discovery {
    pub root: PathBuf,
    /// Valid artifacts, sorted by name.
    pub artifacts: Vec<Artifact>,
    /// Warnings for files that did not produce an artifact.
    pub unmatched: Vec<Finding>,
}

impl Discovery {
    /// Names of artifacts without documentation.
    pub fn undocumented(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter(|a| !a.has_documentation())
            .map(|a| a.name.clone())
            .collect()
    }
}

struct DefinitionFile {
    path: PathBuf,
    content: String,
    doc: Option<(PathBuf, String)>,
}

/// Scan `root` and pair definitions with documentation.
///
/// Fails with [`RunError::UnreadableRoot`] when `root` cannot be listed and
/// with [`RunError::NoInput`] when no valid artifact is found.
pub async fn discover(root: &Path, config: &DiscoveryConfig) -> RunResult<Discovery> {
    tokio::fs::read_dir(root)
        .await
        .map_err(|source| RunError::UnreadableRoot {
            root: root.to_path_buf(),
            source,
        })?;

    let mut unmatched = Vec::new();
    let definition_paths = collect_files(root, &config.definition_extensions, &mut unmatched);
    let documentation_paths = collect_files(root, &config.documentation_extensions, &mut unmatched);

    tracing::info!(
        root = %root.display(),
        definitions = definition_paths.len(),
        documentation = documentation_paths.len(),
        "Scanned models directory"
    );

    // Definitions by base name. First path (sorted) wins on duplicates.
    let mut definitions: BTreeMap<String, DefinitionFile> = BTreeMap::new();
    for path in definition_paths {
        let Some(name) = base_name(&path) else { continue };
        if let Some(existing) = definitions.get(&name) {
            unmatched.push(warning(
                category::DUPLICATE_DEFINITION,
                format!(
                    "Definition `{}` duplicates model name `{}` already defined at `{}`",
                    path.display(),
                    name,
                    existing.path.display()
                ),
            ));
            continue;
        }
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read definition");
                unmatched.push(warning(
                    category::UNREADABLE_FILE,
                    format!("Cannot read `{}`: {e}", path.display()),
                ));
                continue;
            }
        };
        definitions.insert(name, DefinitionFile { path, content, doc: None });
    }

    // Sibling documentation first, then shared schema lookup.
    let mut leftovers: Vec<(PathBuf, String)> = Vec::new();
    for path in documentation_paths {
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                unmatched.push(warning(
                    category::UNREADABLE_FILE,
                    format!("Cannot read `{}`: {e}", path.display()),
                ));
                continue;
            }
        };
        let sibling = base_name(&path)
            .and_then(|name| definitions.get_mut(&name))
            .filter(|def| def.doc.is_none() && def.path.parent() == path.parent());
        match sibling {
            Some(def) => def.doc = Some((path, content)),
            None => leftovers.push((path, content)),
        }
    }

    for (path, content) in leftovers {
        if !config.schema_lookup {
            unmatched.push(unmatched_doc(&path, None));
            continue;
        }
        match SchemaFile::parse(&content) {
            Ok(schema) => {
                let mut referenced = false;
                for model in &schema.models {
                    let Some(def) = definitions.get_mut(&model.name) else { continue };
                    referenced = true;
                    if def.doc.is_some() {
                        continue;
                    }
                    match model.to_standalone_yaml() {
                        Ok(yaml) => def.doc = Some((path.clone(), yaml)),
                        Err(e) => tracing::warn!(
                            path = %path.display(),
                            model = %model.name,
                            error = %e,
                            "Failed to extract model documentation"
                        ),
                    }
                }
                if !referenced {
                    unmatched.push(unmatched_doc(&path, None));
                }
            }
            Err(e) => unmatched.push(unmatched_doc(&path, Some(e.to_string()))),
        }
    }

    let mut artifacts = Vec::with_capacity(definitions.len());
    for (name, def) in definitions {
        if def.content.trim().is_empty() {
            unmatched.push(warning(
                category::EMPTY_DEFINITION,
                format!("Definition `{}` is empty and was skipped", def.path.display()),
            ));
            continue;
        }
        let (documentation_path, documentation) = match def.doc {
            Some((p, c)) => (Some(p), Some(c)),
            None => (None, None),
        };
        artifacts.push(Artifact {
            name,
            definition: def.content,
            documentation,
            definition_path: def.path,
            documentation_path,
        });
    }

    for w in &unmatched {
        tracing::warn!(category = %w.category, "{}", w.description);
    }

    if artifacts.is_empty() {
        return Err(RunError::NoInput {
            root: root.to_path_buf(),
        });
    }

    let discovery = Discovery {
        root: root.to_path_buf(),
        artifacts,
        unmatched,
    };
    let undocumented = discovery.undocumented();
    tracing::info!(
        artifacts = discovery.artifacts.len(),
        documented = discovery.artifacts.len() - undocumented.len(),
        undocumented = undocumented.len(),
        "Paired model files"
    );
    Ok(discovery)
}

/// Recursively list files under `root` with any of `extensions`, sorted.
fn collect_files(root: &Path, extensions: &[String], unmatched: &mut Vec<Finding>) -> Vec<PathBuf> {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let mut files = Vec::new();
    for ext in extensions {
        let pattern = format!("{}/**/*.{}", escaped, ext.trim_start_matches('.'));
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid discovery pattern");
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => unmatched.push(warning(
                    category::UNREADABLE_FILE,
                    format!("Cannot read `{}`: {}", e.path().display(), e.error()),
                )),
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

fn base_name(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

fn warning(category: &str, description: String) -> Finding {
    Finding::new(DISCOVERY_ROLE, Severity::Medium, category, description)
}

fn unmatched_doc(path: &Path, parse_error: Option<String>) -> Finding {
    let description = match parse_error {
        Some(e) => format!(
            "Documentation `{}` matches no model definition and could not be parsed: {e}",
            path.display()
        ),
        None => format!("Documentation `{}` matches no model definition", path.display()),
    };
    warning(category::UNMATCHED_DOCUMENTATION, description)
}
