//! Configuration loading.
//!
//! Resolution order (later wins):
//! 1. Built-in defaults
//! 2. `~/.dbt-reviewer/config.toml` (or the file passed with `--config`)
//! 3. Environment variables (`OPENAI_API_KEY` / `ANTHROPIC_API_KEY`,
//!    `DBT_REVIEWER_MODEL`)
//! 4. CLI flags (applied by the binary)

pub mod schema;

use directories::UserDirs;
use std::path::{Path, PathBuf};

use crate::error::{RunError, RunResult};

pub use schema::{
    Config, DiscoveryConfig, OptimizeConfig, OutputConfig, ProviderConfig, ProviderKind,
    ReportFormat, ReviewConfig,
};

/// Environment variable overriding the configured model.
const MODEL_ENV: &str = "DBT_REVIEWER_MODEL";

/// Default config location: `~/.dbt-reviewer/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|u| u.home_dir().join(".dbt-reviewer").join("config.toml"))
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. The default path is optional: when it
    /// does not exist, built-in defaults are used.
    pub fn load(path: Option<&Path>) -> RunResult<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => (PathBuf::new(), false),
            },
        };

        let mut config = if path.as_os_str().is_empty() || (!required && !path.exists()) {
            Config::default()
        } else {
            let contents = std::fs::read_to_string(&path).map_err(|e| RunError::Config {
                path: path.clone(),
                reason: format!("Failed to read config: {e}"),
            })?;
            Self::from_toml(&contents, &path)?
        };

        config.config_path = path;
        config.apply_env(|key| std::env::var(key).ok());
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str, path: &Path) -> RunResult<Self> {
        toml::from_str(contents).map_err(|e| RunError::Config {
            path: path.to_path_buf(),
            reason: format!("Failed to parse config: {e}"),
        })
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.as_deref().map_or(true, str::is_empty) {
            if let Some(key) = lookup(self.provider.kind.api_key_env()).filter(|k| !k.is_empty()) {
                self.provider.api_key = Some(key);
            }
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.trim().is_empty()) {
            self.provider.model = model.trim().to_string();
        }
    }

    /// Expand `~` and `$VAR` in output directories.
    pub fn expand_paths(&mut self) {
        self.output.review_dir = expand(&self.output.review_dir);
        self.output.optimization_dir = expand(&self.output.optimization_dir);
    }

    /// Reject values the coordinators cannot run with.
    pub fn validate(&self) -> RunResult<()> {
        let invalid = |reason: String| RunError::Config {
            path: self.config_path.clone(),
            reason,
        };

        if self.review.batch_size == 0 {
            return Err(invalid("review.batch_size must be at least 1".into()));
        }
        if self.optimize.batch_size == 0 {
            return Err(invalid("optimize.batch_size must be at least 1".into()));
        }
        for (name, t) in [
            ("provider.temperature", self.provider.temperature),
            ("optimize.apply_temperature", self.optimize.apply_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid(format!("{name} must be within 0.0..=2.0, got {t}")));
            }
        }
        for (name, ids) in [
            ("review.roles", self.review.roles.iter().map(|r| r.id()).collect::<Vec<_>>()),
            ("optimize.roles", self.optimize.roles.iter().map(|r| r.id()).collect()),
        ] {
            if ids.is_empty() {
                return Err(invalid(format!("{name} must name at least one role")));
            }
            let repeated = ids
                .iter()
                .enumerate()
                .find_map(|(i, id)| ids[..i].contains(id).then_some(id));
            if let Some(id) = repeated {
                return Err(invalid(format!("{name} lists `{id}` more than once")));
            }
        }
        if self.provider.timeout_secs == 0 {
            return Err(invalid("provider.timeout_secs must be at least 1".into()));
        }
        if self.discovery.definition_extensions.is_empty() {
            return Err(invalid("discovery.definition_extensions must not be empty".into()));
        }
        Ok(())
    }
}

/// Expand a path with `shellexpand`, falling back to the raw value.
pub(crate) fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::OptimizerRole;
    use crate::review::AnalysisRole;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.review.batch_size, 5);
        assert_eq!(config.optimize.batch_size, 3);
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.output.format, ReportFormat::Markdown);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml_str = r#"
[provider]
kind = "anthropic"
model = "claude-sonnet-4-6"

[review]
batch_size = 2
"#;
        let config = Config::from_toml(toml_str, Path::new("inline.toml")).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert_eq!(config.provider.model, "claude-sonnet-4-6");
        assert_eq!(config.review.batch_size, 2);
        assert_eq!(config.optimize.batch_size, 3);
        assert_eq!(config.discovery.documentation_extensions, vec!["yml", "yaml"]);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = Config::from_toml("[review\nbatch_size = ", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, RunError::Config { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut config = Config::default();
        config.review.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("review.batch_size"));
    }

    #[test]
    fn out_of_range_temperature_rejected() {
        let mut config = Config::default();
        config.provider.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_supplies_key_for_configured_kind() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::Anthropic;
        config.apply_env(|k| match k {
            "ANTHROPIC_API_KEY" => Some("sk-ant".into()),
            "OPENAI_API_KEY" => Some("sk-openai".into()),
            _ => None,
        });
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-ant"));
    }

    #[test]
    fn env_does_not_override_explicit_key() {
        let mut config = Config::default();
        config.provider.api_key = Some("from-file".into());
        config.apply_env(|k| (k == "OPENAI_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn env_overrides_model() {
        let mut config = Config::default();
        config.apply_env(|k| (k == "DBT_REVIEWER_MODEL").then(|| " gpt-4.1 ".to_string()));
        assert_eq!(config.provider.model, "gpt-4.1");
    }

    #[test]
    fn role_lists_from_toml() {
        let toml_str = r#"
[review]
roles = ["materialization", "column_consistency"]

[optimize]
roles = ["materialization_tuning"]
"#;
        let config = Config::from_toml(toml_str, Path::new("roles.toml")).unwrap();
        assert_eq!(
            config.review.roles,
            vec![AnalysisRole::Materialization, AnalysisRole::ColumnConsistency]
        );
        assert_eq!(config.optimize.roles, vec![OptimizerRole::MaterializationTuning]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_role_is_config_error() {
        let err = Config::from_toml("[review]\nroles = [\"lint\"]\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, RunError::Config { .. }));
    }

    #[test]
    fn empty_or_repeated_roles_rejected() {
        let mut config = Config::default();
        config.optimize.roles.clear();
        assert!(config.validate().unwrap_err().to_string().contains("optimize.roles"));

        let mut config = Config::default();
        config.review.roles = vec![AnalysisRole::Materialization, AnalysisRole::Materialization];
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("`materialization` more than once"));
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, RunError::Config { .. }));
    }

    #[test]
    fn load_from_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[optimize]\nbatch_size = 1\n[output]\nformat = \"json\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.optimize.batch_size, 1);
        assert_eq!(config.output.format, ReportFormat::Json);
        assert_eq!(config.config_path, path);
    }
}
