//! TOML-based configuration for rulegate.
//!
//! Every field has a default, so running without a config file checks
//! `rules/**/*.xml` against `origin/main`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

/// Default config file name, looked up in the repository root.
pub const DEFAULT_CONFIG_FILE: &str = "rulegate.toml";

/// How the conflict decider aggregates per-file verdicts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Stop at the first offending file.
    #[default]
    FailFast,
    /// Check every changed file and report all offenders.
    CollectAll,
}

/// Gate configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Rule-definitions directory, relative to the repository root.
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,

    /// Rule file extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Descend into subdirectories of `rules_dir`.
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Glob patterns (repository-relative) of rule files to ignore.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Remote holding the reference branch.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Reference branch name (e.g. `main`).
    #[serde(default = "default_reference_branch")]
    pub reference_branch: String,

    /// Fetch the reference branch before checking.
    #[serde(default = "default_true")]
    pub fetch: bool,

    /// Verdict aggregation policy.
    #[serde(default)]
    pub policy: Policy,

    /// Fail when the reference branch itself has ids owned by several files.
    #[serde(default)]
    pub strict_reference: bool,

    /// Environment variable holding a token for authenticated fetches.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_rules_dir() -> String {
    "rules".into()
}
fn default_extension() -> String {
    "xml".into()
}
fn default_remote() -> String {
    "origin".into()
}
fn default_reference_branch() -> String {
    "main".into()
}
fn default_true() -> bool {
    true
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rules_dir: default_rules_dir(),
            extension: default_extension(),
            recursive: true,
            exclude: Vec::new(),
            remote: default_remote(),
            reference_branch: default_reference_branch(),
            fetch: true,
            policy: Policy::default(),
            strict_reference: false,
            token_env: None,
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl GateConfig {
    /// Load a [`GateConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: GateConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.normalize();

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// Only for implicit lookups of [`DEFAULT_CONFIG_FILE`]; an explicitly
    /// requested file that is missing should go through
    /// [`load_from_file`](Self::load_from_file) and fail.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve `token_env` into `token`. A missing variable only logs a
    /// warning: public remotes fetch fine without credentials.
    pub fn resolve_env_vars(&mut self) {
        if let Some(ref env_name) = self.token_env {
            self.token = resolve_optional_env(env_name, "token_env");
        }
    }

    /// Strip cosmetic variations users tend to write.
    pub fn normalize(&mut self) {
        self.extension = self.extension.trim().trim_start_matches('.').to_string();
        let dir = self.rules_dir.trim().replace('\\', "/");
        let dir = dir.strip_prefix("./").unwrap_or(&dir);
        self.rules_dir = dir.trim_end_matches('/').to_string();
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rules_dir".into(),
                detail: "rules directory must not be empty".into(),
            });
        }
        if self.rules_dir.starts_with('/') || Path::new(&self.rules_dir).is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "rules_dir".into(),
                detail: "rules directory must be relative to the repository root".into(),
            });
        }
        if self.rules_dir.split('/').any(|c| c == "..") {
            return Err(ConfigError::InvalidValue {
                field: "rules_dir".into(),
                detail: "rules directory must not leave the repository".into(),
            });
        }
        if self.extension.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "extension".into(),
                detail: "extension must not be empty".into(),
            });
        }
        if self.reference_branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "reference_branch".into(),
                detail: "reference branch must not be empty".into(),
            });
        }
        if self.remote.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "remote".into(),
                detail: "remote must not be empty".into(),
            });
        }
        for pattern in &self.exclude {
            if pattern.trim().is_empty() || pattern.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: "exclude".into(),
                    detail: format!("invalid exclude pattern '{}'", pattern),
                });
            }
        }
        Ok(())
    }

    /// Human-readable name of the reference point, e.g. `origin/main`.
    pub fn reference_name(&self) -> String {
        format!("{}/{}", self.remote, self.reference_branch)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

/// Commented default configuration written by `rulegate init`.
pub fn default_config_toml() -> &'static str {
    r#"# rulegate configuration
# Every key is optional; the values below are the defaults.

# Directory holding rule-definition files, relative to the repository root.
rules_dir = "rules"

# Extension of rule-definition files.
extension = "xml"

# Descend into subdirectories of rules_dir.
recursive = true

# Glob patterns of rule files to ignore.
exclude = []

# Reference point the change is compared against: <remote>/<reference_branch>.
remote = "origin"
reference_branch = "main"

# Fetch the reference branch before checking.
fetch = true

# "fail_fast" stops at the first offending file, "collect_all" reports every one.
policy = "fail_fast"

# Fail when the reference branch already has ids declared by several files.
strict_reference = false

# Environment variable holding a token for fetching private remotes over HTTPS.
# token_env = "GITHUB_TOKEN"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
rules_dir = "etc/rules"
extension = "xml"
recursive = false
exclude = ["etc/rules/local_*.xml"]
remote = "upstream"
reference_branch = "master"
fetch = false
policy = "collect_all"
strict_reference = true
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: GateConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.rules_dir, "etc/rules");
        assert!(!config.recursive);
        assert_eq!(config.exclude, vec!["etc/rules/local_*.xml"]);
        assert_eq!(config.reference_name(), "upstream/master");
        assert!(!config.fetch);
        assert_eq!(config.policy, Policy::CollectAll);
        assert!(config.strict_reference);
    }

    #[test]
    fn test_defaults() {
        let config: GateConfig = toml::from_str("").unwrap();
        assert_eq!(config.rules_dir, "rules");
        assert_eq!(config.extension, "xml");
        assert!(config.recursive);
        assert_eq!(config.reference_name(), "origin/main");
        assert!(config.fetch);
        assert_eq!(config.policy, Policy::FailFast);
        assert!(!config.strict_reference);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_template_matches_defaults() {
        let parsed: GateConfig = toml::from_str(default_config_toml()).unwrap();
        let defaults = GateConfig::default();
        assert_eq!(parsed.rules_dir, defaults.rules_dir);
        assert_eq!(parsed.reference_name(), defaults.reference_name());
        assert_eq!(parsed.policy, defaults.policy);
    }

    #[test]
    fn test_load_from_file_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rulegate.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"rules_dir = \"./rules/\"\nextension = \".xml\"\n").unwrap();

        let config = GateConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.rules_dir, "rules");
        assert_eq!(config.extension, "xml");
    }

    #[test]
    fn test_file_not_found() {
        let result = GateConfig::load_from_file("/nonexistent/rulegate.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = GateConfig::load_or_default(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.rules_dir, "rules");
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rulegate.toml");
        std::fs::write(&path, "policy = \"sometimes\"").unwrap();
        assert!(matches!(
            GateConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("RULEGATE_TEST_TOKEN", "ghp_abc");
        let mut config: GateConfig =
            toml::from_str("token_env = \"RULEGATE_TEST_TOKEN\"").unwrap();
        config.resolve_env_vars();
        assert_eq!(config.token.as_deref(), Some("ghp_abc"));
        std::env::remove_var("RULEGATE_TEST_TOKEN");

        let mut config: GateConfig =
            toml::from_str("token_env = \"RULEGATE_TEST_TOKEN_UNSET\"").unwrap();
        config.resolve_env_vars();
        assert!(config.token.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<(fn(&mut GateConfig), &str)> = vec![
            (|c| c.rules_dir = String::new(), "rules_dir"),
            (|c| c.rules_dir = "/abs/rules".into(), "rules_dir"),
            (|c| c.rules_dir = "../rules".into(), "rules_dir"),
            (|c| c.extension = String::new(), "extension"),
            (|c| c.reference_branch = " ".into(), "reference_branch"),
            (|c| c.remote = String::new(), "remote"),
            (|c| c.exclude = vec!["".into()], "exclude"),
        ];
        for (mutate, expected) in cases {
            let mut config = GateConfig::default();
            mutate(&mut config);
            let result = config.validate();
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { ref field, .. }) if field == expected),
                "expected {} to be rejected",
                expected
            );
        }
    }
}
