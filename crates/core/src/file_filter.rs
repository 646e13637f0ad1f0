//! Restriction of candidate paths to rule-definition files.
//!
//! # Decision model
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | Path is not under `rules_dir` | `OutsideRulesDir` |
//! | Path is in a subdirectory and `recursive` is off | `OutsideRulesDir` |
//! | Extension does not match | `WrongExtension` |
//! | Path matches an exclude pattern | `Excluded` |
//! | None of the above | `Accept` |
//!
//! Paths are repository-relative and compared with forward slashes.

use tracing::debug;

use crate::config::GateConfig;

// ---------------------------------------------------------------------------
// Decision enum
// ---------------------------------------------------------------------------

/// The outcome of evaluating a path against the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// The path is a rule-definition file.
    Accept,
    /// The path lives outside the rule-definitions directory.
    OutsideRulesDir,
    /// The path does not carry the rule-file extension.
    WrongExtension,
    /// The path matches a configured exclude pattern.
    Excluded { pattern: String },
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

// ---------------------------------------------------------------------------
// RuleFileFilter
// ---------------------------------------------------------------------------

/// Decides which repository paths are rule-definition files.
#[derive(Debug, Clone)]
pub struct RuleFileFilter {
    /// Directory prefix, normalized without leading/trailing slashes.
    rules_dir: String,
    /// Extension without the leading dot.
    extension: String,
    recursive: bool,
    exclude_patterns: Vec<String>,
}

impl RuleFileFilter {
    pub fn new(rules_dir: &str, extension: &str) -> Self {
        Self {
            rules_dir: normalize(rules_dir).trim_matches('/').to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            recursive: true,
            exclude_patterns: Vec::new(),
        }
    }

    /// Only accept files directly inside the rules directory.
    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Evaluate a repository-relative path.
    pub fn evaluate(&self, rel_path: &str) -> FilterDecision {
        let path = normalize(rel_path);

        let rest = match path
            .strip_prefix(self.rules_dir.as_str())
            .and_then(|r| r.strip_prefix('/'))
        {
            Some(rest) if !rest.is_empty() => rest,
            _ => return FilterDecision::OutsideRulesDir,
        };
        if !self.recursive && rest.contains('/') {
            return FilterDecision::OutsideRulesDir;
        }

        let file_name = rest.rsplit('/').next().unwrap_or(rest);
        let has_extension = file_name
            .rsplit_once('.')
            .map(|(stem, ext)| !stem.is_empty() && ext == self.extension)
            .unwrap_or(false);
        if !has_extension {
            return FilterDecision::WrongExtension;
        }

        for pattern in &self.exclude_patterns {
            if glob_match::glob_match(&normalize(pattern), &path) {
                debug!(path = %path, pattern = pattern.as_str(), "path matches exclude pattern");
                return FilterDecision::Excluded {
                    pattern: pattern.clone(),
                };
            }
        }

        FilterDecision::Accept
    }

    /// Shorthand for `evaluate(path).is_accepted()`.
    pub fn accepts(&self, rel_path: &str) -> bool {
        self.evaluate(rel_path).is_accepted()
    }
}

impl From<&GateConfig> for RuleFileFilter {
    fn from(config: &GateConfig) -> Self {
        let filter = Self::new(&config.rules_dir, &config.extension)
            .with_excludes(config.exclude.clone());
        if config.recursive {
            filter
        } else {
            filter.non_recursive()
        }
    }
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => path,
    }
}
