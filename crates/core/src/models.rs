//! Shared data types for the rulegate core library.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::extract::{self, Extraction};

// ---------------------------------------------------------------------------
// Rule identifiers
// ---------------------------------------------------------------------------

/// Numeric identifier of a rule. Unique across the whole rule corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RuleId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Render ids as a sorted, bracketed list: `[2, 3, 10]`.
///
/// The format is stable so CI logs can be grepped for it.
pub fn format_ids<'a>(ids: impl IntoIterator<Item = &'a RuleId>) -> String {
    let mut sorted: Vec<RuleId> = ids.into_iter().copied().collect();
    sorted.sort_unstable();
    sorted.dedup();
    let joined = sorted
        .iter()
        .map(RuleId::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}

/// Ids that occur more than once in `ids`, sorted and deduplicated.
pub fn duplicated_ids(ids: &[RuleId]) -> Vec<RuleId> {
    let mut counts: BTreeMap<RuleId, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(*id).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect()
}

// ---------------------------------------------------------------------------
// Edit status
// ---------------------------------------------------------------------------

/// How a file differs between the reference point and the working state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Unchanged,
}

impl EditStatus {
    /// Added, modified and renamed files can introduce new identifiers. A
    /// rename is checked like a modification of its old path.
    pub fn is_checked(&self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Renamed)
    }
}

impl fmt::Display for EditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
            Self::Renamed => write!(f, "renamed"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// A path reported by the change listing, with its edit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    /// Repository-relative, forward-slash separated.
    pub path: String,
    pub status: EditStatus,
    /// Path at the reference point, set for renames.
    pub old_path: Option<String>,
}

impl ChangedPath {
    pub fn new(status: EditStatus, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status,
            old_path: None,
        }
    }

    /// A file moved from `old_path` to `path`, possibly edited on the way.
    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: EditStatus::Renamed,
            old_path: Some(old_path.into()),
        }
    }

    /// Where the reference version of this file lives.
    pub fn reference_path(&self) -> &str {
        self.old_path.as_deref().unwrap_or(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Rule files
// ---------------------------------------------------------------------------

/// Outcome of parsing a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ParseStatus {
    Ok,
    ParseError(String),
}

/// A rule-definition file and its text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFile {
    pub path: String,
    pub content: String,
}

impl RuleFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Run the content through the extractor.
    pub fn extract(&self) -> Extraction {
        extract::extract_rule_ids(&self.content)
    }
}

/// A changed rule file as produced by the change set builder.
#[derive(Debug, Clone)]
pub struct ChangedRuleFile {
    pub status: EditStatus,
    /// Current (working) version.
    pub working: RuleFile,
    /// Version at the reference point: the same path for modified files, the
    /// old path for renames. Unset for added files and whenever the reference
    /// content could not be read.
    pub reference: Option<RuleFile>,
}

impl ChangedRuleFile {
    pub fn path(&self) -> &str {
        &self.working.path
    }

    /// The old path when the file was renamed from another rule file.
    pub fn renamed_from(&self) -> Option<&str> {
        self.reference
            .as_ref()
            .map(|r| r.path.as_str())
            .filter(|old| *old != self.working.path)
    }
}
