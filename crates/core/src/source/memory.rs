//! In-memory [`RuleSource`] for fixtures and directory-pair comparisons.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use super::RuleSource;
use crate::errors::SourceError;
use crate::models::{ChangedPath, EditStatus};

/// A reference point and a working state held entirely in memory.
///
/// The change list is derived by comparing the two maps unless an explicit
/// list has been set with [`with_changes`](Self::with_changes).
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleSource {
    reference_name: String,
    reference: BTreeMap<String, String>,
    working: BTreeMap<String, String>,
    explicit_changes: Option<Vec<ChangedPath>>,
    /// Paths whose reads fail, with the reason, per side.
    reference_unreadable: BTreeMap<String, String>,
    working_unreadable: BTreeMap<String, String>,
    unavailable: bool,
}

impl MemoryRuleSource {
    pub fn new(reference_name: impl Into<String>) -> Self {
        Self {
            reference_name: reference_name.into(),
            ..Self::default()
        }
    }

    /// Add a file to the reference point. It is also present, unchanged, in
    /// the working state unless overridden.
    pub fn with_reference_file(mut self, path: &str, content: &str) -> Self {
        self.reference.insert(path.to_string(), content.to_string());
        self.working
            .entry(path.to_string())
            .or_insert_with(|| content.to_string());
        self
    }

    /// Set the working-state content of a file (adds or modifies it).
    pub fn with_working_file(mut self, path: &str, content: &str) -> Self {
        self.working.insert(path.to_string(), content.to_string());
        self
    }

    /// Remove a file from the working state.
    pub fn without_working_file(mut self, path: &str) -> Self {
        self.working.remove(path);
        self
    }

    /// Report exactly these changes instead of diffing the two maps.
    pub fn with_changes(mut self, changes: Vec<ChangedPath>) -> Self {
        self.explicit_changes = Some(changes);
        self
    }

    /// Make every read of `path` (reference or working) fail.
    pub fn with_unreadable(mut self, path: &str) -> Self {
        self.reference_unreadable
            .insert(path.to_string(), "marked unreadable".into());
        self.working_unreadable
            .insert(path.to_string(), "marked unreadable".into());
        self
    }

    /// Make `ensure_reference_point_available` fail.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Build a source from two checked-out directory trees: the reference
    /// point's files under `reference_root` and the working files under
    /// `working_root`.
    ///
    /// Files that are not valid UTF-8 still take part in change detection,
    /// but reading them fails so they surface as read-failure diagnostics.
    pub fn from_dirs(reference_root: &Path, working_root: &Path) -> Result<Self, SourceError> {
        info!(
            reference = %reference_root.display(),
            working = %working_root.display(),
            "loading rule trees from directories"
        );
        let mut source = Self::new(reference_root.display().to_string());
        let reference = read_tree(reference_root)?;
        let working = read_tree(working_root)?;
        source.reference = reference.files;
        source.reference_unreadable = reference.unreadable;
        source.working = working.files;
        source.working_unreadable = working.unreadable;
        debug!(
            reference_files = source.reference.len(),
            working_files = source.working.len(),
            "directory trees loaded"
        );
        Ok(source)
    }
}

fn check_readable(unreadable: &BTreeMap<String, String>, path: &str) -> Result<(), SourceError> {
    match unreadable.get(path) {
        Some(detail) => Err(SourceError::read_failed(path, detail)),
        None => Ok(()),
    }
}

impl RuleSource for MemoryRuleSource {
    fn reference_name(&self) -> String {
        self.reference_name.clone()
    }

    fn ensure_reference_point_available(&mut self) -> Result<(), SourceError> {
        if self.unavailable {
            return Err(SourceError::ReferenceUnavailable {
                reference: self.reference_name.clone(),
                detail: "reference point marked unavailable".into(),
            });
        }
        Ok(())
    }

    fn list_changed_files(&self) -> Result<Vec<ChangedPath>, SourceError> {
        if let Some(ref changes) = self.explicit_changes {
            return Ok(changes.clone());
        }
        let mut changes = Vec::new();
        for (path, content) in &self.working {
            match self.reference.get(path) {
                None => changes.push(ChangedPath::new(EditStatus::Added, path.as_str())),
                Some(old) if old != content => {
                    changes.push(ChangedPath::new(EditStatus::Modified, path.as_str()))
                }
                Some(_) => {}
            }
        }
        for path in self.reference.keys() {
            if !self.working.contains_key(path) {
                changes.push(ChangedPath::new(EditStatus::Deleted, path.as_str()));
            }
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn list_reference_files(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.reference.keys().cloned().collect())
    }

    fn read_reference_file(&self, path: &str) -> Result<String, SourceError> {
        check_readable(&self.reference_unreadable, path)?;
        self.reference
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::read_failed(path, "not present at reference point"))
    }

    fn read_working_file(&self, path: &str) -> Result<String, SourceError> {
        check_readable(&self.working_unreadable, path)?;
        self.working
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::read_failed(path, "not present in working state"))
    }
}

/// Files of one directory tree, keyed by forward-slash relative path.
#[derive(Default)]
struct LoadedTree {
    files: BTreeMap<String, String>,
    unreadable: BTreeMap<String, String>,
}

/// Read every file under `root`, skipping `.git`. A file that is not valid
/// UTF-8 keeps a lossy copy for change detection and is recorded as
/// unreadable.
fn read_tree(root: &Path) -> Result<LoadedTree, SourceError> {
    if !root.is_dir() {
        return Err(SourceError::ListingFailed(format!(
            "'{}' is not a directory",
            root.display()
        )));
    }
    let mut tree = LoadedTree::default();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                if entry.file_name() != ".git" {
                    pending.push(path);
                }
                continue;
            }
            let rel = match path.strip_prefix(root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            let bytes = std::fs::read(&path)?;
            match String::from_utf8(bytes) {
                Ok(content) => {
                    tree.files.insert(rel, content);
                }
                Err(e) => {
                    warn!(path = %rel, "file is not valid UTF-8");
                    let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                    tree.unreadable
                        .insert(rel.clone(), "content is not valid UTF-8".into());
                    tree.files.insert(rel, lossy);
                }
            }
        }
    }
    Ok(tree)
}
