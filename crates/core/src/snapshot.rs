//! Reference snapshot: which rule files own which ids at the reference point.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::errors::SourceError;
use crate::file_filter::RuleFileFilter;
use crate::models::{RuleFile, RuleId};
use crate::report::{Diagnostic, IntegrityFault, Side};
use crate::source::RuleSource;

/// Mapping from rule id to every reference file that declares it.
///
/// In a healthy reference point every id has exactly one owner. The set
/// representation exists so violations can be detected and reported.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    owners: BTreeMap<RuleId, BTreeSet<String>>,
    files: usize,
}

impl ReferenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every id of `path`.
    pub fn add_file(&mut self, path: &str, ids: &[RuleId]) {
        self.files += 1;
        for id in ids {
            self.owners
                .entry(*id)
                .or_default()
                .insert(path.to_string());
        }
    }

    pub fn owners(&self, id: RuleId) -> Option<&BTreeSet<String>> {
        self.owners.get(&id)
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Number of files that contributed (including files without ids).
    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Ids owned by more than one file, sorted by id.
    pub fn integrity_faults(&self) -> Vec<IntegrityFault> {
        self.owners
            .iter()
            .filter(|(_, owners)| owners.len() > 1)
            .map(|(id, owners)| IntegrityFault {
                id: *id,
                owners: owners.iter().cloned().collect(),
            })
            .collect()
    }
}

/// Build the snapshot of every rule file at the reference point.
///
/// A file that cannot be read is skipped with a diagnostic. A listing failure
/// is a setup fault and aborts the build, so a partial snapshot never
/// reaches a verdict.
pub fn build_snapshot(
    source: &dyn RuleSource,
    filter: &RuleFileFilter,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ReferenceSnapshot, SourceError> {
    let reference = source.reference_name();
    info!(reference = %reference, "building reference snapshot");

    let mut paths: Vec<String> = source
        .list_reference_files()?
        .into_iter()
        .filter(|p| filter.accepts(p))
        .collect();
    paths.sort();

    let mut snapshot = ReferenceSnapshot::new();
    for path in paths {
        let content = match source.read_reference_file(&path) {
            Ok(content) => content,
            Err(e) if !e.is_fatal() => {
                warn!(path = %path, error = %e, "skipping unreadable reference file");
                diagnostics.push(Diagnostic::ReadFailure {
                    path,
                    side: Side::Reference,
                    detail: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let file = RuleFile::new(path, content);
        let extraction = file.extract();
        if let Some(failure) = extraction.failure {
            diagnostics.push(Diagnostic::ParseFailure {
                path: file.path.clone(),
                side: Side::Reference,
                detail: failure.to_string(),
            });
        }
        debug!(path = %file.path, ids = extraction.ids.len(), "indexed reference file");
        snapshot.add_file(&file.path, &extraction.ids);
    }

    let faults = snapshot.integrity_faults();
    if !faults.is_empty() {
        warn!(
            count = faults.len(),
            "reference point has rule ids declared by multiple files"
        );
    }
    info!(
        files = snapshot.file_count(),
        ids = snapshot.len(),
        "reference snapshot built"
    );
    Ok(snapshot)
}
