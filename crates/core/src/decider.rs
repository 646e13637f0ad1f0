//! Conflict decision logic.
//!
//! Given the reference snapshot and the change set, the decider checks each
//! changed rule file in path order:
//!
//! | Step | Applies to | Fails with |
//! |------|-----------|------------|
//! | Same id declared twice in the file | every file | `InternalDuplicate` |
//! | Ids identical to the reference version | modified, renamed | (passes, no lookups) |
//! | Any declared id owned at the reference point | added | `Conflict` |
//! | Any *newly* declared id owned at the reference point | modified, renamed | `Conflict` |
//! | Newly declared id also claimed by an earlier file of the change | all | `Conflict` |
//!
//! A modified file may keep re-declaring ids it already owned at the
//! reference point; only ids it did not declare before are looked up. A
//! renamed file is compared with its old path, which is never counted as a
//! competing owner.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::changeset::ChangeSet;
use crate::config::Policy;
use crate::models::{duplicated_ids, format_ids, ChangedRuleFile, EditStatus, ParseStatus, RuleId};
use crate::report::{Diagnostic, Side};
use crate::snapshot::ReferenceSnapshot;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where the competing claim on an id comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    /// Owned by one or more files at the reference point.
    Reference,
    /// Newly claimed by another file of the same change.
    Change,
}

/// One colliding id and every other file that claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdConflict {
    pub id: RuleId,
    pub owners: Vec<String>,
    pub source: ClaimSource,
}

impl IdConflict {
    /// The reference point itself already had several owners for this id.
    pub fn is_preexisting_fault(&self) -> bool {
        self.source == ClaimSource::Reference && self.owners.len() > 1
    }
}

impl fmt::Display for IdConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            ClaimSource::Reference if self.is_preexisting_fault() => write!(
                f,
                "rule id {} already exists in multiple files: {}",
                self.id,
                self.owners.join(", ")
            ),
            ClaimSource::Reference => {
                write!(f, "rule id {} already exists in {}", self.id, self.owners.join(", "))
            }
            ClaimSource::Change => write!(
                f,
                "rule id {} is also newly claimed by {} in this change",
                self.id,
                self.owners.join(", ")
            ),
        }
    }
}

/// Result of checking one changed rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    /// The file declares the same id more than once.
    InternalDuplicate { file: String, ids: Vec<RuleId> },
    /// The file claims ids that other files already own.
    Conflict {
        file: String,
        conflicts: Vec<IdConflict>,
    },
}

impl Verdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Clean => None,
            Self::InternalDuplicate { file, .. } | Self::Conflict { file, .. } => Some(file),
        }
    }

    /// Offending ids, sorted.
    pub fn ids(&self) -> Vec<RuleId> {
        let mut ids = match self {
            Self::Clean => Vec::new(),
            Self::InternalDuplicate { ids, .. } => ids.clone(),
            Self::Conflict { conflicts, .. } => conflicts.iter().map(|c| c.id).collect(),
        };
        ids.sort_unstable();
        ids
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::InternalDuplicate { file, ids } => write!(
                f,
                "{}: rule ids {} are declared more than once in the same file",
                file,
                format_ids(ids)
            ),
            Self::Conflict { file, .. } => write!(
                f,
                "{}: conflicting rule ids {}",
                file,
                format_ids(&self.ids())
            ),
        }
    }
}

/// How a single file's check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// New ids were looked up and none collide.
    Clean,
    /// Modified file whose ids equal the reference version's.
    IdsUnchanged,
    InternalDuplicate,
    Conflict,
}

/// Per-file record of what the decider looked at.
#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub path: String,
    pub status: EditStatus,
    /// Ids declared by the working version, duplicates included.
    pub declared: usize,
    /// Ids looked up against the snapshot, sorted.
    pub new_ids: Vec<RuleId>,
    pub parse: ParseStatus,
    pub outcome: CheckOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
}

/// Output of [`ConflictDecider::decide`].
#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub checked: Vec<FileCheck>,
    /// Offending verdicts in evaluation order.
    pub verdicts: Vec<Verdict>,
    /// Files not evaluated because fail-fast stopped early.
    pub skipped: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl Decision {
    pub fn is_clean(&self) -> bool {
        self.verdicts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Decider
// ---------------------------------------------------------------------------

/// Decides pass/fail for a change set against a fully built snapshot.
pub struct ConflictDecider<'a> {
    snapshot: &'a ReferenceSnapshot,
    policy: Policy,
}

impl<'a> ConflictDecider<'a> {
    pub fn new(snapshot: &'a ReferenceSnapshot, policy: Policy) -> Self {
        Self { snapshot, policy }
    }

    /// Check every changed file, sorted by path.
    pub fn decide(&self, changes: &ChangeSet) -> Decision {
        let mut decision = Decision::default();
        if changes.is_empty() {
            debug!("no changed rule files, nothing to decide");
            return decision;
        }

        let mut files: Vec<&ChangedRuleFile> = changes.files.iter().collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));
        info!(count = files.len(), policy = ?self.policy, "checking changed rule files");

        // Ids newly claimed by files already evaluated in this run.
        let mut claimed: BTreeMap<RuleId, String> = BTreeMap::new();

        for (index, file) in files.iter().enumerate() {
            let (check, verdict) = self.check_file(file, &claimed, &mut decision.diagnostics);
            if check.outcome != CheckOutcome::InternalDuplicate {
                for id in &check.new_ids {
                    claimed
                        .entry(*id)
                        .or_insert_with(|| check.path.clone());
                }
            }
            decision.checked.push(check);

            if verdict.is_clean() {
                continue;
            }
            warn!(verdict = %verdict, "rule file rejected");
            decision.verdicts.push(verdict);
            if self.policy == Policy::FailFast {
                decision.skipped = files.len() - index - 1;
                break;
            }
        }

        info!(
            checked = decision.checked.len(),
            rejected = decision.verdicts.len(),
            "decision complete"
        );
        decision
    }

    fn check_file(
        &self,
        file: &ChangedRuleFile,
        claimed: &BTreeMap<RuleId, String>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (FileCheck, Verdict) {
        let path = file.path();
        let working = file.working.extract();
        if let Some(ref failure) = working.failure {
            diagnostics.push(Diagnostic::ParseFailure {
                path: path.to_string(),
                side: Side::Working,
                detail: failure.to_string(),
            });
        }

        let mut check = FileCheck {
            path: path.to_string(),
            status: file.status,
            declared: working.ids.len(),
            new_ids: Vec::new(),
            parse: working.status(),
            outcome: CheckOutcome::Clean,
            renamed_from: file.renamed_from().map(str::to_string),
        };

        let duplicates = duplicated_ids(&working.ids);
        if !duplicates.is_empty() {
            check.outcome = CheckOutcome::InternalDuplicate;
            let verdict = Verdict::InternalDuplicate {
                file: path.to_string(),
                ids: duplicates,
            };
            return (check, verdict);
        }

        let declared: BTreeSet<RuleId> = working.ids.iter().copied().collect();
        let new_ids: BTreeSet<RuleId> = match (file.status, &file.reference) {
            (EditStatus::Modified | EditStatus::Renamed, Some(reference)) => {
                let previous = reference.extract();
                if let Some(ref failure) = previous.failure {
                    diagnostics.push(Diagnostic::ParseFailure {
                        path: reference.path.clone(),
                        side: Side::Reference,
                        detail: failure.to_string(),
                    });
                }
                let mut before = previous.ids.clone();
                let mut after = working.ids.clone();
                before.sort_unstable();
                after.sort_unstable();
                if before == after {
                    debug!(path, "rule ids unchanged");
                    check.outcome = CheckOutcome::IdsUnchanged;
                    return (check, Verdict::Clean);
                }
                let before: BTreeSet<RuleId> = before.into_iter().collect();
                declared.difference(&before).copied().collect()
            }
            _ => declared,
        };
        check.new_ids = new_ids.iter().copied().collect();

        let own_paths: Vec<&str> = std::iter::once(path).chain(file.renamed_from()).collect();
        let conflicts: Vec<IdConflict> = new_ids
            .iter()
            .filter_map(|id| self.competing_claim(*id, &own_paths, claimed))
            .collect();
        debug!(path, new = new_ids.len(), conflicts = conflicts.len(), "checked rule file");

        if conflicts.is_empty() {
            return (check, Verdict::Clean);
        }
        check.outcome = CheckOutcome::Conflict;
        let verdict = Verdict::Conflict {
            file: path.to_string(),
            conflicts,
        };
        (check, verdict)
    }

    /// Files other than `own_paths` claiming `id`, if any. The reference
    /// point takes precedence over earlier files of the same change.
    fn competing_claim(
        &self,
        id: RuleId,
        own_paths: &[&str],
        claimed: &BTreeMap<RuleId, String>,
    ) -> Option<IdConflict> {
        if let Some(owners) = self.snapshot.owners(id) {
            let owners: Vec<String> = owners
                .iter()
                .filter(|o| !own_paths.contains(&o.as_str()))
                .cloned()
                .collect();
            if !owners.is_empty() {
                return Some(IdConflict {
                    id,
                    owners,
                    source: ClaimSource::Reference,
                });
            }
        }
        match claimed.get(&id) {
            Some(other) if !own_paths.contains(&other.as_str()) => Some(IdConflict {
                id,
                owners: vec![other.clone()],
                source: ClaimSource::Change,
            }),
            _ => None,
        }
    }
}
