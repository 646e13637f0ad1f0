//! Diagnostics and the aggregated gate report.
//!
//! Everything here is serializable so the CLI can print it either as text
//! or as JSON. Ordering is stabilized by [`GateReport::finalize`].

use std::fmt;

use serde::Serialize;

use crate::config::Policy;
use crate::decider::{FileCheck, Verdict};
use crate::models::{format_ids, RuleId};

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Which side of the comparison a diagnostic concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Reference,
    Working,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Working => write!(f, "working"),
        }
    }
}

/// An id declared by more than one file at the reference point.
///
/// This is corruption that predates the change under check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityFault {
    pub id: RuleId,
    pub owners: Vec<String>,
}

impl fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule id {} is declared by multiple files at the reference point: {}",
            self.id,
            self.owners.join(", ")
        )
    }
}

/// A non-fatal problem recorded while building or checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The file could not be parsed; it was treated as declaring no ids.
    ParseFailure {
        path: String,
        side: Side,
        detail: String,
    },
    /// The file could not be read; it was skipped.
    ReadFailure {
        path: String,
        side: Side,
        detail: String,
    },
    /// The reference content of a modified file was unavailable, so every id
    /// it declares was checked as new.
    MissingReferenceContent { path: String },
}

impl Diagnostic {
    pub fn path(&self) -> &str {
        match self {
            Self::ParseFailure { path, .. }
            | Self::ReadFailure { path, .. }
            | Self::MissingReferenceContent { path } => path,
        }
    }

    fn sort_key(&self) -> (String, u8) {
        let rank = match self {
            Self::ReadFailure { .. } => 0,
            Self::ParseFailure { .. } => 1,
            Self::MissingReferenceContent { .. } => 2,
        };
        (self.path().to_string(), rank)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailure { path, side, detail } => write!(
                f,
                "skipping {} ({} version): {}; treated as declaring no rule ids",
                path, side, detail
            ),
            Self::ReadFailure { path, side, detail } => {
                write!(f, "could not read {} ({} version): {}", path, side, detail)
            }
            Self::MissingReferenceContent { path } => write!(
                f,
                "reference version of {} is unavailable; checking all of its ids as new",
                path
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate report
// ---------------------------------------------------------------------------

static CLEAN: Verdict = Verdict::Clean;

/// Everything one invocation of the gate found.
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    /// Reference point the change was compared against.
    pub reference: String,
    pub policy: Policy,
    /// Whether reference integrity faults fail the check.
    pub strict_reference: bool,
    /// Rule files the change adds or modifies.
    pub changed_rule_files: usize,
    /// Number of rule files at the reference point (0 when not built).
    pub reference_rule_files: usize,
    /// Nothing to check: the change touches no rule files.
    pub short_circuit: bool,
    /// Per-file results, in evaluation order.
    pub checked: Vec<FileCheck>,
    /// Offending verdicts, in evaluation order. Empty when clean.
    pub verdicts: Vec<Verdict>,
    /// Files left unchecked because the decider stopped at the first failure.
    pub skipped_after_failure: usize,
    pub integrity_faults: Vec<IntegrityFault>,
    pub diagnostics: Vec<Diagnostic>,
}

impl GateReport {
    /// Empty report for `reference`.
    pub fn new(reference: impl Into<String>, policy: Policy, strict_reference: bool) -> Self {
        Self {
            reference: reference.into(),
            policy,
            strict_reference,
            changed_rule_files: 0,
            reference_rule_files: 0,
            short_circuit: false,
            checked: Vec::new(),
            verdicts: Vec::new(),
            skipped_after_failure: 0,
            integrity_faults: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Sort diagnostics and integrity faults so output is deterministic.
    ///
    /// Diagnostics are sorted by path, so a file's reference-side and
    /// working-side problems end up next to each other.
    pub fn finalize(&mut self) {
        self.integrity_faults.sort_by_key(|f| f.id);
        self.diagnostics.sort_by_key(Diagnostic::sort_key);
        self.diagnostics.dedup();
    }

    /// The first offending verdict, or [`Verdict::Clean`].
    pub fn overall(&self) -> &Verdict {
        self.verdicts.first().unwrap_or(&CLEAN)
    }

    /// Whether integrity faults alone are enough to fail.
    pub fn failed_on_integrity(&self) -> bool {
        self.strict_reference && !self.integrity_faults.is_empty()
    }

    pub fn passed(&self) -> bool {
        self.verdicts.is_empty() && !self.failed_on_integrity()
    }

    /// Process exit code: 0 when the change passes, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// Every id that conflicts or is duplicated, sorted.
    pub fn offending_ids(&self) -> Vec<RuleId> {
        let mut ids: Vec<RuleId> = self.verdicts.iter().flat_map(Verdict::ids).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// One-line summary suitable for the last line of CI output.
    pub fn summary(&self) -> String {
        if self.short_circuit {
            return "no rule files changed; nothing to check".into();
        }
        if self.passed() {
            return format!(
                "no rule id conflicts in {} changed rule file(s) against {}",
                self.changed_rule_files, self.reference
            );
        }
        if self.verdicts.is_empty() {
            return format!(
                "reference point {} has {} rule id(s) declared by multiple files",
                self.reference,
                self.integrity_faults.len()
            );
        }
        format!(
            "{} offending rule file(s); rule ids {}",
            self.verdicts.len(),
            format_ids(&self.offending_ids())
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
