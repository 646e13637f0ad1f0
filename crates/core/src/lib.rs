//! rulegate core library.
//!
//! This crate decides whether a change to a repository's rule-definition
//! files introduces rule identifiers that other files already own at a
//! reference point: id extraction, file filtering, repository access,
//! the reference snapshot, the change set, the conflict decider, and the
//! aggregated report.

pub mod changeset;
pub mod config;
pub mod decider;
pub mod errors;
pub mod extract;
pub mod file_filter;
pub mod gate;
pub mod models;
pub mod report;
pub mod snapshot;
pub mod source;

// Re-exports for convenience.
pub use config::{GateConfig, Policy};
pub use decider::{ConflictDecider, Verdict};
pub use errors::{GateError, SourceError};
pub use gate::{check_repository, run_gate};
pub use report::GateReport;
pub use source::{GitRuleSource, MemoryRuleSource, RuleSource};
