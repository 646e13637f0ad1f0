//! Collaborators that list and read rule files.
//!
//! The decision logic only talks to [`RuleSource`]. [`GitRuleSource`] backs
//! it with a real repository; [`MemoryRuleSource`] backs it with in-memory
//! fixtures so the core can be exercised without git or process spawning.

pub mod git;
pub mod memory;

pub use git::GitRuleSource;
pub use memory::MemoryRuleSource;

use crate::errors::SourceError;
use crate::models::ChangedPath;

/// Access to the reference point and the working state of a repository.
///
/// Paths are repository-relative and forward-slash separated. Listings are
/// unfiltered: callers restrict them to rule files.
pub trait RuleSource {
    /// Human-readable name of the reference point, used in diagnostics.
    fn reference_name(&self) -> String;

    /// Make the reference point available locally (fetch, resolve).
    /// Failure is a fatal setup fault.
    fn ensure_reference_point_available(&mut self) -> Result<(), SourceError>;

    /// Files that differ between the reference point and the working state,
    /// in the order the comparison reports them.
    fn list_changed_files(&self) -> Result<Vec<ChangedPath>, SourceError>;

    /// Every file present at the reference point.
    fn list_reference_files(&self) -> Result<Vec<String>, SourceError>;

    /// Content of `path` at the reference point.
    fn read_reference_file(&self, path: &str) -> Result<String, SourceError>;

    /// Content of `path` in the working state.
    fn read_working_file(&self, path: &str) -> Result<String, SourceError>;
}
