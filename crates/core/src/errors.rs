//! Error types for the rulegate core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`GateError`] enum unifies them for callers that want a single
//! error type.
//!
//! Conflicts and internal duplicates are *not* errors: they are computed
//! verdicts (see [`crate::decider::Verdict`]).

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Source (collaborator) errors
// ---------------------------------------------------------------------------

/// Errors from the collaborators that list and read rule files.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// The reference point could not be fetched or resolved.
    #[error("reference point '{reference}' is not available: {detail}")]
    ReferenceUnavailable {
        reference: String,
        detail: String,
    },

    /// Files could not be enumerated (reference tree or working-tree diff).
    #[error("failed to list files: {0}")]
    ListingFailed(String),

    /// A single file could not be read.
    #[error("failed to read '{path}': {detail}")]
    ReadFailed {
        path: String,
        detail: String,
    },

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("source I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SourceError {
    /// `true` for setup faults that must abort the whole check.
    ///
    /// Per-file read failures are recoverable: the builders skip the file and
    /// record a warning diagnostic instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReadFailed { .. })
    }

    /// Build a [`SourceError::ReadFailed`] for `path`.
    pub fn read_failed(path: impl Into<String>, detail: impl ToString) -> Self {
        Self::ReadFailed {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction errors
// ---------------------------------------------------------------------------

/// Why a rule file could not be parsed as XML.
///
/// Never returned as an `Err` from the extractor; it travels inside
/// [`crate::extract::Extraction`] as a non-fatal diagnostic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// More than one top-level element (or text after the root element).
    #[error("junk after document element at byte {position}")]
    MultipleRoots { position: u64 },

    /// The document contains no element at all.
    #[error("no root element found")]
    NoRootElement,

    /// Any other well-formedness failure.
    #[error("malformed XML at byte {position}: {detail}")]
    Malformed { position: u64, detail: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
