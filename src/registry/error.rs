//! Registry-engine error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Batch-level failures that abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The commit-listing collaborator produced a touch that cannot be classified.
    #[error("Malformed commit touch in {commit:?} for {path:?}: {reason}")]
    MalformedTouch {
        /// Commit identifier of the offending touch.
        commit: String,
        /// File path of the offending touch.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An event reached the report without its metadata or score.
    #[error("Inconsistent report input for subject {subject}: missing {missing}")]
    InconsistentInput {
        /// Subject identifier of the event.
        subject: String,
        /// Which per-event input was absent ("metadata" or "score").
        missing: &'static str,
    },
}

/// Why a file could not be resolved into usable metadata.
///
/// Non-fatal: the event stays in the report with empty metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolutionDegraded {
    /// The file does not exist at the commit, or the fetch timed out.
    #[error("not found")]
    NotFound,

    /// The fetch failed for another reason.
    #[error("fetch failed: {message}")]
    FetchFailed {
        /// Transport error message.
        message: String,
    },

    /// The file content is not a JSON object.
    #[error("unparseable content: {message}")]
    Unparseable {
        /// Parser error message.
        message: String,
    },

    /// The file declares a different subject than its path implies.
    #[error("subject mismatch: file declares {declared}")]
    SubjectMismatch {
        /// Subject found inside the file.
        declared: String,
    },
}
