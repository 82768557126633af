//! Raw commit touches and the collaborator that lists them.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::window::LookbackWindow;

/// One file touched by one commit, as reported by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTouch {
    /// Commit identifier (full SHA).
    pub commit: String,
    /// Path of the touched file relative to the repository root.
    pub path: String,
    /// Change kind exactly as the host reported it.
    pub kind: String,
    /// Commit timestamp.
    pub timestamp: DateTime<Utc>,
}

impl CommitTouch {
    /// Creates a touch record.
    pub fn new(
        commit: impl Into<String>,
        path: impl Into<String>,
        kind: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            commit: commit.into(),
            path: path.into(),
            kind: kind.into(),
            timestamp,
        }
    }
}

/// Recognized change kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TouchKind {
    /// The file was created.
    Added,
    /// The file content changed.
    Modified,
    /// The file was deleted.
    Removed,
}

impl FromStr for TouchKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "removed" => Ok(Self::Removed),
            _ => Err(()),
        }
    }
}

impl TouchKind {
    /// Canonical lowercase name, as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// Derives the subject identifier from a mapping file path.
///
/// `mappings/<subject>.json` becomes `<subject>`.
pub fn subject_from_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lists the commit touches under a directory within a window.
pub trait CommitSource: Send + Sync {
    /// Returns every touch of a file below `directory` committed inside `window`.
    ///
    /// Touches outside the window may be included; the classifier filters them.
    fn list_touches<'a>(
        &'a self,
        directory: &'a str,
        window: &'a LookbackWindow,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CommitTouch>>> + Send + 'a>>;
}
