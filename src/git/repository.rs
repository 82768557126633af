//! Registry history read from a local clone.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use git2::{Commit, Delta, DiffOptions, ErrorCode, Oid, Repository, Sort};
use globset::GlobMatcher;
use tracing::{debug, info};

use crate::registry::{CommitSource, CommitTouch, ContentFetcher, FetchError, LookbackWindow};

/// A local clone of the registry repository.
///
/// The repository is reopened per call so the handle can be shared across
/// tasks.
pub struct LocalRepository {
    path: PathBuf,
    revision: String,
    include: GlobMatcher,
}

impl LocalRepository {
    /// Opens the repository at `path`, walking history from `revision`.
    pub fn open_at<P: AsRef<Path>>(path: P, revision: &str, include: GlobMatcher) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let repo = Repository::open(&path)
            .with_context(|| format!("Failed to open git repository at {}", path.display()))?;
        repo.revparse_single(revision)
            .with_context(|| format!("Revision '{revision}' not found"))?;

        Ok(Self {
            path,
            revision: revision.to_string(),
            include,
        })
    }

    fn repo(&self) -> Result<Repository> {
        Repository::open(&self.path)
            .with_context(|| format!("Failed to open git repository at {}", self.path.display()))
    }

    /// Walks history newest first and collects touches below `directory`.
    ///
    /// The walk stops at the first commit older than the window.
    pub fn collect_touches(
        &self,
        directory: &str,
        window: &LookbackWindow,
    ) -> Result<Vec<CommitTouch>> {
        let repo = self.repo()?;
        let head = repo
            .revparse_single(&self.revision)
            .and_then(|object| object.peel_to_commit())
            .with_context(|| format!("Failed to resolve revision '{}'", self.revision))?;

        let mut revwalk = repo.revwalk().context("Failed to create revwalk")?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push(head.id())?;

        let mut touches = Vec::new();
        let mut commits = 0usize;
        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;
            let timestamp = commit_time(&commit)?;
            if timestamp < window.start {
                break;
            }
            if timestamp > window.end {
                continue;
            }
            commits += 1;
            touches.extend(self.commit_touches(&repo, &commit, directory, timestamp)?);
        }

        info!(
            commits,
            touches = touches.len(),
            "Listed registry commits from local repository"
        );
        Ok(touches)
    }

    fn commit_touches(
        &self,
        repo: &Repository,
        commit: &Commit,
        directory: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<CommitTouch>> {
        let commit_tree = commit.tree().context("Failed to get commit tree")?;
        let parent_tree = if commit.parent_count() > 0 {
            Some(
                commit
                    .parent(0)
                    .context("Failed to get parent commit")?
                    .tree()
                    .context("Failed to get parent tree")?,
            )
        } else {
            None
        };

        let mut options = DiffOptions::new();
        options.pathspec(directory.trim_matches('/'));
        let diff = repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), Some(&mut options))
            .context("Failed to create diff")?;

        let sha = commit.id().to_string();
        let mut touches = Vec::new();
        for delta in diff.deltas() {
            let (kind, file) = match delta.status() {
                Delta::Added | Delta::Copied | Delta::Renamed => ("added", delta.new_file()),
                Delta::Modified | Delta::Typechange => ("modified", delta.new_file()),
                Delta::Deleted => ("removed", delta.old_file()),
                _ => continue,
            };
            let Some(path) = file.path().and_then(Path::to_str) else {
                continue;
            };
            if self.include.is_match(path) {
                touches.push(CommitTouch::new(&sha, path, kind, timestamp));
            }
        }
        debug!(commit = %sha, touches = touches.len(), "Analyzed commit");
        Ok(touches)
    }

    /// Reads `path` as of `commit`.
    pub fn read_file(&self, path: &str, commit: &str) -> Result<Vec<u8>, FetchError> {
        let failed = |e: &dyn std::fmt::Display| FetchError::Failed(e.to_string());
        let not_found_or = |e: git2::Error| {
            if e.code() == ErrorCode::NotFound {
                FetchError::NotFound
            } else {
                FetchError::Failed(e.to_string())
            }
        };

        let repo = self.repo().map_err(|e| failed(&e))?;
        let oid = Oid::from_str(commit).map_err(|e| failed(&e))?;
        let commit = repo.find_commit(oid).map_err(not_found_or)?;
        let tree = commit.tree().map_err(|e| failed(&e))?;
        let entry = tree.get_path(Path::new(path)).map_err(not_found_or)?;
        let blob = entry
            .to_object(&repo)
            .and_then(|object| object.peel_to_blob())
            .map_err(|e| failed(&e))?;
        Ok(blob.content().to_vec())
    }
}

fn commit_time(commit: &Commit) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(commit.time().seconds(), 0).context("Invalid commit timestamp")
}

impl CommitSource for LocalRepository {
    fn list_touches<'a>(
        &'a self,
        directory: &'a str,
        window: &'a LookbackWindow,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CommitTouch>>> + Send + 'a>> {
        Box::pin(async move { self.collect_touches(directory, window) })
    }
}

impl ContentFetcher for LocalRepository {
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        commit: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>> {
        Box::pin(async move { self.read_file(path, commit) })
    }
}
