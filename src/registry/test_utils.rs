//! Shared test fixtures for the `registry` module.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};

use super::classify::{ChangeEvent, Classification};
use super::metadata::{ContentFetcher, FetchError};
use super::touch::{CommitSource, CommitTouch};
use super::window::LookbackWindow;

/// Fixed reference instant used across registry tests.
pub(crate) fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Builds an event for `mappings/<subject>.json` at the reference time.
pub(crate) fn event(subject: &str, classification: Classification, commit: &str) -> ChangeEvent {
    let path = format!("mappings/{subject}.json");
    ChangeEvent {
        subject: subject.to_string(),
        classification,
        mapping_url: format!("https://github.com/owner/registry/blob/master/{path}"),
        commit_url: format!("https://github.com/owner/registry/commit/{commit}"),
        metadata_url: None,
        path,
        commit: commit.to_string(),
        timestamp: reference_time(),
    }
}

/// In-memory fetcher keyed by path; every commit sees the same content.
///
/// Paths registered with [`with_failure`](Self::with_failure) return
/// [`FetchError::Failed`]; unknown paths return [`FetchError::NotFound`].
/// Every call is recorded as `(path, commit)`.
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    failures: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryFetcher {
    pub(crate) fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files
            .insert(path.to_string(), content.as_bytes().to_vec());
        self
    }

    pub(crate) fn with_failure(mut self, path: &str, message: &str) -> Self {
        self.failures
            .insert(path.to_string(), message.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.calls.clone()
    }
}

impl ContentFetcher for MemoryFetcher {
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        commit: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((path.to_string(), commit.to_string()));
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = self.failures.get(path) {
                return Err(FetchError::Failed(message.clone()));
            }
            self.files.get(path).cloned().ok_or(FetchError::NotFound)
        })
    }
}

/// Commit source that returns a fixed list of touches.
pub(crate) struct StaticSource {
    pub(crate) touches: Vec<CommitTouch>,
}

impl CommitSource for StaticSource {
    fn list_touches<'a>(
        &'a self,
        _directory: &'a str,
        _window: &'a LookbackWindow,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CommitTouch>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.touches.clone()) })
    }
}
