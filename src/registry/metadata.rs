//! Fetching and normalizing token metadata files.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::classify::ChangeEvent;
use super::error::ResolutionDegraded;

/// Failure modes of a content fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The path does not exist at the requested commit.
    #[error("file not found")]
    NotFound,
    /// The request did not complete in time.
    #[error("request timed out")]
    TimedOut,
    /// Any other transport or server failure.
    #[error("{0}")]
    Failed(String),
}

/// Reads a file's bytes at a given commit.
///
/// Implementations must be safe to call concurrently.
pub trait ContentFetcher: Send + Sync {
    /// Fetches `path` as of `commit`.
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        commit: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>>;
}

/// Normalized metadata for one registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Subject identifier, always equal to the originating event's.
    pub subject: String,
    /// Display name.
    pub name: String,
    /// Ticker symbol.
    pub ticker: String,
    /// Free-text description.
    pub description: String,
    /// Project URL, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Whether the entry carries a logo.
    pub has_logo: bool,
    /// Declared decimals, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    /// Set when the file could not be fetched or parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<ResolutionDegraded>,
}

impl TokenMetadata {
    /// Creates an empty record flagged with the reason resolution failed.
    pub fn degraded(subject: impl Into<String>, reason: ResolutionDegraded) -> Self {
        Self {
            subject: subject.into(),
            degraded: Some(reason),
            ..Self::default()
        }
    }

    /// Returns true if resolution failed for this record.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Parses a mapping file into [`TokenMetadata`].
///
/// Textual properties may be bare strings or `{"value": ...}` objects.
/// Missing keys become empty; unknown keys are ignored.
pub fn parse_metadata(subject: &str, bytes: &[u8]) -> Result<TokenMetadata, ResolutionDegraded> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|e| ResolutionDegraded::Unparseable {
            message: e.to_string(),
        })?;
    let Value::Object(fields) = document else {
        return Err(ResolutionDegraded::Unparseable {
            message: "expected a JSON object".to_string(),
        });
    };

    if let Some(declared) = text_property(&fields, "subject") {
        if !declared.is_empty() && declared != subject {
            return Err(ResolutionDegraded::SubjectMismatch { declared });
        }
    }

    Ok(TokenMetadata {
        subject: subject.to_string(),
        name: text_property(&fields, "name").unwrap_or_default(),
        ticker: text_property(&fields, "ticker").unwrap_or_default(),
        description: text_property(&fields, "description").unwrap_or_default(),
        url: text_property(&fields, "url").filter(|u| !u.is_empty()),
        has_logo: text_property(&fields, "logo").is_some_and(|l| !l.is_empty()),
        decimals: property_value(&fields, "decimals")
            .and_then(Value::as_u64)
            .and_then(|d| u32::try_from(d).ok()),
        degraded: None,
    })
}

fn property_value<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match fields.get(key)? {
        Value::Object(property) => property.get("value"),
        other => Some(other),
    }
}

fn text_property(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match property_value(fields, key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolves change events into metadata through an injected fetcher.
#[derive(Clone)]
pub struct MetadataResolver {
    fetcher: Arc<dyn ContentFetcher>,
    timeout: Duration,
    concurrency: usize,
}

impl MetadataResolver {
    /// Creates a resolver with a per-fetch timeout and fan-out limit.
    pub fn new(fetcher: Arc<dyn ContentFetcher>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            fetcher,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Resolves a single event. Never fails; problems yield degraded metadata.
    pub async fn resolve(&self, event: &ChangeEvent) -> TokenMetadata {
        let fetched =
            tokio::time::timeout(self.timeout, self.fetcher.fetch(&event.path, &event.commit))
                .await;

        let resolved = match fetched {
            Err(_) | Ok(Err(FetchError::NotFound | FetchError::TimedOut)) => {
                Err(ResolutionDegraded::NotFound)
            }
            Ok(Err(FetchError::Failed(message))) => Err(ResolutionDegraded::FetchFailed { message }),
            Ok(Ok(bytes)) => parse_metadata(&event.subject, &bytes),
        };

        match resolved {
            Ok(metadata) => {
                debug!(subject = %event.subject, name = %metadata.name, "Resolved metadata");
                metadata
            }
            Err(reason) => {
                warn!(
                    subject = %event.subject,
                    path = %event.path,
                    commit = %event.commit,
                    "Metadata resolution degraded: {reason}"
                );
                TokenMetadata::degraded(event.subject.clone(), reason)
            }
        }
    }

    /// Resolves all events concurrently, keyed by subject identifier.
    pub async fn resolve_all(&self, events: &[ChangeEvent]) -> HashMap<String, TokenMetadata> {
        stream::iter(events)
            .map(|event| async move { (event.subject.clone(), self.resolve(event).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
