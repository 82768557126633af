//! GitHub REST API client implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use globset::GlobMatcher;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{WatchConfig, MAX_PER_PAGE};
use crate::github::error::GitHubError;
use crate::registry::{CommitSource, CommitTouch, ContentFetcher, FetchError, LookbackWindow};

/// Entry of the commit list endpoint.
#[derive(Deserialize, Debug)]
struct CommitSummary {
    sha: String,
}

/// Single-commit endpoint response.
#[derive(Deserialize, Debug)]
struct CommitDetail {
    sha: String,
    commit: CommitBody,
    #[serde(default)]
    files: Vec<CommitFile>,
}

/// Git-level commit data.
#[derive(Deserialize, Debug)]
struct CommitBody {
    author: Option<CommitSignature>,
    committer: Option<CommitSignature>,
}

/// Author or committer signature.
#[derive(Deserialize, Debug)]
struct CommitSignature {
    date: DateTime<Utc>,
}

/// A file changed by a commit.
#[derive(Deserialize, Debug)]
struct CommitFile {
    filename: String,
    status: String,
    previous_filename: Option<String>,
}

/// Contents endpoint response.
#[derive(Deserialize, Debug)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    download_url: Option<String>,
}

/// Maps a GitHub file status onto a registry change kind.
///
/// `None` means the file should be skipped. Unknown statuses pass through
/// unchanged so the classifier can reject them.
fn normalize_status(status: &str) -> Option<String> {
    match status {
        "added" | "renamed" | "copied" => Some("added".to_string()),
        "modified" | "changed" => Some("modified".to_string()),
        "removed" => Some("removed".to_string()),
        "unchanged" => None,
        other => Some(other.to_string()),
    }
}

fn fetch_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::TimedOut
    } else {
        FetchError::Failed(error.to_string())
    }
}

/// Checks an HTTP response for error status.
///
/// Exhausted rate limits map to [`GitHubError::RateLimitExceeded`]; other
/// failures carry the status and body.
async fn check_error_response(response: Response) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && exhausted) {
        return Err(GitHubError::RateLimitExceeded);
    }

    let error_text = response.text().await.unwrap_or_else(|e| {
        debug!("Failed to read error response body: {e}");
        String::new()
    });
    Err(GitHubError::ApiRequestFailed(format!(
        "HTTP {status}: {error_text}"
    )))
}

/// Client for one GitHub-hosted registry repository.
pub struct GitHubClient {
    client: Client,
    api_base: String,
    repository: String,
    include: GlobMatcher,
    max_pages: u32,
    per_page: u32,
}

impl GitHubClient {
    /// Creates a client for the configured repository.
    pub fn from_config(config: &WatchConfig, token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("registry-watch/{}", crate::VERSION))
                .context("Invalid user agent")?,
        );
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .context("GITHUB_TOKEN contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.fetch_timeout().max(Duration::from_secs(1)))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repository: config.repository.clone(),
            include: config.include_matcher()?,
            max_pages: config.fetch.max_pages,
            per_page: config.fetch.per_page.clamp(1, MAX_PER_PAGE),
        })
    }

    fn endpoint(&self, tail: &str) -> Result<Url> {
        let raw = format!("{}/repos/{}/{tail}", self.api_base, self.repository);
        Url::parse(&raw).with_context(|| format!("Invalid GitHub API URL: {raw}"))
    }

    async fn get(&self, url: Url) -> Result<Response, GitHubError> {
        debug!(url = %url, "GitHub API request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GitHubError::NetworkError(e.to_string()))?;
        check_error_response(response).await
    }

    async fn list_commit_page(
        &self,
        directory: &str,
        window: &LookbackWindow,
        page: u32,
    ) -> Result<Vec<CommitSummary>> {
        let mut url = self.endpoint("commits")?;
        url.query_pairs_mut()
            .append_pair("path", directory)
            .append_pair(
                "since",
                &window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .append_pair("until", &window.end.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("per_page", &self.per_page.to_string())
            .append_pair("page", &page.to_string());

        let response = self.get(url).await?;
        let commits = response
            .json()
            .await
            .map_err(|e| GitHubError::InvalidResponseFormat(e.to_string()))?;
        Ok(commits)
    }

    async fn commit_touches(&self, sha: &str) -> Result<Vec<CommitTouch>> {
        let url = self.endpoint(&format!("commits/{sha}"))?;
        let detail: CommitDetail = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|e| GitHubError::InvalidResponseFormat(e.to_string()))?;

        let timestamp = detail
            .commit
            .committer
            .as_ref()
            .or(detail.commit.author.as_ref())
            .map(|s| s.date)
            .ok_or_else(|| {
                GitHubError::InvalidResponseFormat(format!("Commit {sha} has no date"))
            })?;

        let mut touches = Vec::new();
        for file in &detail.files {
            if file.status == "renamed" {
                if let Some(previous) = &file.previous_filename {
                    if self.include.is_match(previous) {
                        touches.push(CommitTouch::new(&detail.sha, previous, "removed", timestamp));
                    }
                }
            }
            if !self.include.is_match(&file.filename) {
                continue;
            }
            if let Some(kind) = normalize_status(&file.status) {
                touches.push(CommitTouch::new(&detail.sha, &file.filename, kind, timestamp));
            }
        }
        Ok(touches)
    }

    async fn list_touches_impl(
        &self,
        directory: &str,
        window: &LookbackWindow,
    ) -> Result<Vec<CommitTouch>> {
        let mut touches = Vec::new();
        let mut commit_count = 0usize;

        for page in 1..=self.max_pages {
            let commits = self
                .list_commit_page(directory, window, page)
                .await
                .with_context(|| format!("Failed to list commits (page {page})"))?;
            let page_len = commits.len();
            commit_count += page_len;
            debug!(page, commits = page_len, "Fetched commit page");

            for summary in commits {
                let found = self
                    .commit_touches(&summary.sha)
                    .await
                    .with_context(|| format!("Failed to read commit {}", summary.sha))?;
                touches.extend(found);
            }

            if page_len < self.per_page as usize {
                break;
            }
            if page == self.max_pages {
                warn!(
                    max_pages = self.max_pages,
                    "Commit listing truncated; older changes in the window are not reported"
                );
            }
        }

        info!(
            commits = commit_count,
            touches = touches.len(),
            "Listed registry commits from GitHub"
        );
        Ok(touches)
    }

    async fn fetch_impl(&self, path: &str, commit: &str) -> Result<Vec<u8>, FetchError> {
        let mut url = self
            .endpoint(&format!("contents/{path}"))
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        url.query_pairs_mut().append_pair("ref", commit);

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        let body: ContentResponse = check_error_response(response)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?
            .json()
            .await
            .map_err(fetch_error)?;

        if body.encoding == "base64" {
            let compact: String = body
                .content
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            return base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| FetchError::Failed(format!("Invalid base64 content: {e}")));
        }

        // Large files come without inline content.
        let Some(download_url) = body.download_url else {
            return Err(FetchError::Failed(format!(
                "No content returned for {path} (encoding {:?})",
                body.encoding
            )));
        };
        let response = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(fetch_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        let bytes = check_error_response(response)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?
            .bytes()
            .await
            .map_err(fetch_error)?;
        Ok(bytes.to_vec())
    }
}

impl CommitSource for GitHubClient {
    fn list_touches<'a>(
        &'a self,
        directory: &'a str,
        window: &'a LookbackWindow,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CommitTouch>>> + Send + 'a>> {
        Box::pin(self.list_touches_impl(directory, window))
    }
}

impl ContentFetcher for GitHubClient {
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        commit: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_impl(path, commit))
    }
}
