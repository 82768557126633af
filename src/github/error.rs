//! GitHub-specific error handling.

use thiserror::Error;

/// GitHub API errors.
#[derive(Error, Debug)]
pub enum GitHubError {
    /// The API answered with a non-success status.
    #[error("GitHub API request failed: {0}")]
    ApiRequestFailed(String),

    /// The response body did not have the expected shape.
    #[error("Invalid response format from GitHub API: {0}")]
    InvalidResponseFormat(String),

    /// The API rate limit is exhausted.
    #[error("GitHub API rate limit exceeded. Set GITHUB_TOKEN or try again later")]
    RateLimitExceeded,

    /// Network connectivity error.
    #[error("Network error: {0}")]
    NetworkError(String),
}
