//! GitHub REST API adapter for listing registry commits and reading files.

pub mod client;
pub mod error;

pub use client::GitHubClient;
pub use error::GitHubError;

/// Environment variable holding an optional API token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
