//! # registry-watch
//!
//! Watches a file-per-asset token registry for recently added or modified
//! entries and flags those whose name or ticker resembles a target brand.
//!
//! The detection core lives in [`registry`] and has no I/O of its own:
//! commit history and file contents come through the
//! [`CommitSource`](registry::CommitSource) and
//! [`ContentFetcher`](registry::ContentFetcher) traits, implemented by
//! [`github::GitHubClient`] and [`git::LocalRepository`].
//!
//! ## Quick Start
//!
//! ```rust
//! use registry_watch::config::WatchConfig;
//! use registry_watch::registry::TokenMetadata;
//!
//! let scorer = WatchConfig::default().scorer();
//! let metadata = TokenMetadata {
//!     subject: "abc".to_string(),
//!     name: "Night".to_string(),
//!     ..TokenMetadata::default()
//! };
//! assert_eq!(scorer.score(&metadata).score, 40);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod git;
pub mod github;
pub mod pipeline;
pub mod registry;
pub mod utils;

pub use crate::cli::Cli;

/// The current version of registry-watch.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
