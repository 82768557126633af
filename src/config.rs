//! Watch configuration.
//!
//! Every field has a default, so an empty or partial YAML/JSON file is a
//! valid configuration. Environment variables (with fallback to
//! `$HOME/.registry-watch/settings.json`) and CLI flags are layered on top.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::registry::{RepoLinks, ResemblanceScorer, ScoringWeights, TargetFamily};
use crate::utils::Settings;

/// Environment variable overriding [`WatchConfig::lookback_hours`].
pub const LOOKBACK_HOURS_ENV: &str = "LOOKBACK_HOURS";

/// Largest page size the GitHub commit list honours.
pub const MAX_PER_PAGE: u32 = 100;

/// Complete configuration for a watch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Watched repository in `owner/name` form.
    pub repository: String,
    /// Branch used for web links and local scans.
    pub branch: String,
    /// Directory holding one mapping file per subject.
    pub directory: String,
    /// Glob selecting mapping files; defaults to `<directory>/*.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    /// Hours to look back from now.
    pub lookback_hours: u32,
    /// Base URL of a metadata service serving entries by subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_url_base: Option<String>,
    /// GitHub REST API base URL.
    pub api_base: String,
    /// Brand family to compare against.
    pub target: TargetFamily,
    /// Keywords flagged in descriptions.
    pub suspicious_keywords: Vec<String>,
    /// Criterion weights.
    pub weights: ScoringWeights,
    /// Fetch tuning.
    pub fetch: FetchConfig,
}

/// Network fetch tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent metadata fetches.
    pub concurrency: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum commit-list pages requested per run.
    pub max_pages: u32,
    /// Commits per page, at most [`MAX_PER_PAGE`].
    pub per_page: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout_secs: 10,
            max_pages: 10,
            per_page: 50,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            repository: "cardano-foundation/cardano-token-registry".to_string(),
            branch: "master".to_string(),
            directory: "mappings".to_string(),
            include: None,
            lookback_hours: 24,
            metadata_url_base: Some("https://tokens.cardano.org/metadata".to_string()),
            api_base: "https://api.github.com".to_string(),
            target: TargetFamily::new("night", &["knight", "midnight", "mnight", "cnight"]),
            suspicious_keywords: [
                "airdrop", "airdrops", "reward", "rewards", "bonus", "double", "stake",
                "staking", "yield", "free",
            ]
            .iter()
            .map(|k| (*k).to_string())
            .collect(),
            weights: ScoringWeights::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl WatchConfig {
    /// Loads a configuration file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// Loads a YAML or JSON configuration file (chosen by extension).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else if content.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        }
    }

    /// Applies environment overrides such as `LOOKBACK_HOURS`.
    pub fn apply_env(&mut self, settings: &Settings) -> Result<()> {
        if let Some(hours) = settings.get_env_var(LOOKBACK_HOURS_ENV) {
            self.lookback_hours = hours
                .trim()
                .parse()
                .with_context(|| format!("Invalid {LOOKBACK_HOURS_ENV} value: {hours:?}"))?;
        }
        Ok(())
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.repository.split('/').filter(|p| !p.is_empty()).count() != 2 {
            anyhow::bail!(
                "Invalid repository {:?}: expected owner/name",
                self.repository
            );
        }
        if self.directory.trim_matches('/').is_empty() {
            anyhow::bail!("Watched directory must not be empty");
        }
        if self.lookback_hours == 0 {
            anyhow::bail!("lookback_hours must be greater than zero");
        }
        if self.target.normalized_variants().is_empty() {
            anyhow::bail!("Target family needs at least one non-empty variant");
        }
        let w = &self.weights;
        if w.exact < w.substring || w.substring < w.near_miss {
            anyhow::bail!(
                "Weights must satisfy exact >= substring >= near_miss (got {} / {} / {})",
                w.exact,
                w.substring,
                w.near_miss
            );
        }
        if self.fetch.concurrency == 0 {
            anyhow::bail!("fetch.concurrency must be at least 1");
        }
        if self.fetch.max_pages == 0 || self.fetch.per_page == 0 {
            anyhow::bail!("fetch.max_pages and fetch.per_page must be at least 1");
        }
        if self.fetch.per_page > MAX_PER_PAGE {
            anyhow::bail!(
                "fetch.per_page must be at most {MAX_PER_PAGE} (got {})",
                self.fetch.per_page
            );
        }
        self.include_matcher()?;
        Ok(())
    }

    /// Effective include glob.
    pub fn include_pattern(&self) -> String {
        self.include
            .clone()
            .unwrap_or_else(|| format!("{}/*.json", self.directory.trim_matches('/')))
    }

    /// Compiled include glob; `*` does not cross directory separators.
    pub fn include_matcher(&self) -> Result<GlobMatcher> {
        let pattern = self.include_pattern();
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid include pattern: {pattern}"))?;
        Ok(glob.compile_matcher())
    }

    /// Repository web links.
    pub fn links(&self) -> RepoLinks {
        RepoLinks::github(&self.repository, &self.branch)
            .with_metadata_base(self.metadata_url_base.clone())
    }

    /// Scorer for the configured family, keywords and weights.
    pub fn scorer(&self) -> ResemblanceScorer {
        ResemblanceScorer::new(self.target.clone(), &self.suspicious_keywords, self.weights)
    }

    /// Per-request timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}
