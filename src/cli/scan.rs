//! Scan command: runs the watch pipeline and emits the report.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;

use super::{load_config, serialize, OutputFormat};
use crate::config::WatchConfig;
use crate::git::LocalRepository;
use crate::github::{GitHubClient, TOKEN_ENV};
use crate::pipeline::Watcher;
use crate::registry::{CommitSource, ContentFetcher, DetectionReport};
use crate::utils::Settings;

/// Scan command options.
#[derive(Parser)]
pub struct ScanCommand {
    /// Configuration file (YAML or JSON).
    #[arg(long, short, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Repository to watch, as owner/name.
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch used for links and local history.
    #[arg(long)]
    pub branch: Option<String>,

    /// Reads history from a local clone instead of the GitHub API.
    #[arg(long, value_name = "PATH")]
    pub local: Option<PathBuf>,

    /// Hours to look back from now (overrides LOOKBACK_HOURS).
    #[arg(long)]
    pub lookback_hours: Option<u32>,

    /// Output format: text (default), json, yaml.
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Writes the report to a file instead of stdout.
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Appends added=/modified=/total= lines to this file (e.g. $GITHUB_OUTPUT).
    #[arg(long, value_name = "FILE")]
    pub github_output: Option<PathBuf>,
}

impl ScanCommand {
    /// Executes the scan command.
    pub async fn execute(self) -> Result<()> {
        let format: OutputFormat = self.format.parse()?;
        let (mut config, settings) = load_config(self.config.as_deref())?;
        self.apply_overrides(&mut config);
        config.validate().context("Invalid configuration")?;

        let (source, fetcher) = self.collaborators(&config, &settings)?;
        let report = Watcher::new(config, source, fetcher)
            .run(Utc::now())
            .await?;

        let rendered = render(&report, format)?;
        match &self.output {
            Some(path) => {
                fs::write(path, rendered)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                info!(path = %path.display(), "Report written");
            }
            None => print!("{rendered}"),
        }

        if let Some(path) = &self.github_output {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open outputs file {}", path.display()))?;
            file.write_all(report.outputs().as_bytes())
                .with_context(|| format!("Failed to write outputs file {}", path.display()))?;
        }
        Ok(())
    }

    fn apply_overrides(&self, config: &mut WatchConfig) {
        if let Some(repo) = &self.repo {
            config.repository.clone_from(repo);
        }
        if let Some(branch) = &self.branch {
            config.branch.clone_from(branch);
        }
        if let Some(hours) = self.lookback_hours {
            config.lookback_hours = hours;
        }
    }

    fn collaborators(
        &self,
        config: &WatchConfig,
        settings: &Settings,
    ) -> Result<(Arc<dyn CommitSource>, Arc<dyn ContentFetcher>)> {
        match &self.local {
            Some(path) => {
                let repo = Arc::new(LocalRepository::open_at(
                    path,
                    &config.branch,
                    config.include_matcher()?,
                )?);
                Ok((repo.clone(), repo))
            }
            None => {
                let token = settings.get_env_var(TOKEN_ENV);
                if token.is_none() {
                    info!("{TOKEN_ENV} not set; using unauthenticated GitHub requests");
                }
                let client = Arc::new(GitHubClient::from_config(config, token)?);
                Ok((client.clone(), client))
            }
        }
    }
}

fn render(report: &DetectionReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(report.text.clone()),
        other => serialize(report, other),
    }
}
