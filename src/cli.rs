//! CLI interface for registry-watch.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::WatchConfig;
use crate::utils::Settings;

pub mod config;
pub mod scan;
pub mod score;

/// registry-watch: flags token registrations that resemble a brand.
#[derive(Parser)]
#[command(name = "registry-watch")]
#[command(
    about = "Watches a token registry for new or updated entries resembling a brand",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Scans recent registry changes and prints a report.
    Scan(scan::ScanCommand),
    /// Scores a local metadata file against the target family.
    Score(score::ScoreCommand),
    /// Configuration inspection.
    Config(config::ConfigCommand),
}

impl Cli {
    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Scan(scan_cmd) => scan_cmd.execute().await,
            Commands::Score(score_cmd) => score_cmd.execute(),
            Commands::Config(config_cmd) => config_cmd.execute(),
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text format.
    #[default]
    Text,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => anyhow::bail!("Unknown output format '{other}' (expected text, json or yaml)"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// Serializes `value` as JSON or YAML.
pub(crate) fn serialize<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut json =
                serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Yaml | OutputFormat::Text => {
            serde_yaml::to_string(value).context("Failed to serialize to YAML")
        }
    }
}

/// Loads settings and the configuration file, with environment overrides applied.
pub(crate) fn load_config(path: Option<&Path>) -> Result<(WatchConfig, Settings)> {
    let settings = Settings::load().context("Failed to load settings")?;
    let mut config = WatchConfig::load(path)?;
    config.apply_env(&settings)?;
    Ok((config, settings))
}
