//! Score command: rates a single metadata file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use super::{load_config, serialize, OutputFormat};
use crate::registry::metadata::parse_metadata;
use crate::registry::{subject_from_path, ResemblanceScore, TokenMetadata};

/// Score command options.
#[derive(Parser)]
pub struct ScoreCommand {
    /// Metadata JSON file to score.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Configuration file (YAML or JSON).
    #[arg(long, short, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format: text (default), json, yaml.
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(serde::Serialize)]
struct ScoreOutput<'a> {
    metadata: &'a TokenMetadata,
    score: &'a ResemblanceScore,
}

impl ScoreCommand {
    /// Executes the score command.
    pub fn execute(self) -> Result<()> {
        let format: OutputFormat = self.format.parse()?;
        let (config, _) = load_config(self.config.as_deref())?;
        config.validate().context("Invalid configuration")?;

        let bytes = fs::read(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let subject = subject_from_path(&self.file.to_string_lossy());
        let metadata = parse_metadata(&subject, &bytes)
            .with_context(|| format!("Failed to parse {}", self.file.display()))?;
        let score = config.scorer().score(&metadata);

        let rendered = match format {
            OutputFormat::Text => describe(&metadata, &score),
            other => serialize(
                &ScoreOutput {
                    metadata: &metadata,
                    score: &score,
                },
                other,
            )?,
        };
        print!("{rendered}");
        Ok(())
    }
}

fn describe(metadata: &TokenMetadata, score: &ResemblanceScore) -> String {
    let mut text = String::new();
    text.push_str(&format!("Subject: {}\n", metadata.subject));
    text.push_str(&format!("Name: {}\n", metadata.name));
    text.push_str(&format!("Ticker: {}\n", metadata.ticker));
    text.push_str(&format!("Score: {} ({})\n", score.score, score.level));
    if score.matches.is_empty() {
        text.push_str("Matches: none\n");
    } else {
        text.push_str("Matches:\n");
        for m in &score.matches {
            text.push_str(&format!("  {} (+{})\n", m.label(), m.weight));
        }
    }
    if score.suspicious {
        text.push_str(&format!(
            "Suspicious keywords: {}\n",
            score.keywords.join(", ")
        ));
    }
    text
}
