//! End-to-end watch run: list, classify, resolve, score, report.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::WatchConfig;
use crate::registry::{
    ChangeClassifier, CommitSource, ContentFetcher, DetectionReport, LookbackWindow,
    MetadataResolver, ReportBuilder, ResemblanceScore,
};

/// Runs the detection pipeline against injected collaborators.
pub struct Watcher {
    config: WatchConfig,
    source: Arc<dyn CommitSource>,
    fetcher: Arc<dyn ContentFetcher>,
}

impl Watcher {
    /// Creates a watcher over a commit source and a content fetcher.
    pub fn new(
        config: WatchConfig,
        source: Arc<dyn CommitSource>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            config,
            source,
            fetcher,
        }
    }

    /// Produces the report for the window ending at `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<DetectionReport> {
        let config = &self.config;
        let window = LookbackWindow::ending_at(now, config.lookback_hours);
        info!(
            repository = %config.repository,
            directory = %config.directory,
            start = %window.start,
            end = %window.end,
            "Scanning registry"
        );

        let directory = config.directory.trim_matches('/');
        let touches = self
            .source
            .list_touches(directory, &window)
            .await
            .context("Failed to list registry changes")?;

        let links = config.links();
        let events = ChangeClassifier::new(links.clone())
            .classify(&touches, &window)
            .context("Failed to classify registry changes")?;
        info!(
            touches = touches.len(),
            events = events.len(),
            "Classified registry changes"
        );

        let resolver = MetadataResolver::new(
            self.fetcher.clone(),
            config.fetch_timeout(),
            config.fetch.concurrency,
        );
        let metadata = resolver.resolve_all(&events).await;

        let scorer = config.scorer();
        let scores: HashMap<String, ResemblanceScore> = metadata
            .iter()
            .map(|(subject, resolved)| (subject.clone(), scorer.score(resolved)))
            .collect();

        let report = ReportBuilder::new(links, directory)
            .build(&events, &metadata, &scores, window)
            .context("Failed to build report")?;
        info!(
            added = report.added,
            modified = report.modified,
            flagged = report.ranking().len(),
            "Report ready"
        );
        Ok(report)
    }
}
