//! Aggregation of classified, resolved and scored events into a report.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::classify::{sort_events, ChangeEvent, Classification, RepoLinks};
use super::error::RegistryError;
use super::metadata::TokenMetadata;
use super::score::ResemblanceScore;
use super::window::LookbackWindow;

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// The change.
    pub event: ChangeEvent,
    /// Metadata resolved for it.
    pub metadata: TokenMetadata,
    /// Resemblance score; zero for degraded metadata.
    pub score: ResemblanceScore,
}

/// Final output of a run, handed to alert delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Window the run covered.
    pub window: LookbackWindow,
    /// Number of ADDED events.
    pub added: usize,
    /// Number of MODIFIED events.
    pub modified: usize,
    /// Rows, most recent change first.
    pub entries: Vec<ReportEntry>,
    /// Rendered multi-section text.
    pub text: String,
}

impl DetectionReport {
    /// Total number of changed subjects.
    pub fn total(&self) -> usize {
        self.added + self.modified
    }

    /// Returns true if anything changed in the window.
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }

    /// Counts as `key=value` lines for CI step outputs.
    pub fn outputs(&self) -> String {
        format!(
            "added={}\nmodified={}\ntotal={}\n",
            self.added,
            self.modified,
            self.total()
        )
    }

    /// Non-degraded entries with a positive score, highest ranked first.
    pub fn ranking(&self) -> Vec<&ReportEntry> {
        let mut ranked: Vec<&ReportEntry> = self
            .entries
            .iter()
            .filter(|e| !e.metadata.is_degraded() && e.score.score > 0)
            .collect();
        ranked.sort_by(|a, b| {
            a.score
                .rank_cmp(&b.score)
                .then_with(|| a.event.subject.cmp(&b.event.subject))
        });
        ranked
    }
}

/// Builds [`DetectionReport`]s for one repository directory.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    links: RepoLinks,
    directory: String,
}

impl ReportBuilder {
    /// Creates a builder whose footer links to `directory` in the repository.
    pub fn new(links: RepoLinks, directory: impl Into<String>) -> Self {
        Self {
            links,
            directory: directory.into(),
        }
    }

    /// Joins events with their metadata and scores by subject identifier.
    ///
    /// Entries follow the classifier's ordering regardless of input order.
    /// Degraded metadata always carries a zero score.
    pub fn build(
        &self,
        events: &[ChangeEvent],
        metadata: &HashMap<String, TokenMetadata>,
        scores: &HashMap<String, ResemblanceScore>,
        window: LookbackWindow,
    ) -> Result<DetectionReport, RegistryError> {
        let mut ordered = events.to_vec();
        sort_events(&mut ordered);

        let mut entries = Vec::with_capacity(ordered.len());
        for event in ordered {
            let resolved = metadata
                .get(&event.subject)
                .ok_or_else(|| RegistryError::InconsistentInput {
                    subject: event.subject.clone(),
                    missing: "metadata",
                })?
                .clone();
            let score = scores
                .get(&event.subject)
                .ok_or_else(|| RegistryError::InconsistentInput {
                    subject: event.subject.clone(),
                    missing: "score",
                })?;
            let score = if resolved.is_degraded() {
                ResemblanceScore::zero()
            } else {
                score.clone()
            };
            entries.push(ReportEntry {
                event,
                metadata: resolved,
                score,
            });
        }

        let added = entries
            .iter()
            .filter(|e| e.event.classification == Classification::Added)
            .count();
        let modified = entries.len() - added;

        let mut report = DetectionReport {
            window,
            added,
            modified,
            entries,
            text: String::new(),
        };
        report.text = self.render(&report);
        Ok(report)
    }

    fn render(&self, report: &DetectionReport) -> String {
        let hours = report.window.hours();
        let mut text = String::new();

        if report.has_changes() {
            text.push_str(&format!(
                "🚨 New or updated token registrations detected in the last {hours} hours\n"
            ));
        } else {
            text.push_str(&format!(
                "✅ No new or updated token registrations in the last {hours} hours\n"
            ));
        }
        text.push_str(&format!(
            "Window: {} .. {}\n",
            timestamp(report.window.start),
            timestamp(report.window.end)
        ));
        text.push_str(&format!("Total changed: {}\n", report.total()));
        text.push_str(&format!("New tokens: {}\n", report.added));
        text.push_str(&format!("Updated tokens: {}\n", report.modified));
        text.push('\n');

        for (heading, classification) in [
            ("New token mappings:", Classification::Added),
            ("Updated token mappings:", Classification::Modified),
        ] {
            text.push_str(heading);
            text.push('\n');
            let rows: Vec<&ReportEntry> = report
                .entries
                .iter()
                .filter(|e| e.event.classification == classification)
                .collect();
            if rows.is_empty() {
                text.push_str("  None in this window\n\n");
            }
            for entry in rows {
                render_entry(&mut text, entry);
            }
        }

        text.push_str("Resemblance ranking:\n");
        let ranking = report.ranking();
        if ranking.is_empty() {
            text.push_str("  No resemblance matches\n");
        }
        for (position, entry) in ranking.iter().enumerate() {
            text.push_str(&format!(
                "  {}. {} {} ({}){}\n",
                position + 1,
                single_line(&entry.event.subject),
                entry.score.score,
                entry.score.level,
                rationale(&entry.score)
            ));
        }
        text.push('\n');

        text.push_str("You can view all mappings here:\n");
        text.push_str(&self.links.tree_url(&self.directory));
        text.push('\n');
        text
    }
}

fn render_entry(text: &mut String, entry: &ReportEntry) {
    let event = &entry.event;
    let metadata = &entry.metadata;

    text.push_str(&format!(
        "- {} ({})\n",
        single_line(&event.subject),
        single_line(&event.path)
    ));
    text.push_str(&format!("  Committed: {}\n", timestamp(event.timestamp)));
    text.push_str(&format!("  Commit: {}\n", single_line(&event.commit_url)));
    text.push_str(&format!(
        "  Mapping file: {}\n",
        single_line(&event.mapping_url)
    ));
    if let Some(url) = &event.metadata_url {
        text.push_str(&format!("  Metadata: {}\n", single_line(url)));
    }
    if !metadata.name.is_empty() || !metadata.ticker.is_empty() {
        text.push_str(&format!(
            "  Name/Ticker: {} / {}\n",
            single_line(&metadata.name),
            single_line(&metadata.ticker)
        ));
    }
    if let Some(reason) = &metadata.degraded {
        text.push_str(&format!(
            "  Resolution: degraded ({})\n",
            single_line(&reason.to_string())
        ));
    }
    if entry.score.score > 0 {
        text.push_str(&format!(
            "  Resemblance: {} ({}){}\n",
            entry.score.score,
            entry.score.level,
            rationale(&entry.score)
        ));
    }
    if entry.score.suspicious {
        text.push_str(&format!(
            "  Suspicious keywords: {}\n",
            single_line(&entry.score.keywords.join(", "))
        ));
    }
    text.push('\n');
}

/// Registry text with control characters replaced by spaces, so a value
/// cannot start a new report line.
fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn rationale(score: &ResemblanceScore) -> String {
    let labels = score.labels();
    if labels.is_empty() {
        String::new()
    } else {
        format!(" [{}]", single_line(&labels.join(", ")))
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::registry::test_utils::{event, reference_time};
    use crate::registry::{
        ResemblanceScorer, ResolutionDegraded, ScoringWeights, TargetFamily,
    };

    fn builder() -> ReportBuilder {
        ReportBuilder::new(RepoLinks::github("owner/registry", "master"), "mappings")
    }

    fn window() -> LookbackWindow {
        LookbackWindow::ending_at(reference_time(), 24)
    }

    fn scorer() -> ResemblanceScorer {
        ResemblanceScorer::new(
            TargetFamily::new("night", &["knight"]),
            &["airdrop".to_string()],
            ScoringWeights::default(),
        )
    }

    fn named(subject: &str, name: &str, ticker: &str) -> TokenMetadata {
        TokenMetadata {
            subject: subject.to_string(),
            name: name.to_string(),
            ticker: ticker.to_string(),
            ..TokenMetadata::default()
        }
    }

    fn inputs() -> (
        Vec<ChangeEvent>,
        HashMap<String, TokenMetadata>,
        HashMap<String, ResemblanceScore>,
    ) {
        let mut newer = event("b", Classification::Modified, "c2");
        newer.timestamp = reference_time() - Duration::hours(1);
        let mut older = event("a", Classification::Added, "c1");
        older.timestamp = reference_time() - Duration::hours(3);
        let missing = {
            let mut e = event("c", Classification::Added, "c3");
            e.timestamp = reference_time() - Duration::hours(2);
            e
        };

        let metadata: HashMap<String, TokenMetadata> = [
            named("a", "Night Token", "NIGHT"),
            named("b", "Plain", "PLN"),
            TokenMetadata::degraded("c", ResolutionDegraded::NotFound),
        ]
        .into_iter()
        .map(|m| (m.subject.clone(), m))
        .collect();
        let scores = metadata
            .iter()
            .map(|(k, m)| (k.clone(), scorer().score(m)))
            .collect();

        (vec![older, newer, missing], metadata, scores)
    }

    #[test]
    fn counts_follow_classification() {
        let (events, metadata, scores) = inputs();
        let report = builder()
            .build(&events, &metadata, &scores, window())
            .unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.modified, 1);
        assert_eq!(report.total(), 3);
        assert!(report.has_changes());
        assert_eq!(report.outputs(), "added=2\nmodified=1\ntotal=3\n");
    }

    #[test]
    fn entries_are_resorted_most_recent_first() {
        let (events, metadata, scores) = inputs();
        let report = builder()
            .build(&events, &metadata, &scores, window())
            .unwrap();
        let subjects: Vec<&str> = report
            .entries
            .iter()
            .map(|e| e.event.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["b", "c", "a"]);
    }

    #[test]
    fn missing_metadata_is_inconsistent() {
        let (events, mut metadata, scores) = inputs();
        metadata.remove("a");
        let err = builder()
            .build(&events, &metadata, &scores, window())
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::InconsistentInput {
                subject: "a".to_string(),
                missing: "metadata"
            }
        );
    }

    #[test]
    fn missing_score_is_inconsistent() {
        let (events, metadata, mut scores) = inputs();
        scores.remove("b");
        let err = builder()
            .build(&events, &metadata, &scores, window())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InconsistentInput { missing: "score", .. }
        ));
    }

    #[test]
    fn degraded_rows_marked_zeroed_and_unranked() {
        let (events, metadata, mut scores) = inputs();
        // A stray non-zero score for a degraded row is overridden.
        scores.insert("c".to_string(), scores["a"].clone());
        let report = builder()
            .build(&events, &metadata, &scores, window())
            .unwrap();

        let degraded = report
            .entries
            .iter()
            .find(|e| e.event.subject == "c")
            .unwrap();
        assert_eq!(degraded.score, ResemblanceScore::zero());
        assert!(report.text.contains("  Resolution: degraded (not found)\n"));

        let ranked: Vec<&str> = report
            .ranking()
            .iter()
            .map(|e| e.event.subject.as_str())
            .collect();
        assert_eq!(ranked, vec!["a"]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let (events, metadata, scores) = inputs();
        let first = builder()
            .build(&events, &metadata, &scores, window())
            .unwrap();

        let mut reversed = events.clone();
        reversed.reverse();
        let second = builder()
            .build(&reversed, &metadata, &scores, window())
            .unwrap();

        assert_eq!(first.text, second.text);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_report_has_all_sections() {
        let report = builder()
            .build(&[], &HashMap::new(), &HashMap::new(), window())
            .unwrap();
        assert!(!report.has_changes());
        assert!(report
            .text
            .starts_with("✅ No new or updated token registrations in the last 24 hours\n"));
        assert!(report.text.contains("New token mappings:\n  None in this window\n"));
        assert!(report
            .text
            .contains("Updated token mappings:\n  None in this window\n"));
        assert!(report
            .text
            .contains("Resemblance ranking:\n  No resemblance matches\n"));
        assert!(report
            .text
            .ends_with("https://github.com/owner/registry/tree/master/mappings\n"));
    }

    #[test]
    fn registry_text_cannot_forge_sections() {
        let (events, mut metadata, mut scores) = inputs();
        let forged = named(
            "b",
            "Safe\n\nUpdated token mappings:\n  None in this window\n\nResemblance ranking:\n  No resemblance matches",
            "PLN\r\tX",
        );
        scores.insert("b".to_string(), scorer().score(&forged));
        metadata.insert("b".to_string(), forged);

        let report = builder()
            .build(&events, &metadata, &scores, window())
            .unwrap();

        let headers = |header: &str| report.text.lines().filter(|l| *l == header).count();
        assert_eq!(headers("Resemblance ranking:"), 1);
        assert_eq!(headers("Updated token mappings:"), 1);
        assert!(!report.text.lines().any(|l| l == "  None in this window"));
        assert!(report.text.contains(
            "  Name/Ticker: Safe  Updated token mappings:   None in this window  Resemblance ranking:   No resemblance matches / PLN  X\n"
        ));
    }

    #[test]
    fn single_line_replaces_control_characters() {
        assert_eq!(single_line("a\nb\rc\td\u{1b}e"), "a b c d e");
        assert_eq!(single_line("Night Token"), "Night Token");
    }
}
