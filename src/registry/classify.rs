//! Turns raw commit touches into one change event per subject.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::RegistryError;
use super::touch::{subject_from_path, CommitTouch, TouchKind};
use super::window::LookbackWindow;

/// Whether a subject first appeared in the window or already existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// The mapping file was created inside the window.
    Added,
    /// The mapping file existed before the window and was changed.
    Modified,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Modified => write!(f, "MODIFIED"),
        }
    }
}

/// Web links into the watched repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoLinks {
    /// Base URL of the hosting web UI, e.g. `https://github.com`.
    pub web_base: String,
    /// Repository in `owner/name` form.
    pub repository: String,
    /// Branch used for file and tree links.
    pub branch: String,
    /// Base URL of a metadata service that serves entries by subject.
    pub metadata_base: Option<String>,
}

impl RepoLinks {
    /// Creates links for a GitHub-hosted repository.
    pub fn github(repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            web_base: "https://github.com".to_string(),
            repository: repository.into(),
            branch: branch.into(),
            metadata_base: None,
        }
    }

    /// Sets the metadata service base URL.
    #[must_use]
    pub fn with_metadata_base(mut self, base: Option<String>) -> Self {
        self.metadata_base = base;
        self
    }

    /// Link to a single commit.
    pub fn commit_url(&self, commit: &str) -> String {
        format!("{}/{}/commit/{commit}", self.base(), self.repository)
    }

    /// Link to a file on the watched branch.
    pub fn blob_url(&self, path: &str) -> String {
        format!("{}/{}/blob/{}/{path}", self.base(), self.repository, self.branch)
    }

    /// Link to a directory listing on the watched branch.
    pub fn tree_url(&self, directory: &str) -> String {
        format!(
            "{}/{}/tree/{}/{}",
            self.base(),
            self.repository,
            self.branch,
            directory.trim_matches('/')
        )
    }

    /// Link to the metadata service entry for a subject, if configured.
    pub fn metadata_url(&self, subject: &str) -> Option<String> {
        self.metadata_base
            .as_deref()
            .map(|base| format!("{}/{subject}", base.trim_end_matches('/')))
    }

    fn base(&self) -> &str {
        self.web_base.trim_end_matches('/')
    }
}

/// One changed subject within the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Subject identifier derived from the file path.
    pub subject: String,
    /// ADDED or MODIFIED.
    pub classification: Classification,
    /// Path of the mapping file at the latest touch.
    pub path: String,
    /// Most recent commit touching the file in the window.
    pub commit: String,
    /// Timestamp of that commit.
    pub timestamp: DateTime<Utc>,
    /// Link to the mapping file.
    pub mapping_url: String,
    /// Link to the most recent commit.
    pub commit_url: String,
    /// Link to the metadata service entry, when one is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
}

/// Groups commit touches into deduplicated change events.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    links: RepoLinks,
}

impl ChangeClassifier {
    /// Creates a classifier that links events into the given repository.
    pub fn new(links: RepoLinks) -> Self {
        Self { links }
    }

    /// Classifies `touches` falling inside `window`.
    ///
    /// Every touch is validated, including those outside the window. The
    /// result holds at most one event per subject, ordered by
    /// [`sort_events`]. A subject whose latest touch is a removal yields no
    /// event.
    pub fn classify(
        &self,
        touches: &[CommitTouch],
        window: &LookbackWindow,
    ) -> Result<Vec<ChangeEvent>, RegistryError> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut groups: BTreeMap<String, Vec<(&CommitTouch, TouchKind)>> = BTreeMap::new();

        for touch in touches {
            let kind = validate_touch(touch)?;
            if !window.contains(touch.timestamp) {
                continue;
            }
            if !seen.insert((touch.path.as_str(), touch.commit.as_str())) {
                continue;
            }
            groups
                .entry(subject_from_path(&touch.path))
                .or_default()
                .push((touch, kind));
        }

        let mut events = Vec::with_capacity(groups.len());
        for (subject, mut group) in groups {
            group.sort_by(|(a, _), (b, _)| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.commit.cmp(&b.commit))
            });

            let Some(&(latest, latest_kind)) = group.last() else {
                continue;
            };
            if latest_kind == TouchKind::Removed {
                debug!(subject = %subject, commit = %latest.commit, "Skipping removed mapping");
                continue;
            }

            let classification = if group.iter().any(|(_, kind)| *kind == TouchKind::Added) {
                Classification::Added
            } else {
                Classification::Modified
            };

            events.push(ChangeEvent {
                metadata_url: self.links.metadata_url(&subject),
                mapping_url: self.links.blob_url(&latest.path),
                commit_url: self.links.commit_url(&latest.commit),
                subject,
                classification,
                path: latest.path.clone(),
                commit: latest.commit.clone(),
                timestamp: latest.timestamp,
            });
        }

        sort_events(&mut events);
        Ok(events)
    }
}

/// Orders events most recent first, subject ascending on equal timestamps.
pub fn sort_events(events: &mut [ChangeEvent]) {
    events.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.subject.cmp(&b.subject))
    });
}

fn validate_touch(touch: &CommitTouch) -> Result<TouchKind, RegistryError> {
    let malformed = |reason: String| RegistryError::MalformedTouch {
        commit: touch.commit.clone(),
        path: touch.path.clone(),
        reason,
    };

    if touch.path.trim().is_empty() {
        return Err(malformed("empty path".to_string()));
    }
    if touch.commit.trim().is_empty() {
        return Err(malformed("empty commit identifier".to_string()));
    }
    if subject_from_path(&touch.path).is_empty() {
        return Err(malformed("no subject in path".to_string()));
    }
    touch
        .kind
        .parse::<TouchKind>()
        .map_err(|()| malformed(format!("unrecognized change kind {:?}", touch.kind)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap()
    }

    fn window() -> LookbackWindow {
        LookbackWindow::ending_at(t0() + Duration::hours(6), 24)
    }

    fn classifier() -> ChangeClassifier {
        ChangeClassifier::new(
            RepoLinks::github("owner/registry", "master")
                .with_metadata_base(Some("https://tokens.example.org/metadata".to_string())),
        )
    }

    fn touch(commit: &str, path: &str, kind: &str, offset_minutes: i64) -> CommitTouch {
        CommitTouch::new(commit, path, kind, t0() + Duration::minutes(offset_minutes))
    }

    #[test]
    fn single_add_becomes_added_event() {
        let events = classifier()
            .classify(&[touch("c1", "night.json", "added", 0)], &window())
            .unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.subject, "night");
        assert_eq!(event.classification, Classification::Added);
        assert_eq!(event.commit, "c1");
        assert_eq!(event.commit_url, "https://github.com/owner/registry/commit/c1");
        assert_eq!(
            event.mapping_url,
            "https://github.com/owner/registry/blob/master/night.json"
        );
        assert_eq!(
            event.metadata_url.as_deref(),
            Some("https://tokens.example.org/metadata/night")
        );
    }

    #[test]
    fn repeated_modifications_keep_latest_commit() {
        let touches = vec![
            touch("c2", "foo.json", "modified", 30),
            touch("c1", "foo.json", "modified", 10),
        ];
        let events = classifier().classify(&touches, &window()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].classification, Classification::Modified);
        assert_eq!(events[0].commit, "c2");
        assert_eq!(events[0].timestamp, t0() + Duration::minutes(30));
    }

    #[test]
    fn add_then_modifications_stays_added() {
        let touches = vec![
            touch("c3", "mappings/abc.json", "modified", 20),
            touch("c1", "mappings/abc.json", "added", 0),
            touch("c2", "mappings/abc.json", "modified", 10),
        ];
        let events = classifier().classify(&touches, &window()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].classification, Classification::Added);
        assert_eq!(events[0].commit, "c3");
    }

    #[test]
    fn touches_outside_window_ignored() {
        let touches = vec![
            touch("old", "mappings/abc.json", "added", -(60 * 24)),
            touch("c1", "mappings/abc.json", "modified", 5),
        ];
        let events = classifier().classify(&touches, &window()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].classification, Classification::Modified);
    }

    #[test]
    fn window_bounds_inclusive() {
        let w = window();
        let touches = vec![
            CommitTouch::new("s", "mappings/start.json", "added", w.start),
            CommitTouch::new("e", "mappings/end.json", "added", w.end),
        ];
        let events = classifier().classify(&touches, &w).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn duplicate_touches_collapse() {
        let touches = vec![
            touch("c1", "mappings/abc.json", "added", 0),
            touch("c1", "mappings/abc.json", "added", 0),
        ];
        let events = classifier().classify(&touches, &window()).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn ordered_most_recent_first() {
        let touches = vec![
            touch("c1", "mappings/a.json", "added", 0),
            touch("c2", "mappings/b.json", "modified", 50),
            touch("c3", "mappings/c.json", "added", 25),
            touch("c4", "mappings/d.json", "added", 25),
        ];
        let events = classifier().classify(&touches, &window()).unwrap();
        let subjects: Vec<&str> = events.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn removal_as_latest_touch_drops_subject() {
        let touches = vec![
            touch("c1", "mappings/gone.json", "added", 0),
            touch("c2", "mappings/gone.json", "removed", 10),
        ];
        let events = classifier().classify(&touches, &window()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn removal_then_readd_is_added() {
        let touches = vec![
            touch("c1", "mappings/back.json", "removed", 0),
            touch("c2", "mappings/back.json", "added", 10),
        ];
        let events = classifier().classify(&touches, &window()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].classification, Classification::Added);
        assert_eq!(events[0].commit, "c2");
    }

    #[test]
    fn empty_path_is_malformed() {
        let err = classifier()
            .classify(&[touch("c1", "", "added", 0)], &window())
            .unwrap_err();
        assert!(matches!(err, RegistryError::MalformedTouch { .. }));
    }

    #[test]
    fn empty_commit_is_malformed() {
        let err = classifier()
            .classify(&[touch("", "mappings/a.json", "added", 0)], &window())
            .unwrap_err();
        match err {
            RegistryError::MalformedTouch { commit, path, .. } => {
                assert!(commit.is_empty());
                assert_eq!(path, "mappings/a.json");
            }
            other => panic!("expected MalformedTouch, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_malformed_even_outside_window() {
        let err = classifier()
            .classify(
                &[touch("c1", "mappings/a.json", "renamed", -(60 * 48))],
                &window(),
            )
            .unwrap_err();
        match err {
            RegistryError::MalformedTouch { reason, .. } => {
                assert!(reason.contains("renamed"), "unexpected reason: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_input_yields_no_events() {
        let events = classifier().classify(&[], &window()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn metadata_link_absent_without_base() {
        let classifier = ChangeClassifier::new(RepoLinks::github("o/r", "main"));
        let events = classifier
            .classify(&[touch("c1", "mappings/a.json", "added", 0)], &window())
            .unwrap();
        assert!(events[0].metadata_url.is_none());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn arb_touch() -> impl Strategy<Value = CommitTouch> {
            (
                "[a-f0-9]{4}",
                prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")],
                prop_oneof![Just("added"), Just("modified"), Just("removed")],
                -120i64..600,
            )
                .prop_map(|(commit, subject, kind, minutes)| {
                    touch(&commit, &format!("mappings/{subject}.json"), kind, minutes)
                })
        }

        proptest! {
            #[test]
            fn classify_is_deterministic(touches in proptest::collection::vec(arb_touch(), 0..24)) {
                let a = classifier().classify(&touches, &window()).unwrap();
                let b = classifier().classify(&touches, &window()).unwrap();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn at_most_one_event_per_subject(touches in proptest::collection::vec(arb_touch(), 0..24)) {
                let events = classifier().classify(&touches, &window()).unwrap();
                let unique: HashSet<&str> = events.iter().map(|e| e.subject.as_str()).collect();
                prop_assert_eq!(unique.len(), events.len());
            }

            #[test]
            fn no_add_means_modified(touches in proptest::collection::vec(arb_touch(), 0..24)) {
                let without_adds: Vec<CommitTouch> = touches
                    .into_iter()
                    .filter(|t| t.kind != "added")
                    .collect();
                let events = classifier().classify(&without_adds, &window()).unwrap();
                prop_assert!(events.iter().all(|e| e.classification == Classification::Modified));
            }

            #[test]
            fn output_sorted_most_recent_first(touches in proptest::collection::vec(arb_touch(), 0..24)) {
                let events = classifier().classify(&touches, &window()).unwrap();
                for pair in events.windows(2) {
                    prop_assert!(pair[0].timestamp >= pair[1].timestamp);
                }
            }
        }
    }
}
