//! Change detection and resemblance scoring for a file-per-asset registry.
//!
//! Data flows strictly forward through the submodules:
//! [`touch`] records are grouped by [`classify`] into change events,
//! [`metadata`] resolves each event's file, [`score`] rates the resolved
//! metadata and [`report`] assembles everything into a [`DetectionReport`].

pub mod classify;
pub mod error;
pub mod metadata;
pub mod report;
pub mod score;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod touch;
pub mod window;

pub use classify::{ChangeClassifier, ChangeEvent, Classification, RepoLinks};
pub use error::{RegistryError, ResolutionDegraded};
pub use metadata::{ContentFetcher, FetchError, MetadataResolver, TokenMetadata};
pub use report::{DetectionReport, ReportBuilder, ReportEntry};
pub use score::{
    Criterion, CriterionMatch, MatchedField, ResemblanceLevel, ResemblanceScore,
    ResemblanceScorer, ScoringWeights, TargetFamily,
};
pub use touch::{subject_from_path, CommitSource, CommitTouch, TouchKind};
pub use window::LookbackWindow;
