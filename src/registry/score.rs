//! Brand-resemblance scoring of token metadata.
//!
//! The name and ticker are each checked against a target family of variant
//! spellings. Per field only the strongest criterion counts:
//!
//! | criterion  | rule                                                   | default weight |
//! |------------|--------------------------------------------------------|----------------|
//! | exact      | a word equals a variant (case-insensitive)             | 40             |
//! | substring  | a variant appears inside a longer word or the field    | 25             |
//! | near-miss  | a variant appears after digit/symbol substitution, or a word is within the edit-distance bound | 15 |
//!
//! The description is scanned for suspicious keywords; any hit adds a single
//! bonus (default 20). The score is the plain sum of contributing weights.
//! Degraded metadata always scores zero.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::metadata::TokenMetadata;

/// Brand token and its look-alike spellings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFamily {
    /// Canonical brand token.
    pub base: String,
    /// Known variant spellings; the base is always included.
    #[serde(default)]
    pub variants: Vec<String>,
    /// Largest Levenshtein distance still counted as a near miss.
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,
    /// Whether digit/symbol-for-letter substitutions are undone before matching.
    #[serde(default = "default_substitutions")]
    pub substitutions: bool,
}

fn default_max_edit_distance() -> usize {
    1
}

fn default_substitutions() -> bool {
    true
}

impl TargetFamily {
    /// Creates a family with default near-miss tolerance.
    pub fn new(base: impl Into<String>, variants: &[&str]) -> Self {
        Self {
            base: base.into(),
            variants: variants.iter().map(|v| (*v).to_string()).collect(),
            max_edit_distance: default_max_edit_distance(),
            substitutions: default_substitutions(),
        }
    }

    /// Lowercased variants, base first, without duplicates or blanks.
    pub fn normalized_variants(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for candidate in std::iter::once(&self.base).chain(&self.variants) {
            let lowered = candidate.trim().to_lowercase();
            if !lowered.is_empty() && !out.contains(&lowered) {
                out.push(lowered);
            }
        }
        out
    }
}

/// Weight contributed by each criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Exact word match.
    pub exact: u32,
    /// Variant embedded in a longer word.
    pub substring: u32,
    /// Substitution or edit-distance match.
    pub near_miss: u32,
    /// Bonus for any suspicious keyword in the description.
    pub suspicious_keyword: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact: 40,
            substring: 25,
            near_miss: 15,
            suspicious_keyword: 20,
        }
    }
}

/// Matching criterion, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criterion {
    /// Substitution or edit-distance match.
    NearMiss,
    /// Variant embedded in a longer word.
    Substring,
    /// Word equals a variant.
    Exact,
}

impl Criterion {
    /// Weight of this criterion under `weights`.
    pub fn weight(self, weights: &ScoringWeights) -> u32 {
        match self {
            Self::Exact => weights.exact,
            Self::Substring => weights.substring,
            Self::NearMiss => weights.near_miss,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Substring => write!(f, "substring"),
            Self::NearMiss => write!(f, "near-miss"),
        }
    }
}

/// Metadata field a criterion matched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedField {
    /// Display name.
    Name,
    /// Ticker symbol.
    Ticker,
}

impl fmt::Display for MatchedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Ticker => write!(f, "ticker"),
        }
    }
}

/// One satisfied criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionMatch {
    /// Field that matched.
    pub field: MatchedField,
    /// Criterion that matched.
    pub criterion: Criterion,
    /// Variant that was matched.
    pub variant: String,
    /// Weight contributed.
    pub weight: u32,
}

impl CriterionMatch {
    /// Short label such as `name:exact(night)`.
    pub fn label(&self) -> String {
        format!("{}:{}({})", self.field, self.criterion, self.variant)
    }
}

/// Qualitative bucket of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResemblanceLevel {
    /// Score of zero.
    None,
    /// Any positive score below medium.
    Low,
    /// Score of at least 20.
    Medium,
    /// Score of at least 50.
    High,
}

impl ResemblanceLevel {
    /// Buckets a numeric score.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 50 => Self::High,
            s if s >= 20 => Self::Medium,
            0 => Self::None,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for ResemblanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Outcome of scoring one metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResemblanceScore {
    /// Sum of contributing weights.
    pub score: u32,
    /// Qualitative bucket of `score`.
    pub level: ResemblanceLevel,
    /// Matched criteria, strongest first.
    pub matches: Vec<CriterionMatch>,
    /// Whether the description contains a suspicious keyword.
    pub suspicious: bool,
    /// Suspicious keywords found, in configured order.
    pub keywords: Vec<String>,
}

impl ResemblanceScore {
    /// A score with no matches.
    pub fn zero() -> Self {
        Self {
            score: 0,
            level: ResemblanceLevel::None,
            matches: Vec::new(),
            suspicious: false,
            keywords: Vec::new(),
        }
    }

    /// Strongest criterion matched, if any.
    pub fn strongest(&self) -> Option<Criterion> {
        self.matches.iter().map(|m| m.criterion).max()
    }

    /// Labels of all matched criteria, strongest first.
    pub fn labels(&self) -> Vec<String> {
        self.matches.iter().map(CriterionMatch::label).collect()
    }

    /// Ranking order: higher score first, then the more specific match,
    /// then more matches.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.strongest().cmp(&self.strongest()))
            .then_with(|| other.matches.len().cmp(&self.matches.len()))
    }
}

/// Scores metadata against a target family and keyword list.
#[derive(Debug, Clone)]
pub struct ResemblanceScorer {
    family: TargetFamily,
    variants: Vec<String>,
    keywords: Vec<String>,
    weights: ScoringWeights,
}

impl ResemblanceScorer {
    /// Creates a scorer.
    pub fn new(family: TargetFamily, keywords: &[String], weights: ScoringWeights) -> Self {
        let variants = family.normalized_variants();
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let lowered = keyword.trim().to_lowercase();
            if !lowered.is_empty() && !normalized.contains(&lowered) {
                normalized.push(lowered);
            }
        }
        Self {
            family,
            variants,
            keywords: normalized,
            weights,
        }
    }

    /// Scores one record.
    pub fn score(&self, metadata: &TokenMetadata) -> ResemblanceScore {
        if metadata.is_degraded() {
            return ResemblanceScore::zero();
        }

        let mut matches: Vec<CriterionMatch> = [
            (MatchedField::Name, metadata.name.as_str()),
            (MatchedField::Ticker, metadata.ticker.as_str()),
        ]
        .into_iter()
        .filter_map(|(field, text)| self.best_match(field, text))
        .collect();
        matches.sort_by(|a, b| {
            b.criterion
                .cmp(&a.criterion)
                .then_with(|| a.field.cmp(&b.field))
        });

        let description = metadata.description.to_lowercase();
        let keywords: Vec<String> = self
            .keywords
            .iter()
            .filter(|k| description.contains(k.as_str()))
            .cloned()
            .collect();
        let suspicious = !keywords.is_empty();

        let mut score = matches
            .iter()
            .map(|m| m.weight)
            .fold(0u32, u32::saturating_add);
        if suspicious {
            score = score.saturating_add(self.weights.suspicious_keyword);
        }

        ResemblanceScore {
            score,
            level: ResemblanceLevel::from_score(score),
            matches,
            suspicious,
            keywords,
        }
    }

    fn best_match(&self, field: MatchedField, text: &str) -> Option<CriterionMatch> {
        if text.trim().is_empty() {
            return None;
        }

        let checks: [(Criterion, &dyn Fn(&str) -> bool); 3] = [
            (Criterion::Exact, &|v: &str| is_exact_match(text, v)),
            (Criterion::Substring, &|v: &str| is_substring_match(text, v)),
            (Criterion::NearMiss, &|v: &str| {
                is_near_miss(
                    text,
                    v,
                    self.family.max_edit_distance,
                    self.family.substitutions,
                )
            }),
        ];

        checks.iter().find_map(|(criterion, predicate)| {
            self.variants
                .iter()
                .find(|v| predicate(v.as_str()))
                .map(|variant| CriterionMatch {
                    field,
                    criterion: *criterion,
                    variant: variant.clone(),
                    weight: criterion.weight(&self.weights),
                })
        })
    }
}

/// Splits text into lowercase words on whitespace and common separators.
///
/// Symbols used as letter substitutes (`@`, `$`, `!`, `|`) stay inside words.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || "-_.,:;/()[]{}\"'".contains(c))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn trim_symbols(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Lowercased text with everything but letters and digits removed.
fn compact(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// A word of `text` equals `variant`, ignoring case and edge punctuation.
pub fn is_exact_match(text: &str, variant: &str) -> bool {
    let variant = variant.to_lowercase();
    words(text).iter().any(|w| trim_symbols(w) == variant)
}

/// `variant` occurs anywhere in `text`, ignoring case and separators.
///
/// Exact matches satisfy this as well; the scorer checks exact first.
pub fn is_substring_match(text: &str, variant: &str) -> bool {
    let variant = variant.to_lowercase();
    if variant.is_empty() {
        return false;
    }
    text.to_lowercase().contains(&variant) || compact(text).contains(&variant)
}

/// `variant` appears once look-alike characters are undone, or some word is
/// within `max_distance` edits of it.
pub fn is_near_miss(text: &str, variant: &str, max_distance: usize, substitutions: bool) -> bool {
    let variant = variant.to_lowercase();
    if variant.is_empty() {
        return false;
    }

    if substitutions && compact(&normalize_substitutions(text)).contains(&variant) {
        return true;
    }

    max_distance > 0
        && words(text).iter().any(|word| {
            let candidate = if substitutions {
                normalize_substitutions(word)
            } else {
                word.clone()
            };
            let candidate = trim_symbols(&candidate);
            candidate.chars().count() >= 3 && edit_distance(candidate, &variant) <= max_distance
        })
}

/// Maps common digit and symbol substitutes back to letters.
pub fn normalize_substitutions(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' | '!' => 'i',
            '3' => 'e',
            '4' | '@' => 'a',
            '5' | '$' => 's',
            '7' => 't',
            '8' => 'b',
            '|' => 'l',
            other => other,
        })
        .collect()
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
