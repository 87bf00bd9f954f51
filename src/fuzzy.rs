//! Weighted fuzzy matching of reference entries against library candidates.
//!
//! Every candidate is scored on three signals:
//!
//! - **Title** (weight 0.82): `1.0` for an exact normalized match, `0.95` when one
//!   normalized title contains the other, otherwise the better of a token overlap ratio
//!   and a character-bigram Dice coefficient.
//! - **Author** (weight 0.13): any reference surname among the candidate's creators.
//! - **Year** (weight 0.05): both years known and equal.
//!
//! A candidate without an exact title must reach a title score of `0.9` and agree on
//! author or year to be considered at all. An exact title lifts the score to at least
//! `0.98`.
//!
//! The best candidate wins only if it clears the confidence threshold and leads the
//! runner-up by more than the ambiguity delta. Exact-title candidates outrank all others,
//! so the lead is only measured against another exact title when one exists.
//!
//! ## Usage
//!
//! ```rust
//! use citebind::candidate::{Candidate, CandidateRecord, RecordHandle};
//! use citebind::fuzzy::{FuzzyMatcher, FuzzyVerdict};
//! use citebind::{Authors, ReferenceEntry};
//!
//! let candidates = Candidate::from_records(vec![CandidateRecord {
//!     handle: RecordHandle::from("K1"),
//!     title: "Deep Residual Learning for Image Recognition".to_string(),
//!     date: "2016".to_string(),
//!     creators: vec!["He".to_string()],
//!     citekey: "he2016deep".to_string(),
//! }]);
//!
//! let entry = ReferenceEntry {
//!     title: "Deep residual learning for image recognition.".to_string(),
//!     author: Authors::One("Kaiming He".to_string()),
//!     year: "2016".to_string(),
//!     ..Default::default()
//! };
//!
//! match FuzzyMatcher::new().best_match(&entry, &candidates) {
//!     FuzzyVerdict::Winner(scored) => assert_eq!(scored.candidate.citekey, "he2016deep"),
//!     other => panic!("unexpected verdict: {other:?}"),
//! }
//! ```

use crate::ReferenceEntry;
use crate::candidate::Candidate;
use crate::normalize::{author_surname, normalize_text, strip_diacritics};
use std::collections::{HashMap, HashSet};

/// Default minimum score of a fuzzy winner.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.93;
/// Default minimum lead of a fuzzy winner over the runner-up.
pub const DEFAULT_AMBIGUITY_DELTA: f64 = 0.03;

const TITLE_GATE: f64 = 0.9;
const CONTAINMENT_SCORE: f64 = 0.95;
const EXACT_TITLE_FLOOR: f64 = 0.98;

const TITLE_WEIGHT: f64 = 0.82;
const AUTHOR_WEIGHT: f64 = 0.13;
const YEAR_WEIGHT: f64 = 0.05;

/// Configuration of the fuzzy stage.
///
/// # Examples
///
/// ```
/// use citebind::fuzzy::{FuzzyConfig, FuzzyMatcher};
///
/// let config = FuzzyConfig {
///     confidence_threshold: 0.95,
///     ..Default::default()
/// };
/// let matcher = FuzzyMatcher::new().with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyConfig {
    /// Minimum score the best candidate must reach.
    pub confidence_threshold: f64,
    /// The best candidate must lead the second by strictly more than this.
    pub ambiguity_delta: f64,
    /// Score candidates on the rayon pool. Ignored without the `parallel` feature.
    pub run_in_parallel: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            ambiguity_delta: DEFAULT_AMBIGUITY_DELTA,
            run_in_parallel: false,
        }
    }
}

/// A candidate that survived the candidate gate, with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored<'a> {
    pub candidate: &'a Candidate,
    pub score: f64,
    pub exact_title: bool,
}

/// Outcome of the fuzzy stage for one reference.
#[derive(Debug, Clone, PartialEq)]
pub enum FuzzyVerdict<'a> {
    /// The best candidate cleared both gates
    Winner(Scored<'a>),
    /// No candidate survived the candidate gate
    NoCandidate,
    /// The best score is under the confidence threshold
    BelowThreshold(f64),
    /// The two best scores are too close to call
    Ambiguous { top: f64, second: f64 },
}

/// The normalized view of a reference used for scoring.
#[derive(Debug)]
struct PreparedReference {
    normalized_title: String,
    surnames: Vec<String>,
    year: String,
}

impl PreparedReference {
    fn new(entry: &ReferenceEntry) -> Self {
        Self {
            normalized_title: normalize_text(&entry.title),
            surnames: entry
                .author
                .iter()
                .map(author_surname)
                .filter(|surname| !surname.is_empty())
                .collect(),
            year: entry.year_text(),
        }
    }
}

/// Scores candidates and picks a winner under confidence and ambiguity gates.
#[derive(Debug, Default, Clone)]
pub struct FuzzyMatcher {
    config: FuzzyConfig,
}

impl FuzzyMatcher {
    /// Creates a matcher with the default thresholds, scoring sequentially.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: FuzzyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &FuzzyConfig {
        &self.config
    }

    /// Scores one candidate.
    ///
    /// Returns `None` when either title is empty or the candidate fails the candidate
    /// gate.
    pub fn score<'a>(&self, entry: &ReferenceEntry, candidate: &'a Candidate) -> Option<Scored<'a>> {
        score_prepared(&PreparedReference::new(entry), candidate)
    }

    /// Scores every candidate and applies both gates to the best one.
    pub fn best_match<'a>(
        &self,
        entry: &ReferenceEntry,
        candidates: &'a [Candidate],
    ) -> FuzzyVerdict<'a> {
        let reference = PreparedReference::new(entry);
        if reference.normalized_title.is_empty() {
            return FuzzyVerdict::NoCandidate;
        }
        let mut scored = self.score_all(&reference, candidates);
        // stable: equal scores keep snapshot order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        select(&scored, &self.config)
    }

    #[cfg(feature = "parallel")]
    fn score_all<'a>(&self, reference: &PreparedReference, candidates: &'a [Candidate]) -> Vec<Scored<'a>> {
        if self.config.run_in_parallel {
            use rayon::prelude::*;

            candidates
                .par_iter()
                .filter_map(|candidate| score_prepared(reference, candidate))
                .collect()
        } else {
            score_sequential(reference, candidates)
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn score_all<'a>(&self, reference: &PreparedReference, candidates: &'a [Candidate]) -> Vec<Scored<'a>> {
        score_sequential(reference, candidates)
    }
}

fn score_sequential<'a>(reference: &PreparedReference, candidates: &'a [Candidate]) -> Vec<Scored<'a>> {
    candidates
        .iter()
        .filter_map(|candidate| score_prepared(reference, candidate))
        .collect()
}

fn score_prepared<'a>(reference: &PreparedReference, candidate: &'a Candidate) -> Option<Scored<'a>> {
    let (a, b) = (&reference.normalized_title, &candidate.normalized_title);
    // Untitled records carry no signal
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let exact_title = a == b;
    let title = title_score(a, b);
    let author = reference
        .surnames
        .iter()
        .any(|surname| candidate.authors.contains(surname.as_str()));
    let year = !reference.year.is_empty() && reference.year == candidate.year.as_str();

    // Candidate gate: a near title needs a second signal
    if !exact_title && (title < TITLE_GATE || !(author || year)) {
        return None;
    }

    let mut score = title * TITLE_WEIGHT
        + if author { AUTHOR_WEIGHT } else { 0.0 }
        + if year { YEAR_WEIGHT } else { 0.0 };
    if exact_title {
        score = score.max(EXACT_TITLE_FLOOR);
    }

    Some(Scored {
        candidate,
        score,
        exact_title,
    })
}

/// Applies the confidence and ambiguity gates to candidates ranked best first.
///
/// An exact title beats every near title, whatever their scores; the ambiguity gate
/// then only runs between exact-title ties.
fn select<'a>(ranked: &[Scored<'a>], config: &FuzzyConfig) -> FuzzyVerdict<'a> {
    let exact: Vec<Scored<'a>> = ranked.iter().filter(|s| s.exact_title).copied().collect();
    let ranked = if exact.is_empty() { ranked } else { exact.as_slice() };

    match ranked {
        [] => FuzzyVerdict::NoCandidate,
        [top, ..] if top.score < config.confidence_threshold => {
            FuzzyVerdict::BelowThreshold(top.score)
        }
        [top, second, ..] if top.score - second.score <= config.ambiguity_delta => {
            FuzzyVerdict::Ambiguous {
                top: top.score,
                second: second.score,
            }
        }
        [top, ..] => FuzzyVerdict::Winner(*top),
    }
}

/// Title similarity of two normalized titles.
pub fn title_score(a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else if a.contains(b) || b.contains(a) {
        CONTAINMENT_SCORE
    } else {
        jaccard_like(a, b).max(bigram_dice(a, b))
    }
}

/// Shared whitespace tokens over the size of the larger token set.
pub fn jaccard_like(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let larger = a.len().max(b.len());
    if larger == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / larger as f64
}

/// Dice coefficient over character bigrams, ignoring accents, case and whitespace.
///
/// A string shorter than two characters counts as a single bigram of itself.
pub fn bigram_dice(a: &str, b: &str) -> f64 {
    let a = bigrams(a);
    let b = bigrams(b);

    // Multiset intersection: each bigram of `a` matches at most once
    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for bigram in &a {
        *remaining.entry(bigram.as_str()).or_default() += 1;
    }
    let common = b
        .iter()
        .filter(|bigram| match remaining.get_mut(bigram.as_str()) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        })
        .count();

    (2 * common) as f64 / (a.len() + b.len()) as f64
}

fn bigrams(s: &str) -> Vec<String> {
    let chars: Vec<char> = strip_diacritics(s)
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    // Too short for a pair: the whole string is its only bigram
    if chars.len() < 2 {
        return vec![chars.into_iter().collect()];
    }
    chars.windows(2).map(|pair| pair.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Authors;
    use crate::candidate::{CandidateRecord, RecordHandle};
    use pretty_assertions::assert_eq;
    use rstest::*;

    const DETR: &str = "Conditional DETR for Fast Training Convergence";

    fn candidate(handle: &str, title: &str, date: &str, creators: &[&str]) -> Candidate {
        Candidate::from(CandidateRecord {
            handle: RecordHandle::from(handle),
            title: title.to_string(),
            date: date.to_string(),
            creators: creators.iter().map(|c| c.to_string()).collect(),
            citekey: format!("{}-key", handle.to_lowercase()),
        })
    }

    fn reference() -> ReferenceEntry {
        ReferenceEntry {
            title: DETR.to_string(),
            author: Authors::Many(vec!["John Meng".to_string()]),
            year: "2021".to_string(),
            ..Default::default()
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[rstest]
    #[case("deep learning", "deep learning", 1.0)]
    #[case("deep learning", "deep learning for vision", 0.95)]
    #[case("a b c d", "a b c e", 0.75)]
    fn test_title_score(#[case] a: &str, #[case] b: &str, #[case] expected: f64) {
        assert!(approx(title_score(a, b), expected));
    }

    #[test]
    fn test_jaccard_like() {
        assert!(approx(jaccard_like("a b c", "a b"), 2.0 / 3.0));
        assert!(approx(jaccard_like("a a b", "a b"), 1.0));
        assert_eq!(jaccard_like("", ""), 0.0);
    }

    #[rstest]
    #[case("night", "nacht", 0.25)]
    #[case("Über", "uber", 1.0)]
    #[case("a", "a", 1.0)]
    #[case("a", "ab", 0.0)]
    #[case("aaaa", "aa", 0.5)]
    fn test_bigram_dice(#[case] a: &str, #[case] b: &str, #[case] expected: f64) {
        assert!(
            approx(bigram_dice(a, b), expected),
            "{a} / {b}: {}",
            bigram_dice(a, b)
        );
    }

    #[test]
    fn test_exact_title_floor() {
        let exact = candidate("A", DETR, "", &["Nobody"]);
        let scored = FuzzyMatcher::new().score(&reference(), &exact).unwrap();
        assert!(scored.exact_title);
        assert!(approx(scored.score, 0.98));
    }

    #[test]
    fn test_candidate_gate_requires_author_or_year() {
        let matcher = FuzzyMatcher::new();
        let near = "Conditional DETR for Faster Training Convergence";

        let wrong_year = candidate("B", near, "1999", &["Other"]);
        assert_eq!(matcher.score(&reference(), &wrong_year), None);

        let right_year = candidate("B", near, "2021", &["Other"]);
        let with_year = matcher.score(&reference(), &right_year).unwrap();
        assert!(!with_year.exact_title);
        assert!(with_year.score > 0.9 * TITLE_WEIGHT);
    }

    #[test]
    fn test_candidate_gate_requires_title_similarity() {
        let unrelated = candidate("C", "Mask R-CNN", "2021", &["Meng"]);
        assert_eq!(FuzzyMatcher::new().score(&reference(), &unrelated), None);
    }

    #[test]
    fn test_empty_titles_never_score() {
        let untitled = candidate("D", "", "2021", &["Meng"]);
        assert_eq!(FuzzyMatcher::new().score(&reference(), &untitled), None);

        let entry = ReferenceEntry {
            title: "?!".to_string(),
            ..reference()
        };
        let candidates = vec![candidate("E", "!?", "2021", &["Meng"])];
        assert_eq!(
            FuzzyMatcher::new().best_match(&entry, &candidates),
            FuzzyVerdict::NoCandidate
        );
    }

    #[test]
    fn test_exact_title_wins_over_near_title() {
        let candidates = vec![
            candidate("NEAR", "Conditional DETR for Faster Training Convergence", "2021", &["Other"]),
            candidate("EXACT", DETR, "2021", &["Meng"]),
        ];
        match FuzzyMatcher::new().best_match(&reference(), &candidates) {
            FuzzyVerdict::Winner(scored) => {
                assert_eq!(scored.candidate.handle, RecordHandle::from("EXACT"));
                assert!(scored.score >= 0.98);
            }
            other => panic!("expected a winner, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_title_beats_close_containment_match() {
        // the near title agrees on author and year: 0.95 * 0.82 + 0.13 + 0.05 = 0.959
        let candidates = vec![
            candidate("NEAR", &format!("{DETR} Revisited"), "2021", &["Meng"]),
            candidate("EXACT", DETR, "2021", &["Someone"]),
        ];
        match FuzzyMatcher::new().best_match(&reference(), &candidates) {
            FuzzyVerdict::Winner(scored) => {
                assert_eq!(scored.candidate.handle, RecordHandle::from("EXACT"));
                assert!(approx(scored.score, 0.98));
            }
            other => panic!("expected a winner, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_title_beats_higher_scoring_near_title() {
        let a = candidate("NEAR", "x", "", &[]);
        let b = candidate("EXACT", "y", "", &[]);
        let ranked = [
            Scored { candidate: &a, score: 0.99, exact_title: false },
            Scored { candidate: &b, score: 0.98, exact_title: true },
        ];
        assert!(matches!(
            select(&ranked, &FuzzyConfig::default()),
            FuzzyVerdict::Winner(scored) if scored.candidate.handle == RecordHandle::from("EXACT")
        ));
    }

    #[test]
    fn test_identical_candidates_are_ambiguous() {
        let candidates = vec![
            candidate("A", DETR, "2021", &["Meng"]),
            candidate("B", DETR, "2021", &["Meng"]),
        ];
        assert!(matches!(
            FuzzyMatcher::new().best_match(&reference(), &candidates),
            FuzzyVerdict::Ambiguous { .. }
        ));
    }

    #[test]
    fn test_select_rejects_close_runner_up() {
        let a = candidate("A", "x", "", &[]);
        let b = candidate("B", "y", "", &[]);
        let ranked = [
            Scored { candidate: &a, score: 0.95, exact_title: false },
            Scored { candidate: &b, score: 0.93, exact_title: false },
        ];
        assert_eq!(
            select(&ranked, &FuzzyConfig::default()),
            FuzzyVerdict::Ambiguous { top: 0.95, second: 0.93 }
        );
    }

    #[rstest]
    #[case(0.99, Some(0.90), true)]
    #[case(0.99, None, true)]
    #[case(0.92, None, false)]
    #[case(0.93, None, true)]
    fn test_select_gates(#[case] top: f64, #[case] second: Option<f64>, #[case] wins: bool) {
        let a = candidate("A", "x", "", &[]);
        let b = candidate("B", "y", "", &[]);
        let mut ranked = vec![Scored { candidate: &a, score: top, exact_title: false }];
        if let Some(score) = second {
            ranked.push(Scored { candidate: &b, score, exact_title: false });
        }
        let verdict = select(&ranked, &FuzzyConfig::default());
        assert_eq!(matches!(verdict, FuzzyVerdict::Winner(_)), wins, "{verdict:?}");
    }

    #[test]
    fn test_below_threshold_reports_top_score() {
        let candidates = vec![candidate(
            "NEAR",
            "Conditional DETR for Faster Training Convergence",
            "2021",
            &["Other"],
        )];
        assert!(matches!(
            FuzzyMatcher::new().best_match(&reference(), &candidates),
            FuzzyVerdict::BelowThreshold(score) if score < DEFAULT_CONFIDENCE_THRESHOLD
        ));
    }

    #[test]
    fn test_parallel_scoring_matches_sequential() {
        let candidates: Vec<Candidate> = (0..64)
            .map(|i| {
                let title = if i % 7 == 0 { DETR.to_string() } else { format!("{DETR} part {i}") };
                candidate(&format!("K{i}"), &title, "2021", &["Meng"])
            })
            .collect();
        let sequential = FuzzyMatcher::new().best_match(&reference(), &candidates);
        let parallel = FuzzyMatcher::new()
            .with_config(FuzzyConfig {
                run_in_parallel: true,
                ..Default::default()
            })
            .best_match(&reference(), &candidates);
        assert_eq!(sequential, parallel);
    }
}
