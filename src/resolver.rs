//! Per-reference citekey resolution.
//!
//! Each reference entry goes through three stages, stopping at the first unique hit:
//!
//! 1. its own citekey, looked up in the [`CitekeyIndex`]
//! 2. the citekey predicted by the configured [`Template`], looked up the same way
//! 3. the [`FuzzyMatcher`] over the whole snapshot
//!
//! A collision in the index is no hit and falls through to the next stage. An entry
//! that no stage binds has its citekey cleared.

use crate::ReferenceEntry;
use crate::candidate::Candidate;
use crate::fuzzy::{FuzzyConfig, FuzzyMatcher, FuzzyVerdict};
use crate::index::{CitekeyIndex, IndexHit};
use crate::template::Template;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Stage that bound a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStage {
    Explicit,
    Predicted,
    Fuzzy,
}

impl fmt::Display for MatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchStage::Explicit => "explicit",
            MatchStage::Predicted => "predicted",
            MatchStage::Fuzzy => "fuzzy",
        })
    }
}

/// Whether a reference denotes a library candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome<'a> {
    Bound {
        candidate: &'a Candidate,
        stage: MatchStage,
        /// Fuzzy score, for fuzzy binds only
        score: Option<f64>,
    },
    Unbound,
}

impl<'a> MatchOutcome<'a> {
    pub fn candidate(&self) -> Option<&'a Candidate> {
        match self {
            MatchOutcome::Bound { candidate, .. } => Some(*candidate),
            MatchOutcome::Unbound => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, MatchOutcome::Bound { .. })
    }
}

/// The rewritten entry and how it was decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    /// Copy of the input with `citekey` set to the bound citekey, or removed
    pub entry: ReferenceEntry,
    pub outcome: MatchOutcome<'a>,
    /// Citekey predicted by the template, before lookup
    pub predicted_key: String,
}

/// Resolves reference entries against a candidate snapshot.
///
/// # Examples
///
/// ```
/// use citebind::candidate::{Candidate, CandidateRecord, RecordHandle};
/// use citebind::resolver::Resolver;
/// use citebind::{Authors, ReferenceEntry};
///
/// let candidates = Candidate::from_records(vec![CandidateRecord {
///     handle: RecordHandle::from("ITEM1"),
///     title: "Conditional DETR for Fast Training Convergence".to_string(),
///     date: "2021".to_string(),
///     creators: vec!["Meng".to_string()],
///     citekey: "meng_conditional-detr_2021".to_string(),
/// }]);
///
/// let entry = ReferenceEntry {
///     title: "Conditional DETR for fast training convergence".to_string(),
///     author: Authors::One("Depu Meng".to_string()),
///     year: "2021".to_string(),
///     ..Default::default()
/// };
///
/// let resolutions = Resolver::new().resolve_all(&[entry], &candidates);
/// assert_eq!(resolutions[0].outcome.candidate().unwrap().handle.0, "ITEM1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    template: Arc<Template>,
    matcher: FuzzyMatcher,
}

impl Resolver {
    /// Creates a resolver using the default template and fuzzy thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_template(mut self, template: Arc<Template>) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn with_fuzzy_config(mut self, config: FuzzyConfig) -> Self {
        self.matcher = self.matcher.with_config(config);
        self
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Resolves one entry.
    ///
    /// `index` must have been built from `candidates`.
    pub fn resolve<'a>(
        &self,
        entry: &ReferenceEntry,
        candidates: &'a [Candidate],
        index: &CitekeyIndex<'a>,
    ) -> Resolution<'a> {
        let predicted_key = self.template.predict(entry);

        let outcome = self
            .lookup_stage(entry, MatchStage::Explicit, entry.existing_citekey(), index)
            .or_else(|| {
                self.lookup_stage(entry, MatchStage::Predicted, Some(predicted_key.as_str()), index)
            })
            .unwrap_or_else(|| self.fuzzy_stage(entry, candidates));

        let mut entry = entry.clone();
        entry.citekey = outcome
            .candidate()
            .filter(|candidate| candidate.has_citekey())
            .map(|candidate| candidate.citekey.clone());

        Resolution {
            entry,
            outcome,
            predicted_key,
        }
    }

    /// Resolves every entry in input order against one snapshot.
    pub fn resolve_all<'a>(
        &self,
        entries: &[ReferenceEntry],
        candidates: &'a [Candidate],
    ) -> Vec<Resolution<'a>> {
        let index = CitekeyIndex::build(candidates);
        debug!(
            candidates = candidates.len(),
            keys = index.len(),
            collisions = index.collisions(),
            "built citekey index"
        );
        entries
            .iter()
            .map(|entry| self.resolve(entry, candidates, &index))
            .collect()
    }

    fn lookup_stage<'a>(
        &self,
        entry: &ReferenceEntry,
        stage: MatchStage,
        key: Option<&str>,
        index: &CitekeyIndex<'a>,
    ) -> Option<MatchOutcome<'a>> {
        let key = key?;
        match index.lookup(key) {
            IndexHit::Unique(candidate) => {
                debug!(reference = %entry.id, %stage, key, handle = %candidate.handle, "bound");
                Some(MatchOutcome::Bound {
                    candidate,
                    stage,
                    score: None,
                })
            }
            IndexHit::Collision(holders) => {
                debug!(reference = %entry.id, %stage, key, holders, "citekey collision, falling through");
                None
            }
            IndexHit::Miss => None,
        }
    }

    fn fuzzy_stage<'a>(&self, entry: &ReferenceEntry, candidates: &'a [Candidate]) -> MatchOutcome<'a> {
        match self.matcher.best_match(entry, candidates) {
            FuzzyVerdict::Winner(scored) => {
                debug!(
                    reference = %entry.id,
                    handle = %scored.candidate.handle,
                    score = scored.score,
                    exact_title = scored.exact_title,
                    "bound by fuzzy match"
                );
                MatchOutcome::Bound {
                    candidate: scored.candidate,
                    stage: MatchStage::Fuzzy,
                    score: Some(scored.score),
                }
            }
            FuzzyVerdict::NoCandidate => {
                debug!(reference = %entry.id, "no fuzzy candidate, citekey cleared");
                MatchOutcome::Unbound
            }
            FuzzyVerdict::BelowThreshold(score) => {
                debug!(reference = %entry.id, score, "best fuzzy score below threshold, citekey cleared");
                MatchOutcome::Unbound
            }
            FuzzyVerdict::Ambiguous { top, second } => {
                debug!(reference = %entry.id, top, second, "ambiguous fuzzy match, citekey cleared");
                MatchOutcome::Unbound
            }
        }
    }
}
