//! One end-to-end resolution pass over the selected note.
//!
//! A pass:
//!
//! 1. requires exactly one selected note and decodes its payload block
//! 2. gathers one candidate snapshot from the configured source
//! 3. resolves every reference entry against the snapshot
//! 4. writes the rewritten reference list and table back into the note
//! 5. links every matched library record as related to the note's parent
//!
//! Every read and every computation happens before the first write, so a failing pass
//! leaves the host untouched.
//!
//! # Example
//!
//! ```no_run
//! use citebind::pass::{NoteStore, RelationStore, ReferencePass};
//! use citebind::source::library::ItemStore;
//! use citebind::TemplateCache;
//! use serde_json::json;
//!
//! async fn run(
//!     notes: &dyn NoteStore,
//!     items: &dyn ItemStore,
//!     relations: &dyn RelationStore,
//! ) -> citebind::Result<()> {
//!     let templates = TemplateCache::new();
//!     let pass = ReferencePass::from_params(&json!({"citekey_template": "auth + year"}), &templates)?;
//!     let summary = pass.run_with_store(notes, items, relations).await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

use crate::candidate::{Candidate, RecordHandle};
use crate::config::PassConfig;
use crate::payload;
use crate::resolver::{Resolution, Resolver};
use crate::source::library::ItemStore;
use crate::source::{CandidateSource, candidate_source};
use crate::template::TemplateCache;
use crate::{CitekeyError, ReferenceEntry, Result};
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Key of a host record (a note or a library item).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub String);

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        RecordKey(value.to_string())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A note holding a reference payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub key: RecordKey,
    /// Record the note is attached to, if any
    pub parent: Option<RecordKey>,
    pub body: String,
}

/// Host notes.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Keys of the notes currently selected by the user.
    async fn selected_notes(&self) -> Result<Vec<RecordKey>>;

    async fn load_note(&self, key: &RecordKey) -> Result<Note>;

    async fn save_note(&self, key: &RecordKey, body: &str) -> Result<()>;
}

/// Host "related item" links.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Maps a candidate handle to the host record it denotes.
    async fn resolve_record(&self, handle: &RecordHandle) -> Result<Option<RecordKey>>;

    /// Records already related to `target`.
    async fn related_keys(&self, target: &RecordKey) -> Result<Vec<RecordKey>>;

    /// Relates `keys` to `target`. Relating an already related record is a no-op.
    async fn add_related(&self, target: &RecordKey, keys: &[RecordKey]) -> Result<()>;
}

/// Counts reported at the end of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Entries whose citekey changed
    pub updated: usize,
    /// Entries bound to a library record
    pub matched: usize,
    pub total: usize,
    pub related_added: usize,
    pub related_existing: usize,
    /// Matched records the host could not resolve
    pub related_skipped: usize,
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} references matched, {} updated; related records: {} added, {} existing, {} skipped",
            self.matched,
            self.total,
            self.updated,
            self.related_added,
            self.related_existing,
            self.related_skipped
        )
    }
}

/// Relation changes computed before anything is written.
#[derive(Debug, Default)]
struct RelationPlan {
    target: RecordKey,
    to_add: Vec<RecordKey>,
    existing: usize,
    skipped: usize,
}

/// A configured resolution pass.
#[derive(Debug, Clone)]
pub struct ReferencePass {
    config: PassConfig,
    resolver: Resolver,
}

impl ReferencePass {
    /// Creates a pass; the template is taken from `templates`.
    pub fn new(config: PassConfig, templates: &TemplateCache) -> Self {
        let resolver = Resolver::new()
            .with_template(config.template(templates))
            .with_fuzzy_config(config.fuzzy_config());
        Self { config, resolver }
    }

    /// Creates a pass from the host's parameter bag.
    ///
    /// # Errors
    ///
    /// Returns `CitekeyError::Config` for an invalid bag; see [`PassConfig::from_params`].
    pub fn from_params(params: &serde_json::Value, templates: &TemplateCache) -> Result<Self> {
        Ok(Self::new(PassConfig::from_params(params)?, templates))
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Runs the pass with the source selected by the configuration.
    pub async fn run_with_store(
        &self,
        notes: &dyn NoteStore,
        items: &dyn ItemStore,
        relations: &dyn RelationStore,
    ) -> Result<PassSummary> {
        let source = candidate_source(&self.config, items)?;
        self.run(notes, source.as_ref(), relations).await
    }

    /// Runs the pass.
    ///
    /// # Errors
    ///
    /// Any error aborts the pass and leaves the host unmodified. Failing to add relations
    /// is not an error: the records are reported as skipped.
    ///
    /// Fatal errors:
    ///
    /// - `CitekeyError::Selection` unless exactly one note is selected
    /// - `CitekeyError::PayloadMissing` / `CitekeyError::Payload` for a bad note
    /// - source errors (`Transport`, `RpcStatus`, `Rpc`, `RpcShape`, `Store`)
    pub async fn run(
        &self,
        notes: &dyn NoteStore,
        source: &dyn CandidateSource,
        relations: &dyn RelationStore,
    ) -> Result<PassSummary> {
        let selected = notes.selected_notes().await?;
        let key = match selected.as_slice() {
            [key] => key.clone(),
            other => return Err(CitekeyError::Selection(other.len())),
        };

        let note = notes.load_note(&key).await?;
        let references = payload::decode(&note.body)?.references;
        debug!(note = %key, references = references.len(), "decoded reference payload");

        let records = source.gather().await?;
        debug!(source = source.name(), records = records.len(), "gathered candidates");
        let candidates = Candidate::from_records(records);

        let resolutions = self.resolver.resolve_all(&references, &candidates);
        let plan = plan_relations(&note, &resolutions, relations).await?;

        let mut summary = PassSummary {
            updated: resolutions
                .iter()
                .zip(&references)
                .filter(|(resolution, original)| resolution.entry.citekey != original.citekey)
                .count(),
            matched: resolutions.iter().filter(|r| r.outcome.is_bound()).count(),
            total: references.len(),
            related_added: plan.to_add.len(),
            related_existing: plan.existing,
            related_skipped: plan.skipped,
        };

        let entries: Vec<ReferenceEntry> = resolutions.into_iter().map(|r| r.entry).collect();
        let body = payload::rewrite(&note.body, &entries)?;

        if body != note.body {
            notes.save_note(&key, &body).await?;
        }
        // the note is already written; a relation failure must not fail the pass
        if !plan.to_add.is_empty() {
            if let Err(error) = relations.add_related(&plan.target, &plan.to_add).await {
                warn!(
                    note = %key,
                    target = %plan.target,
                    records = plan.to_add.len(),
                    %error,
                    "could not relate matched records, counted as skipped"
                );
                summary.related_skipped += summary.related_added;
                summary.related_added = 0;
            }
        }

        info!(
            note = %key,
            matched = summary.matched,
            total = summary.total,
            updated = summary.updated,
            related_added = summary.related_added,
            related_existing = summary.related_existing,
            related_skipped = summary.related_skipped,
            "reference pass finished"
        );
        Ok(summary)
    }
}

/// Works out which matched records still need relating to the note's target.
async fn plan_relations(
    note: &Note,
    resolutions: &[Resolution<'_>],
    relations: &dyn RelationStore,
) -> Result<RelationPlan> {
    let target = note.parent.clone().unwrap_or_else(|| note.key.clone());
    let mut plan = RelationPlan {
        target,
        ..Default::default()
    };

    let handles: Vec<&RecordHandle> = resolutions
        .iter()
        .filter_map(|resolution| resolution.outcome.candidate())
        .map(|candidate| &candidate.handle)
        .unique()
        .collect();
    if handles.is_empty() {
        return Ok(plan);
    }

    let mut related: HashSet<RecordKey> = relations
        .related_keys(&plan.target)
        .await?
        .into_iter()
        .collect();

    for handle in handles {
        match relations.resolve_record(handle).await? {
            Some(key) if key == plan.target => plan.skipped += 1,
            Some(key) if related.contains(&key) => plan.existing += 1,
            Some(key) => {
                related.insert(key.clone());
                plan.to_add.push(key);
            }
            None => {
                debug!(%handle, "matched record not found in host, not related");
                plan.skipped += 1;
            }
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_summary_display() {
        let mut summary = PassSummary {
            updated: 2,
            matched: 3,
            total: 4,
            related_added: 1,
            related_existing: 2,
            related_skipped: 0,
        };
        assert_eq!(
            summary.to_string(),
            "3 of 4 references matched, 2 updated; related records: 1 added, 2 existing, 0 skipped"
        );
    }

    #[test]
    fn test_pass_uses_configured_template() {
        let templates = TemplateCache::new();
        let pass = ReferencePass::from_params(
            &serde_json::json!({"citekey_template": "auth + year", "confidence_threshold": 0.5}),
            &templates,
        )
        .unwrap();
        assert_eq!(pass.resolver().template().source(), "auth + year");
        assert_eq!(pass.config().confidence_threshold, 0.5);
        assert_eq!(templates.len(), 1);
    }
}
