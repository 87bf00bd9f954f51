//! Citekey index over a candidate snapshot.
//!
//! Maps separator-insensitive citekeys to every candidate holding them, so that a
//! lookup can tell a unique hit from a collision.

use crate::candidate::Candidate;
use crate::normalize::normalize_citekey_lookup_key;
use compact_str::CompactString;
use std::collections::HashMap;

/// Result of looking a key up in the [`CitekeyIndex`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexHit<'a> {
    /// Exactly one candidate holds the key
    Unique(&'a Candidate),
    /// Several candidates hold the key; carries their count
    Collision(usize),
    Miss,
}

/// Normalized citekey → candidates holding it.
///
/// Built once per pass and never mutated afterwards.
#[derive(Debug, Default)]
pub struct CitekeyIndex<'a> {
    entries: HashMap<CompactString, Vec<&'a Candidate>>,
}

impl<'a> CitekeyIndex<'a> {
    /// Indexes every candidate with a non-empty citekey.
    pub fn build(candidates: &'a [Candidate]) -> Self {
        let mut entries: HashMap<CompactString, Vec<&'a Candidate>> = HashMap::new();
        for candidate in candidates {
            let key = normalize_citekey_lookup_key(&candidate.citekey);
            if key.is_empty() {
                continue;
            }
            entries.entry(key.into()).or_default().push(candidate);
        }
        Self { entries }
    }

    /// Looks up a raw citekey; normalization is applied here.
    pub fn lookup(&self, citekey: &str) -> IndexHit<'a> {
        let key = normalize_citekey_lookup_key(citekey);
        if key.is_empty() {
            return IndexHit::Miss;
        }
        match self.entries.get(key.as_str()).map(Vec::as_slice) {
            Some([candidate]) => IndexHit::Unique(*candidate),
            Some(holders) if holders.len() > 1 => IndexHit::Collision(holders.len()),
            _ => IndexHit::Miss,
        }
    }

    /// Number of distinct normalized keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys held by more than one candidate.
    pub fn collisions(&self) -> usize {
        self.entries
            .values()
            .filter(|holders| holders.len() > 1)
            .count()
    }
}
