//! Library candidates considered as matches for reference entries.

use crate::normalize::{author_surname, extract_year, normalize_text};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque reference to one library record (an item key or a service item id).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordHandle(pub String);

impl From<&str> for RecordHandle {
    fn from(value: &str) -> Self {
        RecordHandle(value.to_string())
    }
}

impl From<String> for RecordHandle {
    fn from(value: String) -> Self {
        RecordHandle(value)
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of a library snapshot, as delivered by a candidate source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub handle: RecordHandle,
    pub title: String,
    /// Free-form date or year
    pub date: String,
    /// Creator surnames (or full names when the source has no split)
    pub creators: Vec<String>,
    /// Citekey held by the record, empty if none
    pub citekey: String,
}

/// A library record prepared for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub handle: RecordHandle,
    pub title: String,
    pub normalized_title: String,
    /// Four-digit year, empty if the record has none
    pub year: CompactString,
    /// Normalized creator surnames
    pub authors: BTreeSet<CompactString>,
    pub citekey: String,
}

impl From<CandidateRecord> for Candidate {
    fn from(record: CandidateRecord) -> Self {
        let authors = record
            .creators
            .iter()
            .map(|creator| author_surname(creator))
            .filter(|surname| !surname.is_empty())
            .map(CompactString::from)
            .collect();

        Candidate {
            normalized_title: normalize_text(&record.title),
            year: CompactString::from(extract_year(&record.date)),
            authors,
            citekey: record.citekey.trim().to_string(),
            title: record.title,
            handle: record.handle,
        }
    }
}

impl Candidate {
    /// Prepares a whole snapshot, keeping snapshot order.
    pub fn from_records(records: Vec<CandidateRecord>) -> Vec<Candidate> {
        records.into_iter().map(Candidate::from).collect()
    }

    pub fn has_citekey(&self) -> bool {
        !self.citekey.is_empty()
    }
}
