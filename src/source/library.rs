//! Candidate source scanning the host's own item store.
//!
//! Only live, top-level, bibliographic items become candidates: notes, attachments,
//! annotations, child items and trashed items are skipped. An item's citekey is its
//! `citation_key` field or, failing that, a `Citation Key: ...` line in its `extra`
//! field.
//!
//! When the host cannot enumerate its items, the source walks item ids upwards from 1
//! and stops after a streak of consecutive missing ids. That fallback can miss items
//! behind a longer gap and is logged as degraded.

use crate::Result;
use crate::candidate::{CandidateRecord, RecordHandle};
use crate::regex::Regex;
use crate::source::CandidateSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Consecutive missing ids after which id probing stops.
pub const DEFAULT_MISS_STREAK: usize = 50;

static EXTRA_CITEKEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*citation key\s*:\s*(\S+)\s*$").unwrap());

/// Kind of a host library item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A bibliographic record
    #[default]
    Regular,
    Note,
    Attachment,
    Annotation,
}

/// One creator of a host item, either split into first/last name or as a single name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub first_name: String,
    /// Single-field name (institutions)
    #[serde(default)]
    pub name: String,
}

impl Creator {
    /// Last name, or the single-field name when there is none.
    pub fn surname(&self) -> Option<&str> {
        [&self.last_name, &self.name]
            .into_iter()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
    }
}

/// An item as exposed by the host's item store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: u64,
    pub key: String,
    #[serde(default)]
    pub kind: ItemKind,
    /// Key of the parent item, for child items
    #[serde(default)]
    pub parent_key: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub citation_key: Option<String>,
    #[serde(default)]
    pub extra: String,
}

impl LibraryItem {
    /// Live, top-level and bibliographic.
    pub fn is_candidate(&self) -> bool {
        self.kind == ItemKind::Regular && !self.deleted && self.parent_key.is_none()
    }

    /// Citekey from the dedicated field, else from the `extra` field.
    pub fn citekey(&self) -> Option<&str> {
        self.citation_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .or_else(|| {
                EXTRA_CITEKEY_REGEX
                    .captures(&self.extra)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str())
            })
    }

    pub fn to_record(&self) -> CandidateRecord {
        CandidateRecord {
            handle: RecordHandle(self.key.clone()),
            title: self.title.clone(),
            date: self.date.clone(),
            creators: self
                .creators
                .iter()
                .filter_map(Creator::surname)
                .map(str::to_string)
                .collect(),
            citekey: self.citekey().unwrap_or_default().to_string(),
        }
    }
}

/// Read access to the host's items.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Every item of the library, or `None` if the host cannot enumerate them.
    async fn all_items(&self) -> Result<Option<Vec<LibraryItem>>>;

    /// The item with numeric id `id`, if it exists.
    async fn item_by_id(&self, id: u64) -> Result<Option<LibraryItem>>;
}

/// Candidate source over an [`ItemStore`].
pub struct HostLibrarySource<'s> {
    store: &'s dyn ItemStore,
    miss_streak: usize,
}

impl<'s> HostLibrarySource<'s> {
    pub fn new(store: &'s dyn ItemStore) -> Self {
        Self {
            store,
            miss_streak: DEFAULT_MISS_STREAK,
        }
    }

    /// Sets how many consecutive missing ids end degraded id probing.
    #[must_use]
    pub fn with_miss_streak(mut self, miss_streak: usize) -> Self {
        self.miss_streak = miss_streak.max(1);
        self
    }

    async fn probe_items(&self) -> Result<Vec<LibraryItem>> {
        warn!(
            miss_streak = self.miss_streak,
            "item store cannot enumerate items, probing ids (degraded)"
        );
        let mut items = Vec::new();
        let mut misses = 0;
        let mut id = 1;
        while misses < self.miss_streak {
            match self.store.item_by_id(id).await? {
                Some(item) => {
                    misses = 0;
                    items.push(item);
                }
                None => misses += 1,
            }
            id += 1;
        }
        debug!(probed = id - 1, found = items.len(), "id probing finished");
        Ok(items)
    }
}

#[async_trait]
impl<'s> CandidateSource for HostLibrarySource<'s> {
    async fn gather(&self) -> Result<Vec<CandidateRecord>> {
        let items = match self.store.all_items().await? {
            Some(items) => items,
            None => self.probe_items().await?,
        };
        let records: Vec<CandidateRecord> = items
            .iter()
            .filter(|item| item.is_candidate())
            .map(LibraryItem::to_record)
            .collect();
        debug!(items = items.len(), candidates = records.len(), "scanned host library");
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "host-library"
    }
}
