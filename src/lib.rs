//! Bind extracted bibliography entries to stable citekeys from an existing library.
//!
//! `citebind` takes a list of free-text reference entries (as extracted from a paper or a
//! note) and decides, for each entry, which record of the user's library it denotes. The
//! result is the same list with every entry either bound to the library record's citekey
//! or explicitly cleared.
//!
//! # Key Features
//!
//! - **Citekey templates**: a small formula language deriving a predicted citekey from
//!   an entry, in two dialects:
//!   - legacy placeholders such as `{author}_{title}_{year}`
//!   - method chains such as `auth.lower() + '_' + title.skipwords().select(1,2) + year`
//!
//! - **Staged resolution**:
//!   - explicit citekey lookup
//!   - predicted citekey lookup
//!   - weighted fuzzy matching on title, author and year with confidence and
//!     ambiguity gates
//!
//! - **Complete passes**: candidate gathering from the host library or an external
//!   JSON-RPC citekey service, the embedded payload codec and the HTML table renderer.
//!
//! # Basic Usage
//!
//! ```rust
//! use citebind::{ReferenceEntry, Authors};
//! use citebind::template::Template;
//!
//! let entry = ReferenceEntry {
//!     title: "Conditional DETR for Fast Training Convergence".to_string(),
//!     author: Authors::Many(vec!["John Meng".to_string()]),
//!     year: "2021".to_string(),
//!     ..Default::default()
//! };
//!
//! let template = Template::resolve(None);
//! assert_eq!(template.predict(&entry), "meng_conditional-detr_2021");
//! ```
//!
//! # Resolving Against a Library Snapshot
//!
//! ```rust
//! use citebind::candidate::{Candidate, CandidateRecord, RecordHandle};
//! use citebind::resolver::Resolver;
//! use citebind::ReferenceEntry;
//!
//! let candidates = vec![Candidate::from(CandidateRecord {
//!     handle: RecordHandle::from("ABCD1234"),
//!     title: "Attention Is All You Need".to_string(),
//!     date: "2017".to_string(),
//!     creators: vec!["Vaswani".to_string()],
//!     citekey: "vaswani2017attention".to_string(),
//! })];
//!
//! let entry = ReferenceEntry {
//!     title: "Attention is all you need".to_string(),
//!     ..Default::default()
//! };
//!
//! let resolutions = Resolver::new().resolve_all(&[entry], &candidates);
//! assert_eq!(resolutions[0].entry.citekey.as_deref(), Some("vaswani2017attention"));
//! ```
//!
//! # Error Handling
//!
//! Fatal conditions of a pass are reported through [`CitekeyError`] and the [`Result`]
//! alias. Recoverable conditions (an invalid template, a citekey collision, an entry no
//! candidate matches confidently) never surface as errors.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod candidate;
pub mod config;
pub mod fuzzy;
pub mod index;
pub mod normalize;
pub mod pass;
pub mod payload;
mod regex;
pub mod resolver;
pub mod source;
pub mod table;
pub mod template;

// Reexports
pub use config::{DataSource, PassConfig};
pub use pass::{PassSummary, ReferencePass};
pub use resolver::{MatchOutcome, Resolver};
pub use template::{Template, TemplateCache};

/// A specialized Result type for resolution passes.
pub type Result<T> = std::result::Result<T, CitekeyError>;

/// Fatal errors of a resolution pass.
#[derive(Error, Debug)]
pub enum CitekeyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Expected exactly one selected note, found {0}")]
    Selection(usize),

    #[error("Reference payload not found in note")]
    PayloadMissing,

    #[error("Invalid reference payload: {0}")]
    Payload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC service returned HTTP {status}: {body}")]
    RpcStatus { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected RPC response: {0}")]
    RpcShape(String),

    #[error("Data source unavailable: {0}")]
    Unsupported(String),

    #[error("Host store error: {0}")]
    Store(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl From<base64::DecodeError> for CitekeyError {
    fn from(err: base64::DecodeError) -> Self {
        CitekeyError::Payload(err.to_string())
    }
}

impl From<quick_xml::Error> for CitekeyError {
    fn from(err: quick_xml::Error) -> Self {
        CitekeyError::Render(err.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for CitekeyError {
    fn from(err: quick_xml::escape::EscapeError) -> Self {
        CitekeyError::Payload(err.to_string())
    }
}

#[cfg(feature = "rpc")]
impl From<reqwest::Error> for CitekeyError {
    fn from(err: reqwest::Error) -> Self {
        CitekeyError::Transport(err.to_string())
    }
}

/// Author field of a reference entry: either one free-form string or an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authors {
    One(String),
    Many(Vec<String>),
}

impl Default for Authors {
    fn default() -> Self {
        Authors::Many(Vec::new())
    }
}

impl Authors {
    /// Iterates over individual author names, in order.
    ///
    /// A single string is split on `;` and on the word `and`.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            Authors::One(s) => either::Left(normalize::split_authors(s)),
            Authors::Many(names) => either::Right(
                names
                    .iter()
                    .map(|name| name.trim())
                    .filter(|name| !name.is_empty()),
            ),
        }
    }

    /// The first non-empty author name.
    pub fn first(&self) -> Option<&str> {
        self.iter().next()
    }
}

/// Identifier of a reference entry, written back as the string or number it was read as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceId {
    Number(serde_json::Number),
    Text(String),
}

impl Default for ReferenceId {
    fn default() -> Self {
        ReferenceId::Text(String::new())
    }
}

impl From<&str> for ReferenceId {
    fn from(value: &str) -> Self {
        ReferenceId::Text(value.to_string())
    }
}

impl std::fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceId::Number(n) => write!(f, "{n}"),
            ReferenceId::Text(s) => f.write_str(s),
        }
    }
}

/// One bibliographic citation extracted from a document, pending resolution.
///
/// Extracted lists are sloppy: `null` is accepted for every field, and numbers for the
/// text fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: ReferenceId,
    /// Title of the cited work
    #[serde(default, deserialize_with = "string_or_number")]
    pub title: String,
    /// Free-form year (`"2021"`, `"2021a"`, `"in press"`...)
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "String::is_empty"
    )]
    pub year: String,
    /// Free-form date, consulted when `year` carries no year
    #[serde(
        default,
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,
    #[serde(default, alias = "authors", deserialize_with = "null_as_default")]
    pub author: Authors,
    /// The reference as it appeared in the source document
    #[serde(
        default,
        rename = "rawText",
        alias = "raw_text",
        deserialize_with = "string_or_number"
    )]
    pub raw_text: String,
    /// Citekey bound by a previous pass, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citekey: Option<String>,
    /// Fields this crate does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ReferenceEntry {
    /// The four-digit year of the entry, taken from `year` and falling back to `date`.
    pub fn year_text(&self) -> String {
        let year = normalize::extract_year(&self.year);
        if !year.is_empty() {
            return year;
        }
        self.date
            .as_deref()
            .map(normalize::extract_year)
            .unwrap_or_default()
    }

    /// The pre-existing citekey, if it carries any non-blank text.
    pub fn existing_citekey(&self) -> Option<&str> {
        self.citekey
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Accepts a JSON string, number, or null for a text field.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_string_or_number(deserializer)?.unwrap_or_default())
}

fn optional_string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!(
            "expected a string or a number, found {other}"
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_citekey_error_display() {
        let error = CitekeyError::Selection(3);
        assert_eq!(
            error.to_string(),
            "Expected exactly one selected note, found 3"
        );
    }

    #[test]
    fn test_authors_split_single_string() {
        let authors = Authors::One("John Meng; Jane Doe and Wei Zhang".to_string());
        assert_eq!(
            authors.iter().collect::<Vec<_>>(),
            vec!["John Meng", "Jane Doe", "Wei Zhang"]
        );
        assert_eq!(authors.first(), Some("John Meng"));
    }

    #[test]
    fn test_authors_skip_blank_names() {
        let authors = Authors::Many(vec!["  ".to_string(), " Ada Lovelace ".to_string()]);
        assert_eq!(authors.first(), Some("Ada Lovelace"));
        assert_eq!(Authors::default().first(), None);
    }

    #[test]
    fn test_reference_entry_deserialize_lenient_fields() {
        let entry: ReferenceEntry = serde_json::from_str(
            r#"{"id": 7, "title": "T", "year": 2021, "authors": "A B", "raw_text": "raw", "page": "1-2"}"#,
        )
        .unwrap();
        assert_eq!(entry.id.to_string(), "7");
        assert_eq!(entry.year, "2021");
        assert_eq!(entry.author, Authors::One("A B".to_string()));
        assert_eq!(entry.raw_text, "raw");
        assert_eq!(entry.extra.get("page"), Some(&serde_json::json!("1-2")));
        assert_eq!(entry.citekey, None);
    }

    #[test]
    fn test_reference_entry_accepts_nulls_and_numbers() {
        let entry: ReferenceEntry = serde_json::from_str(
            r#"{"id": null, "title": null, "author": null, "date": 2021, "rawText": null, "citekey": null}"#,
        )
        .unwrap();
        assert_eq!(entry.id, ReferenceId::default());
        assert_eq!(entry.title, "");
        assert_eq!(entry.author, Authors::default());
        assert_eq!(entry.date.as_deref(), Some("2021"));
        assert_eq!(entry.year_text(), "2021");

        let entry: ReferenceEntry = serde_json::from_str(r#"{"title": "T", "date": null}"#).unwrap();
        assert_eq!(entry.date, None);
    }

    #[test]
    fn test_reference_id_keeps_its_json_type() {
        let entries: Vec<ReferenceEntry> =
            serde_json::from_str(r#"[{"id": 7, "title": "A"}, {"id": "r8", "title": "B"}]"#).unwrap();
        let output = serde_json::to_value(&entries).unwrap();
        assert_eq!(output[0]["id"], serde_json::json!(7));
        assert_eq!(output[1]["id"], serde_json::json!("r8"));
    }

    #[test]
    fn test_reference_entry_round_trip_keeps_unknown_fields() {
        let input = r#"{"id":"r1","title":"T","author":["A"],"rawText":"x","citekey":"k","venue":"CVPR"}"#;
        let entry: ReferenceEntry = serde_json::from_str(input).unwrap();
        let output = serde_json::to_value(&entry).unwrap();
        assert_eq!(output["venue"], "CVPR");
        assert_eq!(output["citekey"], "k");
        assert_eq!(output["rawText"], "x");
    }

    #[test]
    fn test_year_text_falls_back_to_date() {
        let entry = ReferenceEntry {
            year: "n.d.".to_string(),
            date: Some("March 2019".to_string()),
            ..Default::default()
        };
        assert_eq!(entry.year_text(), "2019");
    }

    #[test]
    fn test_existing_citekey_ignores_blank() {
        let entry = ReferenceEntry {
            citekey: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(entry.existing_citekey(), None);
    }
}
