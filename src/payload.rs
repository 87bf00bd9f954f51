//! The reference list embedded in a note.
//!
//! A note carries its reference list as JSON inside a marked `<pre>` block:
//!
//! ```html
//! <pre data-citekey-refs="base64">W3sidGl0bGUiOiAiLi4uIn1d</pre>
//! <pre data-citekey-refs="json">[{"title": "..."}]</pre>
//! ```
//!
//! The JSON is either an array of entries or an object with a `references` array. Plain
//! blocks are HTML-unescaped before parsing. Writing always produces the base64 form
//! holding a bare array, followed by a rendered table of the entries.

use crate::regex::Regex;
use crate::table::{TABLE_ATTRIBUTE, render_table};
use crate::{CitekeyError, ReferenceEntry, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::sync::LazyLock;

/// Attribute marking the payload block.
pub const PAYLOAD_ATTRIBUTE: &str = "data-citekey-refs";

static PAYLOAD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?is)<pre\b[^>]*\b{PAYLOAD_ATTRIBUTE}\s*=\s*["']?(base64|json)["']?[^>]*>(.*?)</pre\s*>"#
    ))
    .unwrap()
});

static TABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)<table\b[^>]*\b{TABLE_ATTRIBUTE}\b[^>]*>.*?</table\s*>"
    ))
    .unwrap()
});

/// How a payload block was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Base64,
    Plain,
}

/// A decoded payload block.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub references: Vec<ReferenceEntry>,
    pub encoding: PayloadEncoding,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadDocument {
    List(Vec<ReferenceEntry>),
    Wrapped { references: Vec<ReferenceEntry> },
}

/// Finds and decodes the payload block of `body`.
///
/// # Errors
///
/// - `CitekeyError::PayloadMissing` if the note has no payload block
/// - `CitekeyError::Payload` if the block is not valid base64, UTF-8 or a reference list
pub fn decode(body: &str) -> Result<Payload> {
    let captures = PAYLOAD_REGEX
        .captures(body)
        .ok_or(CitekeyError::PayloadMissing)?;
    let content = captures.get(2).map_or("", |m| m.as_str());

    let (encoding, json) = if captures[1].eq_ignore_ascii_case("base64") {
        // Editors may wrap long base64 lines
        let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD.decode(compact)?;
        let json = String::from_utf8(bytes)
            .map_err(|e| CitekeyError::Payload(format!("payload is not UTF-8: {e}")))?;
        (PayloadEncoding::Base64, json)
    } else {
        let json = quick_xml::escape::unescape(content.trim())?.into_owned();
        (PayloadEncoding::Plain, json)
    };

    let references = match serde_json::from_str::<PayloadDocument>(&json) {
        Ok(PayloadDocument::List(references)) => references,
        Ok(PayloadDocument::Wrapped { references }) => references,
        Err(e) => {
            return Err(CitekeyError::Payload(format!(
                "expected a reference list: {e}"
            )));
        }
    };

    Ok(Payload {
        references,
        encoding,
    })
}

/// Encodes `references` as a base64 payload block.
pub fn encode(references: &[ReferenceEntry]) -> Result<String> {
    let json = serde_json::to_vec(references)?;
    Ok(format!(
        r#"<pre {PAYLOAD_ATTRIBUTE}="base64">{}</pre>"#,
        STANDARD.encode(json)
    ))
}

/// Replaces the payload block of `body` with `references`, and the rendered table.
///
/// An existing table is replaced; otherwise the table is inserted just before the
/// payload block. Everything else in the note is kept as is.
///
/// # Errors
///
/// Returns `CitekeyError::PayloadMissing` if `body` has no payload block.
pub fn rewrite(body: &str, references: &[ReferenceEntry]) -> Result<String> {
    let block = PAYLOAD_REGEX
        .find(body)
        .ok_or(CitekeyError::PayloadMissing)?;
    let (start, end) = (block.start(), block.end());

    let payload = encode(references)?;
    let table = render_table(references)?;

    let mut output = String::with_capacity(body.len() + payload.len() + table.len());
    match TABLE_REGEX.find(body) {
        // Existing table above the payload
        Some(old) if old.end() <= start => {
            output.push_str(&body[..old.start()]);
            output.push_str(&table);
            output.push_str(&body[old.end()..start]);
            output.push_str(&payload);
            output.push_str(&body[end..]);
        }
        // Existing table below the payload
        Some(old) if old.start() >= end => {
            output.push_str(&body[..start]);
            output.push_str(&payload);
            output.push_str(&body[end..old.start()]);
            output.push_str(&table);
            output.push_str(&body[old.end()..]);
        }
        // No table yet (or one overlapping the payload): put a fresh one above it
        _ => {
            output.push_str(&body[..start]);
            output.push_str(&table);
            output.push_str(&payload);
            output.push_str(&body[end..]);
        }
    }
    Ok(output)
}
