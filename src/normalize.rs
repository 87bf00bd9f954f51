//! String normalization shared by the template evaluator, the index and the matcher.
//!
//! All functions are pure. Text is folded by Unicode compatibility decomposition (NFKD)
//! followed by removal of combining marks, so `"Müller"` and `"Muller"` compare equal.

use crate::regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static YEAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"1[6-9]\d{2}|20\d{2}|21\d{2}").unwrap());

static AUTHOR_SEPARATOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+|;").unwrap());

/// English words dropped by `skipwords` and by the legacy `{title}` placeholder.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "against", "along", "among", "an", "and",
    "around", "as", "at", "before", "behind", "below", "beneath", "beside", "between",
    "beyond", "but", "by", "down", "during", "for", "from", "in", "inside", "into", "is",
    "like", "near", "nor", "of", "off", "on", "onto", "or", "over", "past", "per", "since",
    "so", "than", "the", "through", "to", "toward", "towards", "under", "until", "up",
    "upon", "versus", "via", "while", "with", "within", "without", "yet",
];

/// Returns true if `word` (already lowercased) is an English stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Decomposes `s` and drops combining marks, leaving case untouched.
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Accent-stripped, lowercased, with `&` spelled out.
fn fold(s: &str) -> String {
    strip_diacritics(s).to_lowercase().replace('&', " and ")
}

/// Joins the `[a-z0-9]` runs of `s` with `separator`.
///
/// Any run of other characters becomes a single separator, and no separator is
/// emitted at either end.
fn join_alnum_runs(s: &str, separator: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut pending = false;
    for c in s.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending && !result.is_empty() {
                result.push_str(separator);
            }
            pending = false;
            result.push(c);
        } else {
            pending = true;
        }
    }
    result
}

/// Normalizes text for title and author comparison.
///
/// # Arguments
///
/// * `s` - The text to normalize
///
/// # Examples
///
/// ```
/// use citebind::normalize::normalize_text;
/// assert_eq!(normalize_text("  Déjà Vu & DAB-DETR! "), "deja vu and dab detr");
/// ```
pub fn normalize_text(s: &str) -> String {
    join_alnum_runs(&fold(s), " ")
}

/// Finds the first plausible publication year (1600-2199) anywhere in `s`.
///
/// Returns an empty string when there is none.
pub fn extract_year(s: &str) -> String {
    YEAR_REGEX
        .find(s)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Normalizes one legacy-template token; runs of other characters become `-`.
///
/// Hyphens present in the source survive as separators, so `"DAB-DETR:"` becomes
/// `"dab-detr"`.
pub fn normalize_citekey_token(s: &str) -> String {
    join_alnum_runs(&fold(s), "-")
}

/// Normalizes a citekey for index lookup: only `[a-z0-9]` remains.
pub fn normalize_citekey_lookup_key(s: &str) -> String {
    let folded = fold(s).replace(['_', '-'], "");
    join_alnum_runs(&folded, "")
}

/// Final pass over an evaluated template.
///
/// Maps everything outside `[a-z0-9_-]` to `-`, collapses repeated `-` and `_`, and
/// trims both from the ends.
pub fn normalize_predicted_citekey(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in strip_diacritics(s).to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        if (c == '-' || c == '_') && result.ends_with(c) {
            continue;
        }
        result.push(c);
    }
    result.trim_matches(['-', '_']).to_string()
}

/// Splits a free-form author list on `;`, the word `and`, and commas between full names.
///
/// A comma only separates authors when every comma-separated part has at least two words,
/// so `"A. Vaswani, N. Shazeer"` is two authors but `"Vaswani, A."` is one.
pub fn split_authors(s: &str) -> impl Iterator<Item = &str> {
    AUTHOR_SEPARATOR_REGEX
        .split(s)
        .flat_map(split_name_list)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn split_name_list(group: &str) -> Vec<&str> {
    let parts: Vec<&str> = group
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() > 1 && parts.iter().all(|part| part.split_whitespace().nth(1).is_some()) {
        parts
    } else {
        vec![group]
    }
}

/// The family-name part of `name`: the text before the comma of a `"Last, First"` name,
/// otherwise the whole name.
pub fn family_name(name: &str) -> &str {
    name.split_once(',')
        .map_or(name, |(last, _)| last)
        .trim()
}

/// Surname used for comparison: the last token of the normalized family name.
pub fn author_surname(name: &str) -> String {
    normalize_text(family_name(name))
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string()
}
