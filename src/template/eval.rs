//! Template evaluation against one reference entry.

use crate::ReferenceEntry;
use crate::normalize::{
    author_surname, family_name, is_stop_word, normalize_citekey_token, strip_diacritics,
};
use crate::template::ast::{Call, Expression, LegacyPart, Object, Placeholder, Term};
use itertools::Itertools;
use thiserror::Error;

/// Number of title words the legacy `{title}` placeholder keeps.
const LEGACY_TITLE_WORDS: usize = 2;

/// A method application that cannot be performed on the value at hand.
///
/// Any such error discards the whole expression, not only the failing term.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("'{method}' needs a non-negative length, got {value}")]
    NegativeLength { method: &'static str, value: i64 },
}

/// Render a legacy template; missing values render as empty text.
pub(crate) fn evaluate_legacy(parts: &[LegacyPart], entry: &ReferenceEntry) -> String {
    parts
        .iter()
        .map(|part| match part {
            LegacyPart::Text(text) => text.clone(),
            LegacyPart::Placeholder(Placeholder::Author) => legacy_author(entry),
            LegacyPart::Placeholder(Placeholder::Title) => legacy_title(&entry.title),
            LegacyPart::Placeholder(Placeholder::Year) => entry.year_text(),
        })
        .collect()
}

fn legacy_author(entry: &ReferenceEntry) -> String {
    entry
        .author
        .first()
        .and_then(|name| family_name(name).split_whitespace().last())
        .map(normalize_citekey_token)
        .unwrap_or_default()
}

fn legacy_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(normalize_citekey_token)
        .filter(|word| !word.is_empty() && !is_stop_word(word))
        .take(LEGACY_TITLE_WORDS)
        .join("-")
}

/// Evaluate a chain-form expression.
pub(crate) fn evaluate_expression(
    expression: &Expression,
    entry: &ReferenceEntry,
) -> Result<String, EvalError> {
    let mut output = String::new();
    for term in &expression.terms {
        match term {
            Term::Literal(text) => output.push_str(text),
            Term::Chain { object, calls } => {
                let mut value = object_value(*object, entry);
                // One failing call discards the whole expression
                for call in calls {
                    value = apply(call, &value)?;
                }
                output.push_str(&value);
            }
        }
    }
    Ok(output)
}

fn object_value(object: Object, entry: &ReferenceEntry) -> String {
    match object {
        Object::Auth => entry.author.first().map(author_surname).unwrap_or_default(),
        Object::Title => entry.title.clone(),
        Object::Year => entry.year_text(),
    }
}

fn apply(call: &Call, value: &str) -> Result<String, EvalError> {
    let result = match call {
        Call::Lower => value.to_lowercase(),
        Call::Upper => value.to_uppercase(),
        Call::NoPunct => nopunct(value),
        Call::SkipWords => words(value)
            .into_iter()
            .filter(|word| !is_stop_word(word))
            .join(" "),
        Call::Select { start, count } => select(value, *start, *count),
        Call::Prefix(n) => {
            let n = length("prefix", *n)?;
            words(value).concat().chars().take(n).collect()
        }
        Call::Postfix(n) => {
            // Count from the end of the joined words, not of each word
            let n = length("postfix", *n)?;
            let joined: Vec<char> = words(value).concat().chars().collect();
            joined[joined.len().saturating_sub(n)..].iter().collect()
        }
        Call::Initials => words(value)
            .iter()
            .filter_map(|word| word.chars().next())
            .collect(),
        Call::Trim => value.trim().to_string(),
        // Replacing an empty string would interleave `to` between every character
        Call::Replace { from, .. } if from.is_empty() => value.to_string(),
        Call::Replace { from, to } => value.replace(from.as_str(), to),
        Call::Clean => words(value).join(" "),
        Call::Short => select(value, 1, 1),
    };
    Ok(result)
}

fn length(method: &'static str, value: i64) -> Result<usize, EvalError> {
    usize::try_from(value).map_err(|_| EvalError::NegativeLength { method, value })
}

/// Accent-stripped, `&` spelled out, only letters, digits and single spaces left.
fn nopunct(value: &str) -> String {
    strip_diacritics(value)
        .replace('&', " and ")
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}

/// Lowercased words of `nopunct(value)`.
fn words(value: &str) -> Vec<String> {
    nopunct(value)
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn select(value: &str, start: i64, count: i64) -> String {
    let words = words(value);
    // 1-indexed; out-of-range starts select nothing
    if start < 1 || count < 1 || start as usize > words.len() {
        return String::new();
    }
    let from = start as usize - 1;
    let to = from.saturating_add(count as usize).min(words.len());
    words[from..to].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Authors;
    use crate::template::parse::{compile, parse_chain, parse_legacy};
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn entry() -> ReferenceEntry {
        ReferenceEntry {
            title: "The Art & Craft of DAB-DETR: Über Anchors".to_string(),
            author: Authors::Many(vec!["José Álvarez-Núñez".to_string(), "Bo Li".to_string()]),
            year: "circa 2022".to_string(),
            ..Default::default()
        }
    }

    fn eval(template: &str) -> Result<String, EvalError> {
        evaluate_expression(&compile(&parse_chain(template).unwrap()).unwrap(), &entry())
    }

    #[rstest]
    #[case("auth", "nunez")]
    #[case("year", "2022")]
    #[case("title", "The Art & Craft of DAB-DETR: Über Anchors")]
    #[case("title.nopunct()", "The Art and Craft of DABDETR Uber Anchors")]
    #[case("title.skipwords()", "art craft dabdetr uber anchors")]
    #[case("title.clean()", "the art and craft of dabdetr uber anchors")]
    #[case("title.select(2)", "art")]
    #[case("title.select(2, 3)", "art and craft")]
    #[case("title.select(7, 5)", "uber anchors")]
    #[case("title.select(0)", "")]
    #[case("title.select(9)", "")]
    #[case("title.select(1, 0)", "")]
    #[case("title.short()", "the")]
    #[case("title.prefix(6)", "theart")]
    #[case("title.postfix(4)", "hors")]
    #[case("title.prefix(0)", "")]
    #[case("title.postfix(999)", "theartandcraftofdabdetruberanchors")]
    #[case("title.skipwords().initials()", "acdua")]
    #[case("title.abbr()", "taacodua")]
    #[case("year.replace('20', 'X')", "X22")]
    #[case("year.select(1)", "2022")]
    #[case("auth.upper() + '-' + year.postfix(2)", "NUNEZ-22")]
    #[case("'  x  ' + auth.trim()", "  x  nunez")]
    #[case("title.replace('', 'x').lower()", "the art & craft of dab-detr: über anchors")]
    fn test_evaluate_chain(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(eval(template).unwrap(), expected);
    }

    #[test]
    fn test_invalid_application_discards_whole_expression() {
        assert_eq!(
            eval("auth + '_' + title.prefix(-1)"),
            Err(EvalError::NegativeLength {
                method: "prefix",
                value: -1
            })
        );
    }

    #[test]
    fn test_evaluate_legacy() {
        let parts = parse_legacy("{author}_{title}_{year}").unwrap();
        assert_eq!(
            evaluate_legacy(&parts, &entry()),
            "alvarez-nunez_art-craft_2022"
        );
    }

    #[test]
    fn test_legacy_author_of_comma_separated_list() {
        let parts = parse_legacy("{author}").unwrap();
        for author in ["A. Vaswani, N. Shazeer", "Vaswani, A. and Shazeer, N."] {
            let entry = ReferenceEntry {
                author: Authors::One(author.to_string()),
                ..Default::default()
            };
            assert_eq!(evaluate_legacy(&parts, &entry), "vaswani", "{author}");
        }
    }

    #[test]
    fn test_legacy_keeps_source_hyphens() {
        let parts = parse_legacy("{title}").unwrap();
        let entry = ReferenceEntry {
            title: "DAB-DETR: Dynamic Anchor Boxes".to_string(),
            ..Default::default()
        };
        assert_eq!(evaluate_legacy(&parts, &entry), "dab-detr-dynamic");
    }

    #[test]
    fn test_legacy_missing_values_render_empty() {
        let parts = parse_legacy("{author}_{title}_{year}").unwrap();
        assert_eq!(evaluate_legacy(&parts, &ReferenceEntry::default()), "__");
    }
}
