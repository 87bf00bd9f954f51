//! Citekey templates.
//!
//! A template derives a predicted citekey from a reference entry. Two dialects are
//! recognized. Text with braces is read as placeholders first, then as a chain (a
//! quoted literal may contain braces); text without braces is always a chain:
//!
//! - **Legacy placeholders**: literal text around `{author}`, `{title}` and `{year}`.
//! - **Method chains**: terms joined with `+`, each a quoted literal or an object
//!   (`auth`, `title`, `year`) followed by method calls.
//!
//! # Example
//!
//! ```
//! use citebind::{Authors, ReferenceEntry};
//! use citebind::template::Template;
//!
//! let template = Template::parse("auth.lower() + year + title.skipwords().select(1)").unwrap();
//!
//! let entry = ReferenceEntry {
//!     title: "The Structure of Scientific Revolutions".to_string(),
//!     author: Authors::One("Thomas S. Kuhn".to_string()),
//!     year: "1962".to_string(),
//!     ..Default::default()
//! };
//! assert_eq!(template.predict(&entry), "kuhn1962structure");
//! ```
//!
//! A template that fails to parse or validate is never an error for callers of
//! [`Template::resolve`]: the default `{author}_{title}_{year}` is used instead.

pub mod ast;
mod cache;
mod eval;
mod lexer;
mod parse;

pub use cache::TemplateCache;
pub use eval::EvalError;

use crate::ReferenceEntry;
use crate::normalize::normalize_predicted_citekey;
use ast::{Expression, LegacyPart, Object, Placeholder};
use thiserror::Error;

/// Template used when none is configured or the configured one is invalid.
pub const DEFAULT_TEMPLATE: &str = "{author}_{title}_{year}";

/// Reasons a template is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("Empty template")]
    Empty,

    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Expected {expected} at offset {offset}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    #[error("Unbalanced braces")]
    UnbalancedBraces,

    #[error("Unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("Template has no placeholders")]
    NoPlaceholders,

    #[error("Unknown object '{0}'")]
    UnknownObject(String),

    #[error("Method '{method}' is not supported on '{object}'")]
    UnsupportedMethod { object: Object, method: String },

    #[error("Method '{method}' expects {expected} argument(s), got {got}")]
    Arity {
        method: String,
        expected: &'static str,
        got: usize,
    },

    #[error("Argument {position} of '{method}' must be a {expected}")]
    ArgumentType {
        method: String,
        position: usize,
        expected: &'static str,
    },
}

/// The two template dialects, validated.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateForm {
    Legacy(Vec<LegacyPart>),
    Chain(Expression),
}

/// A parsed and validated citekey template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    form: TemplateForm,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
            form: TemplateForm::Legacy(vec![
                LegacyPart::Placeholder(Placeholder::Author),
                LegacyPart::Text("_".to_string()),
                LegacyPart::Placeholder(Placeholder::Title),
                LegacyPart::Text("_".to_string()),
                LegacyPart::Placeholder(Placeholder::Year),
            ]),
        }
    }
}

impl Template {
    /// Parses and validates `text`, detecting the dialect.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if the text is valid in neither dialect.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let form = if text.contains(['{', '}']) {
            match parse::parse_legacy(text) {
                Ok(parts) => TemplateForm::Legacy(parts),
                // braces inside quoted literals are valid chain text
                Err(error) => match parse_chain_form(text) {
                    Ok(expression) => TemplateForm::Chain(expression),
                    Err(_) => return Err(error),
                },
            }
        } else {
            TemplateForm::Chain(parse_chain_form(text)?)
        };
        Ok(Self {
            source: text.to_string(),
            form,
        })
    }

    /// Parses the configured template, falling back to the default.
    ///
    /// `None` or blank text selects the default silently; invalid text logs a warning.
    pub fn resolve(text: Option<&str>) -> Self {
        let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
            return Self::default();
        };
        match Self::parse(text) {
            Ok(template) => template,
            Err(error) => {
                tracing::warn!(
                    template = text,
                    %error,
                    "invalid citekey template, using {DEFAULT_TEMPLATE}"
                );
                Self::default()
            }
        }
    }

    /// The text this template was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn form(&self) -> &TemplateForm {
        &self.form
    }

    pub fn is_default(&self) -> bool {
        self.source == DEFAULT_TEMPLATE
    }

    /// Predicts the citekey of `entry`.
    ///
    /// The result is always passed through
    /// [`normalize_predicted_citekey`](crate::normalize::normalize_predicted_citekey); an
    /// invalid method application anywhere in a chain yields an empty key.
    pub fn predict(&self, entry: &ReferenceEntry) -> String {
        let raw = match &self.form {
            TemplateForm::Legacy(parts) => eval::evaluate_legacy(parts, entry),
            TemplateForm::Chain(expression) => {
                eval::evaluate_expression(expression, entry).unwrap_or_else(|error| {
                    tracing::debug!(
                        reference = %entry.id,
                        template = %self.source,
                        %error,
                        "template evaluation aborted"
                    );
                    String::new()
                })
            }
        };
        normalize_predicted_citekey(&raw)
    }
}

fn parse_chain_form(text: &str) -> Result<Expression, TemplateError> {
    parse::compile(&parse::parse_chain(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Authors;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn detr() -> ReferenceEntry {
        ReferenceEntry {
            id: "ref-1".into(),
            title: "Conditional DETR for Fast Training Convergence".to_string(),
            author: Authors::Many(vec!["John Meng".to_string()]),
            year: "2021".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_template_prediction() {
        assert_eq!(
            Template::default().predict(&detr()),
            "meng_conditional-detr_2021"
        );
    }

    #[test]
    fn test_default_matches_parsed_default() {
        assert_eq!(Template::parse(DEFAULT_TEMPLATE).unwrap(), Template::default());
        assert!(Template::default().is_default());
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    #[case(Some("{unknown}"))]
    #[case(Some("{author"))]
    #[case(Some("auth.nosuch()"))]
    #[case(Some("year.skipwords()"))]
    #[case(Some("title.select()"))]
    fn test_resolve_falls_back_to_default(#[case] text: Option<&str>) {
        let template = Template::resolve(text);
        assert!(template.is_default());
        assert_eq!(template.predict(&detr()), "meng_conditional-detr_2021");
    }

    #[test]
    fn test_chain_template_prediction() {
        let template = Template::resolve(Some(
            "auth.lower() + '_' + title.skipwords().select(1,2).replace(' ', '-') + '_' + year",
        ));
        assert!(!template.is_default());
        assert_eq!(template.predict(&detr()), "meng_conditional-detr_2021");
    }

    #[test]
    fn test_chain_with_braces_in_literal() {
        let template = Template::resolve(Some("auth + '{x}' + year"));
        assert!(matches!(template.form(), TemplateForm::Chain(_)));
        assert_eq!(template.predict(&detr()), "meng-x-2021");
    }

    #[test]
    fn test_prediction_is_normalized() {
        let template = Template::parse("title.upper() + ' ' + auth").unwrap();
        assert_eq!(
            template.predict(&detr()),
            "conditional-detr-for-fast-training-convergence-meng"
        );
    }

    #[test]
    fn test_invalid_application_predicts_empty_key() {
        let template = Template::parse("auth + year + title.postfix(-2)").unwrap();
        assert_eq!(template.predict(&detr()), "");
    }

    #[test]
    fn test_template_error_display() {
        let error = Template::parse("year.clean()").unwrap_err();
        assert_eq!(error.to_string(), "Method 'clean' is not supported on 'year'");
        let error = Template::parse("{nope}").unwrap_err();
        assert_eq!(error.to_string(), "Unknown placeholder '{nope}'");
    }
}
