//! Template syntax trees.
//!
//! The parser first produces the untyped tree ([`RawExpression`]) exactly as written,
//! which validation then compiles into the closed, typed [`Expression`].

use std::fmt;

/// A method argument as written in the template.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Num(i64),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "'{s}'"),
            Arg::Num(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMethod {
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawTerm {
    Literal(String),
    Chain {
        object: String,
        methods: Vec<RawMethod>,
    },
}

/// Untyped chain-form expression: `term ('+' term)*`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExpression {
    pub terms: Vec<RawTerm>,
}

/// Value a chain starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Object {
    /// Normalized surname of the first author
    Auth,
    /// Raw title
    Title,
    /// Four-digit year
    Year,
}

impl Object {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auth" => Some(Object::Auth),
            "title" => Some(Object::Title),
            "year" => Some(Object::Year),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Object::Auth => "auth",
            Object::Title => "title",
            Object::Year => "year",
        }
    }

    /// Whether `call` may be applied to this object.
    ///
    /// `auth` and `title` accept every method; `year` only the ones that make sense on
    /// a number.
    pub fn supports(self, call: &Call) -> bool {
        match self {
            Object::Auth | Object::Title => true,
            Object::Year => matches!(
                call,
                Call::Lower
                    | Call::Upper
                    | Call::NoPunct
                    | Call::Select { .. }
                    | Call::Prefix(_)
                    | Call::Postfix(_)
                    | Call::Trim
                    | Call::Replace { .. }
            ),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated method call with typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Lower,
    Upper,
    NoPunct,
    SkipWords,
    /// 1-indexed word slice
    Select { start: i64, count: i64 },
    Prefix(i64),
    Postfix(i64),
    /// `initials()` and its alias `abbr()`
    Initials,
    Trim,
    Replace { from: String, to: String },
    Clean,
    Short,
}

/// A validated chain-form term.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Literal(String),
    Chain { object: Object, calls: Vec<Call> },
}

/// A validated chain-form template.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub terms: Vec<Term>,
}

/// Placeholders of the legacy `{token}` dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Author,
    Title,
    Year,
}

impl Placeholder {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "author" => Some(Placeholder::Author),
            "title" => Some(Placeholder::Title),
            "year" => Some(Placeholder::Year),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LegacyPart {
    Text(String),
    Placeholder(Placeholder),
}
