//! Template parsing and validation.
//!
//! Chain-form templates go through [`parse_chain`] (tokens → [`RawExpression`]) and
//! [`compile`] (raw tree → typed [`Expression`]). Legacy templates are scanned by
//! [`parse_legacy`].

use crate::template::TemplateError;
use crate::template::ast::{
    Arg, Call, Expression, LegacyPart, Object, Placeholder, RawExpression, RawMethod, RawTerm,
    Term,
};
use crate::template::lexer::{Spanned, Token, tokenize};
use std::iter::Peekable;
use std::vec::IntoIter;

/// Parse a chain-form template into its untyped tree.
pub(crate) fn parse_chain(input: &str) -> Result<RawExpression, TemplateError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(TemplateError::Empty);
    }
    let mut parser = ChainParser {
        tokens: tokens.into_iter().peekable(),
        end: input.len(),
    };
    let expression = parser.expression()?;
    parser.finish()?;
    Ok(expression)
}

struct ChainParser {
    tokens: Peekable<IntoIter<Spanned>>,
    end: usize,
}

impl ChainParser {
    /// `expression := term ('+' term)*`
    fn expression(&mut self) -> Result<RawExpression, TemplateError> {
        let mut terms = vec![self.term()?];
        while self.eat(&Token::Plus) {
            terms.push(self.term()?);
        }
        Ok(RawExpression { terms })
    }

    /// `term := STRING | chain`
    fn term(&mut self) -> Result<RawTerm, TemplateError> {
        match self.advance("a string or an identifier")? {
            Spanned {
                token: Token::Str(value),
                ..
            } => Ok(RawTerm::Literal(value)),
            Spanned {
                token: Token::Ident(object),
                ..
            } => self.chain(object),
            other => Err(unexpected("a string or an identifier", other)),
        }
    }

    /// `chain := IDENT ('.' IDENT '(' (arg (',' arg)*)? ')')*`
    fn chain(&mut self, object: String) -> Result<RawTerm, TemplateError> {
        let mut methods = Vec::new();
        while self.eat(&Token::Dot) {
            let name = match self.advance("a method name")? {
                Spanned {
                    token: Token::Ident(name),
                    ..
                } => name,
                other => return Err(unexpected("a method name", other)),
            };
            self.expect(Token::LParen, "'('")?;
            let mut args = Vec::new();
            if !self.eat(&Token::RParen) {
                loop {
                    args.push(self.arg()?);
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    self.expect(Token::RParen, "',' or ')'")?;
                    break;
                }
            }
            methods.push(RawMethod { name, args });
        }
        Ok(RawTerm::Chain { object, methods })
    }

    /// `arg := STRING | NUMBER`
    fn arg(&mut self) -> Result<Arg, TemplateError> {
        match self.advance("an argument")? {
            Spanned {
                token: Token::Str(value),
                ..
            } => Ok(Arg::Str(value)),
            Spanned {
                token: Token::Number(value),
                ..
            } => Ok(Arg::Num(value)),
            other => Err(unexpected("an argument", other)),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.peek().is_some_and(|next| &next.token == token) {
            self.tokens.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), TemplateError> {
        let next = self.advance(expected)?;
        if next.token == token {
            Ok(())
        } else {
            Err(unexpected(expected, next))
        }
    }

    fn advance(&mut self, expected: &'static str) -> Result<Spanned, TemplateError> {
        let end = self.end;
        self.tokens.next().ok_or_else(|| TemplateError::Unexpected {
            expected,
            found: "end of template".to_string(),
            offset: end,
        })
    }

    fn finish(&mut self) -> Result<(), TemplateError> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(unexpected("'+' or end of template", extra)),
        }
    }
}

fn unexpected(expected: &'static str, found: Spanned) -> TemplateError {
    TemplateError::Unexpected {
        expected,
        found: found.token.describe(),
        offset: found.offset,
    }
}

/// Validate a raw chain-form tree against the object/method table.
pub(crate) fn compile(raw: &RawExpression) -> Result<Expression, TemplateError> {
    let terms = raw
        .terms
        .iter()
        .map(|term| match term {
            RawTerm::Literal(value) => Ok(Term::Literal(value.clone())),
            RawTerm::Chain { object, methods } => {
                let object = Object::from_name(object)
                    .ok_or_else(|| TemplateError::UnknownObject(object.clone()))?;
                let calls = methods
                    .iter()
                    .map(|method| compile_call(object, method))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Term::Chain { object, calls })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expression { terms })
}

fn compile_call(object: Object, method: &RawMethod) -> Result<Call, TemplateError> {
    let RawMethod { name, args } = method;
    let call = match name.as_str() {
        "lower" => no_args(name, args, Call::Lower)?,
        "upper" => no_args(name, args, Call::Upper)?,
        "nopunct" => no_args(name, args, Call::NoPunct)?,
        "skipwords" => no_args(name, args, Call::SkipWords)?,
        "initials" | "abbr" => no_args(name, args, Call::Initials)?,
        "trim" => no_args(name, args, Call::Trim)?,
        "clean" => no_args(name, args, Call::Clean)?,
        "short" => no_args(name, args, Call::Short)?,
        "select" => {
            arity(name, args, 1, 2, "1 or 2")?;
            let count = match args.get(1) {
                Some(_) => number(name, args, 1)?,
                None => 1,
            };
            Call::Select {
                start: number(name, args, 0)?,
                count,
            }
        }
        "prefix" => {
            arity(name, args, 1, 1, "1")?;
            Call::Prefix(number(name, args, 0)?)
        }
        "postfix" => {
            arity(name, args, 1, 1, "1")?;
            Call::Postfix(number(name, args, 0)?)
        }
        "replace" => {
            arity(name, args, 2, 2, "2")?;
            Call::Replace {
                from: text(&args[0]),
                to: text(&args[1]),
            }
        }
        _ => {
            return Err(TemplateError::UnsupportedMethod {
                object,
                method: name.clone(),
            });
        }
    };

    if !object.supports(&call) {
        return Err(TemplateError::UnsupportedMethod {
            object,
            method: name.clone(),
        });
    }
    Ok(call)
}

fn no_args(name: &str, args: &[Arg], call: Call) -> Result<Call, TemplateError> {
    arity(name, args, 0, 0, "0")?;
    Ok(call)
}

fn arity(
    name: &str,
    args: &[Arg],
    min: usize,
    max: usize,
    expected: &'static str,
) -> Result<(), TemplateError> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(TemplateError::Arity {
            method: name.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn number(name: &str, args: &[Arg], position: usize) -> Result<i64, TemplateError> {
    match args.get(position) {
        Some(Arg::Num(value)) => Ok(*value),
        _ => Err(TemplateError::ArgumentType {
            method: name.to_string(),
            position: position + 1,
            expected: "number",
        }),
    }
}

/// String arguments also accept numbers, rendered as written.
fn text(arg: &Arg) -> String {
    match arg {
        Arg::Str(value) => value.clone(),
        Arg::Num(value) => value.to_string(),
    }
}

/// Scan a legacy `{token}` template.
pub(crate) fn parse_legacy(input: &str) -> Result<Vec<LegacyPart>, TemplateError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut has_placeholder = false;
    let mut rest = input;

    while let Some(position) = rest.find(['{', '}']) {
        let (before, after) = rest.split_at(position);
        if after.starts_with('}') {
            return Err(TemplateError::UnbalancedBraces);
        }
        text.push_str(before);

        let inner = &after[1..];
        let close = inner.find('}').ok_or(TemplateError::UnbalancedBraces)?;
        let name = &inner[..close];
        if name.contains('{') {
            return Err(TemplateError::UnbalancedBraces);
        }
        let placeholder = Placeholder::from_name(name.trim())
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;

        if !text.is_empty() {
            parts.push(LegacyPart::Text(std::mem::take(&mut text)));
        }
        parts.push(LegacyPart::Placeholder(placeholder));
        has_placeholder = true;
        rest = &inner[close + 1..];
    }
    text.push_str(rest);
    if !text.is_empty() {
        parts.push(LegacyPart::Text(text));
    }

    if !has_placeholder {
        return Err(TemplateError::NoPlaceholders);
    }
    Ok(parts)
}
