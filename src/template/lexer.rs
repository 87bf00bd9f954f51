//! Tokenizer for chain-form templates.

use crate::template::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Number(i64),
    Str(String),
    Plus,
    Dot,
    Comma,
    LParen,
    RParen,
}

impl Token {
    /// Short description used in parse errors.
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Number(n) => format!("number {n}"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Plus => "'+'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Comma => "','".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) offset: usize,
}

/// Splits a template into tokens, skipping whitespace.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => single(&mut chars, Token::Plus),
            '.' => single(&mut chars, Token::Dot),
            ',' => single(&mut chars, Token::Comma),
            '(' => single(&mut chars, Token::LParen),
            ')' => single(&mut chars, Token::RParen),
            '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\'' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(TemplateError::UnterminatedString(offset));
                }
                Token::Str(value)
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    literal.push(d);
                    chars.next();
                }
                if literal == "-" {
                    return Err(TemplateError::UnexpectedChar { ch: '-', offset });
                }
                let value = literal
                    .parse::<i64>()
                    .map_err(|_| TemplateError::InvalidNumber(literal.clone()))?;
                Token::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    name.push(d);
                    chars.next();
                }
                Token::Ident(name)
            }
            ch => return Err(TemplateError::UnexpectedChar { ch, offset }),
        };
        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

fn single<I: Iterator>(chars: &mut I, token: Token) -> Token {
    chars.next();
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn test_tokenize_chain() {
        assert_eq!(
            kinds("auth.lower() + '_' + title.select(1, 2)"),
            vec![
                Token::Ident("auth".into()),
                Token::Dot,
                Token::Ident("lower".into()),
                Token::LParen,
                Token::RParen,
                Token::Plus,
                Token::Str("_".into()),
                Token::Plus,
                Token::Ident("title".into()),
                Token::Dot,
                Token::Ident("select".into()),
                Token::LParen,
                Token::Number(1),
                Token::Comma,
                Token::Number(2),
                Token::RParen,
            ]
        );
    }

    #[rstest]
    #[case(r"'it\'s'", "it's")]
    #[case(r"'a\\b'", r"a\b")]
    #[case(r"'tab\there'", "tab\there")]
    #[case("''", "")]
    fn test_tokenize_string_escapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(kinds(input), vec![Token::Str(expected.into())]);
    }

    #[test]
    fn test_tokenize_negative_number() {
        assert_eq!(kinds("-3"), vec![Token::Number(-3)]);
    }

    #[test]
    fn test_tokenize_offsets() {
        let tokens = tokenize("  year").unwrap();
        assert_eq!(tokens[0].offset, 2);
    }

    #[rstest]
    #[case("'open", TemplateError::UnterminatedString(0))]
    #[case("year # 1", TemplateError::UnexpectedChar { ch: '#', offset: 5 })]
    #[case("- 1", TemplateError::UnexpectedChar { ch: '-', offset: 0 })]
    #[case("99999999999999999999", TemplateError::InvalidNumber("99999999999999999999".into()))]
    fn test_tokenize_errors(#[case] input: &str, #[case] expected: TemplateError) {
        assert_eq!(tokenize(input).unwrap_err(), expected);
    }
}
