//! Token types and the lexer for the query language.
//!
//! The lexer turns query text into a flat token stream; the parser then
//! dispatches on the action keyword. Tokens carry their source span so the
//! parser can slice original text back out (simpletext content preserves
//! its inner whitespace).

use crate::QueryError;

/// Byte range of a token in the source query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Action keywords. Anything else in caps is ordinary content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Create,
    Set,
    Del,
    Archive,
    Hints,
    History,
    Changesets,
    Replicate,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "CREATE" => Some(Self::Create),
            "SET" => Some(Self::Set),
            "DEL" => Some(Self::Del),
            "ARCHIVE" => Some(Self::Archive),
            "HINTS" => Some(Self::Hints),
            "HISTORY" => Some(Self::History),
            "CHANGESETS" => Some(Self::Changesets),
            "REPLICATE" => Some(Self::Replicate),
            _ => None,
        }
    }
}

/// A `#tag`, `#tag/`, `#tag/prop`, or `#tag/prop=value` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagExpr {
    pub tag: String,
    pub prop: Option<String>,
    pub value: Option<String>,
    /// `#tag/` with nothing after the slash; meaningful for HINTS.
    pub trailing_slash: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `@3dd` -- a lowercase-hex item ref.
    Ref(String),
    Tag(TagExpr),
    /// `[[[ ... ]]]` quoted text, delimiters and outer whitespace stripped.
    Quoted(String),
    /// A bare word; consecutive words merge into simpletext content.
    Word(String),
    Keyword(Keyword),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Tokenizes a query string.
pub fn lex(input: &str) -> Result<Vec<Spanned>, QueryError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        match bytes[i] {
            b'@' => {
                i += 1;
                let ref_start = i;
                while i < bytes.len() && is_hex(bytes[i]) {
                    i += 1;
                }
                if i == ref_start || (i < bytes.len() && bytes[i].is_ascii_alphanumeric()) {
                    return Err(QueryError::InvalidRef { pos: start });
                }
                tokens.push(Spanned {
                    token: Token::Ref(input[ref_start..i].to_owned()),
                    span: Span::new(start, i),
                });
            }
            b'#' => {
                let (expr, next) = lex_tag_expr(input, start)?;
                i = next;
                tokens.push(Spanned {
                    token: Token::Tag(expr),
                    span: Span::new(start, i),
                });
            }
            _ if input[i..].starts_with("[[[") => {
                let (text, next) = lex_quoted(input, start)?;
                i = next;
                tokens.push(Spanned {
                    token: Token::Quoted(text),
                    span: Span::new(start, i),
                });
            }
            _ => {
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'#' {
                    i += 1;
                }
                let word = &input[start..i];
                let token = match Keyword::from_word(word) {
                    Some(kw) => Token::Keyword(kw),
                    None => Token::Word(word.to_owned()),
                };
                tokens.push(Spanned {
                    token,
                    span: Span::new(start, i),
                });
            }
        }
    }

    Ok(tokens)
}

/// Parses `#tag`, `#tag/`, `#tag/prop`, `#tag/prop=value` starting at the
/// `#`. Returns the expression and the index just past it.
fn lex_tag_expr(input: &str, start: usize) -> Result<(TagExpr, usize), QueryError> {
    let bytes = input.as_bytes();
    let mut i = start + 1;

    // Tag: optional leading underscore, then a lowercase letter, then
    // lowercase letters and digits.
    let tag_start = i;
    if i < bytes.len() && bytes[i] == b'_' {
        i += 1;
    }
    if i >= bytes.len() || !bytes[i].is_ascii_lowercase() {
        return Err(QueryError::InvalidTag {
            pos: start,
            text: word_at(input, start),
        });
    }
    i += 1;
    while i < bytes.len() && (bytes[i].is_ascii_lowercase() || bytes[i].is_ascii_digit()) {
        i += 1;
    }
    let tag = input[tag_start..i].to_owned();

    if i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'/' | b'#') {
        return Err(QueryError::InvalidTag {
            pos: start,
            text: word_at(input, start),
        });
    }

    if i >= bytes.len() || bytes[i] != b'/' {
        return Ok((
            TagExpr {
                tag,
                prop: None,
                value: None,
                trailing_slash: false,
            },
            i,
        ));
    }

    // Past the slash: either a prop or nothing (trailing slash).
    i += 1;
    let prop_start = i;
    if i >= bytes.len() || !bytes[i].is_ascii_lowercase() {
        if i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'#' {
            return Err(QueryError::InvalidProp {
                pos: start,
                text: word_at(input, start),
            });
        }
        return Ok((
            TagExpr {
                tag,
                prop: None,
                value: None,
                trailing_slash: true,
            },
            i,
        ));
    }
    i += 1;
    while i < bytes.len()
        && (bytes[i].is_ascii_lowercase() || bytes[i].is_ascii_digit() || bytes[i] == b'_')
    {
        i += 1;
    }
    let prop = input[prop_start..i].to_owned();

    if i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'#') {
        return Err(QueryError::InvalidProp {
            pos: start,
            text: word_at(input, start),
        });
    }

    if i >= bytes.len() || bytes[i] != b'=' {
        return Ok((
            TagExpr {
                tag,
                prop: Some(prop),
                value: None,
                trailing_slash: false,
            },
            i,
        ));
    }

    // Value: quoted text or a bareword up to whitespace.
    i += 1;
    let value = if input[i..].starts_with("[[[") {
        let (text, next) = lex_quoted(input, i)?;
        i = next;
        text
    } else {
        let value_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == value_start {
            return Err(QueryError::MissingValue { pos: start });
        }
        input[value_start..i].to_owned()
    };

    Ok((
        TagExpr {
            tag,
            prop: Some(prop),
            value: Some(value),
            trailing_slash: false,
        },
        i,
    ))
}

/// Parses `[[[ ... ]]]` starting at the opening bracket. The match is
/// non-greedy and may span lines.
fn lex_quoted(input: &str, start: usize) -> Result<(String, usize), QueryError> {
    let body_start = start + 3;
    match input[body_start..].find("]]]") {
        Some(rel) => {
            let end = body_start + rel;
            Ok((input[body_start..end].trim().to_owned(), end + 3))
        }
        None => Err(QueryError::UnclosedQuote(start)),
    }
}

/// The whitespace-delimited word at `pos`, for error messages.
fn word_at(input: &str, pos: usize) -> String {
    input[pos..]
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_owned()
}

fn is_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}
