//! Recursive-descent parser: token stream -> [`ParsedQuery`].
//!
//! The grammar is dispatched on the action keyword; everything before it is
//! the match (or the prop list for CREATE), everything after is the data.
//! Simpletext content is any run of bare words up to the next `#` or
//! newline, and is only legal before the tag/prop expressions it decorates.

use factdb_core::Fact;

use crate::QueryError;
use crate::token::{Keyword, Spanned, TagExpr, Token, lex};

/// A parsed query: the action and its fact list.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedQuery {
    /// `prop* CREATE (content data* | data+)` -- all facts fold into the
    /// created item.
    Create(Vec<Fact>),
    /// `match SET (content | data+)` -- facts[0] is the match.
    Set(Vec<Fact>),
    /// `match DEL data+` -- facts[0] is the match.
    Del(Vec<Fact>),
    /// `match ARCHIVE` -- facts[0] is the match.
    Archive(Vec<Fact>),
    /// A bare `@ref`.
    Get(Fact),
    /// `data+` or `content data*` -- AND search.
    List(Vec<Fact>),
    /// `id? HISTORY`.
    History(Option<Fact>),
    /// `HINTS prop?` -- the raw prefix text, trailing `/` preserved.
    Hints(String),
    Changesets,
    Replicate,
}

/// Parses query text into its action and fact list.
pub fn parse(input: &str) -> Result<ParsedQuery, QueryError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(QueryError::Empty);
    }

    let kw_pos = tokens
        .iter()
        .position(|t| matches!(t.token, Token::Keyword(_)));

    let Some(pos) = kw_pos else {
        return parse_keywordless(input, &tokens);
    };
    let kw = match &tokens[pos].token {
        Token::Keyword(kw) => *kw,
        _ => return Err(unexpected_token(&tokens[pos])),
    };
    let before = &tokens[..pos];
    let after = &tokens[pos + 1..];

    match kw {
        Keyword::Create => {
            if after.is_empty() {
                return Err(unexpected("end of query", input.len()));
            }
            let mut facts = parse_props(before)?;
            facts.extend(parse_data_sequence(input, after, true)?);
            Ok(ParsedQuery::Create(facts))
        }
        Keyword::Set => {
            let mut facts = require_match(input, before)?;
            facts.extend(parse_set_data(input, after)?);
            Ok(ParsedQuery::Set(facts))
        }
        Keyword::Del => {
            let mut facts = require_match(input, before)?;
            let data = parse_data_sequence(input, after, false)?;
            if data.is_empty() {
                return Err(unexpected("end of query", input.len()));
            }
            facts.extend(data);
            Ok(ParsedQuery::Del(facts))
        }
        Keyword::Archive => {
            require_empty(after)?;
            Ok(ParsedQuery::Archive(require_match(input, before)?))
        }
        Keyword::Hints => {
            require_first(before, pos)?;
            Ok(ParsedQuery::Hints(parse_hint_prefix(after)?))
        }
        Keyword::History => {
            require_empty(after)?;
            match before {
                [] => Ok(ParsedQuery::History(None)),
                [one] => match &one.token {
                    Token::Ref(r) => Ok(ParsedQuery::History(Some(Fact::primary_ref(r)))),
                    _ => Err(unexpected_token(one)),
                },
                [_, extra, ..] => Err(unexpected_token(extra)),
            }
        }
        Keyword::Changesets => {
            require_first(before, pos)?;
            require_empty(after)?;
            Ok(ParsedQuery::Changesets)
        }
        Keyword::Replicate => {
            require_first(before, pos)?;
            require_empty(after)?;
            Ok(ParsedQuery::Replicate)
        }
    }
}

/// No action keyword: a bare ref is a get, anything else is a list search.
fn parse_keywordless(input: &str, tokens: &[Spanned]) -> Result<ParsedQuery, QueryError> {
    if let [one] = tokens {
        if let Token::Ref(r) = &one.token {
            return Ok(ParsedQuery::Get(Fact::primary_ref(r)));
        }
    }
    let facts = parse_data_sequence(input, tokens, true)?;
    Ok(ParsedQuery::List(facts))
}

fn tag_expr_to_fact(expr: &TagExpr) -> Fact {
    match (&expr.prop, &expr.value) {
        (None, _) => Fact::tag(expr.tag.clone()),
        (Some(p), None) => Fact::flag(expr.tag.clone(), p.clone()),
        (Some(p), Some(v)) => Fact::value(expr.tag.clone(), p.clone(), v.clone()),
    }
}

/// The `prop*` list allowed before CREATE: bare tags and flags only, never
/// values.
fn parse_props(tokens: &[Spanned]) -> Result<Vec<Fact>, QueryError> {
    tokens
        .iter()
        .map(|t| match &t.token {
            Token::Tag(expr) if expr.value.is_none() => Ok(tag_expr_to_fact(expr)),
            _ => Err(unexpected_token(t)),
        })
        .collect()
}

/// `content? data*`: an optional leading content (quoted text or a run of
/// bare words), then tag expressions. Content after a tag expression is the
/// grammar's canonical rejection case.
fn parse_data_sequence(
    input: &str,
    tokens: &[Spanned],
    allow_leading_content: bool,
) -> Result<Vec<Fact>, QueryError> {
    let mut facts = Vec::new();
    let mut i = 0;

    if allow_leading_content && !tokens.is_empty() {
        if let Some((content, consumed)) = take_content(input, tokens)? {
            facts.push(content);
            i = consumed;
        }
    }

    while i < tokens.len() {
        match &tokens[i].token {
            Token::Tag(expr) => facts.push(tag_expr_to_fact(expr)),
            _ => return Err(unexpected_token(&tokens[i])),
        }
        i += 1;
    }

    Ok(facts)
}

/// After SET: either a single content or `data+`, never both.
fn parse_set_data(input: &str, tokens: &[Spanned]) -> Result<Vec<Fact>, QueryError> {
    if tokens.is_empty() {
        return Err(unexpected("end of query", input.len()));
    }
    match &tokens[0].token {
        Token::Quoted(_) | Token::Word(_) => {
            let (content, consumed) = take_content(input, tokens)?
                .ok_or_else(|| unexpected_token(&tokens[0]))?;
            if consumed < tokens.len() {
                return Err(unexpected_token(&tokens[consumed]));
            }
            Ok(vec![content])
        }
        _ => {
            let facts = parse_data_sequence(input, tokens, false)?;
            if facts.is_empty() {
                return Err(unexpected("end of query", input.len()));
            }
            Ok(facts)
        }
    }
}

/// `match := id | data+ | content data*`, required non-empty.
fn require_match(input: &str, tokens: &[Spanned]) -> Result<Vec<Fact>, QueryError> {
    match tokens {
        [] => Err(unexpected("start of query", 0)),
        [one] => {
            if let Token::Ref(r) = &one.token {
                return Ok(vec![Fact::primary_ref(r)]);
            }
            parse_data_sequence(input, tokens, true)
        }
        _ => parse_data_sequence(input, tokens, true),
    }
}

/// Merges a leading content token (quoted, or consecutive words on one
/// line) into a content fact. Returns the fact and how many tokens it ate.
fn take_content(
    input: &str,
    tokens: &[Spanned],
) -> Result<Option<(Fact, usize)>, QueryError> {
    match &tokens[0].token {
        Token::Quoted(text) => Ok(Some((Fact::content(text.clone()), 1))),
        Token::Word(_) => {
            let start = tokens[0].span.start;
            let mut end = tokens[0].span.end;
            let mut consumed = 1;
            while consumed < tokens.len() {
                let next = &tokens[consumed];
                if !matches!(next.token, Token::Word(_)) {
                    break;
                }
                // Simpletext stops at a newline.
                if input[end..next.span.start].contains('\n') {
                    break;
                }
                end = next.span.end;
                consumed += 1;
            }
            let text = input[start..end].trim().to_owned();
            Ok(Some((Fact::content(text), consumed)))
        }
        _ => Ok(None),
    }
}

fn parse_hint_prefix(tokens: &[Spanned]) -> Result<String, QueryError> {
    match tokens {
        [] => Ok(String::new()),
        [one] => match &one.token {
            // Same production as the CREATE prefix: a value is not a prop.
            Token::Tag(expr) if expr.value.is_none() => {
                Ok(match (&expr.prop, expr.trailing_slash) {
                    (Some(p), _) => format!("#{}/{}", expr.tag, p),
                    (None, true) => format!("#{}/", expr.tag),
                    (None, false) => format!("#{}", expr.tag),
                })
            }
            _ => Err(unexpected_token(one)),
        },
        [_, extra, ..] => Err(unexpected_token(extra)),
    }
}

fn require_empty(tokens: &[Spanned]) -> Result<(), QueryError> {
    match tokens.first() {
        Some(t) => Err(unexpected_token(t)),
        None => Ok(()),
    }
}

fn require_first(before: &[Spanned], pos: usize) -> Result<(), QueryError> {
    if pos != 0 {
        return Err(unexpected_token(&before[0]));
    }
    Ok(())
}

fn unexpected_token(t: &Spanned) -> QueryError {
    let what = match &t.token {
        Token::Ref(r) => format!("@{r}"),
        Token::Tag(expr) => format!("#{}", expr.tag),
        Token::Quoted(_) => "quoted text".to_owned(),
        Token::Word(w) => format!("text {w:?}"),
        Token::Keyword(kw) => format!("{kw:?}").to_uppercase(),
    };
    unexpected(&what, t.span.start)
}

fn unexpected(what: &str, pos: usize) -> QueryError {
    QueryError::Unexpected {
        what: what.to_owned(),
        pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn create_with_content_and_tags() {
        let q = parse("CREATE go to supermarket #todo #todo/completed").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Create(vec![
                Fact::content("go to supermarket"),
                Fact::tag("todo"),
                Fact::flag("todo", "completed"),
            ])
        );
    }

    #[test]
    fn create_with_value_fact() {
        let q = parse("CREATE book appointment #todo #todo/remind_at=20210412").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Create(vec![
                Fact::content("book appointment"),
                Fact::tag("todo"),
                Fact::value("todo", "remind_at", "20210412"),
            ])
        );
    }

    #[test]
    fn create_with_leading_props() {
        let q = parse("#todo #chores/urgent CREATE do dishes").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Create(vec![
                Fact::tag("todo"),
                Fact::flag("chores", "urgent"),
                Fact::content("do dishes"),
            ])
        );
    }

    #[test]
    fn create_with_quoted_content() {
        let q = parse("CREATE [[[ multi-line\ncontent with #hashes allowed ]]] #help").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Create(vec![
                Fact::content("multi-line\ncontent with #hashes allowed"),
                Fact::tag("help"),
            ])
        );
    }

    #[test]
    fn create_rejects_content_after_tag() {
        assert!(parse("CREATE #x This is me").is_err());
    }

    #[test]
    fn create_prefix_rejects_values() {
        // Before CREATE only tags and flags are props; values are not.
        assert!(parse("#todo/com=val CREATE foo").is_err());
        assert!(parse("#todo #chores/due=friday CREATE foo").is_err());
    }

    #[test]
    fn create_rejects_refs() {
        assert!(parse("CREATE @3dd #todo").is_err());
    }

    #[test]
    fn create_requires_data() {
        assert!(parse("CREATE").is_err());
    }

    #[test]
    fn set_with_content() {
        let q = parse("@3dd SET book appointment at physio").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Set(vec![
                Fact::primary_ref("3dd"),
                Fact::content("book appointment at physio"),
            ])
        );
    }

    #[test]
    fn set_with_data() {
        let q = parse("@544 SET #book #todo").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Set(vec![
                Fact::primary_ref("544"),
                Fact::tag("book"),
                Fact::tag("todo"),
            ])
        );
    }

    #[test]
    fn set_requires_data() {
        assert!(parse("@3dd SET").is_err());
    }

    #[test]
    fn del_facts() {
        let q = parse("@4af DEL #book").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Del(vec![Fact::primary_ref("4af"), Fact::tag("book")])
        );
    }

    #[test]
    fn archive_by_ref() {
        let q = parse("@4af ARCHIVE").unwrap();
        assert_eq!(q, ParsedQuery::Archive(vec![Fact::primary_ref("4af")]));
        assert!(parse("@4af ARCHIVE #todo").is_err());
    }

    #[test]
    fn get_bare_ref() {
        assert_eq!(parse("@aaa").unwrap(), ParsedQuery::Get(Fact::primary_ref("aaa")));
    }

    #[test]
    fn list_searches() {
        assert_eq!(
            parse("#todo/completed").unwrap(),
            ParsedQuery::List(vec![Fact::flag("todo", "completed")])
        );
        assert_eq!(
            parse("do dishes").unwrap(),
            ParsedQuery::List(vec![Fact::content("do dishes")])
        );
        assert_eq!(
            parse("find #todo").unwrap(),
            ParsedQuery::List(vec![Fact::content("find"), Fact::tag("todo")])
        );
        assert_eq!(
            parse("#todo/remind_at=444").unwrap(),
            ParsedQuery::List(vec![Fact::value("todo", "remind_at", "444")])
        );
    }

    #[test]
    fn history_forms() {
        assert_eq!(
            parse("@f4a HISTORY").unwrap(),
            ParsedQuery::History(Some(Fact::primary_ref("f4a")))
        );
        assert_eq!(parse("HISTORY").unwrap(), ParsedQuery::History(None));
        assert!(parse("#todo HISTORY").is_err());
    }

    #[test]
    fn hints_prefixes() {
        assert_eq!(parse("HINTS").unwrap(), ParsedQuery::Hints(String::new()));
        assert_eq!(parse("HINTS #to").unwrap(), ParsedQuery::Hints("#to".into()));
        assert_eq!(parse("HINTS #to/").unwrap(), ParsedQuery::Hints("#to/".into()));
        assert_eq!(
            parse("HINTS #todo/com").unwrap(),
            ParsedQuery::Hints("#todo/com".into())
        );
        assert!(parse("HINTS #a #b").is_err());
        // A value is not a prop; it must not be truncated to one.
        assert!(parse("HINTS #todo/com=val").is_err());
    }

    #[test]
    fn bare_keywords() {
        assert_eq!(parse("CHANGESETS").unwrap(), ParsedQuery::Changesets);
        assert_eq!(parse("REPLICATE").unwrap(), ParsedQuery::Replicate);
        assert!(parse("CHANGESETS #todo").is_err());
    }

    #[test]
    fn empty_query() {
        assert!(matches!(parse(""), Err(QueryError::Empty)));
        assert!(matches!(parse("   "), Err(QueryError::Empty)));
    }

    #[test]
    fn unclosed_quote() {
        assert!(matches!(
            parse("CREATE [[[ oops"),
            Err(QueryError::UnclosedQuote(_))
        ));
    }

    #[test]
    fn content_preserves_inner_spacing() {
        let q = parse("CREATE go  to   supermarket #todo").unwrap();
        assert_eq!(
            q,
            ParsedQuery::Create(vec![
                Fact::content("go  to   supermarket"),
                Fact::tag("todo"),
            ])
        );
    }

    #[test]
    fn render_parse_round_trip() {
        for fact in [
            Fact::tag("todo"),
            Fact::flag("todo", "completed"),
            Fact::value("todo", "due", "friday"),
            Fact::value("todo", "due", "next friday 10:30"),
        ] {
            let rendered = fact.to_string();
            let q = parse(&rendered).unwrap();
            assert_eq!(q, ParsedQuery::List(vec![fact]), "query {rendered:?}");
        }
        // Content round-trips through its raw rendering.
        let content = Fact::content("pick up milk");
        assert_eq!(
            parse(&content.to_string()).unwrap(),
            ParsedQuery::List(vec![content])
        );
        // Refs round-trip to a get.
        let r = Fact::primary_ref("0f3a2d");
        assert_eq!(parse(&r.to_string()).unwrap(), ParsedQuery::Get(r));
    }
}
