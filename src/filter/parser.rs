//! Recursive-descent parser for the RFC 4515 filter grammar:
//!
//! ```text
//! filter     := '(' filtercomp ')'
//! filtercomp := '&' filter+ | '|' filter+ | '!' filter | item
//! item       := attr filtertype value
//! filtertype := '=' | '>=' | '<=' | '~='
//! ```

use super::ast::Filter;
use crate::errors::{HeraclesError, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Parses an RFC 4515 filter string into a `Filter` tree.
///
/// An empty input string canonicalizes to `Present("objectClass")`.
pub fn parse(input: &str) -> Result<Filter> {
    if input.is_empty() {
        return Ok(Filter::present("objectClass"));
    }

    let mut cursor = input.chars().peekable();
    let filter = parse_filter(&mut cursor)?;
    if cursor.next().is_some() {
        return Err(HeraclesError::Protocol(format!(
            "trailing characters after filter: {input:?}"
        )));
    }
    Ok(filter)
}

fn parse_filter(cursor: &mut Peekable<Chars>) -> Result<Filter> {
    expect(cursor, '(')?;
    let filter = parse_filtercomp(cursor)?;
    expect(cursor, ')')?;
    Ok(filter)
}

fn parse_filtercomp(cursor: &mut Peekable<Chars>) -> Result<Filter> {
    match cursor.peek() {
        Some('&') => {
            cursor.next();
            Ok(Filter::And(parse_filter_list(cursor)?))
        }
        Some('|') => {
            cursor.next();
            Ok(Filter::Or(parse_filter_list(cursor)?))
        }
        Some('!') => {
            cursor.next();
            let inner = parse_filter(cursor)?;
            Ok(Filter::Not(Box::new(inner)))
        }
        Some(_) => parse_item(cursor),
        None => Err(HeraclesError::Protocol("unexpected end of filter".into())),
    }
}

/// `&` and `|` each take one-or-more child filters.
fn parse_filter_list(cursor: &mut Peekable<Chars>) -> Result<Vec<Filter>> {
    let mut children = Vec::new();
    while let Some('(') = cursor.peek() {
        children.push(parse_filter(cursor)?);
    }
    if children.is_empty() {
        return Err(HeraclesError::Protocol(
            "'&'/'|' filter requires at least one child".into(),
        ));
    }
    Ok(children)
}

fn parse_item(cursor: &mut Peekable<Chars>) -> Result<Filter> {
    let attr = read_until_operator(cursor)?;
    let op = read_operator(cursor)?;
    let raw_value = read_value(cursor)?;

    let filter = match op.as_str() {
        "=" => classify_equality(attr, raw_value),
        ">=" => Filter::GreaterOrEqual(attr, unescape_filter_value(&raw_value)),
        "<=" => Filter::LessOrEqual(attr, unescape_filter_value(&raw_value)),
        "~=" => Filter::ApproxMatch(attr, unescape_filter_value(&raw_value)),
        _ => unreachable!("read_operator only returns the four known operators"),
    };
    Ok(filter)
}

/// `(attr=value)`'s value is classified by its wildcard content: exactly
/// `*` is `Present`, any `*` (but not exclusively) is `Substrings`,
/// otherwise `Equality`.
fn classify_equality(attr: String, raw_value: String) -> Filter {
    if raw_value == "*" {
        Filter::Present(attr)
    } else if raw_value.contains('*') {
        Filter::Substrings(attr, unescape_filter_value(&raw_value))
    } else {
        Filter::Equality(attr, unescape_filter_value(&raw_value))
    }
}

fn read_until_operator(cursor: &mut Peekable<Chars>) -> Result<String> {
    let mut attr = String::new();
    loop {
        match cursor.peek() {
            Some('=') | Some('>') | Some('<') | Some('~') => break,
            Some(')') | None => {
                return Err(HeraclesError::Protocol(format!(
                    "malformed filter item, missing operator near {attr:?}"
                )))
            }
            Some(&c) => {
                attr.push(c);
                cursor.next();
            }
        }
    }
    if attr.is_empty() {
        return Err(HeraclesError::Protocol("empty attribute in filter item".into()));
    }
    Ok(attr)
}

fn read_operator(cursor: &mut Peekable<Chars>) -> Result<String> {
    match cursor.next() {
        Some('=') => Ok("=".to_string()),
        Some('>') if cursor.peek() == Some(&'=') => {
            cursor.next();
            Ok(">=".to_string())
        }
        Some('<') if cursor.peek() == Some(&'=') => {
            cursor.next();
            Ok("<=".to_string())
        }
        Some('~') if cursor.peek() == Some(&'=') => {
            cursor.next();
            Ok("~=".to_string())
        }
        other => Err(HeraclesError::Protocol(format!(
            "invalid filter operator near {other:?}"
        ))),
    }
}

/// Reads a value up to (but not including) the closing, unescaped `)`.
fn read_value(cursor: &mut Peekable<Chars>) -> Result<String> {
    let mut value = String::new();
    loop {
        match cursor.peek() {
            Some(')') | None => break,
            Some('\\') => {
                value.push('\\');
                cursor.next();
                if let Some(&c) = cursor.peek() {
                    value.push(c);
                    cursor.next();
                }
            }
            Some(&c) => {
                value.push(c);
                cursor.next();
            }
        }
    }
    Ok(value)
}

fn expect(cursor: &mut Peekable<Chars>, expected: char) -> Result<()> {
    match cursor.next() {
        Some(c) if c == expected => Ok(()),
        other => Err(HeraclesError::Protocol(format!(
            "expected '{expected}', found {other:?}"
        ))),
    }
}

/// Reverses `escape_filter_value`'s `\XX` hex escaping.
pub fn unescape_filter_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            let h1 = chars.next();
            let h2 = chars.next();
            match (h1, h2) {
                (Some(h1), Some(h2)) if h1.is_ascii_hexdigit() && h2.is_ascii_hexdigit() => {
                    if let Ok(byte) = u8::from_str_radix(&format!("{h1}{h2}"), 16) {
                        result.push(byte as char);
                    }
                }
                (Some(h1), Some(h2)) => {
                    result.push(h1);
                    result.push(h2);
                }
                (Some(h1), None) => result.push(h1),
                (None, _) => {}
            }
        } else {
            result.push(c);
        }
    }

    result
}
