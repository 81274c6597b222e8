// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Line protocol codec: one request line in, a response out.
//!
//! Grounded on the teacher's hand-rolled byte-level PDU parsing style
//! (`models::parse`/`models::command::common`): no parser-combinator
//! crate, a small hand-written tokenizer walking the line char by char.

use std::collections::HashMap;
use std::fmt;

/// A parsed request line: a verb plus its arguments, in the order they
/// appeared, split into positional barewords and `key=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub verb: String,
    pub positional: Vec<String>,
    pub kv: HashMap<String, String>,
}

impl Request {
    pub fn kv(&self, key: &str) -> Option<&str> {
        self.kv.get(key).map(String::as_str)
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }
}

/// Failure parsing a request line. Always maps to `ERR bad-arguments` at
/// the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

/// Parses one request line (without its trailing newline) into a
/// [`Request`]. The verb is upper-cased; arguments are either bare tokens
/// or `key=value` pairs where `value` may be a double-quoted string with
/// `\"` and `\\` escapes.
pub fn parse_request(line: &str) -> Result<Request, ParseError> {
    let mut tokens = tokenize(line)?.into_iter();

    let verb = tokens
        .next()
        .ok_or_else(|| ParseError("empty request".to_string()))?
        .to_ascii_uppercase();

    let mut positional = Vec::new();
    let mut kv = HashMap::new();

    for token in tokens {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                kv.insert(key.to_ascii_lowercase(), value.to_string());
            },
            _ => positional.push(token),
        }
    }

    Ok(Request { verb, positional, kv })
}

/// Splits a line into whitespace-separated tokens, honoring double-quoted
/// segments that may contain escaped `"` and `\`. Quoting only affects the
/// value side of a `key="..."` token: the quotes are stripped and the
/// token yielded is `key=unescaped value`.
fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut chars = line.chars().peekable();
    let mut tokens = Vec::new();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            if c == '"' {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        match chars.next() {
                            Some(escaped) => token.push(escaped),
                            None => break,
                        }
                    } else {
                        token.push(c);
                    }
                }
                if !closed {
                    return Err(ParseError("unterminated quoted string".to_string()));
                }
            } else {
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

/// Formats a scalar `OK` line, optionally with trailing `key=value` pairs
/// in the given order.
pub fn ok_line(pairs: &[(&str, String)]) -> String {
    if pairs.is_empty() {
        "OK".to_string()
    } else {
        let rendered = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("OK {rendered}")
    }
}

/// Formats an `ERR <reason>` line.
pub fn err_line(reason: &str) -> String {
    format!("ERR {reason}")
}
