//! Dotted/indexed path expressions over parsed documents.
//!
//! Supported forms: `data.items[0].name`, `$.data.items[0]`, `['odd.key']`,
//! `["odd key"]`. An empty path or `$` selects the whole document.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::ContractError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    source: String,
    segments: Vec<Segment>,
}

impl Path {
    /// Parses `source`, rejecting malformed expressions with
    /// [`ContractError::InvalidPath`].
    pub fn parse(source: &str) -> Result<Self, ContractError> {
        let invalid = |reason: &str| ContractError::InvalidPath {
            path: source.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut chars = source.trim().chars().peekable();
        if chars.peek() == Some(&'$') {
            chars.next();
        }
        // A bare leading name has no '.' in front of it.
        let mut expect_key = chars.peek().is_some_and(|c| *c != '.' && *c != '[');

        loop {
            if expect_key {
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    if c == ']' {
                        return Err(invalid("unexpected ']' in property name"));
                    }
                    key.push(c);
                    chars.next();
                }
                if key.is_empty() {
                    return Err(invalid("empty property name"));
                }
                segments.push(Segment::Key(key));
                expect_key = false;
                continue;
            }

            match chars.next() {
                None => break,
                Some('.') => {
                    if chars.peek().is_none() {
                        return Err(invalid("path ends with '.'"));
                    }
                    expect_key = true;
                }
                Some('[') => match chars.peek() {
                    Some(&quote @ ('\'' | '"')) => {
                        chars.next();
                        let mut key = String::new();
                        loop {
                            match chars.next() {
                                Some(c) if c == quote => break,
                                Some(c) => key.push(c),
                                None => return Err(invalid("unterminated quoted name")),
                            }
                        }
                        if chars.next() != Some(']') {
                            return Err(invalid("expected ']' after quoted name"));
                        }
                        segments.push(Segment::Key(key));
                    }
                    _ => {
                        let mut digits = String::new();
                        loop {
                            match chars.next() {
                                Some(']') => break,
                                Some(c) => digits.push(c),
                                None => return Err(invalid("unterminated index")),
                            }
                        }
                        let index = digits
                            .trim()
                            .parse::<usize>()
                            .map_err(|_| invalid("index must be a non-negative integer"))?;
                        segments.push(Segment::Index(index));
                    }
                },
                Some(c) => {
                    return Err(invalid(&format!("unexpected character '{c}'")));
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Walks `doc`; `None` when any step is missing.
    pub fn select<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(doc, |current, segment| match segment {
                Segment::Key(key) => current.as_object()?.get(key),
                Segment::Index(index) => current.as_array()?.get(*index),
            })
    }
}

impl FromStr for Path {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
