//! `_pair.first` / `_pair.second` placeholder rewriting.
//!
//! With `pair = x,y` a query mentioning the placeholders is evaluated for
//! both assignments and OR-ed: `q[first=x, second=y] OR q[first=y, second=x]`.

use serde::{Deserialize, Serialize};

use crate::error::{OlapError, Result};

pub const PAIR_PREFIX: &str = "_pair.";
const FIRST: &str = "first";
const SECOND: &str = "second";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub first: String,
    pub second: String,
}

impl Pair {
    pub fn new(first: &str, second: &str) -> Self {
        Self {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    /// Parse `"x,y"`. Anything other than two non-empty names is invalid.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [first, second] if !first.is_empty() && !second.is_empty() => {
                Ok(Self::new(first, second))
            }
            _ => Err(OlapError::InvalidPair(format!(
                "expected two comma-separated field names, got '{}'",
                spec
            ))),
        }
    }

    /// Replace the placeholders, swapping the two names when `swapped`.
    pub fn substitute(&self, text: &str, swapped: bool) -> String {
        let (first, second) = if swapped {
            (&self.second, &self.first)
        } else {
            (&self.first, &self.second)
        };
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(PAIR_PREFIX) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + PAIR_PREFIX.len()..];
            if let Some(tail) = strip_word(after, FIRST) {
                out.push_str(first);
                rest = tail;
            } else if let Some(tail) = strip_word(after, SECOND) {
                out.push_str(second);
                rest = tail;
            } else {
                out.push_str(PAIR_PREFIX);
                rest = after;
            }
        }
        out.push_str(rest);
        out
    }
}

/// True if `text` mentions either placeholder.
pub fn has_placeholders(text: &str) -> bool {
    let probe = Pair::new("\u{0}", "\u{0}");
    probe.substitute(text, false) != text
}

/// Rewrite query text for a pair. Text without placeholders, or without a
/// pair, is returned unchanged.
pub fn rewrite_query(text: &str, pair: Option<&Pair>) -> String {
    match pair {
        Some(pair) if has_placeholders(text) => format!(
            "({}) OR ({})",
            pair.substitute(text, false),
            pair.substitute(text, true)
        ),
        _ => text.to_string(),
    }
}

fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let tail = text.strip_prefix(word)?;
    match tail.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => None,
        _ => Some(tail),
    }
}
