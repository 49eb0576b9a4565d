//! Identifier normalization and natural ordering
//!
//! Two identifiers denote the same document exactly when their normalized keys
//! are equal. Normalization is pure and idempotent:
//!
//! 1. trim leading/trailing whitespace
//! 2. remove all remaining whitespace
//! 3. remove the separator characters `-`, `–`, `—`, `_` and `/`
//! 4. uppercase
//!
//! Dots are kept, so `GB/T 1.1-2020` normalizes to `GBT1.12020`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const SEPARATORS: [char; 5] = ['-', '\u{2013}', '\u{2014}', '_', '/'];

/// Normalize an identifier for equality comparison
///
/// Returns an empty string for blank input; such keys must not be merged.
pub fn normalize(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
        .flat_map(char::to_uppercase)
        .collect()
}

/// A non-empty normalized identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Normalize `identifier`, returning None when nothing is left
    pub fn new(identifier: &str) -> Option<Self> {
        let key = normalize(identifier);
        if key.is_empty() { None } else { Some(Self(key)) }
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compare identifiers so that embedded numbers sort by value
///
/// `GB/T 2-2000` sorts before `GB/T 10-2000`. Text runs compare
/// case-insensitively. Ties fall back to plain string order so the
/// ordering is total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = chunks(a);
    let right = chunks(b);
    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Chunk::Number(x), Chunk::Number(y)) => compare_digits(x, y),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
            (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;
    for (idx, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                out.push(chunk(&s[start..idx], prev));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(digit) = in_digits {
        out.push(chunk(&s[start..], digit));
    }
    out
}

fn chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits { Chunk::Number(s) } else { Chunk::Text(s) }
}

// Compares arbitrarily long digit runs without overflowing.
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
