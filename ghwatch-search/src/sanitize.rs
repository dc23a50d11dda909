//! Query normalisation and URL encoding for the search endpoints.
//!
//! The code search endpoint rejects `fork:` qualifiers, and its parser needs
//! qualifier punctuation (`language:python`, `pushed:>=2024-01-01`) to
//! arrive unescaped. [`encode_lenient`] keeps that punctuation readable;
//! [`encode_strict`] escapes everything and is only used after the API has
//! rejected the lenient form with a 422.

use url::form_urlencoded;

use crate::types::SearchKind;

/// Percent-encoded sequences restored by [`encode_lenient`]:
/// `: ( ) > < = , / |`.
const OPERATOR_ESCAPES: &[(&str, char)] = &[
    ("%3A", ':'),
    ("%28", '('),
    ("%29", ')'),
    ("%3E", '>'),
    ("%3C", '<'),
    ("%3D", '='),
    ("%2C", ','),
    ("%2F", '/'),
    ("%7C", '|'),
];

/// Values accepted after a `fork:` qualifier.
const FORK_VALUES: &[&str] = &["true", "false", "only"];

/// Which encoding a page request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEncoding {
    /// Escape, then restore search-operator punctuation.
    Lenient,
    /// Escape everything.
    Strict,
}

impl QueryEncoding {
    pub fn encode(&self, query: &str) -> String {
        match self {
            Self::Lenient => encode_lenient(query),
            Self::Strict => encode_strict(query),
        }
    }
}

/// Normalise a raw query for `kind`.
///
/// Code queries lose any `fork:true|false|only` qualifier. All queries have
/// whitespace runs collapsed to one space and are trimmed.
pub fn sanitize_query(raw: &str, kind: SearchKind) -> String {
    let stripped = match kind {
        SearchKind::Code => strip_fork_qualifiers(raw),
        SearchKind::Repo => raw.to_owned(),
    };
    collapse_whitespace(&stripped)
}

/// Form-encode `query` and restore the operator punctuation the search
/// parser relies on.
pub fn encode_lenient(query: &str) -> String {
    let mut encoded = encode_strict(query);
    for (escape, ch) in OPERATOR_ESCAPES {
        let restored = ch.to_string();
        encoded = encoded.replace(escape, &restored);
        encoded = encoded.replace(&escape.to_ascii_lowercase(), &restored);
    }
    encoded
}

/// Form-encode `query` (space becomes `+`) without any restoration.
pub fn encode_strict(query: &str) -> String {
    form_urlencoded::byte_serialize(query.trim().as_bytes()).collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Remove every `fork\s*:\s*(true|false|only)` occurrence, matched
/// case-insensitively on word boundaries.
fn strip_fork_qualifiers(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut copied_to = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = match_fork_at(bytes, i) {
            out.push_str(&raw[copied_to..i]);
            copied_to = end;
            i = end;
        } else {
            i += 1;
        }
    }
    out.push_str(&raw[copied_to..]);
    out
}

/// If a fork qualifier starts at byte `start`, return the byte index just
/// past it.
fn match_fork_at(bytes: &[u8], start: usize) -> Option<usize> {
    if start > 0 && is_word_byte(bytes[start - 1]) {
        return None;
    }
    let mut i = start;
    if !bytes[i..].starts_with(b"fork") {
        return None;
    }
    i += 4;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if bytes.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    FORK_VALUES.iter().find_map(|value| {
        let end = i + value.len();
        let matches = bytes[i..].starts_with(value.as_bytes())
            && bytes.get(end).is_none_or(|b| !is_word_byte(*b));
        matches.then_some(end)
    })
}
