//! Query input micro-syntax.
//!
//! `<path>[:number]` narrows files by a fuzzy path and optionally names a
//! line. `[<path>]:/<text>` searches contents with a fuzzy pattern,
//! `[<path>]://<regexp>` and `[<path>]#<regexp>` with a raw regexp, and
//! `[<path>]@<symbol>` looks for declarations.

use serde::{Deserialize, Serialize};

/// How a query's suffix is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    /// Match file names only; the suffix is a line number (or empty)
    FilenameOnly,
    /// Content search introduced by `:`
    ContentAfterColon,
    /// Content search introduced by `/`
    ContentAfterSlash,
}

impl QueryType {
    /// Decode the wire marker. `":"` is filename mode, every other marker
    /// requests a content search.
    pub fn from_marker(marker: &str) -> Self {
        match marker {
            ":" => QueryType::FilenameOnly,
            "/" => QueryType::ContentAfterSlash,
            _ => QueryType::ContentAfterColon,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            QueryType::FilenameOnly => ":",
            QueryType::ContentAfterColon => ":/",
            QueryType::ContentAfterSlash => "/",
        }
    }

    pub fn is_content(&self) -> bool {
        !matches!(self, QueryType::FilenameOnly)
    }
}

/// The `(patterns, type, suffix)` triple handed to the query engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Name patterns in descending order of desirability
    pub patterns: Vec<String>,
    pub query_type: QueryType,
    pub suffix: String,
}

const SEPARATORS: [char; 3] = [':', '#', '@'];

/// Split input at the first separator into `(path, separator, rest)`.
pub fn chunk_input(s: &str) -> (&str, &str, &str) {
    match s.find(SEPARATORS) {
        Some(i) => (&s[..i], &s[i..i + 1], &s[i + 1..]),
        None => (s, "", ""),
    }
}

/// Fuzzy regexp for `s`: any characters may appear between the given ones,
/// except around a `/`, which must be matched exactly.
pub fn file_exp(s: &str) -> String {
    let mut out = String::from(".*");
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if let Some(p) = prev
            && p != '/'
            && c != '/'
        {
            out.push_str(".*");
        }
        push_literal(&mut out, c);
        prev = Some(c);
    }
    out.push_str(".*");
    out
}

/// Regexp for a declaration whose identifier contains the characters of `s`
/// in order.
pub fn symbol_exp(s: &str) -> String {
    let mut out = String::from("(func|type|var|const).*");
    for c in s.chars() {
        push_literal(&mut out, c);
        out.push_str("[a-zA-Z_0-9]*");
    }
    out
}

/// `s` if it is a decimal number, else the empty string
pub fn num_check(s: &str) -> &str {
    if s.parse::<i64>().is_ok() { s } else { "" }
}

/// Name patterns for a fuzzy path, best first.
pub fn fuzzy_matchers(path: &str) -> Vec<String> {
    if path.is_empty() {
        return vec![String::new()];
    }
    let spread = path.replace('/', "[^/]*/");
    vec![
        format!("{}[^/]*$", path),
        path.to_string(),
        format!("^{}", spread),
        spread,
        file_exp(path),
    ]
}

/// Parse a full query string.
pub fn parse(s: &str) -> ParsedQuery {
    let (path, sep, rest) = chunk_input(s);
    let patterns = fuzzy_matchers(path);

    let (query_type, suffix) = match sep {
        ":" => match rest.strip_prefix('/') {
            Some(raw) if raw.starts_with('/') => (QueryType::ContentAfterSlash, raw[1..].to_string()),
            Some(fuzzy) => (QueryType::ContentAfterSlash, file_exp(fuzzy)),
            None => (QueryType::FilenameOnly, num_check(rest).to_string()),
        },
        "@" => (QueryType::ContentAfterSlash, symbol_exp(rest)),
        "#" => (QueryType::ContentAfterSlash, rest.to_string()),
        _ => (QueryType::FilenameOnly, String::new()),
    };

    ParsedQuery {
        patterns,
        query_type,
        suffix,
    }
}

fn push_literal(out: &mut String, c: char) {
    if regex_syntax::is_meta_character(c) {
        out.push('\\');
    }
    out.push(c);
}
