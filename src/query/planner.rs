//! Derives a trigram posting query from a regular expression.
//!
//! The analysis walks the parsed HIR and tracks, per node, either the exact
//! set of strings it can match (while that set stays small) or a posting query
//! every match must satisfy. The result over-approximates: it may admit files
//! without a match, never the reverse.

use crate::index::types::PostingQuery;
use regex_syntax::hir::{Class, Hir, HirKind};

/// Largest exact-string set tracked before degrading to a trigram query
const MAX_EXACT_SET: usize = 64;

/// Largest character class expanded into alternatives
const MAX_CLASS_SIZE: usize = 8;

/// Analysis result for one HIR node
struct Info {
    /// Every string the node can match, if small enough to enumerate
    exact: Option<Vec<Vec<u8>>>,
    /// Must hold for any file containing a match (used when `exact` is None)
    query: PostingQuery,
}

impl Info {
    fn exact(strings: Vec<Vec<u8>>) -> Self {
        Self {
            exact: Some(strings),
            query: PostingQuery::All,
        }
    }

    fn any() -> Self {
        Self {
            exact: None,
            query: PostingQuery::All,
        }
    }

    fn into_query(self) -> PostingQuery {
        match self.exact {
            Some(strings) => strings
                .iter()
                .map(|s| PostingQuery::literal(s))
                .fold(PostingQuery::None, PostingQuery::or),
            None => self.query,
        }
    }
}

/// Build the posting query for `pattern`. Patterns the parser rejects match
/// every file, leaving the decision to the regex engine.
pub fn regexp_query(pattern: &str) -> PostingQuery {
    match regex_syntax::Parser::new().parse(pattern) {
        Ok(hir) => analyze(&hir).into_query(),
        Err(e) => {
            log::debug!("planner can't parse {:?}: {}", pattern, e);
            PostingQuery::All
        }
    }
}

fn analyze(hir: &Hir) -> Info {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => Info::exact(vec![Vec::new()]),
        HirKind::Literal(lit) => Info::exact(vec![lit.0.to_vec()]),
        HirKind::Class(class) => match class_strings(class) {
            Some(strings) => Info::exact(strings),
            None => Info::any(),
        },
        HirKind::Capture(cap) => analyze(&cap.sub),
        HirKind::Repetition(rep) => {
            if rep.min == 0 {
                return Info::any();
            }
            let sub = analyze(&rep.sub);
            if rep.min == 1 && rep.max == Some(1) {
                return sub;
            }
            Info {
                exact: None,
                query: sub.into_query(),
            }
        }
        HirKind::Concat(parts) => {
            let mut acc = Info::exact(vec![Vec::new()]);
            for part in parts {
                acc = concat(acc, analyze(part));
            }
            acc
        }
        HirKind::Alternation(alts) => {
            let infos: Vec<Info> = alts.iter().map(analyze).collect();
            let all_exact = infos.iter().all(|i| i.exact.is_some());
            let total: usize = infos.iter().filter_map(|i| i.exact.as_ref()).map(Vec::len).sum();
            if all_exact && total <= MAX_EXACT_SET {
                let mut strings: Vec<Vec<u8>> = infos.into_iter().flat_map(|i| i.exact.unwrap_or_default()).collect();
                strings.sort();
                strings.dedup();
                return Info::exact(strings);
            }
            Info {
                exact: None,
                query: infos
                    .into_iter()
                    .map(Info::into_query)
                    .fold(PostingQuery::None, PostingQuery::or),
            }
        }
    }
}

fn concat(left: Info, right: Info) -> Info {
    if let (Some(l), Some(r)) = (&left.exact, &right.exact)
        && l.len().saturating_mul(r.len()) <= MAX_EXACT_SET
    {
        let mut product = Vec::with_capacity(l.len() * r.len());
        for a in l {
            for b in r {
                let mut s = a.clone();
                s.extend_from_slice(b);
                product.push(s);
            }
        }
        return Info::exact(product);
    }

    Info {
        exact: None,
        query: left.into_query().and(right.into_query()),
    }
}

/// Expand a small class into its member strings (UTF-8 encoded for unicode
/// classes).
fn class_strings(class: &Class) -> Option<Vec<Vec<u8>>> {
    match class {
        Class::Unicode(cls) => {
            let mut size = 0usize;
            for r in cls.ranges() {
                size += (r.end() as usize) - (r.start() as usize) + 1;
                if size > MAX_CLASS_SIZE {
                    return None;
                }
            }
            let mut out = Vec::with_capacity(size);
            let mut buf = [0u8; 4];
            for r in cls.ranges() {
                for c in r.start()..=r.end() {
                    out.push(c.encode_utf8(&mut buf).as_bytes().to_vec());
                }
            }
            Some(out)
        }
        Class::Bytes(cls) => {
            let mut size = 0usize;
            for r in cls.ranges() {
                size += (r.end() as usize) - (r.start() as usize) + 1;
                if size > MAX_CLASS_SIZE {
                    return None;
                }
            }
            Some(cls.ranges().iter().flat_map(|r| (r.start()..=r.end()).map(|b| vec![b])).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bytes_to_trigram;

    fn tri(s: &[u8; 3]) -> PostingQuery {
        PostingQuery::Trigram(bytes_to_trigram(s[0], s[1], s[2]))
    }

    #[test]
    fn test_short_literals_match_everything() {
        assert_eq!(regexp_query("(?m)ab"), PostingQuery::All);
        assert_eq!(regexp_query("(?m)"), PostingQuery::All);
        assert_eq!(regexp_query("(?m).*"), PostingQuery::All);
    }

    #[test]
    fn test_literal_requires_all_trigrams() {
        assert_eq!(regexp_query("(?m)carrot"), PostingQuery::literal(b"carrot"));
        assert!(matches!(regexp_query("carrot"), PostingQuery::And(v) if v.len() == 4));
        assert_eq!(regexp_query("abc"), tri(b"abc"));
    }

    #[test]
    fn test_alternation_becomes_or() {
        let q = regexp_query("carrot|turnip");
        assert_eq!(q, PostingQuery::literal(b"carrot").or(PostingQuery::literal(b"turnip")));
    }

    #[test]
    fn test_optional_parts_are_dropped() {
        assert_eq!(regexp_query("car(rot)?"), PostingQuery::literal(b"car"));
        assert_eq!(
            regexp_query("^func.*main"),
            PostingQuery::literal(b"func").and(PostingQuery::literal(b"main"))
        );
    }

    #[test]
    fn test_small_classes_expand() {
        let q = regexp_query("ca[rt]");
        assert_eq!(q, PostingQuery::literal(b"car").or(PostingQuery::literal(b"cat")));
    }

    #[test]
    fn test_case_insensitive_literal_is_not_all() {
        let q = regexp_query("(?i)abc");
        assert_ne!(q, PostingQuery::All);
        assert!(matches!(q, PostingQuery::Or(ref v) if v.len() == 8));
    }

    #[test]
    fn test_unparseable_matches_everything() {
        assert_eq!(regexp_query("("), PostingQuery::All);
    }
}
