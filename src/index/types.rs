use serde::{Deserialize, Serialize};

/// Identifies a file within one opened index. Stable only for that index.
pub type FileId = u32;

/// A trigram is a 3-byte sequence stored as u32 (only lower 24 bits used)
pub type Trigram = u32;

/// Leading and trailing magic of an index file
pub const INDEX_MAGIC: &[u8; 8] = b"LEAPIDX1";

/// Trailer: four u64 section offsets followed by the magic
pub const TRAILER_SIZE: usize = 4 * 8 + INDEX_MAGIC.len();

/// Size of one trigram dictionary record
pub const DICT_ENTRY_SIZE: usize = 4 + 8 + 4 + 4;

/// A posting-list query over the trigram index.
///
/// Evaluates to the set of files that could contain a match. The final
/// verification happens against file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingQuery {
    /// Every indexed file
    All,
    /// No file
    None,
    /// Files containing this trigram
    Trigram(Trigram),
    And(Vec<PostingQuery>),
    Or(Vec<PostingQuery>),
}

impl PostingQuery {
    /// Files containing all trigrams of `literal`; `All` for literals shorter
    /// than three bytes.
    pub fn literal(literal: &[u8]) -> Self {
        let trigrams = crate::utils::extract_trigrams(literal);
        match trigrams.len() {
            0 => PostingQuery::All,
            1 => PostingQuery::Trigram(trigrams[0]),
            _ => PostingQuery::And(trigrams.into_iter().map(PostingQuery::Trigram).collect()),
        }
    }

    /// Conjunction, simplified
    pub fn and(self, other: PostingQuery) -> Self {
        match (self, other) {
            (PostingQuery::None, _) | (_, PostingQuery::None) => PostingQuery::None,
            (PostingQuery::All, q) | (q, PostingQuery::All) => q,
            (PostingQuery::And(mut a), PostingQuery::And(b)) => {
                a.extend(b);
                PostingQuery::And(a)
            }
            (PostingQuery::And(mut a), q) | (q, PostingQuery::And(mut a)) => {
                a.push(q);
                PostingQuery::And(a)
            }
            (a, b) => PostingQuery::And(vec![a, b]),
        }
    }

    /// Disjunction, simplified
    pub fn or(self, other: PostingQuery) -> Self {
        match (self, other) {
            (PostingQuery::All, _) | (_, PostingQuery::All) => PostingQuery::All,
            (PostingQuery::None, q) | (q, PostingQuery::None) => q,
            (PostingQuery::Or(mut a), PostingQuery::Or(b)) => {
                a.extend(b);
                PostingQuery::Or(a)
            }
            (PostingQuery::Or(mut a), q) | (q, PostingQuery::Or(mut a)) => {
                a.push(q);
                PostingQuery::Or(a)
            }
            (a, b) => PostingQuery::Or(vec![a, b]),
        }
    }
}

/// Configuration for index building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Files larger than this are skipped
    pub max_file_size: u64,
    /// Directory names never descended into
    pub ignored_dirs: Vec<String>,
    /// Honour .gitignore and friends while walking
    pub respect_gitignore: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1 << 30,
            ignored_dirs: vec![
                ".git".to_string(),
                ".hg".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
            ],
            respect_gitignore: false,
        }
    }
}
