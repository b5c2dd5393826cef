//! Error taxonomy shared by the query engine, the sync protocol and the server.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, LeapError>;

/// Errors surfaced by leap's core operations.
///
/// Per-file scan failures are reported as [`LeapError::FileUnreadable`] but are
/// logged and swallowed by the scanner rather than returned from a query.
#[derive(Debug, Error)]
pub enum LeapError {
    /// A caller supplied regular expression failed to compile
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A second sync session tried to start while another one is open
    #[error("token mis-match: {0}")]
    TokenMismatch(String),

    /// Connection or transport failure talking to a leap server
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The trigram index file could not be opened, stat'ed or parsed
    #[error("can't use index {}: {reason}", path.display())]
    IndexUnreadable { path: PathBuf, reason: String },

    /// A candidate file could not be read during a content scan
    #[error("can't read {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A fetched block did not match the reference strong checksum
    #[error("block {block} failed strong checksum verification")]
    BlockVerification { block: usize },

    /// Malformed or unexpected message on the wire
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote side reported a failure
    #[error("remote error: {0}")]
    Remote(String),

    /// Configuration could not be loaded, saved or resolved
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LeapError {
    pub fn invalid_pattern(pattern: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn index_unreadable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::IndexUnreadable {
            path: path.into(),
            reason: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_message() {
        let err = LeapError::invalid_pattern("(", "unclosed group");
        assert_eq!(err.to_string(), "invalid pattern \"(\": unclosed group");
    }

    #[test]
    fn test_io_conversion() {
        let err: LeapError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, LeapError::Io(_)));
    }
}
