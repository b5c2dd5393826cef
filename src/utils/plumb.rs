//! Encoded "jump to line" paths.
//!
//! A content match is shipped as `<JUMP_PREFIX>:<line><path>` so the arg
//! still ends in the file's real extension. Decoding turns it back into
//! the `path:line` form a plumber or editor understands.

use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

/// Unlikely to collide with anything a real tree has at the root
pub const JUMP_PREFIX: &str = "/tmp/.leaping/glenda";

/// Directory holding the copies made under [`JUMP_PREFIX`]
pub const SENTINEL_DIR: &str = "/tmp/.leaping";

/// Splits an encoded path into its line number and file path
pub struct PlumbDecoder {
    re: Regex,
}

impl PlumbDecoder {
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!("(.*{}:([0-9]+))?(.*)", regex::escape(prefix)))?;
        Ok(Self { re })
    }

    fn parts<'s>(&self, s: &'s str) -> (&'s str, &'s str) {
        match self.re.captures(s) {
            Some(caps) => (
                caps.get(2).map_or("", |m| m.as_str()),
                caps.get(3).map_or("", |m| m.as_str()),
            ),
            None => ("", ""),
        }
    }

    /// `path:line`, or just the path when nothing is encoded
    pub fn to_plumb(&self, s: &str) -> String {
        match self.parts(s) {
            ("", file) => file.to_string(),
            (number, file) => format!("{}:{}", file, number),
        }
    }

    pub fn to_file<'s>(&self, s: &'s str) -> &'s str {
        self.parts(s).1
    }

    pub fn to_number<'s>(&self, s: &'s str) -> &'s str {
        self.parts(s).0
    }
}

static DECODER: LazyLock<Option<PlumbDecoder>> = LazyLock::new(|| PlumbDecoder::new(JUMP_PREFIX).ok());

pub fn encoded_to_plumb(s: &str) -> String {
    DECODER.as_ref().map_or_else(|| s.to_string(), |d| d.to_plumb(s))
}

pub fn encoded_to_file(s: &str) -> String {
    DECODER.as_ref().map_or(s, |d| d.to_file(s)).to_string()
}

pub fn encoded_to_number(s: &str) -> String {
    DECODER.as_ref().map_or("", |d| d.to_number(s)).to_string()
}

/// Drop copies left behind by earlier content queries
pub fn clear_sentinel_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_to_plumb() {
        assert_eq!(encoded_to_plumb("/ab"), "/ab");
        assert_eq!(encoded_to_plumb(&format!("/{}:100/ab", JUMP_PREFIX)), "/ab:100");
        assert_eq!(
            encoded_to_plumb("/tmp/.leaping/glenda:5/home/gopher/src/leap/main.go"),
            "/home/gopher/src/leap/main.go:5"
        );
    }

    #[test]
    fn test_encoded_to_file_and_number() {
        assert_eq!(encoded_to_file("/ab"), "/ab");
        assert_eq!(encoded_to_number("/ab"), "");
        let encoded = format!("{}:100/ab", JUMP_PREFIX);
        assert_eq!(encoded_to_file(&encoded), "/ab");
        assert_eq!(encoded_to_number(&encoded), "100");
    }

    #[test]
    fn test_prefix_dot_is_literal() {
        // `.` in the prefix must not match other characters.
        assert_eq!(encoded_to_plumb("/tmp/xleaping/glenda:5/ab"), "/tmp/xleaping/glenda:5/ab");
    }

    #[test]
    fn test_custom_prefix() {
        let decoder = PlumbDecoder::new("/scratch/jump").unwrap();
        assert_eq!(decoder.to_plumb("/scratch/jump:12/src/lib.rs"), "/src/lib.rs:12");
    }

    #[test]
    fn test_clear_sentinel_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join(".leaping");
        fs::create_dir_all(sentinel.join("glenda:2/a")).unwrap();
        clear_sentinel_dir(&sentinel).unwrap();
        assert!(!sentinel.exists());
        clear_sentinel_dir(&sentinel).unwrap();
    }
}
