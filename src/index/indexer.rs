//! Re-indexing on behalf of the sync server.

use crate::error::{LeapError, Result};
use crate::index::build::build_index;
use crate::index::reader::TrigramIndex;
use crate::index::types::IndexConfig;
use std::path::{Path, PathBuf};
use std::process::Command;

pub use crate::utils::config::INDEX_ENV;

/// Rebuilds the index file at `index_path`, returning the indexer's combined
/// output for display to the user.
pub trait Indexer: Send + Sync {
    fn re_index(&self, index_path: &Path, args: &[String]) -> Result<Vec<u8>>;
}

/// Rebuilds the index in this process.
///
/// With no extra arguments the roots recorded in the existing index are
/// re-walked; otherwise the arguments are the roots.
#[derive(Debug, Clone, Default)]
pub struct InProcessIndexer {
    pub config: IndexConfig,
}

impl Indexer for InProcessIndexer {
    fn re_index(&self, index_path: &Path, args: &[String]) -> Result<Vec<u8>> {
        let roots: Vec<PathBuf> = if args.is_empty() {
            let existing = TrigramIndex::open(index_path).map_err(|e| LeapError::index_unreadable(index_path, e))?;
            existing.paths().iter().map(PathBuf::from).collect()
        } else {
            args.iter().map(PathBuf::from).collect()
        };
        if roots.is_empty() {
            return Err(LeapError::index_unreadable(index_path, "no roots to index"));
        }

        let summary =
            build_index(&roots, index_path, &self.config, true).map_err(|e| LeapError::index_unreadable(index_path, e))?;
        Ok(format!("{}\n", summary).into_bytes())
    }
}

/// Runs an external indexing program with [`INDEX_ENV`] pointing at the
/// index file.
#[derive(Debug, Clone)]
pub struct CommandIndexer {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandIndexer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

impl Indexer for CommandIndexer {
    fn re_index(&self, index_path: &Path, args: &[String]) -> Result<Vec<u8>> {
        log::info!("indexpath: {} via {}", index_path.display(), self.program);
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(args)
            .env(INDEX_ENV, index_path)
            .output()
            .map_err(|e| LeapError::Remote(format!("can't run {} because: {}", self.program, e)))?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        if !output.status.success() {
            return Err(LeapError::Remote(format!(
                "{} failed ({}): {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&combined).trim_end()
            )));
        }
        Ok(combined)
    }
}
