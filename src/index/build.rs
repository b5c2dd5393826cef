use crate::index::types::{IndexConfig, Trigram};
use crate::index::writer::IndexWriter;
use crate::utils::progress::BuildProgress;
use crate::utils::{extract_trigrams, is_binary};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// What a build did, for reporting back to the caller (or a remote client)
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub roots: Vec<String>,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub unreadable: usize,
}

impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for root in &self.roots {
            writeln!(f, "index {}", root)?;
        }
        write!(
            f,
            "{} files indexed, {} skipped, {} unreadable",
            self.files_indexed, self.files_skipped, self.unreadable
        )
    }
}

/// Index every file under `roots` into the single index file at `index_path`.
pub fn build_index(roots: &[PathBuf], index_path: &Path, config: &IndexConfig, silent: bool) -> Result<BuildSummary> {
    let mut canonical = Vec::with_capacity(roots.len());
    for root in roots {
        let root = root
            .canonicalize()
            .with_context(|| format!("Invalid root {}", root.display()))?;
        canonical.push(root);
    }
    canonical.sort();
    canonical.dedup();

    let mut progress = BuildProgress::start(silent);
    let mut paths = Vec::new();
    for root in &canonical {
        paths.extend(walk_root(root, config));
    }
    progress.found(paths.len());

    let unreadable = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);

    let processed: Vec<(String, Vec<Trigram>)> = paths
        .par_iter()
        .filter_map(|path| {
            progress.file_done();
            let content = match fs::read(path) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("can't read {} for indexing: {}", path.display(), e);
                    unreadable.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            };
            if content.len() as u64 > config.max_file_size || is_binary(&content) {
                skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some((path.to_string_lossy().into_owned(), extract_trigrams(&content)))
        })
        .collect();

    let root_names: Vec<String> = canonical.iter().map(|r| r.to_string_lossy().into_owned()).collect();
    let mut writer = IndexWriter::new(root_names.clone());
    for (name, trigrams) in processed {
        writer.add_trigrams(name, trigrams);
    }
    let files_indexed = writer.file_count();
    progress.writing(index_path);
    writer.write(index_path)?;
    progress.finish(files_indexed);

    let summary = BuildSummary {
        roots: root_names,
        files_indexed,
        files_skipped: skipped.load(Ordering::Relaxed),
        unreadable: unreadable.load(Ordering::Relaxed),
    };
    log::info!("built {}: {}", index_path.display(), summary.to_string().replace('\n', "; "));
    Ok(summary)
}

fn walk_root(root: &Path, config: &IndexConfig) -> Vec<PathBuf> {
    let ignored = config.ignored_dirs.clone();
    WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .ignore(config.respect_gitignore)
        .parents(config.respect_gitignore)
        .filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            !ignored.iter().any(|d| d == name.as_ref())
        })
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .collect()
}
