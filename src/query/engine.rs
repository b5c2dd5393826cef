use crate::error::{LeapError, Result};
use crate::index::{FileId, PostingQuery, TrigramIndex};
use crate::output::{EntryType, ResultEntry, determine_icon};
use crate::query::MAXIMUM_MATCHES;
use crate::query::parser::QueryType;
use crate::query::planner::regexp_query;
use crate::query::scanner;
use crate::query::trimmer::PathTrimmer;
use crate::utils::plumb::JUMP_PREFIX;
use regex::bytes::{Regex, RegexSet};
use std::path::Path;
use std::time::Instant;

/// Confirms candidate files against a content regexp.
///
/// Implemented by the local engine (scans files on this machine) and by the
/// remote bridge (asks a leap server to scan its copy).
pub trait ContentResolver {
    fn content_search_result(&self, file_ids: &[FileId], re: &Regex, pattern: &str) -> Result<Vec<ResultEntry>>;
}

/// Query engine over one opened trigram index.
pub struct QueryEngine {
    index: TrigramIndex,
    trimmer: PathTrimmer,
    prefixes: Option<Vec<String>>,
    jump_prefix: String,
}

impl QueryEngine {
    /// Open the index at `index_path`. Display and name matching trim
    /// `prefixes` when given, else the index's own roots.
    pub fn open(index_path: &Path, prefixes: Option<Vec<String>>) -> Result<Self> {
        let index = TrigramIndex::open(index_path).map_err(|e| LeapError::index_unreadable(index_path, e))?;
        let trimmer = match &prefixes {
            Some(p) => PathTrimmer::new(p),
            None => PathTrimmer::new(index.paths()),
        };
        Ok(Self {
            index,
            trimmer,
            prefixes,
            jump_prefix: JUMP_PREFIX.to_string(),
        })
    }

    /// Where content matches are encoded and copied to
    pub fn with_jump_prefix(mut self, jump_prefix: impl Into<String>) -> Self {
        self.jump_prefix = jump_prefix.into();
        self
    }

    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    pub fn prefixes(&self) -> Option<&[String]> {
        self.prefixes.as_deref()
    }

    pub fn trimmer(&self) -> &PathTrimmer {
        &self.trimmer
    }

    /// Run a query. `patterns` are name regexps in descending order of
    /// desirability; the first of `suffixes` is the line number (filename
    /// mode) or content regexp.
    pub fn query(
        &self,
        patterns: &[String],
        query_type: QueryType,
        suffixes: &[String],
        resolver: &dyn ContentResolver,
    ) -> Result<Vec<ResultEntry>> {
        let start = Instant::now();
        if patterns.is_empty() {
            return Err(LeapError::invalid_pattern("", "no name patterns"));
        }
        let suffix = suffixes.first().map(String::as_str).unwrap_or_default();

        let content = if query_type.is_content() {
            let pattern = format!("(?m){}", suffix);
            let re = Regex::new(&pattern).map_err(|e| LeapError::invalid_pattern(suffix, e))?;
            Some((re, pattern))
        } else {
            None
        };
        let posting = match &content {
            Some((_, pattern)) => regexp_query(pattern),
            None => PostingQuery::All,
        };
        let post = self.index.posting_query(&posting);
        let file_ids = self.matching_files(patterns, &post)?;

        let result = match &content {
            None => Ok(self.filename_result(&file_ids, suffix)),
            Some((re, pattern)) => resolver.content_search_result(&file_ids, re, pattern),
        };

        log::debug!(
            "query {:?} {} {:?}: {} candidates, {} names, took {:?}",
            patterns,
            query_type.marker(),
            suffixes,
            post.len(),
            file_ids.len(),
            start.elapsed()
        );
        result
    }

    /// Filter `post` by name, stopping at [`MAXIMUM_MATCHES`], and order the
    /// survivors by the first pattern each one satisfies.
    pub fn matching_files(&self, patterns: &[String], post: &[FileId]) -> Result<Vec<FileId>> {
        let set = RegexSet::new(patterns).map_err(|e| LeapError::invalid_pattern(&patterns.join("|"), e))?;

        let mut buckets: Vec<Vec<FileId>> = vec![Vec::new(); patterns.len()];
        let mut count = 0;
        for &id in post {
            if count >= MAXIMUM_MATCHES {
                break;
            }
            let name = self.trimmer.trim(self.index.name_bytes(id));
            if let Some(first) = set.matches(name).iter().next() {
                buckets[first].push(id);
                count += 1;
            }
        }

        Ok(buckets.concat())
    }

    /// Entries for a filename-only query; `suffix` (a line number) is
    /// appended to the arg, title and subtitle when present.
    pub fn filename_result(&self, file_ids: &[FileId], suffix: &str) -> Vec<ResultEntry> {
        file_ids
            .iter()
            .map(|&id| {
                let name = self.index.name(id);
                let title = Path::new(&name)
                    .file_name()
                    .map(|b| b.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                let trimmed = self.trimmer.trim_str(&name);
                ResultEntry {
                    uid: name.clone(),
                    arg: extend(&name, suffix),
                    title: extend(&title, suffix),
                    subtitle: extend(trimmed, suffix),
                    entry_type: EntryType::FileNoCheck,
                    icon: determine_icon(&name).to_string(),
                }
            })
            .collect()
    }

    fn names(&self, file_ids: &[FileId]) -> Vec<String> {
        file_ids.iter().map(|&id| self.index.name(id)).collect()
    }
}

impl ContentResolver for QueryEngine {
    fn content_search_result(&self, file_ids: &[FileId], re: &Regex, _pattern: &str) -> Result<Vec<ResultEntry>> {
        Ok(scanner::content_search_result(
            &self.names(file_ids),
            re,
            &self.trimmer,
            &self.jump_prefix,
        ))
    }
}

fn extend(base: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!("{}:{}", base, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexWriter;
    use std::cell::RefCell;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: String,
        engine: QueryEngine,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let mut writer = IndexWriter::new(vec![root.clone()]);
        for (name, content) in files {
            writer.add_file(format!("{}/{}", root, name), content.as_bytes());
        }
        let index_path = dir.path().join("index");
        writer.write(&index_path).unwrap();
        let engine = QueryEngine::open(&index_path, None)
            .unwrap()
            .with_jump_prefix(dir.path().join("jump/glenda").to_string_lossy().into_owned());
        Fixture { _dir: dir, root, engine }
    }

    /// Records what the engine hands to a content resolver
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(Vec<FileId>, String)>>,
    }

    impl ContentResolver for Recorder {
        fn content_search_result(&self, file_ids: &[FileId], _re: &Regex, pattern: &str) -> Result<Vec<ResultEntry>> {
            self.calls.borrow_mut().push((file_ids.to_vec(), pattern.to_string()));
            Ok(Vec::new())
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fuzziness_ordering() {
        let f = fixture(&[
            ("b/aaa.txt", "a"),
            ("b/bbb.txt", "b"),
            ("b/ccc.txt", "c"),
            ("b/ddd.txt", "d"),
        ]);
        let got = f
            .engine
            .query(&strings(&[".*/bbb.*", ".*b.*"]), QueryType::FilenameOnly, &strings(&[""]), &f.engine)
            .unwrap();
        let titles: Vec<&str> = got.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["bbb.txt", "aaa.txt", "ccc.txt", "ddd.txt"]);
    }

    #[test]
    fn test_dedup_across_patterns() {
        let f = fixture(&[("x/one.rs", ""), ("x/two.rs", "")]);
        let got = f
            .engine
            .query(&strings(&["one", "o", ".*"]), QueryType::FilenameOnly, &[], &f.engine)
            .unwrap();
        let uids: Vec<String> = got.iter().map(|e| e.uid.clone()).collect();
        assert_eq!(uids, vec![format!("{}/x/one.rs", f.root), format!("{}/x/two.rs", f.root)]);
    }

    #[test]
    fn test_name_cap() {
        let names: Vec<String> = (0..70).map(|i| format!("d/f{:03}.txt", i)).collect();
        let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "")).collect();
        let f = fixture(&files);
        let got = f
            .engine
            .query(&strings(&["f"]), QueryType::FilenameOnly, &[], &f.engine)
            .unwrap();
        assert_eq!(got.len(), MAXIMUM_MATCHES);
        assert_eq!(got[0].title, "f000.txt");
    }

    #[test]
    fn test_filename_entry_with_line_suffix() {
        let f = fixture(&[("a/aaa.txt", "...\ncarrot\n"), ("b/ccc.txt", "good bye\n")]);
        let got = f
            .engine
            .query(&strings(&[".*c.*"]), QueryType::FilenameOnly, &strings(&["2"]), &f.engine)
            .unwrap();
        assert_eq!(got.len(), 1);
        let e = &got[0];
        let name = format!("{}/b/ccc.txt", f.root);
        assert_eq!(e.uid, name);
        assert_eq!(e.arg, format!("{}:2", name));
        assert_eq!(e.title, "ccc.txt:2");
        assert_eq!(e.subtitle, "b/ccc.txt:2");
        assert_eq!(e.entry_type, EntryType::FileNoCheck);
    }

    #[test]
    fn test_names_match_after_trimming() {
        let f = fixture(&[("src/main.rs", "")]);
        let got = f
            .engine
            .query(&strings(&["^src/"]), QueryType::FilenameOnly, &[], &f.engine)
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_content_mode_delegates_candidates() {
        let f = fixture(&[("a.txt", "carrot\n"), ("b.txt", "turnip\n"), ("c.txt", "carrot cake\n")]);
        let recorder = Recorder::default();
        f.engine
            .query(&strings(&[""]), QueryType::ContentAfterSlash, &strings(&["carrot"]), &recorder)
            .unwrap();
        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (vec![0, 2], "(?m)carrot".to_string()));
    }

    #[test]
    fn test_local_content_search() {
        let f = fixture(&[("a/aaa.txt", "...\ncarrot\n"), ("b/ccc.txt", "good bye\n")]);
        let got = f
            .engine
            .query(&strings(&[""]), QueryType::ContentAfterSlash, &strings(&["carrot"]), &f.engine)
            .unwrap();
        assert!(got.is_empty(), "fixture files exist only in the index");

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("aaa.txt");
        std::fs::write(&file, "...\ncarrot\n").unwrap();
        let mut writer = IndexWriter::new(vec![dir.path().to_string_lossy().into_owned()]);
        writer.add_file(file.to_string_lossy().into_owned(), b"...\ncarrot\n");
        writer.write(&dir.path().join("index")).unwrap();
        let engine = QueryEngine::open(&dir.path().join("index"), None)
            .unwrap()
            .with_jump_prefix(dir.path().join("jump/glenda").to_string_lossy().into_owned());
        let got = engine
            .query(&strings(&[""]), QueryType::ContentAfterSlash, &strings(&["carrot"]), &engine)
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "2 carrot\n");
    }

    #[test]
    fn test_invalid_patterns() {
        let f = fixture(&[("a.txt", "x")]);
        let err = f.engine.query(&[], QueryType::FilenameOnly, &[], &f.engine).unwrap_err();
        assert!(matches!(err, LeapError::InvalidPattern { .. }));

        let err = f
            .engine
            .query(&strings(&["("]), QueryType::FilenameOnly, &[], &f.engine)
            .unwrap_err();
        assert!(matches!(err, LeapError::InvalidPattern { .. }));

        let recorder = Recorder::default();
        let err = f
            .engine
            .query(&strings(&[""]), QueryType::ContentAfterSlash, &strings(&["(car"]), &recorder)
            .unwrap_err();
        assert!(matches!(err, LeapError::InvalidPattern { .. }));
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn test_open_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let err = QueryEngine::open(&dir.path().join("nope"), None).err().unwrap();
        assert!(matches!(err, LeapError::IndexUnreadable { .. }));
    }

    #[test]
    fn test_configured_prefixes_replace_index_roots() {
        let f = fixture(&[("deep/inside/x.go", "")]);
        let index_path = f.engine.index_path().to_path_buf();
        let engine = QueryEngine::open(&index_path, Some(vec![format!("{}/deep", f.root)])).unwrap();
        let got = engine
            .query(&strings(&["x"]), QueryType::FilenameOnly, &[], &engine)
            .unwrap();
        assert_eq!(got[0].subtitle, "inside/x.go");
        assert_eq!(got[0].icon, "golang.icns");
    }
}
