//! End-to-end queries against an index built from a small fixture tree.

use leap::LeapError;
use leap::index::{IndexConfig, build_index};
use leap::output::{EntryType, ResultEntry};
use leap::query::{MAXIMUM_MATCHES, QueryEngine, QueryType, parse};
use std::fs;
use std::path::{Path, PathBuf};

const TXT_ICON: &str = "/Applications/TextEdit.app/Contents/Resources/txt.icns";

struct Fixture {
    _dir: tempfile::TempDir,
    /// Canonical `test_data` root the index was built over
    root: PathBuf,
    jump: String,
    engine: QueryEngine,
}

impl Fixture {
    fn path(&self, rel: &str) -> String {
        self.root.join(rel).to_string_lossy().into_owned()
    }

    fn query(&self, patterns: &[&str], query_type: QueryType, suffix: &str) -> Result<Vec<ResultEntry>, LeapError> {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        self.engine
            .query(&patterns, query_type, &[suffix.to_string()], &self.engine)
    }
}

fn fixture() -> Fixture {
    fixture_with_prefixes(None)
}

fn fixture_with_prefixes(prefixes: Option<Vec<String>>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("test_data");
    let b = root.join("b");
    fs::create_dir_all(&b).unwrap();

    fs::write(b.join("aaa.txt"), "potato\ncarrot\nbeet\n").unwrap();
    let mut bbb = "parsnip\n".repeat(7616);
    bbb.push_str("turnip");
    fs::write(b.join("bbb.txt"), bbb).unwrap();
    fs::write(b.join("ccc.txt"), "onion\nleek\nkale\nbeet\n").unwrap();
    fs::write(b.join("ddd.txt"), "broccoli\n".repeat(MAXIMUM_MATCHES + 10)).unwrap();

    let root = root.canonicalize().unwrap();
    let index_path = dir.path().join("index");
    build_index(&[root.clone()], &index_path, &IndexConfig::default(), true).unwrap();

    let jump = dir.path().join(".leaping/glenda").to_string_lossy().into_owned();
    let parent = dir.path().canonicalize().unwrap().to_string_lossy().into_owned();
    let prefixes = prefixes.map(|p| p.into_iter().map(|s| s.replace("{parent}", &parent)).collect());
    let engine = QueryEngine::open(&index_path, prefixes)
        .unwrap()
        .with_jump_prefix(jump.clone());
    Fixture {
        _dir: dir,
        root,
        jump,
        engine,
    }
}

fn file_entry(f: &Fixture, rel: &str, title: &str, subtitle: &str, suffix: &str) -> ResultEntry {
    let name = f.path(rel);
    let arg = if suffix.is_empty() {
        name.clone()
    } else {
        format!("{}:{}", name, suffix)
    };
    ResultEntry {
        uid: name,
        arg,
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        entry_type: EntryType::FileNoCheck,
        icon: TXT_ICON.to_string(),
    }
}

fn content_entry(f: &Fixture, rel: &str, line: usize, text: &str) -> ResultEntry {
    let name = f.path(rel);
    let base = Path::new(rel).file_name().unwrap().to_string_lossy().into_owned();
    ResultEntry {
        uid: format!("{}:{}", name, line),
        arg: format!("{}:{}{}", f.jump, line, name),
        title: format!("{} {}", line, text),
        subtitle: format!(".../{}:{} {}", base, line, text),
        entry_type: EntryType::File,
        icon: TXT_ICON.to_string(),
    }
}

#[test]
fn no_match_filename_only() {
    let f = fixture();
    assert!(f.query(&[".*z.*"], QueryType::FilenameOnly, "").unwrap().is_empty());
}

#[test]
fn one_match_filename_only() {
    let f = fixture();
    let got = f.query(&[".*c.*"], QueryType::FilenameOnly, "").unwrap();
    assert_eq!(got, vec![file_entry(&f, "b/ccc.txt", "ccc.txt", "b/ccc.txt", "")]);
}

#[test]
fn one_match_filename_with_line_number() {
    let f = fixture();
    let got = f.query(&[".*c.*"], QueryType::FilenameOnly, "2").unwrap();
    assert_eq!(got, vec![file_entry(&f, "b/ccc.txt", "ccc.txt:2", "b/ccc.txt:2", "2")]);
}

#[test]
fn configured_prefix_replaces_index_roots() {
    for prefix in ["{parent}", "{parent}/"] {
        let f = fixture_with_prefixes(Some(vec![prefix.to_string()]));
        let got = f.query(&[".*c.*"], QueryType::FilenameOnly, "2").unwrap();
        assert_eq!(
            got,
            vec![file_entry(&f, "b/ccc.txt", "ccc.txt:2", "test_data/b/ccc.txt:2", "2")]
        );
    }
}

#[test]
fn one_match_content() {
    let f = fixture();
    let got = f.query(&[""], QueryType::ContentAfterSlash, "carrot").unwrap();
    assert_eq!(got, vec![content_entry(&f, "b/aaa.txt", 2, "carrot\n")]);
    // The match is copied where its arg points.
    assert_eq!(fs::read_to_string(&got[0].arg).unwrap(), "potato\ncarrot\nbeet\n");
}

#[test]
fn bad_file_regexp() {
    let f = fixture();
    let err = f.query(&[")*"], QueryType::ContentAfterSlash, "").unwrap_err();
    assert!(matches!(err, LeapError::InvalidPattern { .. }));
}

#[test]
fn bad_content_regexp() {
    let f = fixture();
    let err = f.query(&[""], QueryType::ContentAfterSlash, ")*").unwrap_err();
    assert!(matches!(err, LeapError::InvalidPattern { .. }));
}

#[test]
fn missing_file_is_skipped() {
    let f = fixture();
    fs::remove_file(f.root.join("b/aaa.txt")).unwrap();
    let got = f.query(&[""], QueryType::ContentAfterSlash, "beet").unwrap();
    assert_eq!(got, vec![content_entry(&f, "b/ccc.txt", 4, "beet\n")]);
}

#[test]
fn large_file_last_line() {
    let f = fixture();
    let got = f.query(&[""], QueryType::ContentAfterSlash, "turnip").unwrap();
    assert_eq!(got, vec![content_entry(&f, "b/bbb.txt", 7617, "turnip")]);
}

#[test]
fn many_matches_are_capped() {
    let f = fixture();
    let got = f.query(&[""], QueryType::ContentAfterSlash, "broccoli").unwrap();
    let expected: Vec<ResultEntry> = (1..=MAXIMUM_MATCHES)
        .map(|n| content_entry(&f, "b/ddd.txt", n, "broccoli\n"))
        .collect();
    assert_eq!(got, expected);
}

#[test]
fn multi_pattern_order() {
    let f = fixture();
    let got = f.query(&[".*/bbb.*", ".*b.*"], QueryType::FilenameOnly, "").unwrap();
    let expected: Vec<ResultEntry> = ["bbb.txt", "aaa.txt", "ccc.txt", "ddd.txt"]
        .iter()
        .map(|n| file_entry(&f, &format!("b/{}", n), n, &format!("b/{}", n), ""))
        .collect();
    assert_eq!(got, expected);
}

#[test]
fn parsed_input_end_to_end() {
    let f = fixture();

    let parsed = parse("ccc:4");
    let got = f
        .engine
        .query(&parsed.patterns, parsed.query_type, &[parsed.suffix], &f.engine)
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].title, "ccc.txt:4");

    let parsed = parse("b/a:/carrot");
    let got = f
        .engine
        .query(&parsed.patterns, parsed.query_type, &[parsed.suffix], &f.engine)
        .unwrap();
    assert_eq!(got, vec![content_entry(&f, "b/aaa.txt", 2, "carrot\n")]);
}
