#![no_main]

use arbitrary::Arbitrary;
use leap::index::{IndexWriter, TrigramIndex};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    pattern: &'a str,
    files: Vec<&'a [u8]>,
}

fuzz_target!(|input: Input| {
    // The trigram plan may over-approximate but must never drop a file
    // the regexp actually matches.
    let Ok(re) = regex::bytes::Regex::new(input.pattern) else {
        return;
    };
    let query = leap::query::regexp_query(input.pattern);

    let mut writer = IndexWriter::new(vec!["/f".to_string()]);
    for (i, content) in input.files.iter().take(16).enumerate() {
        writer.add_file(format!("/f/{:02}", i), content);
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    writer.write(&path).unwrap();
    let index = TrigramIndex::open(&path).unwrap();
    let candidates = index.posting_query(&query);

    for (i, content) in input.files.iter().take(16).enumerate() {
        if leap::utils::is_binary(content) {
            continue;
        }
        if re.is_match(content) {
            let id = (0..index.file_count()).find(|&id| index.name(id) == format!("/f/{:02}", i));
            if let Some(id) = id {
                assert!(candidates.contains(&id), "{:?} dropped file {}", input.pattern, i);
            }
        }
    }
});
