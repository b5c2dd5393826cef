#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Every input parses, and every pattern it yields must compile
    // unless the input supplied a raw regexp.
    let parsed = leap::query::parse(data);
    assert!(!parsed.patterns.is_empty());
    let _ = regex::bytes::RegexSet::new(&parsed.patterns);
    let _ = leap::utils::encoded_to_plumb(data);
});
