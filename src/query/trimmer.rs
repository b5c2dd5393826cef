/// Strips configured (or index-derived) root prefixes from file names for
/// display and name matching.
#[derive(Debug, Clone, Default)]
pub struct PathTrimmer {
    prefixes: Vec<Vec<u8>>,
}

impl PathTrimmer {
    /// Each prefix gets a trailing `/` so trimming never leaves a leading one.
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Self {
        let prefixes = prefixes
            .iter()
            .map(|p| {
                let mut p = p.as_ref().as_bytes().to_vec();
                if p.last() != Some(&b'/') {
                    p.push(b'/');
                }
                p
            })
            .collect();
        Self { prefixes }
    }

    /// Remove every prefix in turn. A prefix that doesn't match is skipped.
    pub fn trim<'a>(&self, mut name: &'a [u8]) -> &'a [u8] {
        for p in &self.prefixes {
            if let Some(rest) = name.strip_prefix(p.as_slice()) {
                name = rest;
            }
        }
        name
    }

    pub fn trim_str<'a>(&self, name: &'a str) -> &'a str {
        let trimmed = self.trim(name.as_bytes());
        // Only whole prefixes ending in '/' are removed, so the cut is on a
        // char boundary.
        &name[name.len() - trimmed.len()..]
    }
}
