use crate::index::types::*;
use crate::utils::{delta_encode, extract_trigrams, is_binary, write_u32_le, write_u64_le};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Builds a single-file trigram index.
///
/// File ids are assigned at write time in sorted name order so that the same
/// set of files always produces byte-identical output.
pub struct IndexWriter {
    roots: Vec<String>,
    files: Vec<(String, Vec<Trigram>)>,
}

impl IndexWriter {
    pub fn new(roots: Vec<String>) -> Self {
        Self {
            roots,
            files: Vec::new(),
        }
    }

    /// Add a file's content. Returns false if the file was skipped as binary.
    pub fn add_file(&mut self, name: impl Into<String>, content: &[u8]) -> bool {
        if is_binary(content) {
            return false;
        }
        self.add_trigrams(name, extract_trigrams(content));
        true
    }

    /// Add a file whose trigrams were extracted elsewhere (parallel build)
    pub fn add_trigrams(&mut self, name: impl Into<String>, trigrams: Vec<Trigram>) {
        self.files.push((name.into(), trigrams));
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Write the index to `index_path`, replacing any existing file only once
    /// the new one is complete.
    pub fn write(self, index_path: &Path) -> Result<()> {
        if let Some(parent) = index_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut tmp = index_path.as_os_str().to_owned();
        tmp.push(format!(".tmp-{}", std::process::id()));
        let tmp = PathBuf::from(tmp);

        let file = File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
        let result = self.write_to(BufWriter::new(file));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, index_path)
            .with_context(|| format!("Failed to move index into place at {}", index_path.display()))?;
        Ok(())
    }

    /// Serialize the index. Layout: magic, roots, names, postings, dictionary,
    /// trailer of section offsets.
    pub fn write_to<W: Write>(mut self, mut out: W) -> Result<()> {
        self.files.sort_by(|a, b| a.0.cmp(&b.0));
        self.files.dedup_by(|a, b| a.0 == b.0);

        let mut postings: BTreeMap<Trigram, Vec<FileId>> = BTreeMap::new();
        for (id, (_, trigrams)) in self.files.iter().enumerate() {
            for &t in trigrams {
                postings.entry(t).or_default().push(id as FileId);
            }
        }

        let mut offset: u64 = 0;
        out.write_all(INDEX_MAGIC)?;
        offset += INDEX_MAGIC.len() as u64;

        let roots_off = offset;
        offset += write_strings(&mut out, self.roots.iter().map(String::as_str))?;

        let names_off = offset;
        offset += write_strings(&mut out, self.files.iter().map(|(n, _)| n.as_str()))?;

        let postings_off = offset;
        let mut dict = Vec::with_capacity(postings.len());
        let mut buf = Vec::new();
        for (trigram, ids) in &postings {
            buf.clear();
            delta_encode(ids, &mut buf);
            out.write_all(&buf)?;
            dict.push((*trigram, offset - postings_off, buf.len() as u32, ids.len() as u32));
            offset += buf.len() as u64;
        }

        let dict_off = offset;
        write_u32_le(&mut out, dict.len() as u32)?;
        for (trigram, rel_offset, length, doc_freq) in dict {
            write_u32_le(&mut out, trigram)?;
            write_u64_le(&mut out, rel_offset)?;
            write_u32_le(&mut out, length)?;
            write_u32_le(&mut out, doc_freq)?;
        }

        write_u64_le(&mut out, roots_off)?;
        write_u64_le(&mut out, names_off)?;
        write_u64_le(&mut out, postings_off)?;
        write_u64_le(&mut out, dict_off)?;
        out.write_all(INDEX_MAGIC)?;
        out.flush()?;

        Ok(())
    }
}

/// Count-prefixed list of length-prefixed strings. Returns bytes written.
fn write_strings<'a, W: Write>(out: &mut W, items: impl ExactSizeIterator<Item = &'a str>) -> Result<u64> {
    let mut written = 4u64;
    write_u32_le(out, items.len() as u32)?;
    for s in items {
        write_u32_le(out, s.len() as u32)?;
        out.write_all(s.as_bytes())?;
        written += 4 + s.len() as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(writer: IndexWriter) -> Vec<u8> {
        let mut buf = Vec::new();
        writer.write_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut a = IndexWriter::new(vec!["/r".to_string()]);
        a.add_file("/r/b.txt", b"turnip");
        a.add_file("/r/a.txt", b"carrot");

        let mut b = IndexWriter::new(vec!["/r".to_string()]);
        b.add_file("/r/a.txt", b"carrot");
        b.add_file("/r/b.txt", b"turnip");

        assert_eq!(serialize(a), serialize(b));
    }

    #[test]
    fn test_binary_files_skipped() {
        let mut w = IndexWriter::new(Vec::new());
        assert!(!w.add_file("/bin", &[0u8; 64]));
        assert!(w.add_file("/text", b"plain text"));
        assert_eq!(w.file_count(), 1);
    }

    #[test]
    fn test_magic_framing() {
        let bytes = serialize(IndexWriter::new(Vec::new()));
        assert!(bytes.starts_with(INDEX_MAGIC));
        assert!(bytes.ends_with(INDEX_MAGIC));
        assert!(bytes.len() >= INDEX_MAGIC.len() + TRAILER_SIZE);
    }
}
