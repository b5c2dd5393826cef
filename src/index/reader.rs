use crate::index::types::*;
use crate::utils::{delta_decode, u32_at, u64_at};
use anyhow::{Context, Result, bail};
use memmap2::Mmap;
use roaring::RoaringBitmap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Trigram dictionary entry
struct TrigramDictEntry {
    trigram: Trigram,
    offset: u64,
    length: u32,
    #[allow(dead_code)]
    doc_freq: u32,
}

/// Memory-mapped reader over a single-file trigram index.
///
/// Exposes just what the query engine needs: posting queries, name lookup by
/// file id, and the index's own root paths.
pub struct TrigramIndex {
    path: PathBuf,
    data: Mmap,
    roots: Vec<String>,
    names: Vec<Range<usize>>,
    postings: Range<usize>,
    dict: Vec<TrigramDictEntry>,
}

impl TrigramIndex {
    /// Open and validate an index file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open index {}", path.display()))?;
        // The index is only ever replaced by rename, never rewritten in place.
        let data = unsafe { Mmap::map(&file)? };

        let len = data.len();
        if len < INDEX_MAGIC.len() + TRAILER_SIZE || !data.starts_with(INDEX_MAGIC) || !data.ends_with(INDEX_MAGIC) {
            bail!("{} is not a leap index", path.display());
        }

        let trailer = len - TRAILER_SIZE;
        let offset = |i: usize| -> Result<usize> {
            let v = u64_at(&data, trailer + i * 8).context("Truncated trailer")?;
            let v = usize::try_from(v)?;
            if v > trailer {
                bail!("Section offset {} out of range", v);
            }
            Ok(v)
        };
        let (roots_off, names_off, postings_off, dict_off) = (offset(0)?, offset(1)?, offset(2)?, offset(3)?);
        if !(roots_off <= names_off && names_off <= postings_off && postings_off <= dict_off) {
            bail!("Index sections out of order");
        }

        let roots = read_strings(&data, roots_off)
            .context("Failed to read roots")?
            .into_iter()
            .map(|r| String::from_utf8_lossy(&data[r]).into_owned())
            .collect();
        let names = read_strings(&data, names_off).context("Failed to read names")?;
        let dict = read_trigram_dict(&data[dict_off..trailer], postings_off..dict_off)?;

        Ok(Self {
            path: path.to_path_buf(),
            data,
            roots,
            names,
            postings: postings_off..dict_off,
            dict,
        })
    }

    /// The file this index was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root prefixes the index was built from
    pub fn paths(&self) -> &[String] {
        &self.roots
    }

    pub fn file_count(&self) -> u32 {
        self.names.len() as u32
    }

    /// Name (absolute path) of a file, or an empty slice for unknown ids
    pub fn name_bytes(&self, id: FileId) -> &[u8] {
        self.names
            .get(id as usize)
            .map(|r| &self.data[r.clone()])
            .unwrap_or_default()
    }

    /// Name as a lossily decoded string
    pub fn name(&self, id: FileId) -> String {
        String::from_utf8_lossy(self.name_bytes(id)).into_owned()
    }

    /// Evaluate a posting query. File ids come back ascending.
    pub fn posting_query(&self, query: &PostingQuery) -> Vec<FileId> {
        self.evaluate(query).iter().collect()
    }

    fn evaluate(&self, query: &PostingQuery) -> RoaringBitmap {
        match query {
            PostingQuery::All => {
                let mut all = RoaringBitmap::new();
                all.insert_range(0..self.file_count());
                all
            }
            PostingQuery::None => RoaringBitmap::new(),
            PostingQuery::Trigram(t) => self.trigram_files(*t),
            PostingQuery::And(parts) => {
                let mut iter = parts.iter();
                let Some(first) = iter.next() else {
                    return self.evaluate(&PostingQuery::All);
                };
                let mut acc = self.evaluate(first);
                for part in iter {
                    if acc.is_empty() {
                        break;
                    }
                    acc &= self.evaluate(part);
                }
                acc
            }
            PostingQuery::Or(parts) => {
                let mut acc = RoaringBitmap::new();
                for part in parts {
                    acc |= self.evaluate(part);
                }
                acc
            }
        }
    }

    fn trigram_files(&self, trigram: Trigram) -> RoaringBitmap {
        let Ok(i) = self.dict.binary_search_by_key(&trigram, |e| e.trigram) else {
            return RoaringBitmap::new();
        };
        let entry = &self.dict[i];
        let start = self.postings.start + entry.offset as usize;
        let end = start + entry.length as usize;
        delta_decode(&self.data[start..end]).into_iter().collect()
    }
}

/// Read a count-prefixed list of length-prefixed strings at `pos`,
/// returning byte ranges into `data`.
fn read_strings(data: &[u8], mut pos: usize) -> Result<Vec<Range<usize>>> {
    let count = u32_at(data, pos).context("Truncated string table")? as usize;
    pos += 4;
    let mut ranges = Vec::with_capacity(count.min(data.len() / 4));
    for _ in 0..count {
        let len = u32_at(data, pos).context("Truncated string length")? as usize;
        pos += 4;
        let end = pos.checked_add(len).filter(|&e| e <= data.len()).context("String runs past end of index")?;
        ranges.push(pos..end);
        pos = end;
    }
    Ok(ranges)
}

/// Read the trigram dictionary, checking every posting run lies inside the
/// postings section.
fn read_trigram_dict(section: &[u8], postings: Range<usize>) -> Result<Vec<TrigramDictEntry>> {
    let count = u32_at(section, 0).context("Truncated dictionary")? as usize;
    if section.len() < 4 + count.saturating_mul(DICT_ENTRY_SIZE) {
        bail!("Dictionary claims {} entries but is only {} bytes", count, section.len());
    }

    let postings_len = (postings.end - postings.start) as u64;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let at = 4 + i * DICT_ENTRY_SIZE;
        let entry = TrigramDictEntry {
            trigram: u32_at(section, at).context("dict")?,
            offset: u64_at(section, at + 4).context("dict")?,
            length: u32_at(section, at + 12).context("dict")?,
            doc_freq: u32_at(section, at + 16).context("dict")?,
        };
        if entry.offset + entry.length as u64 > postings_len {
            bail!("Posting list for trigram {:06x} out of range", entry.trigram);
        }
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexWriter;
    use crate::utils::bytes_to_trigram;
    use std::fs;

    fn build(dir: &Path, files: &[(&str, &str)]) -> TrigramIndex {
        let root = dir.to_string_lossy().into_owned();
        let mut writer = IndexWriter::new(vec![root.clone()]);
        for (name, content) in files {
            writer.add_file(format!("{}/{}", root, name), content.as_bytes());
        }
        let path = dir.join("index");
        writer.write(&path).unwrap();
        TrigramIndex::open(&path).unwrap()
    }

    #[test]
    fn test_names_and_roots() {
        let dir = tempfile::tempdir().unwrap();
        let index = build(dir.path(), &[("b.txt", "turnip"), ("a.txt", "carrot")]);

        assert_eq!(index.file_count(), 2);
        assert_eq!(index.paths(), &[dir.path().to_string_lossy().into_owned()]);
        assert!(index.name(0).ends_with("/a.txt"));
        assert!(index.name(1).ends_with("/b.txt"));
        assert_eq!(index.name_bytes(7), b"");
    }

    #[test]
    fn test_posting_queries() {
        let dir = tempfile::tempdir().unwrap();
        let index = build(
            dir.path(),
            &[("a.txt", "one carrot\n"), ("b.txt", "turnip\n"), ("c.txt", "carrot and turnip\n")],
        );

        assert_eq!(index.posting_query(&PostingQuery::All), vec![0, 1, 2]);
        assert_eq!(index.posting_query(&PostingQuery::None), Vec::<FileId>::new());
        assert_eq!(index.posting_query(&PostingQuery::literal(b"carrot")), vec![0, 2]);
        assert_eq!(index.posting_query(&PostingQuery::literal(b"turnip")), vec![1, 2]);
        assert_eq!(
            index.posting_query(&PostingQuery::literal(b"carrot").or(PostingQuery::literal(b"turnip"))),
            vec![0, 1, 2]
        );
        assert_eq!(
            index.posting_query(&PostingQuery::Trigram(bytes_to_trigram(b'z', b'z', b'z'))),
            Vec::<FileId>::new()
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk");
        fs::write(&path, b"definitely not an index").unwrap();
        assert!(TrigramIndex::open(&path).is_err());
        assert!(TrigramIndex::open(&dir.path().join("missing")).is_err());
    }
}
