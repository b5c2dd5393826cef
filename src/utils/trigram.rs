use crate::index::types::Trigram;

/// Pack three bytes into the low 24 bits of a trigram
#[inline]
pub fn bytes_to_trigram(a: u8, b: u8, c: u8) -> Trigram {
    ((a as u32) << 16) | ((b as u32) << 8) | (c as u32)
}

/// Unpack a trigram into its three bytes
pub fn trigram_to_bytes(t: Trigram) -> [u8; 3] {
    [(t >> 16) as u8, (t >> 8) as u8, t as u8]
}

/// Bitset over the 2^24 trigram space, used to dedup trigrams of large files
/// without hashing.
struct TrigramBitset {
    bits: Vec<u64>,
}

impl TrigramBitset {
    fn new() -> Self {
        Self {
            bits: vec![0u64; 1 << 18],
        }
    }

    #[inline]
    fn insert(&mut self, trigram: Trigram) {
        self.bits[(trigram >> 6) as usize] |= 1u64 << (trigram & 63);
    }

    /// Set trigrams in ascending order
    fn into_sorted(self) -> Vec<Trigram> {
        let mut result = Vec::with_capacity(8192);
        for (word_idx, &word) in self.bits.iter().enumerate() {
            let base = (word_idx as u32) << 6;
            let mut w = word;
            while w != 0 {
                result.push(base | w.trailing_zeros());
                w &= w - 1;
            }
        }
        result
    }
}

/// Unique trigrams of `content`, ascending.
pub fn extract_trigrams(content: &[u8]) -> Vec<Trigram> {
    if content.len() < 3 {
        return Vec::new();
    }

    if content.len() < 1024 {
        let mut trigrams: Vec<Trigram> = content
            .windows(3)
            .map(|w| bytes_to_trigram(w[0], w[1], w[2]))
            .collect();
        trigrams.sort_unstable();
        trigrams.dedup();
        return trigrams;
    }

    let mut bitset = TrigramBitset::new();
    for w in content.windows(3) {
        bitset.insert(bytes_to_trigram(w[0], w[1], w[2]));
    }
    bitset.into_sorted()
}

/// Check if content is likely binary. Binary files are not indexed.
pub fn is_binary(content: &[u8]) -> bool {
    let sample = &content[..content.len().min(8192)];
    if sample.is_empty() {
        return false;
    }

    if memchr::memchr(0, sample).is_some() {
        let nul_count = sample.iter().filter(|&&b| b == 0).count();
        if nul_count > sample.len() / 10 {
            return true;
        }
    }

    let control = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    control > sample.len() / 8
}
