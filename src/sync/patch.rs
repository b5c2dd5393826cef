use crate::error::{LeapError, Result};
use crate::sync::checksum::{ChecksumIndex, RollingChecksum, strong_checksum};
use rustc_hash::FxHashMap;
use std::io::Write;

/// Largest byte range fetched in one request
pub const MAX_REQUEST_SIZE: u64 = 1 << 20;

/// Supplies byte ranges of the reference file
pub trait BlockSource {
    /// Bytes `[start, end)` of the reference file
    fn request(&mut self, start: u64, end: u64) -> Result<Vec<u8>>;
}

/// What a patch reused and what it had to fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub reused_blocks: usize,
    pub fetched_blocks: usize,
    pub requests: usize,
    pub bytes_fetched: u64,
}

/// Find where each reference block already occurs in `local`.
fn locate_blocks(local: &[u8], reference: &ChecksumIndex) -> Vec<Option<usize>> {
    let bs = reference.block_size;
    let n = reference.block_count();
    let mut found: Vec<Option<usize>> = vec![None; n];
    if n == 0 {
        return found;
    }

    let mut by_weak: FxHashMap<u32, Vec<usize>> = FxHashMap::default();
    for (i, block) in reference.blocks.iter().enumerate() {
        if reference.block_range(i).end - reference.block_range(i).start == bs as u64 {
            by_weak.entry(block.weak).or_default().push(i);
        }
    }

    if local.len() >= bs && !by_weak.is_empty() {
        let mut rc = RollingChecksum::new(&local[..bs]);
        for off in 0..=local.len() - bs {
            if off > 0 {
                rc.roll(local[off - 1], local[off + bs - 1]);
            }
            let Some(candidates) = by_weak.get(&rc.digest()) else {
                continue;
            };
            if candidates.iter().all(|&i| found[i].is_some()) {
                continue;
            }
            let strong = strong_checksum(&local[off..off + bs]);
            for &i in candidates {
                if found[i].is_none() && reference.blocks[i].strong == strong {
                    found[i] = Some(off);
                }
            }
        }
    }

    // A short final block can only sit at the same offset or at the end.
    let last = n - 1;
    let range = reference.block_range(last);
    let r = (range.end - range.start) as usize;
    if r < bs && found[last].is_none() {
        let same_place = range.start as usize;
        let at_end = local.len().checked_sub(r);
        for off in [Some(same_place), at_end].into_iter().flatten() {
            if off + r <= local.len() && strong_checksum(&local[off..off + r]) == reference.blocks[last].strong {
                found[last] = Some(off);
                break;
            }
        }
    }

    found
}

/// Reconstruct the reference file into `out`, reusing blocks of `local`
/// and fetching the rest from `source`.
///
/// Consecutive missing blocks are fetched together, at most
/// [`MAX_REQUEST_SIZE`] bytes per request. Every fetched block is checked
/// against its strong checksum before it is written.
pub fn patch<W: Write>(
    local: &[u8],
    source: &mut dyn BlockSource,
    reference: &ChecksumIndex,
    out: &mut W,
) -> Result<PatchStats> {
    reference.validate()?;
    let found = locate_blocks(local, reference);
    let blocks_per_request = ((MAX_REQUEST_SIZE / reference.block_size as u64) as usize).max(1);

    let mut stats = PatchStats::default();
    let mut i = 0;
    while i < found.len() {
        if let Some(off) = found[i] {
            let len = (reference.block_range(i).end - reference.block_range(i).start) as usize;
            out.write_all(&local[off..off + len])?;
            stats.reused_blocks += 1;
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < found.len() && found[j].is_none() && j - i < blocks_per_request {
            j += 1;
        }
        let start = reference.block_range(i).start;
        let end = reference.block_range(j - 1).end;
        let data = source.request(start, end)?;
        if data.len() as u64 != end - start {
            return Err(LeapError::Protocol(format!(
                "asked for {} bytes at {}, got {}",
                end - start,
                start,
                data.len()
            )));
        }
        stats.requests += 1;
        stats.bytes_fetched += data.len() as u64;

        for block in i..j {
            let range = reference.block_range(block);
            let bytes = &data[(range.start - start) as usize..(range.end - start) as usize];
            if strong_checksum(bytes) != reference.blocks[block].strong {
                return Err(LeapError::BlockVerification { block });
            }
        }
        out.write_all(&data)?;
        stats.fetched_blocks += j - i;
        i = j;
    }

    out.flush()?;
    Ok(stats)
}
