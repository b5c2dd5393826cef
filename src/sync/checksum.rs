use crate::error::{LeapError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::ops::Range;

/// rsync-style weak checksum over a fixed window.
///
/// `a` is the byte sum and `b` the position-weighted sum, both mod 2^16.
/// Sliding the window one byte costs O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingChecksum {
    a: u32,
    b: u32,
    len: u32,
}

impl RollingChecksum {
    pub fn new(window: &[u8]) -> Self {
        let len = window.len() as u32;
        let mut a: u32 = 0;
        let mut b: u32 = 0;
        for (i, &x) in window.iter().enumerate() {
            a = a.wrapping_add(x as u32);
            b = b.wrapping_add((len - i as u32).wrapping_mul(x as u32));
        }
        Self { a, b, len }
    }

    pub fn digest(&self) -> u32 {
        (self.a & 0xffff) | ((self.b & 0xffff) << 16)
    }

    /// Slide the window: `out` leaves at the front, `inb` enters at the back
    pub fn roll(&mut self, out: u8, inb: u8) {
        self.a = self.a.wrapping_sub(out as u32).wrapping_add(inb as u32);
        self.b = self
            .b
            .wrapping_sub(self.len.wrapping_mul(out as u32))
            .wrapping_add(self.a);
    }
}

pub fn weak_checksum(block: &[u8]) -> u32 {
    RollingChecksum::new(block).digest()
}

pub fn strong_checksum(block: &[u8]) -> [u8; 32] {
    Sha256::digest(block).into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChecksum {
    pub weak: u32,
    #[serde(with = "crate::utils::encoding::base64_bytes")]
    pub strong: [u8; 32],
}

/// Per-block checksums of a reference file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumIndex {
    pub block_size: usize,
    pub file_size: u64,
    pub blocks: Vec<BlockChecksum>,
}

impl ChecksumIndex {
    /// Checksum everything `reader` yields, `block_size` bytes at a time.
    /// Only the last block may be short.
    pub fn build<R: Read>(block_size: usize, mut reader: R) -> Result<Self> {
        if block_size == 0 {
            return Err(LeapError::Protocol("block size must be positive".to_string()));
        }
        let mut blocks = Vec::new();
        let mut file_size = 0u64;
        let mut buf = Vec::with_capacity(block_size);
        loop {
            buf.clear();
            let n = reader.by_ref().take(block_size as u64).read_to_end(&mut buf)?;
            if n == 0 {
                break;
            }
            file_size += n as u64;
            blocks.push(BlockChecksum {
                weak: weak_checksum(&buf),
                strong: strong_checksum(&buf),
            });
            if n < block_size {
                break;
            }
        }
        Ok(Self {
            block_size,
            file_size,
            blocks,
        })
    }

    /// Number of blocks a file of `file_size` bytes splits into
    pub fn expected_blocks(file_size: u64, block_size: usize) -> usize {
        file_size.div_ceil(block_size as u64) as usize
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Byte range of block `i` within the reference file
    pub fn block_range(&self, i: usize) -> Range<u64> {
        let start = (i as u64) * self.block_size as u64;
        let end = (start + self.block_size as u64).min(self.file_size);
        start..end
    }

    /// Check the block list is consistent with the recorded file size
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(LeapError::Protocol("checksum index has zero block size".to_string()));
        }
        let expected = Self::expected_blocks(self.file_size, self.block_size);
        if expected != self.blocks.len() {
            return Err(LeapError::Protocol(format!(
                "checksum index has {} blocks, a {} byte file needs {}",
                self.blocks.len(),
                self.file_size,
                expected
            )));
        }
        Ok(())
    }
}
