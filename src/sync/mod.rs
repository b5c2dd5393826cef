//! Block-level delta sync.
//!
//! The side holding the reference file publishes a [`ChecksumIndex`] (a weak
//! rolling checksum and a strong SHA-256 per fixed-size block). The side
//! holding a stale copy finds which reference blocks it already has with
//! [`patch`], fetching only the rest from a [`BlockSource`].

pub mod checksum;
pub mod patch;

/// Block size used by leap's index sync
pub const BLOCK_SIZE: usize = 4096;

pub use checksum::{BlockChecksum, ChecksumIndex, RollingChecksum, strong_checksum};
pub use patch::{BlockSource, MAX_REQUEST_SIZE, PatchStats, patch};
