//! Client side of index sync: ask the server to reindex, then pull the new
//! index file across as a block-level delta and swap it into place.

use crate::error::{LeapError, Result};
use crate::server::client::LeapClient;
use crate::server::protocol::IndexAndBuildChecksumIndexArgs;
use crate::sync::{BLOCK_SIZE, BlockSource, ChecksumIndex, PatchStats, patch};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of sync session tokens. Seeded per process so that concurrent
/// `leap sync` runs don't share tokens; zero is never handed out.
static NEXT_TOKEN: LazyLock<AtomicU64> = LazyLock::new(|| AtomicU64::new(token_seed(process::id(), SystemTime::now())));

/// Process id in the high 32 bits, clock noise in the low 32
fn token_seed(pid: u32, now: SystemTime) -> u64 {
    let noise = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
        .unwrap_or(0);
    // Leave room below 2^63 so the counter never wraps to zero.
    let seed = (u64::from(pid & 0x7fff_ffff) << 32) | u64::from(noise);
    seed.max(1)
}

fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle,
    RequestedReindex,
    ReceivedChecksumIndex,
    Patching,
    Swapping,
    Done,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fetches byte ranges of the server's index inside one session
pub struct RpcBlockRequester<'a> {
    client: &'a mut LeapClient,
    token: u64,
}

impl<'a> RpcBlockRequester<'a> {
    pub fn new(client: &'a mut LeapClient, token: u64) -> Self {
        Self { client, token }
    }
}

impl BlockSource for RpcBlockRequester<'_> {
    fn request(&mut self, start: u64, end: u64) -> Result<Vec<u8>> {
        self.client.do_request(start, end, self.token)
    }
}

/// What one sync did
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub file_size: u64,
    pub stats: PatchStats,
}

/// Where the server's index lives and where the copy goes
#[derive(Debug, Clone)]
pub struct TransferTarget {
    pub remote_project_name: String,
    pub remote_path: String,
    pub local_path: PathBuf,
}

/// Have the server rebuild its index, then bring `local_path` up to date
/// with it. On failure the local file is left as it was.
pub fn reindex_and_transfer(client: &mut LeapClient, target: &TransferTarget) -> Result<TransferSummary> {
    let token = next_token();
    let result = run_session(client, target, token);

    if let Err(e) = client.finish_sync(token) {
        log::debug!("token {}: finish failed: {}", token, e);
    }
    if let Err(e) = &result {
        log::info!("token {}: {} ({})", token, SyncState::Failed, e);
    }
    result
}

fn run_session(client: &mut LeapClient, target: &TransferTarget, token: u64) -> Result<TransferSummary> {
    let mut state = SyncState::Idle;
    let mut advance = |next: SyncState| {
        log::info!("token {}: {} -> {}", token, state, next);
        state = next;
    };

    advance(SyncState::RequestedReindex);
    let data = client.index_and_build_checksum_index(IndexAndBuildChecksumIndexArgs {
        token,
        remote_project_name: target.remote_project_name.clone(),
        remote_path: target.remote_path.clone(),
    })?;
    for line in String::from_utf8_lossy(&data.cindex_output).lines() {
        log::info!("server> {}", line);
    }

    advance(SyncState::ReceivedChecksumIndex);
    check_manifest(data.file_size, &data.reference_file_index)?;

    advance(SyncState::Patching);
    let local = read_or_create(&target.local_path)?;
    let temp = temporary_path(&target.local_path);
    let mut source = RpcBlockRequester::new(client, token);
    let stats = patch_to_temporary(&local, &mut source, &data.reference_file_index, &temp)?;

    advance(SyncState::Swapping);
    if let Err(e) = replace(&target.local_path, &temp) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    advance(SyncState::Done);
    log::info!(
        "token {}: {} bytes, {} blocks reused, {} fetched in {} requests",
        token,
        data.file_size,
        stats.reused_blocks,
        stats.fetched_blocks,
        stats.requests
    );
    Ok(TransferSummary {
        file_size: data.file_size,
        stats,
    })
}

fn check_manifest(file_size: u64, index: &ChecksumIndex) -> Result<()> {
    if index.block_size != BLOCK_SIZE || index.file_size != file_size {
        return Err(LeapError::Protocol(format!(
            "manifest for {} bytes in {} byte blocks, expected {} bytes in {} byte blocks",
            index.file_size, index.block_size, file_size, BLOCK_SIZE
        )));
    }
    let expected = ChecksumIndex::expected_blocks(file_size, BLOCK_SIZE);
    if expected != index.block_count() {
        return Err(LeapError::Protocol(format!(
            "a {} byte file needs {} blocks, manifest has {}",
            file_size,
            expected,
            index.block_count()
        )));
    }
    Ok(())
}

/// The current local copy, created empty if there is none yet
fn read_or_create(path: &Path) -> Result<Vec<u8>> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| LeapError::FileUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
    let mut local = Vec::new();
    file.read_to_end(&mut local)?;
    Ok(local)
}

/// Write the patched file to `temp`, removing it again if anything fails
fn patch_to_temporary(
    local: &[u8],
    source: &mut dyn BlockSource,
    reference: &ChecksumIndex,
    temp: &Path,
) -> Result<PatchStats> {
    patch_into(local, source, reference, temp).inspect_err(|_| {
        if let Err(e) = fs::remove_file(temp)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("can't remove {}: {}", temp.display(), e);
        }
    })
}

fn patch_into(local: &[u8], source: &mut dyn BlockSource, reference: &ChecksumIndex, temp: &Path) -> Result<PatchStats> {
    let mut out = BufWriter::new(File::create(temp)?);
    let stats = patch(local, source, reference, &mut out)?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(stats)
}

pub fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-temporary");
    PathBuf::from(name)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-backup");
    PathBuf::from(name)
}

/// Move `new` over `old`. The old file is kept as a hard link until the new
/// one is in place and restored if the rename fails.
pub fn replace(old: &Path, new: &Path) -> Result<()> {
    replace_with(old, new, |backup| fs::remove_file(backup))
}

fn replace_with(old: &Path, new: &Path, remove_backup: impl Fn(&Path) -> std::io::Result<()>) -> Result<()> {
    let backup = backup_path(old);
    let _ = fs::remove_file(&backup);

    let had_old = old.exists();
    if had_old {
        fs::hard_link(old, &backup)?;
    }
    if let Err(e) = fs::rename(new, old) {
        if had_old && !old.exists() {
            let _ = fs::rename(&backup, old);
        }
        let _ = fs::remove_file(&backup);
        return Err(e.into());
    }
    // The new file is in place; a leftover backup is only clutter.
    if had_old && let Err(e) = remove_backup(&backup) {
        log::warn!("can't remove {}: {}", backup.display(), e);
    }
    Ok(())
}
