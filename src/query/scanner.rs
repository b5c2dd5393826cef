//! Concurrent content scanner: confirms candidate files by running the
//! content regexp over their bytes, one task per file, collecting results
//! in file order.

use crate::error::LeapError;
use crate::output::{ContentMatch, EntryType, ResultEntry, determine_icon};
use crate::query::MAXIMUM_MATCHES;
use crate::query::trimmer::PathTrimmer;
use memchr::{memchr, memchr_iter, memrchr};
use regex::bytes::Regex;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc;

/// Bytes read per chunk while streaming a file
pub const CHUNK_SIZE: usize = 1 << 20;

fn count_nl(b: &[u8]) -> usize {
    memchr_iter(b'\n', b).count()
}

/// Stream `reader` in chunks of `chunk_size`, returning up to `limit` matching
/// lines.
///
/// Only complete lines of a non-final chunk are searched; the tail is carried
/// into the next read. A tail with no newline at all grows the buffer.
pub fn scan_reader<R: Read>(
    re: &Regex,
    mut reader: R,
    path: &Path,
    chunk_size: usize,
    limit: usize,
) -> io::Result<Vec<ContentMatch>> {
    let mut matches = Vec::new();
    let mut buf: Vec<u8> = Vec::with_capacity(chunk_size);
    let mut lineno = 1;

    loop {
        let n = reader.by_ref().take(chunk_size as u64).read_to_end(&mut buf)?;
        let eof = n < chunk_size;
        let end = if eof {
            buf.len()
        } else {
            memrchr(b'\n', &buf).map_or(0, |i| i + 1)
        };

        let mut chunk_start = 0;
        while chunk_start < end {
            let Some(m) = re.find_at(&buf[..end], chunk_start) else {
                break;
            };
            // The empty position after a final newline starts no line.
            if m.start() == end && buf[end - 1] == b'\n' {
                break;
            }

            let line_start = memrchr(b'\n', &buf[chunk_start..m.start()]).map_or(chunk_start, |i| chunk_start + i + 1);
            let line_end = if m.end() > m.start() && buf[m.end() - 1] == b'\n' {
                m.end()
            } else {
                memchr(b'\n', &buf[m.end()..end]).map_or(end, |i| m.end() + i + 1)
            };

            lineno += count_nl(&buf[chunk_start..line_start]);
            let line = &buf[line_start..line_end];
            matches.push(ContentMatch {
                path: path.to_path_buf(),
                line_number: lineno,
                line: String::from_utf8_lossy(line).into_owned(),
            });
            if matches.len() >= limit {
                return Ok(matches);
            }

            lineno += count_nl(line);
            chunk_start = line_end;
        }

        if eof {
            break;
        }
        lineno += count_nl(&buf[chunk_start..end]);
        buf.drain(..end);
    }

    Ok(matches)
}

/// Scan one file on disk
pub fn scan_file(re: &Regex, path: &Path, limit: usize) -> Result<Vec<ContentMatch>, LeapError> {
    let unreadable = |source| LeapError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(unreadable)?;
    scan_reader(re, file, path, CHUNK_SIZE, limit).map_err(unreadable)
}

/// Scan `names` concurrently, keeping file order and stopping once
/// [`MAXIMUM_MATCHES`] have been gathered.
///
/// Every file gets its own task on the rayon pool. Tasks whose results are
/// no longer wanted finish into a dropped channel.
pub fn multi_file(names: &[String], re: &Regex) -> Vec<ContentMatch> {
    let receivers: Vec<mpsc::Receiver<Vec<ContentMatch>>> = names
        .iter()
        .map(|name| {
            let (tx, rx) = mpsc::sync_channel(1);
            let re = re.clone();
            let name = name.clone();
            rayon::spawn(move || {
                let found = match scan_file(&re, Path::new(&name), MAXIMUM_MATCHES) {
                    Ok(found) => found,
                    Err(e) => {
                        log::warn!("content scan skipped: {}", e);
                        Vec::new()
                    }
                };
                let _ = tx.send(found);
            });
            rx
        })
        .collect();

    let mut matches = Vec::with_capacity(MAXIMUM_MATCHES);
    for rx in receivers {
        if matches.len() >= MAXIMUM_MATCHES {
            break;
        }
        if let Ok(found) = rx.recv() {
            matches.extend(found);
        }
    }
    matches.truncate(MAXIMUM_MATCHES);
    matches
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

/// Byte length of the longest character-wise common prefix of `names`
pub fn find_longest_prefix<S: AsRef<str>>(names: &[S]) -> usize {
    let Some((first, rest)) = names.split_first() else {
        return 0;
    };
    let first = first.as_ref();
    rest.iter()
        .map(|n| common_prefix_len(first, n.as_ref()))
        .fold(first.len(), usize::min)
}

/// Shorten an absolute path for display: whichever is shorter of the path
/// after `cut` and the prefix-trimmed path, behind `.../`.
pub fn nicely_trim_path(name: &str, cut: usize, trimmer: &PathTrimmer) -> String {
    let mut cut = cut.min(name.len());
    if cut > 0 && name.as_bytes().get(cut) == Some(&b'/') {
        cut += 1;
    }
    let cut_name = name.get(cut..).unwrap_or(name);
    let trimmed = trimmer.trim_str(name);
    if cut_name.len() < trimmed.len() {
        format!(".../{}", cut_name)
    } else {
        format!(".../{}", trimmed)
    }
}

/// Search inside `names` and turn the matching lines into result entries.
///
/// Each matched file is also copied to its entry's `arg` path under
/// `jump_prefix` so icon lookup can see a real file with the right
/// extension.
pub fn content_search_result(names: &[String], re: &Regex, trimmer: &PathTrimmer, jump_prefix: &str) -> Vec<ResultEntry> {
    let matches = multi_file(names, re);

    let dirs: Vec<String> = matches
        .iter()
        .map(|m| m.path.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default())
        .collect();
    let trimpoint = find_longest_prefix(&dirs);

    let mut entries = Vec::with_capacity(matches.len());
    for m in &matches {
        let name = m.path.to_string_lossy();
        let n = m.line_number;
        let arg = format!("{}:{}{}", jump_prefix, n, name);

        entries.push(ResultEntry {
            uid: format!("{}:{}", name, n),
            arg: arg.clone(),
            title: format!("{} {}", n, m.line),
            subtitle: format!("{}:{} {}", nicely_trim_path(&name, trimpoint, trimmer), n, m.line),
            entry_type: EntryType::File,
            icon: determine_icon(&name).to_string(),
        });

        let target = Path::new(&arg);
        if let Some(dir) = target.parent()
            && let Err(e) = fs::create_dir_all(dir)
        {
            log::warn!("can't create {}: {}", dir.display(), e);
            continue;
        }
        if let Err(e) = fs::copy(&m.path, target) {
            log::warn!("can't copy {} to {}: {}", name, arg, e);
        }
    }
    entries
}
