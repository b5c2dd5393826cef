//! Log file setup for the `leap` binary.
//!
//! Every run writes to its own `leap-<secs>-<pid>.log`; files older than a
//! day are removed at startup.

use crate::error::{LeapError, Result};
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Log files are named `<LOG_NAME>-...`
pub const LOG_NAME: &str = "leap";

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Install the global logger. Writes to a fresh file in `log_dir`, and also
/// to stderr at `term_level` when given.
pub fn setup_logging(log_dir: &Path, level: LevelFilter, term_level: Option<LevelFilter>) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .map_err(|e| LeapError::Config(format!("can't make log directory {}: {}", log_dir.display(), e)))?;

    let path = log_dir.join(log_file_name(SystemTime::now()));
    let file = File::create(&path)
        .map_err(|e| LeapError::Config(format!("can't create log file {}: {}", path.display(), e)))?;

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(WriteLogger::new(level, Config::default(), file));
    if let Some(term_level) = term_level {
        loggers.push(TermLogger::new(
            term_level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    CombinedLogger::init(loggers).map_err(|e| LeapError::Config(format!("can't install logger: {}", e)))?;
    Ok(path)
}

fn log_file_name(now: SystemTime) -> String {
    let secs = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
    format!("{}-{}-{}.log", LOG_NAME, secs, std::process::id())
}

/// Remove `leap*` files in `log_dir` last modified more than a day ago
pub fn roll_logs(log_dir: &Path) {
    if let Err(e) = roll_older_than(log_dir, ONE_DAY, SystemTime::now()) {
        log::warn!("failed to roll logs in {}: {}", log_dir.display(), e);
    }
}

fn roll_older_than(log_dir: &Path, older: Duration, now: SystemTime) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(LOG_NAME) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age > older {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("can't delete old log {}: {}", entry.path().display(), e),
            }
        }
    }
    Ok(removed)
}
