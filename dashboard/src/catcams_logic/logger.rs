//! # Logging Setup
//!
//! Routes the `log` facade to stdout and to a per-run file under the log
//! directory. Each run writes `catcams_<timestamp>.log`; older runs are pruned
//! so the directory holds the current file plus the previous one.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Prefix of every log file this binary writes.
const LOG_PREFIX: &str = "catcams_";
/// Earlier run files kept next to the current one.
const KEEP_PREVIOUS: usize = 1;

/// Installs the global logger.
///
/// # Arguments
/// * `log_dir` - Directory for the run files. Created if missing.
/// * `log_level` - `trace`, `debug`, `info`, `warn`, `error` or `off`. Anything
///   else means `info`.
///
/// # Errors
/// Fails if the directory or file cannot be created, or if a global logger is
/// already installed.
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<()> {
    // 1. Make sure the directory exists
    fs::create_dir_all(log_dir).with_context(|| format!("creating log directory {}", log_dir.display()))?;

    // 2. Drop run files beyond the retention window
    cleanup_old_logs(log_dir, KEEP_PREVIOUS)?;

    // 3. Open this run's file
    let log_path = run_file(log_dir, chrono::Local::now());
    let log_file = fern::log_file(&log_path).with_context(|| format!("opening {}", log_path.display()))?;

    // 4. Chain stdout and the file behind one formatter; quiet the HTTP stack
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()?;

    log::debug!("Logging to {}", log_path.display());
    Ok(())
}

fn run_file(log_dir: &Path, now: chrono::DateTime<chrono::Local>) -> PathBuf {
    log_dir.join(format!("{LOG_PREFIX}{}.log", now.format("%Y-%m-%d_%H-%M-%S")))
}

fn parse_level(log_level: &str) -> log::LevelFilter {
    log_level.trim().parse().unwrap_or(log::LevelFilter::Info)
}

/// Deletes this binary's run files, newest first, past the first `keep`.
/// Other files in the directory are never touched.
fn cleanup_old_logs(log_dir: &Path, keep: usize) -> Result<()> {
    let mut runs: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_run_file(path))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    runs.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in runs.into_iter().skip(keep) {
        if let Err(e) = fs::remove_file(&path) {
            eprintln!("Failed to delete old log file {}: {}", path.display(), e);
        }
    }
    Ok(())
}

fn is_run_file(path: &Path) -> bool {
    let named_like_run = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOG_PREFIX));
    named_like_run && path.extension().is_some_and(|ext| ext == "log")
}
