// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging bootstrap shared by both binaries: size-based rotation at
//! startup, a plain startup marker the operator can grep for, and a
//! non-blocking file subscriber.

use std::io::Write;
use std::path::Path;

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (`.1`, `.2`, `.3`).
const MAX_ROTATED_LOGS: u32 = 3;

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- ovsd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- ";

/// Rotate the log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `x.log` to `x.log.1` to `x.log.2` to `x.log.3`, deleting the
/// oldest. Best-effort: rotation failures are silently ignored so the
/// process still starts.
pub fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Append the startup marker so the operator can find where this run's
/// log begins, before tracing is even installed.
pub fn write_startup_marker(log_path: &Path, process_name: &str) -> std::io::Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(
        file,
        "{STARTUP_MARKER_PREFIX}{process_name}: starting (pid: {}) ---\n",
        std::process::id()
    )?;
    Ok(())
}

/// Write a startup error synchronously so it is visible even if the
/// process exits before the non-blocking subscriber flushes.
pub fn write_startup_error(log_path: &Path, error: &dyn std::fmt::Display) {
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start: {error}");
}

/// Install the file subscriber. The returned guard must be held for the
/// process lifetime or buffered lines are lost.
pub fn setup(log_path: &Path) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent directory"))?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;
    std::fs::create_dir_all(parent)?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
