// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker spawn protocol.
//!
//! Locates the `ovs-worker` binary, materializes the worker's env file
//! (mode 0600) under the runtime directory, and spawns the worker fully
//! detached so supervisor death never orphans it. When tmux is present
//! the worker runs inside a named session operators can attach to;
//! otherwise it is a raw detached child with its stdio appended to the
//! worker log.

use ovs_adapters::session::{sanitize_session_name, SessionAdapter, TmuxAdapter};
use ovs_adapters::SessionError;
use ovs_core::{Config, WorkerRecord};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;

/// Errors from the spawn protocol
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("worker binary not found (set OVERSEER_WORKER_BINARY)")]
    WorkerBinaryNotFound,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result of one successful spawn.
#[derive(Debug)]
pub struct SpawnOutcome {
    /// Pid of the spawned process (the pane process under tmux)
    pub pid: Option<u32>,
    /// Tmux session name, when spawned inside one
    pub liveness_session: Option<String>,
    /// Handle for exit-status polling; absent for tmux spawns
    pub child: Option<std::process::Child>,
}

/// Find the worker binary: explicit override, then a sibling of the
/// current executable, then `ovs-worker` on PATH.
pub fn locate_worker_binary(config: &Config) -> Result<PathBuf, SpawnError> {
    if let Some(path) = &config.worker_binary {
        return Ok(path.clone());
    }
    if let Ok(current) = std::env::current_exe() {
        if let Some(dir) = current.parent() {
            let sibling = dir.join("ovs-worker");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }
    // Fall back to PATH resolution by the spawn itself
    Ok(PathBuf::from("ovs-worker"))
}

/// Write the worker's env file under `<state>/runtime/env/`, mode 0600.
///
/// Captures every `OVERSEER_*` variable of the supervisor's environment
/// so the worker sees the same configuration even when launched by tmux
/// with a minimal environment.
pub fn materialize_env_file(config: &Config, worker_id: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = config.env_file_for(worker_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut contents = String::new();
    for (key, value) in std::env::vars() {
        if key.starts_with("OVERSEER_") {
            contents.push_str(&format!("{key}={value}\n"));
        }
    }
    std::fs::write(&path, contents)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    Ok(path)
}

/// Spawn a detached worker process for this record.
pub async fn spawn_worker(
    config: &Config,
    worker: &WorkerRecord,
    prefer_tmux: bool,
) -> Result<SpawnOutcome, SpawnError> {
    let binary = locate_worker_binary(config)?;
    let workspace = config.workspace_for(&worker.name);
    std::fs::create_dir_all(&workspace)?;
    let env_file = materialize_env_file(config, worker.id.as_str())?;

    let mut args = vec!["--name".to_string(), worker.name.clone()];
    if let Some(chat_id) = &worker.chat_id {
        args.push("--chat-id".to_string());
        args.push(chat_id.clone());
    }

    if prefer_tmux {
        match spawn_in_tmux(&binary, &args, worker, &workspace, &env_file).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                tracing::warn!(worker = %worker.name, error = %e, "tmux spawn failed, falling back to raw spawn");
            }
        }
    }
    spawn_detached(config, &binary, &args, worker, &workspace, &env_file)
}

/// Spawn inside a persistent tmux session named after the worker, so an
/// operator can attach to live logs.
async fn spawn_in_tmux(
    binary: &std::path::Path,
    args: &[String],
    worker: &WorkerRecord,
    workspace: &std::path::Path,
    env_file: &std::path::Path,
) -> Result<SpawnOutcome, SpawnError> {
    let tmux = TmuxAdapter::new();
    let session_name = format!(
        "{}-{}",
        sanitize_session_name(&worker.name, 20),
        worker.id.short(8)
    );
    let command = std::iter::once(binary.display().to_string())
        .chain(args.iter().map(|a| shell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ");
    let env = vec![(
        "OVERSEER_ENV_FILE".to_string(),
        env_file.display().to_string(),
    )];

    let session_id = tmux.spawn(&session_name, workspace, &command, &env).await?;
    let pid = tmux.pane_pid(&session_id).await.unwrap_or(None);
    tracing::info!(worker = %worker.name, session_id, ?pid, "worker spawned in tmux");
    Ok(SpawnOutcome {
        pid,
        liveness_session: Some(session_id),
        child: None,
    })
}

/// Raw detached spawn: own process group, stdio appended to the worker
/// log so panics are not lost.
fn spawn_detached(
    config: &Config,
    binary: &std::path::Path,
    args: &[String],
    worker: &WorkerRecord,
    workspace: &std::path::Path,
    env_file: &std::path::Path,
) -> Result<SpawnOutcome, SpawnError> {
    use std::os::unix::process::CommandExt;

    std::fs::create_dir_all(&config.log_dir)?;
    let log_path = config.log_dir.join(format!("worker-{}.log", worker.name));
    let open_log = || {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
    };

    let child = std::process::Command::new(binary)
        .args(args)
        .current_dir(workspace)
        .env("OVERSEER_ENV_FILE", env_file)
        .stdin(Stdio::null())
        .stdout(open_log()?)
        .stderr(open_log()?)
        .process_group(0)
        .spawn()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SpawnError::WorkerBinaryNotFound
            } else {
                SpawnError::Io(e)
            }
        })?;

    let pid = child.id();
    tracing::info!(worker = %worker.name, pid, "worker spawned detached");
    Ok(SpawnOutcome {
        pid: Some(pid),
        liveness_session: None,
        child: Some(child),
    })
}

/// Quote an argument for the shell command line tmux runs.
fn shell_quote(arg: &str) -> String {
    if arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
