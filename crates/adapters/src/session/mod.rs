// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-multiplexer session adapters.
//!
//! The supervisor prefers spawning workers inside a persistent tmux
//! session so operators can attach to live logs; when tmux is absent it
//! falls back to raw detached spawning.

mod tmux;

pub use tmux::{TmuxAdapter, tmux_available};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Adapter for persistent terminal sessions
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    /// Spawn a detached session running `cmd` in `cwd` with extra `env`.
    /// Returns the session id.
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError>;

    /// Whether the session still exists
    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;

    /// Kill a session (killing a dead session is not an error)
    async fn kill(&self, id: &str) -> Result<(), SessionError>;
}

/// Sanitize a string for use in session names.
///
/// tmux session names cannot contain colon or period; everything outside
/// `[A-Za-z0-9_-]` becomes a hyphen and runs of hyphens collapse.
pub fn sanitize_session_name(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect();

    let collapsed = sanitized
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if collapsed.len() <= max_len {
        collapsed
    } else {
        collapsed[..max_len].trim_end_matches('-').to_string()
    }
}

/// Generate a short random hex string.
pub fn short_random(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..len)
        .map(|_| format!("{:x}", rng.random::<u8>() % 16))
        .collect()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
