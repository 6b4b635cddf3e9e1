// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique session names across parallel tests.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(suffix: &str) -> String {
    let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("ovstest-{}-{}", suffix, id)
}

macro_rules! skip_without_tmux {
    () => {
        if !tmux_available().await {
            eprintln!("tmux not available, skipping");
            return;
        }
    };
}

#[tokio::test]
async fn spawn_creates_session_and_returns_prefixed_id() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("spawn");

    let id = adapter
        .spawn(&name, Path::new("/tmp"), "sleep 60", &[])
        .await
        .unwrap();
    assert_eq!(id, format!("ovs-{}", name));
    assert!(adapter.is_alive(&id).await.unwrap());

    adapter.kill(&id).await.unwrap();
    assert!(!adapter.is_alive(&id).await.unwrap());
}

#[tokio::test]
async fn spawn_rejects_missing_cwd() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let result = adapter
        .spawn(
            &unique_name("cwd"),
            Path::new("/definitely/not/a/dir"),
            "true",
            &[],
        )
        .await;
    assert!(matches!(result, Err(SessionError::SpawnFailed(_))));
}

#[tokio::test]
async fn kill_is_idempotent() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    // Killing a session that never existed is not an error
    adapter.kill("ovs-never-existed").await.unwrap();
}
