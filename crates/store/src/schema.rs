// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema creation and migration.
//!
//! Versioned via `PRAGMA user_version`. Migrations only ever append; old
//! processes reading a newer schema see columns they ignore.

use crate::StoreError;
use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS workers (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL UNIQUE,
    pid              INTEGER,
    liveness_session TEXT,
    status           TEXT NOT NULL,
    cost_usd         REAL NOT NULL DEFAULT 0,
    chat_id          TEXT,
    created_at_ms    INTEGER NOT NULL,
    updated_at_ms    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id              TEXT PRIMARY KEY,
    worker_id       TEXT NOT NULL REFERENCES workers(id),
    parent_id       TEXT REFERENCES tasks(id),
    title           TEXT NOT NULL,
    prompt          TEXT NOT NULL,
    status          TEXT NOT NULL,
    exec_mode       TEXT NOT NULL DEFAULT 'agent',
    model           TEXT NOT NULL DEFAULT 'standard',
    session_id      TEXT,
    deps            TEXT NOT NULL DEFAULT '[]',
    skills          TEXT NOT NULL DEFAULT '[]',
    capability      TEXT,
    result          TEXT,
    idempotency_key TEXT UNIQUE,
    created_at_ms   INTEGER NOT NULL,
    updated_at_ms   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_worker_status ON tasks(worker_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);

CREATE TABLE IF NOT EXISTS events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id     TEXT NOT NULL REFERENCES workers(id),
    task_id       TEXT,
    kind          TEXT NOT NULL,
    payload       TEXT NOT NULL,
    notified      INTEGER NOT NULL DEFAULT 0,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_worker_notified ON events(worker_id, notified);

CREATE TABLE IF NOT EXISTS commands (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id     TEXT NOT NULL REFERENCES workers(id),
    kind          TEXT NOT NULL,
    payload       TEXT NOT NULL,
    handled       INTEGER NOT NULL DEFAULT 0,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_commands_worker_handled ON commands(worker_id, handled);

CREATE TABLE IF NOT EXISTS connectors (
    name      TEXT PRIMARY KEY,
    scope     TEXT,
    transport TEXT NOT NULL,
    config    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS triggers (
    id          TEXT PRIMARY KEY,
    worker_name TEXT NOT NULL,
    title       TEXT NOT NULL,
    prompt      TEXT NOT NULL,
    schedule    TEXT NOT NULL,
    skills      TEXT NOT NULL DEFAULT '[]',
    model       TEXT,
    capability  TEXT,
    enabled     INTEGER NOT NULL DEFAULT 1,
    last_run_ms INTEGER,
    next_run_ms INTEGER
);

CREATE TABLE IF NOT EXISTS skills (
    name        TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    body        TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS capabilities (
    id     TEXT PRIMARY KEY,
    policy TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decomp_runs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id     TEXT NOT NULL,
    task_id       TEXT NOT NULL,
    started_at_ms INTEGER NOT NULL,
    finished_at_ms INTEGER NOT NULL,
    elapsed_ms    INTEGER NOT NULL,
    model         TEXT NOT NULL,
    timeout_ms    INTEGER NOT NULL,
    request_chars INTEGER NOT NULL,
    prompt_chars  INTEGER NOT NULL,
    result_chars  INTEGER NOT NULL,
    parse_attempts INTEGER NOT NULL,
    fallback      INTEGER NOT NULL DEFAULT 0,
    error_code    TEXT,
    raw_prefix    TEXT NOT NULL DEFAULT ''
);
";

/// Create or upgrade the schema.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }
    conn.execute_batch(SCHEMA_V1)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tracing::debug!(from = version, to = SCHEMA_VERSION, "store schema migrated");
    Ok(())
}
