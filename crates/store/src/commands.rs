// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command queue: inserted by the chat relay, consumed once by the target
//! worker.

use crate::{Store, StoreError};
use ovs_core::{Command, CommandRecord, WorkerId};
use rusqlite::params;

impl Store {
    /// Insert a command for a worker. Ids are store-assigned, strictly
    /// increasing, never reissued.
    pub fn push_command(
        &self,
        worker_id: &WorkerId,
        command: &Command,
        now_ms: u64,
    ) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(command)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO commands (worker_id, kind, payload, handled, created_at_ms) \
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![worker_id.as_str(), command.name(), payload, now_ms as i64],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Unhandled commands for a worker in insertion order. The caller
    /// marks each handled after its dispatch returns.
    pub fn unhandled_commands(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, worker_id, payload, handled, created_at_ms FROM commands \
                 WHERE worker_id = ?1 AND handled = 0 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![worker_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>("id")?,
                    row.get::<_, String>("worker_id")?,
                    row.get::<_, String>("payload")?,
                    row.get::<_, i64>("created_at_ms")?,
                ))
            })?;
            rows.map(|r| {
                let (id, worker_id, payload, created_at_ms) = r?;
                let command: Command = serde_json::from_str(&payload)?;
                Ok(CommandRecord {
                    id,
                    worker_id: WorkerId::new(worker_id),
                    command,
                    handled: false,
                    created_at_ms: created_at_ms as u64,
                })
            })
            .collect()
        })
    }

    /// Mark a command handled. Idempotent; handling is at-most-once
    /// because the dequeue only returns unhandled rows.
    pub fn mark_command_handled(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE commands SET handled = 1 WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
