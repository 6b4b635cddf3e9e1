// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event append and exactly-once notification claim.

use crate::{Store, StoreError};
use ovs_core::{Event, EventRecord, WorkerId};
use rusqlite::{params, Row, TransactionBehavior};

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, i64, i64)> {
    Ok((
        row.get("id")?,
        row.get("worker_id")?,
        row.get("payload")?,
        row.get("notified")?,
        row.get("created_at_ms")?,
    ))
}

fn finish(raw: (i64, String, String, i64, i64)) -> Result<EventRecord, StoreError> {
    let (id, worker_id, payload, notified, created_at_ms) = raw;
    let event: Event = serde_json::from_str(&payload)?;
    Ok(EventRecord {
        id,
        worker_id: WorkerId::new(worker_id),
        event,
        notified: notified != 0,
        created_at_ms: created_at_ms as u64,
    })
}

impl Store {
    /// Append an event. Ids are assigned by the store, strictly increasing,
    /// never reissued.
    pub fn append_event(
        &self,
        worker_id: &WorkerId,
        event: &Event,
        now_ms: u64,
    ) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(event)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (worker_id, task_id, kind, payload, notified, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    worker_id.as_str(),
                    event.task_id().map(|t| t.as_str()),
                    event.name(),
                    payload,
                    now_ms as i64,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Atomically claim up to `limit` unnotified user-visible events for a
    /// worker, marking them notified in the same transaction. Each event is
    /// returned by exactly one claim across all callers.
    pub fn claim_unnotified(
        &self,
        worker_id: &WorkerId,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let raws: Vec<(i64, String, String, i64, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, worker_id, payload, notified, created_at_ms FROM events \
                     WHERE worker_id = ?1 AND notified = 0 \
                     AND kind IN ('task_done', 'task_failed', 'needs_input') \
                     ORDER BY id LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![worker_id.as_str(), limit as i64], record_from_row)?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            for (id, ..) in &raws {
                tx.execute("UPDATE events SET notified = 1 WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            raws.into_iter()
                .map(|mut raw| {
                    raw.3 = 1; // claimed means notified
                    finish(raw)
                })
                .collect()
        })
    }

    /// Count of unnotified user-visible events for a worker. The idle
    /// check refuses to shut the worker down while this is non-zero.
    pub fn unnotified_count(&self, worker_id: &WorkerId) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM events WHERE worker_id = ?1 AND notified = 0 \
                 AND kind IN ('task_done', 'task_failed', 'needs_input')",
                params![worker_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// All events for a worker in insertion order (dashboards, tests).
    pub fn events_for_worker(&self, worker_id: &WorkerId) -> Result<Vec<EventRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, worker_id, payload, notified, created_at_ms FROM events \
                 WHERE worker_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![worker_id.as_str()], record_from_row)?;
            rows.map(|r| finish(r?)).collect()
        })
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
