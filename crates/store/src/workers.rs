// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-record operations.

use crate::{Store, StoreError};
use ovs_core::{WorkerId, WorkerRecord, WorkerStatus};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<(WorkerRecord, String)> {
    let status_raw: String = row.get("status")?;
    let record = WorkerRecord {
        id: WorkerId::new(row.get::<_, String>("id")?),
        name: row.get("name")?,
        pid: row.get::<_, Option<i64>>("pid")?.map(|p| p as u32),
        liveness_session: row.get("liveness_session")?,
        // Replaced with the parsed value by the caller
        status: WorkerStatus::Dormant,
        cost_usd: row.get("cost_usd")?,
        chat_id: row.get("chat_id")?,
        created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
        updated_at_ms: row.get::<_, i64>("updated_at_ms")? as u64,
    };
    Ok((record, status_raw))
}

fn finish(pair: (WorkerRecord, String)) -> Result<WorkerRecord, StoreError> {
    let (mut record, status_raw) = pair;
    record.status = WorkerStatus::parse(&status_raw).ok_or_else(|| StoreError::Corrupt {
        column: "status",
        id: record.id.to_string(),
        message: format!("unknown worker status {status_raw:?}"),
    })?;
    Ok(record)
}

const SELECT: &str = "SELECT id, name, pid, liveness_session, status, cost_usd, chat_id, \
     created_at_ms, updated_at_ms FROM workers";

impl Store {
    /// Look up a worker by name, creating it dormant if absent. Lookup and
    /// creation happen in one transaction, so concurrent callers racing on
    /// the same name resolve to a single row.
    ///
    /// When `chat_id` is supplied and differs from the stored handle, the
    /// stored handle is updated.
    pub fn get_or_create_worker(
        &self,
        id_if_new: &WorkerId,
        name: &str,
        chat_id: Option<&str>,
        now_ms: u64,
    ) -> Result<WorkerRecord, StoreError> {
        self.with_conn(|conn| {
            // Immediate: take the write lock before reading so concurrent
            // creators serialize instead of racing the UNIQUE index
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing = tx
                .query_row(
                    &format!("{SELECT} WHERE name = ?1"),
                    params![name],
                    worker_from_row,
                )
                .optional()?;

            let record = match existing {
                Some(pair) => {
                    let mut record = finish(pair)?;
                    if let Some(chat) = chat_id {
                        if record.chat_id.as_deref() != Some(chat) {
                            tx.execute(
                                "UPDATE workers SET chat_id = ?1, updated_at_ms = ?2 WHERE id = ?3",
                                params![chat, now_ms as i64, record.id.as_str()],
                            )?;
                            record.chat_id = Some(chat.to_string());
                        }
                    }
                    record
                }
                None => {
                    let mut record = WorkerRecord::new(id_if_new.clone(), name, now_ms);
                    record.chat_id = chat_id.map(str::to_string);
                    tx.execute(
                        "INSERT INTO workers (id, name, pid, liveness_session, status, cost_usd, \
                         chat_id, created_at_ms, updated_at_ms) \
                         VALUES (?1, ?2, NULL, NULL, ?3, 0, ?4, ?5, ?5)",
                        params![
                            record.id.as_str(),
                            name,
                            record.status.to_string(),
                            record.chat_id,
                            now_ms as i64,
                        ],
                    )?;
                    record
                }
            };
            tx.commit()?;
            Ok(record)
        })
    }

    pub fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT} WHERE id = ?1"),
                params![id.as_str()],
                worker_from_row,
            )
            .optional()?
            .map(finish)
            .transpose()
        })
    }

    pub fn worker_by_name(&self, name: &str) -> Result<Option<WorkerRecord>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT} WHERE name = ?1"),
                params![name],
                worker_from_row,
            )
            .optional()?
            .map(finish)
            .transpose()
        })
    }

    pub fn workers_with_status(
        &self,
        status: WorkerStatus,
    ) -> Result<Vec<WorkerRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT} WHERE status = ?1 ORDER BY name"))?;
            let rows = stmt.query_map(params![status.to_string()], worker_from_row)?;
            rows.map(|r| finish(r?)).collect()
        })
    }

    /// Heartbeat: touch the worker's updated timestamp.
    pub fn touch_worker(&self, id: &WorkerId, now_ms: u64) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE workers SET updated_at_ms = ?1 WHERE id = ?2",
                params![now_ms as i64, id.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn set_worker_status(
        &self,
        id: &WorkerId,
        status: WorkerStatus,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE workers SET status = ?1, updated_at_ms = ?2 WHERE id = ?3",
                params![status.to_string(), now_ms as i64, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    kind: "worker",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Record (or clear) the worker's OS process id and liveness session.
    /// The supervisor is the sole writer of these fields.
    pub fn set_worker_process(
        &self,
        id: &WorkerId,
        pid: Option<u32>,
        liveness_session: Option<&str>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE workers SET pid = ?1, liveness_session = ?2, updated_at_ms = ?3 \
                 WHERE id = ?4",
                params![
                    pid.map(i64::from),
                    liveness_session,
                    now_ms as i64,
                    id.as_str()
                ],
            )?;
            Ok(())
        })
    }

    /// Add `delta` dollars to the worker's accumulated cost. Negative
    /// deltas are discarded: cost is monotonically non-decreasing.
    pub fn add_worker_cost(
        &self,
        id: &WorkerId,
        delta_usd: f64,
        now_ms: u64,
    ) -> Result<f64, StoreError> {
        if delta_usd <= 0.0 {
            if delta_usd < 0.0 {
                tracing::warn!(worker_id = %id, delta_usd, "discarding negative cost delta");
            }
            let record = self.worker(id)?.ok_or_else(|| StoreError::NotFound {
                kind: "worker",
                id: id.to_string(),
            })?;
            return Ok(record.cost_usd);
        }
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE workers SET cost_usd = cost_usd + ?1, updated_at_ms = ?2 WHERE id = ?3",
                params![delta_usd, now_ms as i64, id.as_str()],
            )?;
            conn.query_row(
                "SELECT cost_usd FROM workers WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)
        })
    }

    /// Workers marked dormant that still own unfinished tasks. The
    /// supervisor spawns a child for each.
    pub fn dormant_workers_with_open_tasks(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT} WHERE status = 'dormant' AND id IN \
                 (SELECT DISTINCT worker_id FROM tasks \
                  WHERE status IN ('pending', 'blocked', 'running')) \
                 ORDER BY name"
            ))?;
            let rows = stmt.query_map([], worker_from_row)?;
            rows.map(|r| finish(r?)).collect()
        })
    }
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
