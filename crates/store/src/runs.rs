// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decomposition run records.
//!
//! One row per decomposition attempt; dashboards read them to answer
//! "why did this plan take 90 seconds" without scraping logs.

use crate::{Store, StoreError};
use ovs_core::{TaskId, WorkerId};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// Maximum characters of raw model output preserved on the run record.
pub const RAW_OUTPUT_LIMIT: usize = 1_200;

/// Observability record for one decomposition attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompRun {
    pub worker_id: WorkerId,
    pub task_id: TaskId,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub elapsed_ms: u64,
    pub model: String,
    pub timeout_ms: u64,
    pub request_chars: usize,
    pub prompt_chars: usize,
    pub result_chars: usize,
    pub parse_attempts: u32,
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// First [`RAW_OUTPUT_LIMIT`] characters of the raw model output
    pub raw_prefix: String,
}

impl Store {
    pub fn record_decomp_run(&self, run: &DecompRun) -> Result<i64, StoreError> {
        let raw_prefix: String = run.raw_prefix.chars().take(RAW_OUTPUT_LIMIT).collect();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO decomp_runs (worker_id, task_id, started_at_ms, finished_at_ms, \
                 elapsed_ms, model, timeout_ms, request_chars, prompt_chars, result_chars, \
                 parse_attempts, fallback, error_code, raw_prefix) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    run.worker_id.as_str(),
                    run.task_id.as_str(),
                    run.started_at_ms as i64,
                    run.finished_at_ms as i64,
                    run.elapsed_ms as i64,
                    run.model,
                    run.timeout_ms as i64,
                    run.request_chars as i64,
                    run.prompt_chars as i64,
                    run.result_chars as i64,
                    run.parse_attempts as i64,
                    run.fallback as i64,
                    run.error_code,
                    raw_prefix,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn decomp_runs_for(&self, task_id: &TaskId) -> Result<Vec<DecompRun>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT worker_id, task_id, started_at_ms, finished_at_ms, elapsed_ms, model, \
                 timeout_ms, request_chars, prompt_chars, result_chars, parse_attempts, fallback, \
                 error_code, raw_prefix FROM decomp_runs WHERE task_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![task_id.as_str()], |row| {
                Ok(DecompRun {
                    worker_id: WorkerId::new(row.get::<_, String>(0)?),
                    task_id: TaskId::new(row.get::<_, String>(1)?),
                    started_at_ms: row.get::<_, i64>(2)? as u64,
                    finished_at_ms: row.get::<_, i64>(3)? as u64,
                    elapsed_ms: row.get::<_, i64>(4)? as u64,
                    model: row.get(5)?,
                    timeout_ms: row.get::<_, i64>(6)? as u64,
                    request_chars: row.get::<_, i64>(7)? as usize,
                    prompt_chars: row.get::<_, i64>(8)? as usize,
                    result_chars: row.get::<_, i64>(9)? as usize,
                    parse_attempts: row.get::<_, i64>(10)? as u32,
                    fallback: row.get::<_, i64>(11)? != 0,
                    error_code: row.get(12)?,
                    raw_prefix: row.get(13)?,
                })
            })?;
            rows.collect::<rusqlite::Result<_>>().map_err(StoreError::from)
        })
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
