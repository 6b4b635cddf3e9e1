// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker record and status machine.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a worker (one per project).
    pub struct WorkerId;
}

/// Global status of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// No live process; may still own unfinished work (the supervisor's
    /// dormant-with-work sweep respawns it)
    Dormant,
    /// A live worker process owns this record
    Active,
    /// Worker exited fatally; the supervisor decides whether to respawn
    Error,
}

impl WorkerStatus {
    pub fn parse(s: &str) -> Option<WorkerStatus> {
        match s {
            "dormant" => Some(WorkerStatus::Dormant),
            "active" => Some(WorkerStatus::Active),
            "error" => Some(WorkerStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Dormant => write!(f, "dormant"),
            WorkerStatus::Active => write!(f, "active"),
            WorkerStatus::Error => write!(f, "error"),
        }
    }
}

/// A worker row in the shared store.
///
/// Lifecycle fields (pid, liveness session) belong to the supervisor;
/// status transitions and cost belong to the worker scheduler that owns the
/// record. All mutations go through store transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    /// Unique project name; doubles as the workspace directory name
    pub name: String,
    /// OS process id of the live worker, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Terminal-multiplexer session the worker runs in, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_session: Option<String>,
    pub status: WorkerStatus,
    /// Accumulated agent cost in USD; monotonically non-decreasing
    pub cost_usd: f64,
    /// Chat channel to notify for this worker's tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, name: impl Into<String>, epoch_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            pid: None,
            liveness_session: None,
            status: WorkerStatus::Dormant,
            cost_usd: 0.0,
            chat_id: None,
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
