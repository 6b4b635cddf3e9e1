// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control commands addressed to a worker through the shared store.

use crate::task::TaskId;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};

/// Commands inserted by the chat relay and consumed once by the target
/// worker scheduler.
///
/// Serializes with `{"type": "answer", ...fields}` format. Unknown type
/// tags are preserved as `Custom` so a newer relay never wedges an older
/// worker's command queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Resume the agent bound to a waiting task with the user's answer
    #[serde(rename = "answer")]
    Answer { task_id: TaskId, text: String },

    /// Abort all in-flight agents, fail their tasks, terminate the worker
    #[serde(rename = "kill")]
    Kill,

    /// Stop spawning new work; keep servicing commands and in-flight agents
    #[serde(rename = "pause")]
    Pause,

    /// Clear the paused flag
    #[serde(rename = "resume")]
    Resume,

    /// Reset a failed task to pending (the documented retry escape hatch)
    #[serde(rename = "retry")]
    Retry { task_id: TaskId },

    /// Catch-all for unknown command types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Answer { .. } => "answer",
            Command::Kill => "kill",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Retry { .. } => "retry",
            Command::Custom => "custom",
        }
    }
}

/// A persisted command row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Monotonic store-assigned id; never reissued
    pub id: i64,
    pub worker_id: WorkerId,
    pub command: Command,
    /// Set after dispatch returns; handling is at-most-once per id
    pub handled: bool,
    pub created_at_ms: u64,
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
