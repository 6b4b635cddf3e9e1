// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types appended to the shared store by workers and the supervisor.

use crate::task::TaskId;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events describing task and agent lifecycle.
///
/// Serializes with `{"type": "task_started", ...fields}` format. Unknown
/// type tags deserialize to `Custom` so newer writers never break older
/// readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "task_started")]
    TaskStarted { task_id: TaskId, title: String },

    #[serde(rename = "task_done")]
    TaskDone {
        task_id: TaskId,
        title: String,
        /// Result message from the agent's final payload
        message: String,
    },

    #[serde(rename = "task_failed")]
    TaskFailed {
        task_id: TaskId,
        title: String,
        reason: String,
    },

    /// Agent asked the user a question and is waiting for an answer
    #[serde(rename = "needs_input")]
    NeedsInput { task_id: TaskId, question: String },

    /// Agent session stopped (from the Stop hook)
    #[serde(rename = "agent_stop")]
    AgentStop {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// A file was edited or written by an agent (from the PostToolUse hook)
    #[serde(rename = "file_changed")]
    FileChanged { task_id: TaskId, path: PathBuf },

    /// The same tool was invoked five times in a row
    #[serde(rename = "loop_detected")]
    LoopDetected { task_id: TaskId, tool: String },

    /// Agent asked a question it already asked for this task
    #[serde(rename = "duplicate_question")]
    DuplicateQuestion {
        task_id: TaskId,
        /// 16-hex prefix of the question's SHA-256
        hash: String,
    },

    /// A task would exceed the maximum tree depth
    #[serde(rename = "depth_limit_exceeded")]
    DepthLimitExceeded { task_id: TaskId, depth: u32 },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskStarted { .. } => "task_started",
            Event::TaskDone { .. } => "task_done",
            Event::TaskFailed { .. } => "task_failed",
            Event::NeedsInput { .. } => "needs_input",
            Event::AgentStop { .. } => "agent_stop",
            Event::FileChanged { .. } => "file_changed",
            Event::LoopDetected { .. } => "loop_detected",
            Event::DuplicateQuestion { .. } => "duplicate_question",
            Event::DepthLimitExceeded { .. } => "depth_limit_exceeded",
            Event::Custom => "custom",
        }
    }

    /// Whether notification dispatch forwards this event to the chat
    /// channel. Diagnostic events stay in the store for dashboards.
    pub fn user_visible(&self) -> bool {
        matches!(
            self,
            Event::TaskDone { .. } | Event::TaskFailed { .. } | Event::NeedsInput { .. }
        )
    }

    /// Task this event is about, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskStarted { task_id, .. }
            | Event::TaskDone { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::NeedsInput { task_id, .. }
            | Event::AgentStop { task_id, .. }
            | Event::FileChanged { task_id, .. }
            | Event::LoopDetected { task_id, .. }
            | Event::DuplicateQuestion { task_id, .. }
            | Event::DepthLimitExceeded { task_id, .. } => Some(task_id),
            Event::Custom => None,
        }
    }

    /// One-line summary for log spans.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::TaskStarted { task_id, title } => format!("{t} task={task_id} title={title}"),
            Event::TaskDone { task_id, .. } => format!("{t} task={task_id}"),
            Event::TaskFailed {
                task_id, reason, ..
            } => format!("{t} task={task_id} reason={reason}"),
            Event::NeedsInput { task_id, .. } => format!("{t} task={task_id}"),
            Event::AgentStop { task_id, .. } => format!("{t} task={task_id}"),
            Event::FileChanged { task_id, path } => {
                format!("{t} task={task_id} path={}", path.display())
            }
            Event::LoopDetected { task_id, tool } => format!("{t} task={task_id} tool={tool}"),
            Event::DuplicateQuestion { task_id, hash } => {
                format!("{t} task={task_id} hash={hash}")
            }
            Event::DepthLimitExceeded { task_id, depth } => {
                format!("{t} task={task_id} depth={depth}")
            }
            Event::Custom => t.to_string(),
        }
    }
}

/// A persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic store-assigned id; never reissued
    pub id: i64,
    pub worker_id: WorkerId,
    pub event: Event,
    /// Set once by the notification dispatcher's claim
    pub notified: bool,
    pub created_at_ms: u64,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
