// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier and state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a task.
    ///
    /// Generated as UUIDv7 so sibling tasks sort in creation order.
    #[derive(Default)]
    pub struct TaskId;
}

/// Maximum depth of the task tree (root = 0). Tasks at or beyond this
/// depth are failed without launching an agent, which keeps recursive
/// decomposition bounded.
pub const MAX_TASK_DEPTH: u32 = 3;

/// Status of a task in the scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Ready to be picked up by the scheduler
    Pending,
    /// Waiting on unfinished dependencies
    Blocked,
    /// An agent session is executing it (or decomposition is in flight)
    Running,
    /// Finished successfully; result recorded
    Done,
    /// Finished unsuccessfully; eligible for retry
    Failed,
}

impl TaskStatus {
    /// The allowed-transition table. Any transition not listed here is
    /// rejected by the store's guarded update. The single documented
    /// exception (a failed parent rewritten to running on retry) is applied
    /// by the retry path in the store, never through the guarded update.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Blocked)
                | (Blocked, Pending)
                | (Running, Done)
                | (Running, Failed)
                | (Failed, Pending)
        )
    }

    /// Check if this status is terminal ({done, failed}).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    /// Initial status per the dependency rule: tasks with deps start
    /// blocked, tasks without start pending.
    pub fn initial_for(deps: &[TaskId]) -> TaskStatus {
        if deps.is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::Blocked
        }
    }

    /// Parse from the persisted string form.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "blocked" => Some(TaskStatus::Blocked),
            "running" => Some(TaskStatus::Running),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// How a task produces its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Run one agent session bound to this task
    #[default]
    Agent,
    /// Result is composed from children; never executed directly
    Aggregate,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecMode::Agent => write!(f, "agent"),
            ExecMode::Aggregate => write!(f, "aggregate"),
        }
    }
}

impl ExecMode {
    pub fn parse(s: &str) -> Option<ExecMode> {
        match s {
            "agent" => Some(ExecMode::Agent),
            "aggregate" => Some(ExecMode::Aggregate),
            _ => None,
        }
    }
}

/// Reasoning-model tier requested for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheap and quick; mechanical subtasks
    Fast,
    #[default]
    Standard,
    /// Extended reasoning; planning-heavy subtasks
    Deep,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Fast => write!(f, "fast"),
            ModelTier::Standard => write!(f, "standard"),
            ModelTier::Deep => write!(f, "deep"),
        }
    }
}

impl ModelTier {
    pub fn parse(s: &str) -> Option<ModelTier> {
        match s {
            "fast" => Some(ModelTier::Fast),
            "standard" => Some(ModelTier::Standard),
            "deep" => Some(ModelTier::Deep),
            _ => None,
        }
    }
}

/// Configuration for creating a new task
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub id: TaskId,
    pub worker_id: crate::worker::WorkerId,
    pub parent_id: Option<TaskId>,
    pub title: String,
    pub prompt: String,
    pub exec_mode: ExecMode,
    pub model: ModelTier,
    pub deps: Vec<TaskId>,
    pub skills: Vec<String>,
    pub capability: Option<String>,
    /// Dedup key for externally triggered roots (e.g. cron firings)
    pub idempotency_key: Option<String>,
}

impl TaskConfig {
    /// Minimal config for a root task with no dependencies.
    pub fn root(
        id: TaskId,
        worker_id: crate::worker::WorkerId,
        title: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id,
            worker_id,
            parent_id: None,
            title: title.into(),
            prompt: prompt.into(),
            exec_mode: ExecMode::Agent,
            model: ModelTier::default(),
            deps: Vec::new(),
            skills: Vec::new(),
            capability: None,
            idempotency_key: None,
        }
    }
}

/// A unit of work with a prompt, dependencies, status, and optional
/// parent/children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub worker_id: crate::worker::WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub title: String,
    pub prompt: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub exec_mode: ExecMode,
    #[serde(default)]
    pub model: ModelTier,
    /// Handle for resuming the bound agent session, set on the session's
    /// init message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Sibling task ids that must be done before this task runs
    #[serde(default)]
    pub deps: Vec<TaskId>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Raw result payload (task-result JSON for leaves, aggregated array
    /// for parents, error result for failures)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Task {
    /// Create a new task. Initial status follows the dependency rule.
    pub fn new(config: TaskConfig, epoch_ms: u64) -> Self {
        let status = TaskStatus::initial_for(&config.deps);
        Self {
            id: config.id,
            worker_id: config.worker_id,
            parent_id: config.parent_id,
            title: config.title,
            prompt: config.prompt,
            status,
            exec_mode: config.exec_mode,
            model: config.model,
            session_id: None,
            deps: config.deps,
            skills: config.skills,
            capability: config.capability,
            result: None,
            idempotency_key: config.idempotency_key,
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
        }
    }

    /// True for tasks that have no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
