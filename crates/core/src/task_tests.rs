// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::worker::WorkerId;
use yare::parameterized;

fn config(deps: Vec<TaskId>) -> TaskConfig {
    TaskConfig {
        id: TaskId::new("t-1"),
        worker_id: WorkerId::new("w-1"),
        parent_id: None,
        title: "title".to_string(),
        prompt: "prompt".to_string(),
        exec_mode: ExecMode::Agent,
        model: ModelTier::Standard,
        deps,
        skills: vec![],
        capability: None,
        idempotency_key: None,
    }
}

#[parameterized(
    pending_to_running = { TaskStatus::Pending, TaskStatus::Running, true },
    pending_to_blocked = { TaskStatus::Pending, TaskStatus::Blocked, true },
    blocked_to_pending = { TaskStatus::Blocked, TaskStatus::Pending, true },
    running_to_done = { TaskStatus::Running, TaskStatus::Done, true },
    running_to_failed = { TaskStatus::Running, TaskStatus::Failed, true },
    failed_to_pending = { TaskStatus::Failed, TaskStatus::Pending, true },
    done_is_terminal = { TaskStatus::Done, TaskStatus::Pending, false },
    done_to_running = { TaskStatus::Done, TaskStatus::Running, false },
    blocked_to_running = { TaskStatus::Blocked, TaskStatus::Running, false },
    pending_to_done = { TaskStatus::Pending, TaskStatus::Done, false },
    failed_to_running = { TaskStatus::Failed, TaskStatus::Running, false },
    running_to_pending = { TaskStatus::Running, TaskStatus::Pending, false },
    self_transition = { TaskStatus::Running, TaskStatus::Running, false },
)]
fn transition_table(from: TaskStatus, to: TaskStatus, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[test]
fn initial_status_follows_dependency_rule() {
    assert_eq!(TaskStatus::initial_for(&[]), TaskStatus::Pending);
    assert_eq!(
        TaskStatus::initial_for(&[TaskId::new("a")]),
        TaskStatus::Blocked
    );
}

#[test]
fn new_task_with_deps_starts_blocked() {
    let task = Task::new(config(vec![TaskId::new("dep")]), 1_000);
    assert_eq!(task.status, TaskStatus::Blocked);
    assert_eq!(task.created_at_ms, 1_000);
}

#[test]
fn new_task_without_deps_starts_pending() {
    let task = Task::new(config(vec![]), 1_000);
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.session_id.is_none());
    assert!(task.result.is_none());
}

#[test]
fn root_has_no_parent() {
    let task = Task::new(config(vec![]), 0);
    assert!(task.is_root());
}

#[parameterized(
    pending = { TaskStatus::Pending, "pending" },
    blocked = { TaskStatus::Blocked, "blocked" },
    running = { TaskStatus::Running, "running" },
    done = { TaskStatus::Done, "done" },
    failed = { TaskStatus::Failed, "failed" },
)]
fn status_display_round_trips(status: TaskStatus, s: &str) {
    assert_eq!(status.to_string(), s);
    assert_eq!(TaskStatus::parse(s), Some(status));
}

#[test]
fn status_parse_rejects_unknown() {
    assert_eq!(TaskStatus::parse("paused"), None);
}

#[test]
fn terminal_statuses() {
    assert!(TaskStatus::Done.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
    assert!(!TaskStatus::Pending.is_terminal());
    assert!(!TaskStatus::Blocked.is_terminal());
}

#[test]
fn model_tier_parse() {
    assert_eq!(ModelTier::parse("deep"), Some(ModelTier::Deep));
    assert_eq!(ModelTier::parse("opus"), None);
}

#[test]
fn exec_mode_parse() {
    assert_eq!(ExecMode::parse("aggregate"), Some(ExecMode::Aggregate));
    assert_eq!(ExecMode::parse("shell"), None);
}
