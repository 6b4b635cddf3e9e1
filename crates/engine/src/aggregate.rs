// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion aggregation.
//!
//! When a task reaches a terminal state its parent is evaluated. On the
//! completion path an ancestor closes only once every child is terminal:
//! all done aggregates child results into an ordered list, any failure
//! fails the parent. The failure path is more eager: a still-running
//! parent fails as soon as a second child failure is observed, without
//! waiting for in-flight siblings (which keep executing — nothing is
//! cancelled). Evaluation recurses upward so a settled subtree closes its
//! whole ancestor chain.

use ovs_core::{AggregatedEntry, Event, TaskId, TaskResult, TaskStatus};
use ovs_store::{Store, StoreError};

/// Failure reason written to a parent whose subtree failed.
pub const SUBTASKS_FAILED_REASON: &str = "one or more subtasks failed";

/// Walk up from `task_id` after a completion. Returns the events
/// produced (parent done/failed), which the caller appends to the store.
pub fn evaluate_parent_chain(
    store: &Store,
    task_id: &TaskId,
    now_ms: u64,
) -> Result<Vec<Event>, StoreError> {
    walk(store, task_id, now_ms, false)
}

/// Walk up from `task_id` after a failure. Same as
/// [`evaluate_parent_chain`], plus the eager rule: a running parent with
/// more than one failed child fails immediately.
pub fn evaluate_parent_chain_after_failure(
    store: &Store,
    task_id: &TaskId,
    now_ms: u64,
) -> Result<Vec<Event>, StoreError> {
    walk(store, task_id, now_ms, true)
}

fn walk(
    store: &Store,
    task_id: &TaskId,
    now_ms: u64,
    mut failure_observed: bool,
) -> Result<Vec<Event>, StoreError> {
    let mut events = Vec::new();
    let mut parent_id = match store.task(task_id)? {
        Some(task) => task.parent_id,
        None => return Ok(events),
    };

    while let Some(pid) = parent_id {
        let parent = match store.task(&pid)? {
            Some(parent) => parent,
            None => break,
        };
        // Only a running parent may be closed; anything else means a
        // concurrent close already happened
        if parent.status != TaskStatus::Running {
            break;
        }
        let children = store.children(&pid)?;
        if children.is_empty() {
            break;
        }

        let failed = children
            .iter()
            .filter(|c| c.status == TaskStatus::Failed)
            .count();
        let all_terminal = children.iter().all(|c| c.status.is_terminal());

        if all_terminal && failed == 0 {
            let entries: Vec<AggregatedEntry> = children
                .iter()
                .map(|child| AggregatedEntry {
                    title: child.title.clone(),
                    result: TaskResult::from_raw(child.result.as_deref().unwrap_or_default()),
                })
                .collect();
            let payload = serde_json::to_string(&entries)?;
            store.set_task_result(&pid, Some(&payload), now_ms)?;
            store.transition_task(&pid, TaskStatus::Done, now_ms)?;
            events.push(Event::TaskDone {
                task_id: pid.clone(),
                title: parent.title.clone(),
                message: format!("{} subtasks completed", entries.len()),
            });
            tracing::info!(parent_id = %pid, children = entries.len(), "parent aggregated");
            failure_observed = false;
        } else if all_terminal || (failure_observed && failed > 1) {
            // Either the subtree is settled with failures, or a second
            // failure just landed: fail the parent now. Siblings still
            // executing are left alone.
            let payload = serde_json::to_string(&TaskResult::error(SUBTASKS_FAILED_REASON))?;
            store.set_task_result(&pid, Some(&payload), now_ms)?;
            store.transition_task(&pid, TaskStatus::Failed, now_ms)?;
            events.push(Event::TaskFailed {
                task_id: pid.clone(),
                title: parent.title.clone(),
                reason: SUBTASKS_FAILED_REASON.to_string(),
            });
            tracing::info!(parent_id = %pid, failed, all_terminal, "parent failed: subtree has failures");
            failure_observed = true;
        } else {
            // Siblings still executing and no eager rule applies
            break;
        }

        parent_id = parent.parent_id;
    }

    Ok(events)
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
