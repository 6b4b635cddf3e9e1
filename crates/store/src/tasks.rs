// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task operations: creation, guarded transitions, dependency resolution,
//! and the retry escape hatch.

use crate::{Store, StoreError};
use ovs_core::{ExecMode, ModelTier, Task, TaskId, TaskResult, TaskStatus, WorkerId};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

const SELECT: &str = "SELECT id, worker_id, parent_id, title, prompt, status, exec_mode, model, \
     session_id, deps, skills, capability, result, idempotency_key, created_at_ms, updated_at_ms \
     FROM tasks";

/// Row image before the string columns are parsed into typed fields.
struct RawTask {
    task: Task,
    status: String,
    exec_mode: String,
    model: String,
    deps: String,
    skills: String,
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        task: Task {
            id: TaskId::new(row.get::<_, String>("id")?),
            worker_id: WorkerId::new(row.get::<_, String>("worker_id")?),
            parent_id: row.get::<_, Option<String>>("parent_id")?.map(TaskId::new),
            title: row.get("title")?,
            prompt: row.get("prompt")?,
            // Replaced with parsed values by `finish`
            status: TaskStatus::Pending,
            exec_mode: ExecMode::Agent,
            model: ModelTier::Standard,
            session_id: row.get("session_id")?,
            deps: Vec::new(),
            skills: Vec::new(),
            capability: row.get("capability")?,
            result: row.get("result")?,
            idempotency_key: row.get("idempotency_key")?,
            created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
            updated_at_ms: row.get::<_, i64>("updated_at_ms")? as u64,
        },
        status: row.get("status")?,
        exec_mode: row.get("exec_mode")?,
        model: row.get("model")?,
        deps: row.get("deps")?,
        skills: row.get("skills")?,
    })
}

fn finish(raw: RawTask) -> Result<Task, StoreError> {
    let mut task = raw.task;
    let id = task.id.to_string();
    let corrupt = |column: &'static str, message: String| StoreError::Corrupt {
        column,
        id: id.clone(),
        message,
    };

    task.status = TaskStatus::parse(&raw.status)
        .ok_or_else(|| corrupt("status", format!("unknown task status {:?}", raw.status)))?;
    task.exec_mode = ExecMode::parse(&raw.exec_mode)
        .ok_or_else(|| corrupt("exec_mode", format!("unknown exec mode {:?}", raw.exec_mode)))?;
    task.model = ModelTier::parse(&raw.model)
        .ok_or_else(|| corrupt("model", format!("unknown model tier {:?}", raw.model)))?;

    let deps: Vec<String> =
        serde_json::from_str(&raw.deps).map_err(|e| corrupt("deps", e.to_string()))?;
    task.deps = deps.into_iter().map(TaskId::new).collect();
    task.skills =
        serde_json::from_str(&raw.skills).map_err(|e| corrupt("skills", e.to_string()))?;
    Ok(task)
}

fn insert_task(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    let deps: Vec<&str> = task.deps.iter().map(TaskId::as_str).collect();
    conn.execute(
        "INSERT INTO tasks (id, worker_id, parent_id, title, prompt, status, exec_mode, model, \
         session_id, deps, skills, capability, result, idempotency_key, created_at_ms, \
         updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            task.id.as_str(),
            task.worker_id.as_str(),
            task.parent_id.as_ref().map(TaskId::as_str),
            task.title,
            task.prompt,
            task.status.to_string(),
            task.exec_mode.to_string(),
            task.model.to_string(),
            task.session_id,
            serde_json::to_string(&deps)?,
            serde_json::to_string(&task.skills)?,
            task.capability,
            task.result,
            task.idempotency_key,
            task.created_at_ms as i64,
            task.updated_at_ms as i64,
        ],
    )?;
    Ok(())
}

impl Store {
    /// Insert one task. When the task carries an idempotency key that
    /// already exists, nothing is inserted and the existing task's id is
    /// returned.
    pub fn create_task(&self, task: &Task) -> Result<TaskId, StoreError> {
        self.with_conn(|conn| {
            if let Some(key) = &task.idempotency_key {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT id FROM tasks WHERE idempotency_key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    tracing::debug!(key, existing = %id, "task creation deduplicated");
                    return Ok(TaskId::new(id));
                }
            }
            insert_task(conn, task)?;
            Ok(task.id.clone())
        })
    }

    /// Insert a batch of tasks all-or-nothing. Returns the assigned ids in
    /// input order. Used by decomposition so a half-created graph can never
    /// be observed.
    pub fn create_tasks(&self, tasks: &[Task]) -> Result<Vec<TaskId>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for task in tasks {
                insert_task(&tx, task)?;
            }
            tx.commit()?;
            Ok(tasks.iter().map(|t| t.id.clone()).collect())
        })
    }

    /// Apply resolved dependency lists atomically: each tuple sets a
    /// task's deps and status in one transaction. Used after decomposition
    /// once title-to-id resolution is complete.
    pub fn apply_dependencies(
        &self,
        updates: &[(TaskId, Vec<TaskId>, TaskStatus)],
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for (task_id, deps, status) in updates {
                let deps: Vec<&str> = deps.iter().map(TaskId::as_str).collect();
                let changed = tx.execute(
                    "UPDATE tasks SET deps = ?1, status = ?2, updated_at_ms = ?3 WHERE id = ?4",
                    params![
                        serde_json::to_string(&deps)?,
                        status.to_string(),
                        now_ms as i64,
                        task_id.as_str()
                    ],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound {
                        kind: "task",
                        id: task_id.to_string(),
                    });
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Guarded status transition. Consults the allowed-transition table;
    /// illegal moves are logged and rejected, never silently applied.
    pub fn transition_task(
        &self,
        id: &TaskId,
        to: TaskStatus,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let from_raw: String = tx
                .query_row(
                    "SELECT status FROM tasks WHERE id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound {
                    kind: "task",
                    id: id.to_string(),
                })?;
            let from = TaskStatus::parse(&from_raw).ok_or_else(|| StoreError::Corrupt {
                column: "status",
                id: id.to_string(),
                message: format!("unknown task status {from_raw:?}"),
            })?;
            if !from.can_transition_to(to) {
                tracing::warn!(task_id = %id, %from, %to, "rejecting illegal task transition");
                return Err(StoreError::IllegalTransition {
                    task_id: id.clone(),
                    from,
                    to,
                });
            }
            tx.execute(
                "UPDATE tasks SET status = ?1, updated_at_ms = ?2 WHERE id = ?3",
                params![to.to_string(), now_ms as i64, id.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT} WHERE id = ?1"),
                params![id.as_str()],
                task_from_row,
            )
            .optional()?
            .map(finish)
            .transpose()
        })
    }

    /// All root tasks (no parent) for a worker, oldest first.
    pub fn root_tasks(&self, worker_id: &WorkerId) -> Result<Vec<Task>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT} WHERE worker_id = ?1 AND parent_id IS NULL \
                 ORDER BY created_at_ms, id"
            ))?;
            let rows = stmt.query_map(params![worker_id.as_str()], task_from_row)?;
            rows.map(|r| finish(r?)).collect()
        })
    }

    pub fn tasks_with_status(
        &self,
        worker_id: &WorkerId,
        status: TaskStatus,
    ) -> Result<Vec<Task>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT} WHERE worker_id = ?1 AND status = ?2 ORDER BY created_at_ms, id"
            ))?;
            let rows = stmt.query_map(
                params![worker_id.as_str(), status.to_string()],
                task_from_row,
            )?;
            rows.map(|r| finish(r?)).collect()
        })
    }

    /// Children of a parent in creation order (stable across retries:
    /// retry resets status, never recreates rows).
    pub fn children(&self, parent_id: &TaskId) -> Result<Vec<Task>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT} WHERE parent_id = ?1 ORDER BY created_at_ms, id"
            ))?;
            let rows = stmt.query_map(params![parent_id.as_str()], task_from_row)?;
            rows.map(|r| finish(r?)).collect()
        })
    }

    pub fn has_children(&self, task_id: &TaskId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE parent_id = ?1",
                params![task_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Promote blocked tasks whose dependency set is fully done. Each flip
    /// is atomic per task; returns the promoted set.
    pub fn promote_unblocked(
        &self,
        worker_id: &WorkerId,
        now_ms: u64,
    ) -> Result<Vec<Task>, StoreError> {
        let blocked = self.tasks_with_status(worker_id, TaskStatus::Blocked)?;
        let mut promoted = Vec::new();
        for mut task in blocked {
            let mut all_done = true;
            for dep in &task.deps {
                match self.task(dep)? {
                    Some(dep_task) if dep_task.status == TaskStatus::Done => {}
                    _ => {
                        all_done = false;
                        break;
                    }
                }
            }
            if !all_done {
                continue;
            }
            self.transition_task(&task.id, TaskStatus::Pending, now_ms)?;
            task.status = TaskStatus::Pending;
            task.updated_at_ms = now_ms;
            promoted.push(task);
        }
        Ok(promoted)
    }

    /// Whether every child of `parent_id` is done. False when there are no
    /// children.
    pub fn all_children_done(&self, parent_id: &TaskId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let (total, done): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(CASE WHEN status = 'done' THEN 1 END) \
                 FROM tasks WHERE parent_id = ?1",
                params![parent_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(total > 0 && total == done)
        })
    }

    /// Whether any child of `parent_id` has failed.
    pub fn any_child_failed(&self, parent_id: &TaskId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let failed: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE parent_id = ?1 AND status = 'failed'",
                params![parent_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(failed > 0)
        })
    }

    /// Record the agent session handle on a task (set on init, cleared on
    /// retry).
    pub fn set_task_session(
        &self,
        id: &TaskId,
        session_id: Option<&str>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET session_id = ?1, updated_at_ms = ?2 WHERE id = ?3",
                params![session_id, now_ms as i64, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Record the exec mode on a task (a decomposed root becomes an
    /// aggregate node).
    pub fn set_task_exec_mode(
        &self,
        id: &TaskId,
        exec_mode: ExecMode,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET exec_mode = ?1, updated_at_ms = ?2 WHERE id = ?3",
                params![exec_mode.to_string(), now_ms as i64, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Record the raw result payload on a task.
    pub fn set_task_result(
        &self,
        id: &TaskId,
        result: Option<&str>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET result = ?1, updated_at_ms = ?2 WHERE id = ?3",
                params![result, now_ms as i64, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// The retry escape hatch. In one transaction: the failed task goes
    /// back to pending with result and session cleared; a failed parent is
    /// rewritten to running (the only transition outside the table) with
    /// its result cleared.
    pub fn reset_task_for_retry(&self, id: &TaskId, now_ms: u64) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT status, parent_id FROM tasks WHERE id = ?1",
                    params![id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (status_raw, parent_id) = row.ok_or_else(|| StoreError::NotFound {
                kind: "task",
                id: id.to_string(),
            })?;
            let from = TaskStatus::parse(&status_raw).ok_or_else(|| StoreError::Corrupt {
                column: "status",
                id: id.to_string(),
                message: format!("unknown task status {status_raw:?}"),
            })?;
            if from != TaskStatus::Failed {
                return Err(StoreError::IllegalTransition {
                    task_id: id.clone(),
                    from,
                    to: TaskStatus::Pending,
                });
            }
            tx.execute(
                "UPDATE tasks SET status = 'pending', result = NULL, session_id = NULL, \
                 updated_at_ms = ?1 WHERE id = ?2",
                params![now_ms as i64, id.as_str()],
            )?;
            if let Some(parent_id) = parent_id {
                tx.execute(
                    "UPDATE tasks SET status = 'running', result = NULL, updated_at_ms = ?1 \
                     WHERE id = ?2 AND status = 'failed'",
                    params![now_ms as i64, parent_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Fail every running task of a worker with the given reason. Used on
    /// shutdown and when a worker adopts leftovers after a crash. Returns
    /// the failed tasks.
    pub fn fail_running_tasks(
        &self,
        worker_id: &WorkerId,
        reason: &str,
        now_ms: u64,
    ) -> Result<Vec<Task>, StoreError> {
        let running = self.tasks_with_status(worker_id, TaskStatus::Running)?;
        let payload = serde_json::to_string(&TaskResult::error(reason))?;
        for task in &running {
            self.set_task_result(&task.id, Some(&payload), now_ms)?;
            self.transition_task(&task.id, TaskStatus::Failed, now_ms)?;
        }
        Ok(running)
    }

    /// Depth of a task in its tree (root = 0), walking the parent chain.
    pub fn task_depth(&self, id: &TaskId) -> Result<u32, StoreError> {
        self.with_conn(|conn| {
            let mut depth = 0u32;
            let mut current = id.as_str().to_string();
            loop {
                let parent: Option<String> = conn
                    .query_row(
                        "SELECT parent_id FROM tasks WHERE id = ?1",
                        params![current],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| StoreError::NotFound {
                        kind: "task",
                        id: current.clone(),
                    })?;
                match parent {
                    Some(parent_id) => {
                        depth += 1;
                        current = parent_id;
                        // A tree deeper than this is corrupt, not legal
                        if depth > 64 {
                            return Err(StoreError::Corrupt {
                                column: "parent_id",
                                id: id.to_string(),
                                message: "parent chain exceeds 64 levels".to_string(),
                            });
                        }
                    }
                    None => return Ok(depth),
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
