// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-worker scheduler state machine.
//!
//! One tick: heartbeat, drain commands, drain session events, gate on
//! pause/budget, decompose fresh roots, promote unblocked tasks, spawn
//! pending leaves up to capacity, dispatch notifications, detect idle.
//! The loop runs at the poll cadence with a consecutive-error governor;
//! three failed ticks flip the worker to error and exit.

use crate::aggregate;
use crate::decompose::Decomposer;
use crate::error::EngineError;
use crate::notify::Notifier;
use crate::pool::{AgentPool, PoolEvent};
use ovs_adapters::{ChatAdapter, ReasoningAdapter, ReasoningError};
use ovs_core::{
    Clock, Command, Config, Event, IdGen, ModelTier, Task, TaskConfig, TaskId, TaskResult,
    TaskStatus, WorkerId, WorkerRecord, WorkerStatus, MAX_TASK_DEPTH,
};
use ovs_store::{Store, StoreError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Tick errors tolerated before the worker flips to error and exits.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Grace given to in-flight sessions when a kill command drains the pool.
const KILL_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Scheduler tuning, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_agents: usize,
    pub budget_usd: f64,
    pub default_model: ModelTier,
    pub poll_interval: Duration,
    pub agent_timeout: Duration,
    pub workspace: PathBuf,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config, workspace: PathBuf) -> Self {
        Self {
            max_agents: config.max_agents,
            budget_usd: config.budget_usd,
            default_model: config.default_model,
            poll_interval: config.poll_interval,
            agent_timeout: config.agent_timeout,
            workspace,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// All work done and notified; worker flipped dormant
    Idle,
    /// Kill command handled; worker flipped dormant
    Killed,
}

/// Why the scheduler loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Idle,
    Killed,
    /// Consecutive-error governor tripped; worker flipped to error
    Fatal,
}

/// The per-project worker scheduler.
pub struct WorkerScheduler<R, C, K, I>
where
    R: ReasoningAdapter,
    C: ChatAdapter,
    K: Clock,
    I: IdGen,
{
    store: Store,
    worker_id: WorkerId,
    config: SchedulerConfig,
    pool: AgentPool<R>,
    decomposer: Decomposer<R>,
    notifier: Notifier<R, C>,
    clock: K,
    idgen: I,
    paused: bool,
    budget_notified: bool,
    consecutive_errors: u32,
}

impl<R, C, K, I> WorkerScheduler<R, C, K, I>
where
    R: ReasoningAdapter,
    C: ChatAdapter,
    K: Clock,
    I: IdGen,
{
    pub fn new(
        store: Store,
        worker_id: WorkerId,
        reasoning: R,
        chat: C,
        clock: K,
        idgen: I,
        config: SchedulerConfig,
    ) -> Self {
        let pool = AgentPool::new(
            reasoning.clone(),
            config.workspace.clone(),
            config.agent_timeout,
        );
        let decomposer = Decomposer::new(reasoning.clone(), config.default_model);
        let notifier = Notifier::new(reasoning, chat, config.workspace.clone());
        Self {
            store,
            worker_id,
            config,
            pool,
            decomposer,
            notifier,
            clock,
            idgen,
            paused: false,
            budget_notified: false,
            consecutive_errors: 0,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn in_flight_count(&self) -> usize {
        self.pool.in_flight_count()
    }

    /// Run ticks at the poll cadence until idle, killed, or fatal.
    pub async fn run(&mut self) -> ExitReason {
        loop {
            match self.tick().await {
                Ok(TickOutcome::Continue) => {
                    self.consecutive_errors = 0;
                }
                Ok(TickOutcome::Idle) => return ExitReason::Idle,
                Ok(TickOutcome::Killed) => return ExitReason::Killed,
                Err(e) => {
                    self.consecutive_errors += 1;
                    tracing::error!(
                        worker_id = %self.worker_id,
                        consecutive = self.consecutive_errors,
                        error = %e,
                        "scheduler tick failed"
                    );
                    if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        let _ = self.store.set_worker_status(
                            &self.worker_id,
                            WorkerStatus::Error,
                            self.clock.epoch_ms(),
                        );
                        return ExitReason::Fatal;
                    }
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One pass of the state machine.
    pub async fn tick(&mut self) -> Result<TickOutcome, EngineError> {
        let now_ms = self.clock.epoch_ms();

        // 1. Heartbeat
        self.store.touch_worker(&self.worker_id, now_ms)?;
        let worker = self.fetch_worker()?;

        // 2. Drain commands in insertion order
        for record in self.store.unhandled_commands(&self.worker_id)? {
            let outcome = self.handle_command(&worker, record.command).await?;
            self.store.mark_command_handled(record.id)?;
            if outcome == Some(TickOutcome::Killed) {
                return Ok(TickOutcome::Killed);
            }
        }

        // 3. Drain session events
        self.drain_pool().await?;

        // 4. Gate on pause and budget
        let worker = self.fetch_worker()?;
        let over_budget = self.config.budget_usd > 0.0 && worker.cost_usd >= self.config.budget_usd;
        if over_budget && !self.budget_notified {
            self.budget_notified = true;
            tracing::warn!(worker = %worker.name, cost = worker.cost_usd, "budget cap reached");
            self.notifier
                .send_direct(
                    &worker,
                    &format!(
                        "Budget cap reached (${:.2} of ${:.2}); no new tasks will start.",
                        worker.cost_usd, self.config.budget_usd
                    ),
                )
                .await;
        }
        let gated = self.paused || over_budget;

        // 5. Decompose fresh roots
        if !gated {
            self.decompose_pending_roots(&worker).await?;
        }

        // 6. Promote blocked tasks whose deps are done
        let promoted = self
            .store
            .promote_unblocked(&self.worker_id, self.clock.epoch_ms())?;
        if !promoted.is_empty() {
            tracing::debug!(count = promoted.len(), "promoted unblocked tasks");
        }

        // 7. Spawn pending leaves up to capacity
        if !gated {
            self.spawn_pending().await?;
        }

        // 8. Notifications
        let worker = self.fetch_worker()?;
        self.notifier.dispatch(&self.store, &worker).await?;

        // 9. Idle detection
        if self.is_idle()? {
            tracing::info!(worker = %worker.name, "all work settled, going dormant");
            self.store.set_worker_status(
                &self.worker_id,
                WorkerStatus::Dormant,
                self.clock.epoch_ms(),
            )?;
            return Ok(TickOutcome::Idle);
        }

        Ok(TickOutcome::Continue)
    }

    fn fetch_worker(&self) -> Result<WorkerRecord, EngineError> {
        self.store
            .worker(&self.worker_id)?
            .ok_or_else(|| EngineError::WorkerGone(self.worker_id.to_string()))
    }

    /// Dispatch one control command. Returns `Some(Killed)` when the
    /// worker must terminate.
    async fn handle_command(
        &mut self,
        worker: &WorkerRecord,
        command: Command,
    ) -> Result<Option<TickOutcome>, EngineError> {
        let now_ms = self.clock.epoch_ms();
        match command {
            Command::Answer { task_id, text } => {
                self.handle_answer(worker, &task_id, &text).await?;
            }
            Command::Kill => {
                tracing::info!(worker = %worker.name, "kill command received");
                self.pool.kill_all().await;
                let _ = self.pool.drain(KILL_DRAIN_GRACE).await;
                let failed =
                    self.store
                        .fail_running_tasks(&self.worker_id, "killed by user", now_ms)?;
                for task in &failed {
                    self.store.append_event(
                        &self.worker_id,
                        &Event::TaskFailed {
                            task_id: task.id.clone(),
                            title: task.title.clone(),
                            reason: "killed by user".to_string(),
                        },
                        now_ms,
                    )?;
                }
                self.store
                    .set_worker_status(&self.worker_id, WorkerStatus::Dormant, now_ms)?;
                self.notifier.send_direct(worker, "Worker stopped.").await;
                return Ok(Some(TickOutcome::Killed));
            }
            Command::Pause => {
                self.paused = true;
                tracing::info!(worker = %worker.name, "paused");
                self.notifier
                    .send_direct(worker, "Paused; in-flight agents will finish.")
                    .await;
            }
            Command::Resume => {
                self.paused = false;
                tracing::info!(worker = %worker.name, "resumed");
                self.notifier.send_direct(worker, "Resumed.").await;
            }
            Command::Retry { task_id } => {
                // A still-live session for the task is aborted first; a
                // zombie session bound to a pending task would violate
                // the one-session-per-task invariant
                if self.pool.is_inflight(&task_id) {
                    self.pool.kill(&task_id).await;
                }
                match self.store.reset_task_for_retry(&task_id, now_ms) {
                    Ok(()) => {
                        tracing::info!(%task_id, "task reset for retry");
                        self.notifier
                            .send_direct(worker, &format!("Retrying task {}.", task_id.short(8)))
                            .await;
                    }
                    Err(StoreError::IllegalTransition { from, .. }) => {
                        tracing::warn!(%task_id, %from, "retry rejected: task is not failed");
                        self.notifier
                            .send_direct(
                                worker,
                                &format!("Cannot retry task {}: it is {from}.", task_id.short(8)),
                            )
                            .await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Command::Custom => {
                tracing::warn!(worker = %worker.name, "ignoring unknown command kind");
            }
        }
        Ok(None)
    }

    /// `answer`: resume the agent bound to a waiting task with the user's
    /// text as the next turn.
    async fn handle_answer(
        &mut self,
        worker: &WorkerRecord,
        task_id: &TaskId,
        text: &str,
    ) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let Some(task) = self.store.task(task_id)? else {
            tracing::warn!(%task_id, "answer for unknown task");
            return Ok(());
        };
        if task.session_id.is_none() {
            tracing::warn!(%task_id, "answer for task without a session handle");
            self.notifier
                .send_direct(worker, "That task has no session to resume.")
                .await;
            return Ok(());
        }
        if self.pool.is_inflight(task_id) {
            tracing::warn!(%task_id, "answer for task with a live session, ignoring");
            return Ok(());
        }

        // Walk the task back to running through guarded transitions
        match task.status {
            TaskStatus::Running => {}
            TaskStatus::Pending => {
                self.store
                    .transition_task(task_id, TaskStatus::Running, now_ms)?;
            }
            TaskStatus::Failed => {
                self.store
                    .transition_task(task_id, TaskStatus::Pending, now_ms)?;
                self.store
                    .transition_task(task_id, TaskStatus::Running, now_ms)?;
            }
            other => {
                tracing::warn!(%task_id, status = %other, "answer for task in unsupported state");
                return Ok(());
            }
        }

        let (allowed_tools, timeout, task) = self.apply_capability(task)?;
        if let Err(error) = self
            .pool
            .resume(&task, text, allowed_tools, timeout, self.clock.now())
            .await
        {
            self.fail_task(&task.id, &error).await?;
            return Ok(());
        }
        self.notifier
            .send_direct(worker, &format!("Answer delivered to task {}.", task.id.short(8)))
            .await;
        Ok(())
    }

    /// Drain pool events: session handles, hook events, completions,
    /// failures. Serialized here so no task logic runs concurrently.
    async fn drain_pool(&mut self) -> Result<(), EngineError> {
        let events = self.pool.poll(self.clock.now()).await;
        for event in events {
            let now_ms = self.clock.epoch_ms();
            match event {
                PoolEvent::SessionInit {
                    task_id,
                    session_id,
                } => {
                    self.store
                        .set_task_session(&task_id, Some(&session_id), now_ms)?;
                }
                PoolEvent::Hook { event } => {
                    self.store.append_event(&self.worker_id, &event, now_ms)?;
                }
                PoolEvent::Completed {
                    task_id,
                    payload,
                    cost_usd,
                    ..
                } => {
                    if cost_usd > 0.0 {
                        self.store
                            .add_worker_cost(&self.worker_id, cost_usd, now_ms)?;
                    }
                    self.complete_task(&task_id, &payload).await?;
                }
                PoolEvent::Failed { task_id, error } => {
                    self.fail_task(&task_id, &error).await?;
                }
            }
        }
        Ok(())
    }

    /// Record a session's final payload and close the task (and any
    /// completed ancestors).
    async fn complete_task(&mut self, task_id: &TaskId, payload: &str) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let Some(task) = self.store.task(task_id)? else {
            return Ok(());
        };
        let parsed = TaskResult::from_raw(payload);
        let normalized = serde_json::to_string(&parsed).map_err(StoreError::from)?;
        self.store
            .set_task_result(task_id, Some(&normalized), now_ms)?;

        if !parsed.is_success() {
            return self
                .fail_task_with_reason(task_id, &task.title, &parsed.message)
                .await;
        }

        match self
            .store
            .transition_task(task_id, TaskStatus::Done, now_ms)
        {
            Ok(()) => {}
            Err(StoreError::IllegalTransition { from, .. }) => {
                // Killed or already closed while the result was in flight
                tracing::warn!(%task_id, %from, "dropping completion for non-running task");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.store.append_event(
            &self.worker_id,
            &Event::TaskDone {
                task_id: task_id.clone(),
                title: task.title.clone(),
                message: parsed.message.clone(),
            },
            now_ms,
        )?;

        for event in aggregate::evaluate_parent_chain(&self.store, task_id, now_ms)? {
            self.store.append_event(&self.worker_id, &event, now_ms)?;
        }
        Ok(())
    }

    async fn fail_task(
        &mut self,
        task_id: &TaskId,
        error: &ReasoningError,
    ) -> Result<(), EngineError> {
        let Some(task) = self.store.task(task_id)? else {
            return Ok(());
        };
        tracing::warn!(%task_id, kind = %error.kind, technical = %error.technical, "task failed");
        self.fail_task_with_reason(task_id, &task.title, &error.user_message)
            .await
    }

    async fn fail_task_with_reason(
        &mut self,
        task_id: &TaskId,
        title: &str,
        reason: &str,
    ) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let payload =
            serde_json::to_string(&TaskResult::error(reason)).map_err(StoreError::from)?;
        self.store.set_task_result(task_id, Some(&payload), now_ms)?;
        match self
            .store
            .transition_task(task_id, TaskStatus::Failed, now_ms)
        {
            Ok(()) => {}
            Err(StoreError::IllegalTransition { from, .. }) => {
                tracing::warn!(%task_id, %from, "dropping failure for non-running task");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.store.append_event(
            &self.worker_id,
            &Event::TaskFailed {
                task_id: task_id.clone(),
                title: title.to_string(),
                reason: reason.to_string(),
            },
            now_ms,
        )?;
        for event in aggregate::evaluate_parent_chain_after_failure(&self.store, task_id, now_ms)? {
            self.store.append_event(&self.worker_id, &event, now_ms)?;
        }
        Ok(())
    }

    /// Decompose every pending root into a child graph (or run it as a
    /// single agent when the plan is empty).
    async fn decompose_pending_roots(
        &mut self,
        worker: &WorkerRecord,
    ) -> Result<(), EngineError> {
        let roots = self.store.root_tasks(&self.worker_id)?;
        for root in roots {
            if root.status != TaskStatus::Pending {
                continue;
            }
            let now_ms = self.clock.epoch_ms();
            self.store
                .transition_task(&root.id, TaskStatus::Running, now_ms)?;

            if self.store.has_children(&root.id)? {
                // Re-entered after a retry: children already exist, let
                // aggregation re-evaluate the subtree
                if let Some(first_child) = self.store.children(&root.id)?.first() {
                    let events =
                        aggregate::evaluate_parent_chain(&self.store, &first_child.id, now_ms)?;
                    for event in events {
                        self.store.append_event(&self.worker_id, &event, now_ms)?;
                    }
                }
                continue;
            }

            tracing::info!(root_id = %root.id, worker = %worker.name, "decomposing root request");
            let skills = self.store.skills()?;
            let outcome = self
                .decomposer
                .decompose(
                    &self.worker_id,
                    &root.id,
                    &root.prompt,
                    &skills,
                    self.config.workspace.clone(),
                    &self.clock,
                )
                .await;
            self.store.record_decomp_run(&outcome.run)?;

            match outcome.plan {
                Err(error) => {
                    self.fail_task(&root.id, &error).await?;
                }
                Ok(plan) if plan.subtasks.is_empty() => {
                    // Simple request: the root runs as a single agent
                    let Some(root) = self.store.task(&root.id)? else {
                        continue;
                    };
                    self.store.append_event(
                        &self.worker_id,
                        &Event::TaskStarted {
                            task_id: root.id.clone(),
                            title: root.title.clone(),
                        },
                        self.clock.epoch_ms(),
                    )?;
                    self.launch_agent(root).await?;
                }
                Ok(plan) => {
                    self.create_children(&root.id, plan).await?;
                }
            }
        }
        Ok(())
    }

    /// Batch-create a plan's children, resolve title references to ids,
    /// and mark the root an aggregate node.
    async fn create_children(
        &mut self,
        root_id: &TaskId,
        plan: crate::decompose::DecompPlan,
    ) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let mut tasks = Vec::with_capacity(plan.subtasks.len());
        let mut ids_by_title: HashMap<String, TaskId> = HashMap::new();

        for spec in &plan.subtasks {
            let id = TaskId::new(self.idgen.next());
            ids_by_title.insert(spec.title.clone(), id.clone());
            tasks.push(Task::new(
                TaskConfig {
                    id,
                    worker_id: self.worker_id.clone(),
                    parent_id: Some(root_id.clone()),
                    title: spec.title.clone(),
                    prompt: spec.prompt.clone(),
                    exec_mode: ovs_core::ExecMode::Agent,
                    model: spec.model.unwrap_or(self.config.default_model),
                    deps: Vec::new(),
                    skills: spec.skills.clone(),
                    capability: spec.capability.clone(),
                    idempotency_key: None,
                },
                now_ms,
            ));
        }
        self.store.create_tasks(&tasks)?;

        // Apply dependency edges now that titles resolve to ids
        let mut updates = Vec::new();
        for spec in &plan.subtasks {
            if spec.deps.is_empty() {
                continue;
            }
            let task_id = ids_by_title[&spec.title].clone();
            let deps: Vec<TaskId> = spec
                .deps
                .iter()
                .filter_map(|title| ids_by_title.get(title).cloned())
                .collect();
            updates.push((task_id, deps, TaskStatus::Blocked));
        }
        if !updates.is_empty() {
            self.store.apply_dependencies(&updates, now_ms)?;
        }

        self.store
            .set_task_exec_mode(root_id, ovs_core::ExecMode::Aggregate, now_ms)?;
        tracing::info!(
            %root_id,
            children = tasks.len(),
            blocked = updates.len(),
            "decomposition graph created"
        );
        Ok(())
    }

    /// Spawn pending leaf tasks up to the concurrency cap.
    async fn spawn_pending(&mut self) -> Result<(), EngineError> {
        let mut capacity = self
            .config
            .max_agents
            .saturating_sub(self.pool.in_flight_count());
        if capacity == 0 {
            return Ok(());
        }

        let pending = self
            .store
            .tasks_with_status(&self.worker_id, TaskStatus::Pending)?;
        for task in pending {
            if capacity == 0 {
                break;
            }
            // Non-leaves are aggregated, never executed
            if task.exec_mode == ovs_core::ExecMode::Aggregate
                || self.store.has_children(&task.id)?
            {
                continue;
            }
            // Roots wait for decomposition, which owns their launch
            if task.is_root() {
                continue;
            }
            let now_ms = self.clock.epoch_ms();

            let depth = self.store.task_depth(&task.id)?;
            if depth >= MAX_TASK_DEPTH {
                self.store.append_event(
                    &self.worker_id,
                    &Event::DepthLimitExceeded {
                        task_id: task.id.clone(),
                        depth,
                    },
                    now_ms,
                )?;
                self.store
                    .transition_task(&task.id, TaskStatus::Running, now_ms)?;
                self.fail_task_with_reason(&task.id, &task.title, "maximum task depth exceeded")
                    .await?;
                continue;
            }

            self.store
                .transition_task(&task.id, TaskStatus::Running, now_ms)?;
            self.store.append_event(
                &self.worker_id,
                &Event::TaskStarted {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                },
                now_ms,
            )?;
            self.launch_agent(task).await?;
            capacity -= 1;
        }
        Ok(())
    }

    /// Launch the agent session for a task already in `running`. Spawn
    /// errors fail the task; siblings are unaffected.
    async fn launch_agent(&mut self, task: Task) -> Result<(), EngineError> {
        let (allowed_tools, timeout, task) = self.apply_capability(task)?;
        if let Err(error) = self
            .pool
            .spawn(&task, allowed_tools, timeout, self.clock.now())
            .await
        {
            let reason = format!("spawn failed: {}", error.technical);
            tracing::error!(task_id = %task.id, %reason, "agent launch failed");
            self.fail_task_with_reason(&task.id, &task.title, &reason)
                .await?;
        }
        Ok(())
    }

    /// Resolve a task's capability policy into session parameters.
    #[allow(clippy::type_complexity)]
    fn apply_capability(
        &self,
        mut task: Task,
    ) -> Result<(Vec<String>, Option<Duration>, Task), EngineError> {
        let Some(capability_id) = task.capability.clone() else {
            return Ok((Vec::new(), None, task));
        };
        let Some(policy) = self.store.capability(&capability_id)? else {
            tracing::warn!(task_id = %task.id, capability_id, "unknown capability, running unrestricted");
            return Ok((Vec::new(), None, task));
        };
        if let Some(model) = policy.model {
            task.model = model;
        }
        let timeout = policy.timeout_ms.map(Duration::from_millis);
        Ok((policy.allowed_tools, timeout, task))
    }

    /// Signal-path shutdown: abort sessions, fail whatever was running
    /// with the given reason, flip the worker dormant.
    pub async fn shutdown(&mut self, reason: &str) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        tracing::info!(worker_id = %self.worker_id, reason, "worker shutting down");
        self.pool.kill_all().await;
        let _ = self.pool.drain(KILL_DRAIN_GRACE).await;
        let failed = self.store.fail_running_tasks(&self.worker_id, reason, now_ms)?;
        for task in &failed {
            self.store.append_event(
                &self.worker_id,
                &Event::TaskFailed {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    reason: reason.to_string(),
                },
                now_ms,
            )?;
        }
        self.store
            .set_worker_status(&self.worker_id, WorkerStatus::Dormant, now_ms)?;
        Ok(())
    }

    /// Idle means: no open tasks, no in-flight sessions, nothing left to
    /// notify.
    fn is_idle(&self) -> Result<bool, EngineError> {
        if self.pool.in_flight_count() > 0 {
            return Ok(false);
        }
        for status in [TaskStatus::Pending, TaskStatus::Blocked, TaskStatus::Running] {
            if !self
                .store
                .tasks_with_status(&self.worker_id, status)?
                .is_empty()
            {
                return Ok(false);
            }
        }
        Ok(self.store.unnotified_count(&self.worker_id)? == 0)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
