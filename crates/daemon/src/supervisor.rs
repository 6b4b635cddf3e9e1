// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor scan loop.
//!
//! Every ~3s: reconcile spawned children against the store (respawning
//! stale dead workers, flagging fresh ones as errored to avoid spawn
//! storms), sweep dormant workers that still own open tasks, fire due
//! time triggers, and periodically sync capability and skill manifests.
//! Scan failures are logged and skipped; only store-open failure at
//! startup is fatal.

use crate::liveness::pid_alive;
use crate::spawn::{self, SpawnError};
use chrono::{DateTime, Utc};
use ovs_adapters::session::{tmux_available, SessionAdapter, TmuxAdapter};
use ovs_core::{
    firing_key, CapabilityPolicy, Clock, Config, CronSchedule, IdGen, SkillDescriptor, Task,
    TaskConfig, TaskId, WorkerId, WorkerRecord, WorkerStatus,
};
use ovs_store::{Store, StoreError};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Scan cadence.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(3);

/// A dead worker whose record is older than this is respawned; fresher
/// records are marked error instead (spawn-storm guard).
pub const STALENESS_THRESHOLD_MS: u64 = 30_000;

/// Manifest sync runs every this many scans (~60s at the 3s cadence).
const MANIFEST_SYNC_EVERY: u64 = 20;

/// Errors from supervisor operations
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// What child reconciliation decided for one active worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Process (or session) is alive, or we already track a child
    Keep,
    /// Dead and stale: clear process fields and respawn
    Respawn,
    /// Dead but the record is fresh: flag error, do not respawn
    MarkError,
}

/// Pure reconciliation decision for an `active` worker with no tracked
/// child handle.
pub fn reconcile_action(
    pid_ok: bool,
    session_ok: bool,
    record_age_ms: u64,
) -> ReconcileAction {
    if pid_ok || session_ok {
        ReconcileAction::Keep
    } else if record_age_ms >= STALENESS_THRESHOLD_MS {
        ReconcileAction::Respawn
    } else {
        ReconcileAction::MarkError
    }
}

struct TrackedChild {
    child: Option<std::process::Child>,
    session: Option<String>,
}

/// The always-on supervisor.
pub struct Supervisor<K: Clock, I: IdGen> {
    store: Store,
    config: Config,
    clock: K,
    idgen: I,
    children: HashMap<WorkerId, TrackedChild>,
    use_tmux: bool,
    scans: u64,
}

impl<K: Clock, I: IdGen> Supervisor<K, I> {
    pub fn new(store: Store, config: Config, clock: K, idgen: I, use_tmux: bool) -> Self {
        Self {
            store,
            config,
            clock,
            idgen,
            children: HashMap::new(),
            use_tmux,
            scans: 0,
        }
    }

    /// Detect tmux once at startup.
    pub async fn detect_tmux() -> bool {
        tmux_available().await
    }

    /// Number of tracked child handles (for tests and status).
    pub fn tracked_count(&self) -> usize {
        self.children.len()
    }

    /// One scan. Individual step failures are logged and skipped so a
    /// flaky store read never wedges the loop.
    pub async fn tick(&mut self) {
        self.scans += 1;
        if let Err(e) = self.reconcile_children().await {
            tracing::warn!(error = %e, "child reconciliation failed, skipping");
        }
        if let Err(e) = self.sweep_dormant().await {
            tracing::warn!(error = %e, "dormant sweep failed, skipping");
        }
        if let Err(e) = self.fire_triggers().await {
            tracing::warn!(error = %e, "trigger firing failed, skipping");
        }
        if self.scans % MANIFEST_SYNC_EVERY == 1 {
            if let Err(e) = self.sync_manifests() {
                tracing::warn!(error = %e, "manifest sync failed, skipping");
            }
        }
    }

    /// Step 1: reconcile in-memory child handles and active records.
    async fn reconcile_children(&mut self) -> Result<(), SupervisorError> {
        // Discard handles whose process has exited
        let mut gone = Vec::new();
        for (worker_id, tracked) in self.children.iter_mut() {
            let alive = match (&mut tracked.child, &tracked.session) {
                (Some(child), _) => child.try_wait().map(|s| s.is_none()).unwrap_or(false),
                (None, Some(session)) => TmuxAdapter::new()
                    .is_alive(session)
                    .await
                    .unwrap_or(false),
                (None, None) => false,
            };
            if !alive {
                tracing::debug!(%worker_id, "tracked child exited");
                gone.push(worker_id.clone());
            }
        }
        for worker_id in gone {
            self.children.remove(&worker_id);
        }

        let now_ms = self.clock.epoch_ms();
        for worker in self.store.workers_with_status(WorkerStatus::Active)? {
            if self.children.contains_key(&worker.id) {
                continue;
            }
            let pid_ok = worker.pid.map(pid_alive).unwrap_or(false);
            let session_ok = match &worker.liveness_session {
                Some(session) if self.use_tmux => TmuxAdapter::new()
                    .is_alive(session)
                    .await
                    .unwrap_or(false),
                _ => false,
            };
            let age_ms = now_ms.saturating_sub(worker.updated_at_ms);

            match reconcile_action(pid_ok, session_ok, age_ms) {
                ReconcileAction::Keep => {}
                ReconcileAction::Respawn => {
                    tracing::warn!(
                        worker = %worker.name,
                        age_ms,
                        "active worker is dead and stale, respawning"
                    );
                    self.store
                        .set_worker_process(&worker.id, None, None, now_ms)?;
                    self.spawn(&worker).await;
                }
                ReconcileAction::MarkError => {
                    tracing::warn!(
                        worker = %worker.name,
                        age_ms,
                        "active worker is dead but fresh, marking error"
                    );
                    self.store
                        .set_worker_status(&worker.id, WorkerStatus::Error, now_ms)?;
                }
            }
        }
        Ok(())
    }

    /// Step 2: spawn a child for every dormant worker that still owns
    /// open tasks.
    async fn sweep_dormant(&mut self) -> Result<(), SupervisorError> {
        for worker in self.store.dormant_workers_with_open_tasks()? {
            if self.children.contains_key(&worker.id) {
                continue;
            }
            if worker.pid.map(pid_alive).unwrap_or(false) {
                // A live process already owns this record (it will flip
                // itself active); leave it alone
                continue;
            }
            tracing::info!(worker = %worker.name, "dormant worker owns open tasks, spawning");
            self.spawn(&worker).await;
        }
        Ok(())
    }

    /// Step 3: fire due time triggers by inserting idempotent root tasks.
    async fn fire_triggers(&mut self) -> Result<(), SupervisorError> {
        let now_ms = self.clock.epoch_ms();
        let Some(now_utc) = DateTime::<Utc>::from_timestamp_millis(now_ms as i64) else {
            return Ok(());
        };

        for trigger in self.store.due_triggers(now_ms)? {
            let schedule = match CronSchedule::parse(&trigger.schedule) {
                Ok(schedule) => schedule,
                Err(e) => {
                    tracing::warn!(
                        trigger_id = %trigger.id,
                        schedule = %trigger.schedule,
                        error = %e,
                        "invalid schedule, disabling trigger"
                    );
                    self.store.set_trigger_enabled(&trigger.id, false)?;
                    continue;
                }
            };

            let worker = self.store.get_or_create_worker(
                &WorkerId::new(self.idgen.next()),
                &trigger.worker_name,
                None,
                now_ms,
            )?;

            let mut config = TaskConfig::root(
                TaskId::new(self.idgen.next()),
                worker.id.clone(),
                trigger.title.clone(),
                trigger.prompt.clone(),
            );
            config.skills = trigger.skills.clone();
            config.capability = trigger.capability.clone();
            if let Some(model) = trigger.model {
                config.model = model;
            }
            config.idempotency_key = Some(firing_key(trigger.id.as_str(), now_utc));
            let task = Task::new(config, now_ms);
            let created_id = self.store.create_task(&task)?;
            if created_id == task.id {
                tracing::info!(trigger_id = %trigger.id, task_id = %created_id, "trigger fired");
            }

            // Dormant so the sweep picks it up; a live active worker
            // polls the new root itself
            if worker.status != WorkerStatus::Active {
                self.store
                    .set_worker_status(&worker.id, WorkerStatus::Dormant, now_ms)?;
            }

            let next_run_ms = schedule
                .next_after(now_utc)
                .map(|next| next.timestamp_millis() as u64);
            self.store
                .set_trigger_runs(&trigger.id, Some(now_ms), next_run_ms)?;
        }
        Ok(())
    }

    /// Step 4: upsert built-in capability policies and discovered skill
    /// descriptors. Cheap and idempotent.
    fn sync_manifests(&self) -> Result<(), SupervisorError> {
        for policy in CapabilityPolicy::builtin() {
            self.store.upsert_capability(&policy)?;
        }
        for skill in discover_skills(&self.config.skill_dir) {
            self.store.upsert_skill(&skill)?;
        }
        Ok(())
    }

    async fn spawn(&mut self, worker: &WorkerRecord) {
        let now_ms = self.clock.epoch_ms();
        match spawn::spawn_worker(&self.config, worker, self.use_tmux).await {
            Ok(outcome) => {
                if let Err(e) = self.store.set_worker_process(
                    &worker.id,
                    outcome.pid,
                    outcome.liveness_session.as_deref(),
                    now_ms,
                ) {
                    tracing::warn!(worker = %worker.name, error = %e, "failed to record spawn");
                }
                if let Err(e) =
                    self.store
                        .set_worker_status(&worker.id, WorkerStatus::Active, now_ms)
                {
                    tracing::warn!(worker = %worker.name, error = %e, "failed to activate worker");
                }
                self.children.insert(
                    worker.id.clone(),
                    TrackedChild {
                        child: outcome.child,
                        session: outcome.liveness_session,
                    },
                );
            }
            Err(e) => {
                tracing::error!(worker = %worker.name, error = %e, "worker spawn failed");
                let _ = self
                    .store
                    .set_worker_status(&worker.id, WorkerStatus::Error, now_ms);
            }
        }
    }
}

/// Scan the skill directory for `<name>.md` descriptors: the description
/// is the first non-empty line (leading `#` stripped), the body is the
/// whole file.
pub fn discover_skills(skill_dir: &std::path::Path) -> Vec<SkillDescriptor> {
    let Ok(entries) = std::fs::read_dir(skill_dir) else {
        return Vec::new();
    };
    let mut skills = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(body) = std::fs::read_to_string(&path) else {
            continue;
        };
        let description = body
            .lines()
            .map(|l| l.trim_start_matches('#').trim())
            .find(|l| !l.is_empty())
            .unwrap_or(name)
            .to_string();
        skills.push(SkillDescriptor {
            name: name.to_string(),
            description,
            body,
        });
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
