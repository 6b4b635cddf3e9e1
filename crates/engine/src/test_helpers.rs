// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scheduler test fixtures.

use crate::scheduler::{SchedulerConfig, WorkerScheduler};
use ovs_adapters::{FakeChatAdapter, FakeReasoningAdapter};
use ovs_core::{
    Clock, FakeClock, ModelTier, SequentialIdGen, Task, TaskConfig, TaskId, WorkerId,
};
use ovs_store::Store;
use std::time::Duration;

pub type TestScheduler =
    WorkerScheduler<FakeReasoningAdapter, FakeChatAdapter, FakeClock, SequentialIdGen>;

pub struct Harness {
    pub store: Store,
    pub worker_id: WorkerId,
    pub scheduler: TestScheduler,
    pub reasoning: FakeReasoningAdapter,
    pub chat: FakeChatAdapter,
    pub clock: FakeClock,
    pub workspace: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tune: impl FnOnce(&mut SchedulerConfig)) -> Self {
        let store = Store::open_in_memory().expect("in-memory store");
        let worker_id = WorkerId::new("w-1");
        let clock = FakeClock::new();
        store
            .get_or_create_worker(&worker_id, "proj", Some("chat-1"), clock.epoch_ms())
            .expect("create worker");

        let workspace = tempfile::tempdir().expect("tempdir");
        let mut config = SchedulerConfig {
            max_agents: 5,
            budget_usd: 0.0,
            default_model: ModelTier::Standard,
            poll_interval: Duration::from_millis(10),
            agent_timeout: Duration::from_secs(600),
            workspace: workspace.path().to_path_buf(),
        };
        tune(&mut config);

        let reasoning = FakeReasoningAdapter::new();
        let chat = FakeChatAdapter::new();
        let scheduler = WorkerScheduler::new(
            store.clone(),
            worker_id.clone(),
            reasoning.clone(),
            chat.clone(),
            clock.clone(),
            SequentialIdGen::new("task"),
            config,
        );

        Self {
            store,
            worker_id,
            scheduler,
            reasoning,
            chat,
            clock,
            workspace,
        }
    }

    /// Insert a root task with the given prompt; returns its id.
    pub fn add_root(&self, id: &str, prompt: &str) -> TaskId {
        let task = Task::new(
            TaskConfig::root(TaskId::new(id), self.worker_id.clone(), id, prompt),
            self.clock.epoch_ms(),
        );
        self.store.create_task(&task).expect("create root");
        task.id
    }

    pub fn task(&self, id: &str) -> Task {
        self.store
            .task(&TaskId::new(id))
            .expect("store")
            .expect("task exists")
    }
}
