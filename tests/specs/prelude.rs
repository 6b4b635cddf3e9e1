//! Shared fixtures for the behavioral specs.

use ovs_adapters::{FakeChatAdapter, FakeReasoningAdapter};
use ovs_core::{FakeClock, ModelTier, SequentialIdGen, WorkerId};
use ovs_engine::{SchedulerConfig, WorkerScheduler};
use ovs_store::Store;
use std::path::Path;
use std::time::Duration;

pub type SpecScheduler =
    WorkerScheduler<FakeReasoningAdapter, FakeChatAdapter, FakeClock, SequentialIdGen>;

/// Open a store handle the way one process would.
pub fn open_store(dir: &Path) -> Store {
    Store::open(&dir.join("overseer.db")).expect("open store")
}

/// Build a scheduler bound to an existing worker row, with fakes for the
/// external services.
pub fn scheduler_for(
    store: Store,
    worker_id: WorkerId,
    reasoning: FakeReasoningAdapter,
    workspace: &Path,
) -> SpecScheduler {
    WorkerScheduler::new(
        store,
        worker_id,
        reasoning,
        FakeChatAdapter::new(),
        FakeClock::new(),
        SequentialIdGen::new("task"),
        SchedulerConfig {
            max_agents: 5,
            budget_usd: 0.0,
            default_model: ModelTier::Standard,
            poll_interval: Duration::from_millis(10),
            agent_timeout: Duration::from_secs(600),
            workspace: workspace.to_path_buf(),
        },
    )
}

/// A success payload in the task-result wire schema.
pub fn success_payload(message: &str) -> String {
    format!("{{\"status\":\"success\",\"message\":\"{message}\"}}")
}
