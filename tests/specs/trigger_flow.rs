//! Time triggers end to end: the supervisor fires a due trigger into the
//! store, and a worker scheduler attached to the same store runs the
//! resulting root task.

use crate::prelude::*;
use ovs_adapters::SessionScript;
use ovs_core::{FakeClock, SequentialIdGen, TaskStatus, TimeTrigger, TriggerId, WorkerStatus};
use ovs_daemon::Supervisor;
use ovs_engine::TickOutcome;
use serial_test::serial;

fn trigger() -> TimeTrigger {
    TimeTrigger {
        id: TriggerId::new("trig-1"),
        worker_name: "nightly".to_string(),
        title: "Nightly report".to_string(),
        prompt: "Summarize the day".to_string(),
        schedule: "*/15 * * * *".to_string(),
        skills: vec![],
        model: None,
        capability: None,
        enabled: true,
        last_run_ms: None,
        next_run_ms: None,
    }
}

#[tokio::test]
#[serial]
async fn fired_trigger_is_run_by_a_worker_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    std::env::set_var("OVERSEER_STATE_DIR", dir.path());
    std::env::remove_var("OVERSEER_WORKER_BINARY");
    let config = ovs_core::Config::from_env().unwrap();

    let supervisor_store = ovs_store::Store::open(&config.store_path).unwrap();
    supervisor_store.upsert_trigger(&trigger()).unwrap();

    let clock = FakeClock::new();
    clock.set_epoch_ms(1_772_323_320_000); // 2026-03-01T00:02:00Z
    let mut supervisor = Supervisor::new(
        supervisor_store.clone(),
        config.clone(),
        clock.clone(),
        SequentialIdGen::new("sup"),
        false,
    );
    supervisor.tick().await;

    // The trigger created a dormant worker owning one root task
    let worker = supervisor_store
        .worker_by_name("nightly")
        .unwrap()
        .unwrap();
    let roots = supervisor_store.root_tasks(&worker.id).unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].status, TaskStatus::Pending);

    // A worker process (simulated with its own handle and fakes) runs it
    let worker_store = ovs_store::Store::open(&config.store_path).unwrap();
    let reasoning = ovs_adapters::FakeReasoningAdapter::new();
    reasoning.push_one_shot(Ok(r#"{"subtasks": []}"#.to_string()));
    reasoning.push_script(SessionScript::success(
        "sess-1",
        &success_payload("report sent"),
        0.02,
    ));
    let mut scheduler = scheduler_for(
        worker_store.clone(),
        worker.id.clone(),
        reasoning,
        workspace.path(),
    );

    let mut outcome = TickOutcome::Continue;
    for _ in 0..10 {
        outcome = scheduler.tick().await.unwrap();
        if outcome != TickOutcome::Continue {
            break;
        }
    }
    assert_eq!(outcome, TickOutcome::Idle);

    let root = worker_store.task(&roots[0].id).unwrap().unwrap();
    assert_eq!(root.status, TaskStatus::Done);
    assert!(root.result.unwrap().contains("report sent"));
    assert_eq!(
        worker_store.worker(&worker.id).unwrap().unwrap().status,
        WorkerStatus::Dormant
    );

    // The supervisor's next scan does not refire within the same minute
    supervisor.tick().await;
    assert_eq!(supervisor_store.root_tasks(&worker.id).unwrap().len(), 1);
}
