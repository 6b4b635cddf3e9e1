//! End-to-end worker lifecycle against an on-disk store: a request
//! decomposes, children run concurrently, results aggregate, the worker
//! goes dormant, and commands from a second handle steer it.

use crate::prelude::*;
use ovs_adapters::SessionScript;
use ovs_core::{
    AggregatedEntry, Command, Task, TaskConfig, TaskId, TaskStatus, WorkerId, WorkerStatus,
};
use ovs_engine::TickOutcome;

fn add_root(store: &ovs_store::Store, worker_id: &WorkerId, prompt: &str) -> TaskId {
    let task = Task::new(
        TaskConfig::root(TaskId::new("root"), worker_id.clone(), "root", prompt),
        1_000,
    );
    store.create_task(&task).unwrap();
    task.id
}

#[tokio::test]
async fn request_decomposes_runs_and_goes_dormant() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    let worker_id = WorkerId::new("w-1");
    store
        .get_or_create_worker(&worker_id, "proj", Some("chat-1"), 100)
        .unwrap();
    add_root(&store, &worker_id, "do A and B");

    let reasoning = ovs_adapters::FakeReasoningAdapter::new();
    reasoning.push_one_shot(Ok(
        r#"{"subtasks": [{"title":"A","prompt":"a"},{"title":"B","prompt":"b","deps":["A"]}]}"#
            .to_string(),
    ));
    reasoning.push_script(SessionScript::success("sess-a", &success_payload("a"), 0.10));
    reasoning.push_script(SessionScript::success("sess-b", &success_payload("b"), 0.15));

    let mut scheduler = scheduler_for(store.clone(), worker_id.clone(), reasoning, workspace.path());

    // Drive ticks until idle (bounded so a regression cannot hang)
    let mut outcome = TickOutcome::Continue;
    for _ in 0..10 {
        outcome = scheduler.tick().await.unwrap();
        if outcome != TickOutcome::Continue {
            break;
        }
    }
    assert_eq!(outcome, TickOutcome::Idle);

    // The root aggregated its children in creation order
    let root = store.task(&TaskId::new("root")).unwrap().unwrap();
    assert_eq!(root.status, TaskStatus::Done);
    let entries: Vec<AggregatedEntry> =
        serde_json::from_str(root.result.as_deref().unwrap()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].title, "A");
    assert_eq!(entries[1].title, "B");

    // Cost accumulated, worker dormant
    let worker = store.worker(&worker_id).unwrap().unwrap();
    assert_eq!(worker.status, WorkerStatus::Dormant);
    assert!((worker.cost_usd - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn kill_command_from_relay_handle_stops_the_worker() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let worker_store = open_store(dir.path());
    let relay_store = open_store(dir.path());
    let worker_id = WorkerId::new("w-1");
    worker_store
        .get_or_create_worker(&worker_id, "proj", None, 100)
        .unwrap();
    add_root(&worker_store, &worker_id, "long job");

    let reasoning = ovs_adapters::FakeReasoningAdapter::new();
    reasoning.push_one_shot(Ok(r#"{"subtasks": []}"#.to_string()));
    reasoning.push_script(SessionScript::held("sess-1"));

    let mut scheduler =
        scheduler_for(worker_store.clone(), worker_id.clone(), reasoning, workspace.path());
    scheduler.tick().await.unwrap();
    assert_eq!(scheduler.in_flight_count(), 1);

    // The relay kills the worker through the store
    relay_store
        .push_command(&worker_id, &Command::Kill, 2_000)
        .unwrap();
    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Killed);

    let root = worker_store.task(&TaskId::new("root")).unwrap().unwrap();
    assert_eq!(root.status, TaskStatus::Failed);
    assert!(root.result.unwrap().contains("killed by user"));
    assert_eq!(
        worker_store.worker(&worker_id).unwrap().unwrap().status,
        WorkerStatus::Dormant
    );
}

#[tokio::test]
async fn shutdown_fails_running_tasks_with_signal_reason() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    let worker_id = WorkerId::new("w-1");
    store
        .get_or_create_worker(&worker_id, "proj", None, 100)
        .unwrap();
    add_root(&store, &worker_id, "long job");

    let reasoning = ovs_adapters::FakeReasoningAdapter::new();
    reasoning.push_one_shot(Ok(r#"{"subtasks": []}"#.to_string()));
    reasoning.push_script(SessionScript::held("sess-1"));

    let mut scheduler = scheduler_for(store.clone(), worker_id.clone(), reasoning, workspace.path());
    scheduler.tick().await.unwrap();

    scheduler.shutdown("daemon shutdown (SIGTERM)").await.unwrap();

    let root = store.task(&TaskId::new("root")).unwrap().unwrap();
    assert_eq!(root.status, TaskStatus::Failed);
    assert!(root.result.unwrap().contains("daemon shutdown (SIGTERM)"));
    assert_eq!(
        store.worker(&worker_id).unwrap().unwrap().status,
        WorkerStatus::Dormant
    );
}

#[tokio::test]
async fn recovered_worker_fails_leftover_running_tasks_before_ticking() {
    // Simulates the SIGKILL scenario: the previous process died leaving a
    // task in running; the replacement adopts it on startup the way
    // ovs-worker does
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    let worker_id = WorkerId::new("w-1");
    store
        .get_or_create_worker(&worker_id, "proj", None, 100)
        .unwrap();
    let root = add_root(&store, &worker_id, "p");
    store.transition_task(&root, TaskStatus::Running, 200).unwrap();

    let adopted = store
        .fail_running_tasks(&worker_id, "daemon shutdown (recovered)", 300)
        .unwrap();
    assert_eq!(adopted.len(), 1);

    let root = store.task(&root).unwrap().unwrap();
    assert_eq!(root.status, TaskStatus::Failed);
    assert!(root.result.unwrap().contains("recovered"));
}
