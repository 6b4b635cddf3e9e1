//! The store is the only shared memory between processes: races on
//! worker creation, command handoff, and notification claims must all
//! resolve through it.

use crate::prelude::*;
use ovs_core::{Command, Event, TaskId, WorkerId};

#[test]
fn concurrent_get_or_create_resolves_to_a_single_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    // Ten "processes" race to create the same worker name
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let path = path.clone();
            std::thread::spawn(move || {
                let store = open_store(&path);
                let record = store
                    .get_or_create_worker(
                        &WorkerId::new(format!("candidate-{i}")),
                        "shared-project",
                        None,
                        1_000 + i,
                    )
                    .unwrap();
                record.id
            })
        })
        .collect();

    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = &ids[0];
    assert!(ids.iter().all(|id| id == first), "every racer saw {first}");

    let store = open_store(&path);
    assert!(store.worker_by_name("shared-project").unwrap().is_some());
}

#[test]
fn commands_flow_from_relay_handle_to_worker_handle() {
    let dir = tempfile::tempdir().unwrap();
    let relay = open_store(dir.path());
    let worker_side = open_store(dir.path());

    let worker_id = WorkerId::new("w-1");
    worker_side
        .get_or_create_worker(&worker_id, "proj", None, 100)
        .unwrap();

    // The relay inserts; the worker drains in order and marks handled
    relay.push_command(&worker_id, &Command::Pause, 200).unwrap();
    relay
        .push_command(
            &worker_id,
            &Command::Answer {
                task_id: TaskId::new("t-1"),
                text: "yes".to_string(),
            },
            201,
        )
        .unwrap();

    let commands = worker_side.unhandled_commands(&worker_id).unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].command.name(), "pause");
    for command in &commands {
        worker_side.mark_command_handled(command.id).unwrap();
    }

    // The relay's next poll sees everything consumed
    assert!(relay.unhandled_commands(&worker_id).unwrap().is_empty());
}

#[test]
fn notification_claims_are_exactly_once_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let writer = open_store(dir.path());
    let claimer_a = open_store(dir.path());
    let claimer_b = open_store(dir.path());

    let worker_id = WorkerId::new("w-1");
    writer
        .get_or_create_worker(&worker_id, "proj", None, 100)
        .unwrap();
    for i in 0..20 {
        writer
            .append_event(
                &worker_id,
                &Event::TaskDone {
                    task_id: TaskId::new(format!("t-{i}")),
                    title: format!("t-{i}"),
                    message: "ok".to_string(),
                },
                200 + i,
            )
            .unwrap();
    }

    let mut total = 0;
    loop {
        let a = claimer_a.claim_unnotified(&worker_id, 3).unwrap().len();
        let b = claimer_b.claim_unnotified(&worker_id, 3).unwrap().len();
        if a == 0 && b == 0 {
            break;
        }
        total += a + b;
    }
    assert_eq!(total, 20, "every event claimed exactly once");
}

#[test]
fn guarded_transitions_hold_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_store(dir.path());
    let b = open_store(dir.path());

    let worker_id = WorkerId::new("w-1");
    a.get_or_create_worker(&worker_id, "proj", None, 100).unwrap();
    let task = ovs_core::Task::new(
        ovs_core::TaskConfig::root(TaskId::new("t-1"), worker_id, "t", "p"),
        100,
    );
    a.create_task(&task).unwrap();

    a.transition_task(&task.id, ovs_core::TaskStatus::Running, 200)
        .unwrap();
    // Handle B races a conflicting transition and is rejected
    assert!(b
        .transition_task(&task.id, ovs_core::TaskStatus::Blocked, 201)
        .is_err());
    b.transition_task(&task.id, ovs_core::TaskStatus::Done, 202)
        .unwrap();

    assert_eq!(
        a.task(&task.id).unwrap().unwrap().status,
        ovs_core::TaskStatus::Done
    );
}
