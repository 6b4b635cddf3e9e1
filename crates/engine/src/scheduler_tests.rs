// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::Harness;
use ovs_adapters::{ReasoningCall, ReasoningErrorKind, ReasoningMessage, SessionScript};
use ovs_core::{AggregatedEntry, SequentialIdGen, WorkerStatus};

fn plan(json: &str) -> String {
    json.to_string()
}

fn success_payload(message: &str) -> String {
    format!("{{\"status\":\"success\",\"message\":\"{message}\"}}")
}

// --- Scenario: single task, no decomposition ---

#[tokio::test]
async fn empty_plan_runs_root_as_single_agent() {
    let mut h = Harness::new();
    h.add_root("root", "echo hi");
    h.reasoning
        .push_one_shot(Ok(plan(r#"{"subtasks": []}"#)));
    h.reasoning
        .push_script(SessionScript::success("sess-1", &success_payload("hi"), 0.01));

    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Continue);
    // Completion lands on the next tick, which then goes idle
    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Idle);

    let root = h.task("root");
    assert_eq!(root.status, TaskStatus::Done);
    assert!(root.result.unwrap().contains("hi"));
    assert_eq!(root.session_id.as_deref(), Some("sess-1"));

    let worker = h.store.worker(&h.worker_id).unwrap().unwrap();
    assert_eq!(worker.status, WorkerStatus::Dormant);
    assert!((worker.cost_usd - 0.01).abs() < f64::EPSILON);
}

// --- Scenario: two-child parallel plan ---

#[tokio::test]
async fn two_children_spawn_concurrently_and_aggregate_in_creation_order() {
    let mut h = Harness::new();
    h.add_root("root", "do A and B");
    h.reasoning.push_one_shot(Ok(plan(
        r#"{"subtasks": [{"title":"A","prompt":"do a"},{"title":"B","prompt":"do b"}]}"#,
    )));
    // A is held open; B completes immediately, so B finishes first
    h.reasoning.push_script(SessionScript::held("sess-a"));
    h.reasoning
        .push_script(SessionScript::success("sess-b", &success_payload("b"), 0.0));

    h.scheduler.tick().await.unwrap();
    assert_eq!(h.scheduler.in_flight_count(), 2, "children run concurrently");

    h.scheduler.tick().await.unwrap();
    // B is done, A still open, parent still running
    assert_eq!(h.task("task-0002").status, TaskStatus::Done);
    assert_eq!(h.task("root").status, TaskStatus::Running);

    // Now A completes
    let a = ovs_core::TaskId::new("task-0001");
    h.reasoning
        .send_message(
            &a,
            ReasoningMessage::Result {
                payload: success_payload("a"),
                cost_usd: None,
                stop_reason: None,
            },
        )
        .await;
    h.reasoning.close_session(&a, None).await;

    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Idle);

    let root = h.task("root");
    assert_eq!(root.status, TaskStatus::Done);
    let entries: Vec<AggregatedEntry> =
        serde_json::from_str(root.result.as_deref().unwrap()).unwrap();
    // Order preserved by creation, not completion
    assert_eq!(entries[0].title, "A");
    assert_eq!(entries[0].result.message, "a");
    assert_eq!(entries[1].title, "B");
    assert_eq!(entries[1].result.message, "b");
}

// --- Scenario: linear plan with dependency ---

#[tokio::test]
async fn dependent_child_blocks_then_promotes_after_dep_done() {
    let mut h = Harness::new();
    h.add_root("root", "A then B");
    h.reasoning.push_one_shot(Ok(plan(
        r#"{"subtasks": [{"title":"A","prompt":"a"},{"title":"B","prompt":"b","deps":["A"]}]}"#,
    )));
    h.reasoning
        .push_script(SessionScript::success("sess-a", &success_payload("a"), 0.0));
    h.reasoning
        .push_script(SessionScript::success("sess-b", &success_payload("b"), 0.0));

    h.scheduler.tick().await.unwrap();
    assert_eq!(h.task("task-0001").status, TaskStatus::Running);
    assert_eq!(h.task("task-0002").status, TaskStatus::Blocked);
    assert_eq!(h.scheduler.in_flight_count(), 1, "blocked task must not spawn");

    // A's completion drains, B promotes and spawns
    h.scheduler.tick().await.unwrap();
    assert_eq!(h.task("task-0001").status, TaskStatus::Done);
    assert_eq!(h.task("task-0002").status, TaskStatus::Running);

    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(h.task("root").status, TaskStatus::Done);
}

// --- Scenario: child failure propagates after siblings settle ---

#[tokio::test]
async fn child_failure_fails_parent_only_after_all_siblings_finish() {
    let mut h = Harness::new();
    h.add_root("root", "A and B");
    h.reasoning.push_one_shot(Ok(plan(
        r#"{"subtasks": [{"title":"A","prompt":"a"},{"title":"B","prompt":"b"}]}"#,
    )));
    h.reasoning.push_script(SessionScript::failure(
        ovs_adapters::ReasoningError::classify("timed out"),
    ));
    h.reasoning.push_script(SessionScript::held("sess-b"));

    h.scheduler.tick().await.unwrap();
    h.scheduler.tick().await.unwrap();

    // A failed, B still executing: parent must keep running
    assert_eq!(h.task("task-0001").status, TaskStatus::Failed);
    assert_eq!(h.task("root").status, TaskStatus::Running);

    let b = ovs_core::TaskId::new("task-0002");
    h.reasoning
        .send_message(
            &b,
            ReasoningMessage::Result {
                payload: success_payload("b"),
                cost_usd: None,
                stop_reason: None,
            },
        )
        .await;
    h.reasoning.close_session(&b, None).await;
    h.scheduler.tick().await.unwrap();

    let root = h.task("root");
    assert_eq!(root.status, TaskStatus::Failed);
    assert!(root
        .result
        .unwrap()
        .contains("one or more subtasks failed"));
}

#[tokio::test]
async fn second_child_failure_fails_parent_while_sibling_still_runs() {
    let mut h = Harness::new();
    h.add_root("root", "A, B and C");
    h.reasoning.push_one_shot(Ok(plan(
        r#"{"subtasks": [{"title":"A","prompt":"a"},{"title":"B","prompt":"b"},{"title":"C","prompt":"c"}]}"#,
    )));
    h.reasoning.push_script(SessionScript::failure(
        ovs_adapters::ReasoningError::classify("timed out"),
    ));
    h.reasoning.push_script(SessionScript::failure(
        ovs_adapters::ReasoningError::classify("503 overloaded"),
    ));
    h.reasoning.push_script(SessionScript::held("sess-c"));

    h.scheduler.tick().await.unwrap();
    h.scheduler.tick().await.unwrap();

    // Two failures observed: the parent fails without waiting for C
    let root = h.task("root");
    assert_eq!(root.status, TaskStatus::Failed);
    assert!(root
        .result
        .unwrap()
        .contains("one or more subtasks failed"));
    // C was not cancelled
    assert_eq!(h.task("task-0003").status, TaskStatus::Running);
    assert_eq!(h.scheduler.in_flight_count(), 1);

    // C's eventual success lands normally and the worker settles
    let c = ovs_core::TaskId::new("task-0003");
    h.reasoning
        .send_message(
            &c,
            ReasoningMessage::Result {
                payload: success_payload("c"),
                cost_usd: None,
                stop_reason: None,
            },
        )
        .await;
    h.reasoning.close_session(&c, None).await;

    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(h.task("task-0003").status, TaskStatus::Done);
    assert_eq!(h.task("root").status, TaskStatus::Failed);
}

// --- Scenario: decomposition failure ---

#[tokio::test]
async fn decomposition_provider_error_fails_root() {
    let mut h = Harness::new();
    h.add_root("root", "request");
    h.reasoning
        .push_one_shot(Err(ovs_adapters::ReasoningError::classify("503 overloaded")));

    h.scheduler.tick().await.unwrap();

    let root = h.task("root");
    assert_eq!(root.status, TaskStatus::Failed);
    // A run record was persisted with the classified code
    let runs = h.store.decomp_runs_for(&root.id).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].error_code.as_deref(), Some("provider"));
}

// --- Scenario: retry from failed ---

#[tokio::test]
async fn retry_resets_task_rewrites_parent_and_respawns() {
    let mut h = Harness::new();
    h.add_root("root", "A only");
    h.reasoning.push_one_shot(Ok(plan(
        r#"{"subtasks": [{"title":"A","prompt":"a"}]}"#,
    )));
    h.reasoning.push_script(SessionScript::failure(
        ovs_adapters::ReasoningError::classify("boom"),
    ));

    h.scheduler.tick().await.unwrap();
    h.scheduler.tick().await.unwrap();
    assert_eq!(h.task("task-0001").status, TaskStatus::Failed);
    assert_eq!(h.task("root").status, TaskStatus::Failed);

    // User retries the failed child
    h.store
        .push_command(
            &h.worker_id,
            &ovs_core::Command::Retry {
                task_id: ovs_core::TaskId::new("task-0001"),
            },
            h.clock.epoch_ms(),
        )
        .unwrap();
    h.reasoning
        .push_script(SessionScript::success("sess-2", &success_payload("ok"), 0.0));

    h.scheduler.tick().await.unwrap();
    // Parent rewritten to running, task respawned and completed in channel
    assert_eq!(h.task("root").status, TaskStatus::Running);

    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(h.task("task-0001").status, TaskStatus::Done);
    assert_eq!(h.task("root").status, TaskStatus::Done);
}

// --- Commands: pause / resume / kill ---

#[tokio::test]
async fn pause_gates_new_work_until_resume() {
    let mut h = Harness::new();
    h.add_root("root", "request");
    h.store
        .push_command(&h.worker_id, &ovs_core::Command::Pause, h.clock.epoch_ms())
        .unwrap();

    h.scheduler.tick().await.unwrap();
    assert!(h.scheduler.is_paused());
    // Root untouched: no decomposition attempted while paused
    assert_eq!(h.task("root").status, TaskStatus::Pending);
    assert!(h.reasoning.calls().is_empty());

    h.store
        .push_command(&h.worker_id, &ovs_core::Command::Resume, h.clock.epoch_ms())
        .unwrap();
    h.reasoning.push_one_shot(Ok(plan(r#"{"subtasks": []}"#)));
    h.reasoning
        .push_script(SessionScript::success("s", &success_payload("ok"), 0.0));

    h.scheduler.tick().await.unwrap();
    assert!(!h.scheduler.is_paused());
    assert_eq!(h.task("root").status, TaskStatus::Running);
}

#[tokio::test]
async fn kill_fails_running_tasks_and_terminates() {
    let mut h = Harness::new();
    h.add_root("root", "request");
    h.reasoning.push_one_shot(Ok(plan(r#"{"subtasks": []}"#)));
    h.reasoning.push_script(SessionScript::held("sess-1"));

    h.scheduler.tick().await.unwrap();
    assert_eq!(h.scheduler.in_flight_count(), 1);

    h.store
        .push_command(&h.worker_id, &ovs_core::Command::Kill, h.clock.epoch_ms())
        .unwrap();
    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Killed);

    let root = h.task("root");
    assert_eq!(root.status, TaskStatus::Failed);
    assert!(root.result.unwrap().contains("killed by user"));
    let worker = h.store.worker(&h.worker_id).unwrap().unwrap();
    assert_eq!(worker.status, WorkerStatus::Dormant);
}

// --- Budget gate ---

#[tokio::test]
async fn budget_cap_blocks_new_work_and_notifies_once() {
    let mut h = Harness::with_config(|c| c.budget_usd = 0.05);
    h.add_root("root-1", "first");
    h.reasoning.push_one_shot(Ok(plan(r#"{"subtasks": []}"#)));
    // The first task costs exactly the cap
    h.reasoning
        .push_script(SessionScript::success("s1", &success_payload("done"), 0.05));

    h.scheduler.tick().await.unwrap();
    h.scheduler.tick().await.unwrap();

    // New work arrives after the cap is reached
    h.add_root("root-2", "second");
    h.scheduler.tick().await.unwrap();
    h.scheduler.tick().await.unwrap();

    assert_eq!(h.task("root-2").status, TaskStatus::Pending, "gated");
    let budget_messages: Vec<String> = h
        .chat
        .messages()
        .into_iter()
        .filter(|m| m.contains("Budget cap reached"))
        .collect();
    assert_eq!(budget_messages.len(), 1, "notified exactly once");
}

// --- Depth limit ---

#[tokio::test]
async fn depth_limit_fails_task_without_launching_an_agent() {
    let h = Harness::new();
    // Build a chain root -> a -> b -> c by hand; c sits at depth 3
    let root = h.add_root("root", "p");
    h.store.transition_task(&root, TaskStatus::Running, 1).unwrap();
    for (id, parent) in [("a", "root"), ("b", "a")] {
        let task = ovs_core::Task::new(
            ovs_core::TaskConfig {
                id: ovs_core::TaskId::new(id),
                worker_id: h.worker_id.clone(),
                parent_id: Some(ovs_core::TaskId::new(parent)),
                title: id.to_string(),
                prompt: "p".to_string(),
                exec_mode: ovs_core::ExecMode::Aggregate,
                model: ovs_core::ModelTier::Standard,
                deps: vec![],
                skills: vec![],
                capability: None,
                idempotency_key: None,
            },
            h.clock.epoch_ms(),
        );
        h.store.create_task(&task).unwrap();
        h.store.transition_task(&task.id, TaskStatus::Running, 1).unwrap();
    }
    let c = ovs_core::Task::new(
        ovs_core::TaskConfig {
            id: ovs_core::TaskId::new("c"),
            worker_id: h.worker_id.clone(),
            parent_id: Some(ovs_core::TaskId::new("b")),
            title: "c".to_string(),
            prompt: "p".to_string(),
            exec_mode: ovs_core::ExecMode::Agent,
            model: ovs_core::ModelTier::Standard,
            deps: vec![],
            skills: vec![],
            capability: None,
            idempotency_key: None,
        },
        h.clock.epoch_ms(),
    );
    h.store.create_task(&c).unwrap();

    let mut h = h;
    h.scheduler.tick().await.unwrap();

    assert_eq!(h.task("c").status, TaskStatus::Failed);
    // No agent was launched for it
    assert!(h
        .reasoning
        .calls()
        .iter()
        .all(|call| !matches!(call, ReasoningCall::Start { .. })));
    let events = h.store.events_for_worker(&h.worker_id).unwrap();
    assert!(events.iter().any(|e| matches!(
        e.event,
        ovs_core::Event::DepthLimitExceeded { depth: 3, .. }
    )));
}

// --- Spawn failure isolation ---

#[tokio::test]
async fn spawn_error_fails_that_task_and_spares_siblings() {
    let mut h = Harness::new();
    h.add_root("root", "A and B");
    h.reasoning.push_one_shot(Ok(plan(
        r#"{"subtasks": [{"title":"A","prompt":"a"},{"title":"B","prompt":"b"}]}"#,
    )));
    h.reasoning.set_start_error(ovs_adapters::ReasoningError::new(
        ReasoningErrorKind::Unknown,
        "no such binary",
    ));
    h.reasoning.push_script(SessionScript::held("sess-b"));

    h.scheduler.tick().await.unwrap();

    let a = h.task("task-0001");
    assert_eq!(a.status, TaskStatus::Failed);
    assert!(a.result.unwrap().contains("spawn failed"));
    assert_eq!(h.task("task-0002").status, TaskStatus::Running);
    assert_eq!(h.scheduler.in_flight_count(), 1);
}

// --- Answer command ---

#[tokio::test]
async fn answer_resumes_failed_task_with_session_handle() {
    let mut h = Harness::new();
    h.add_root("root", "ask me");
    h.reasoning.push_one_shot(Ok(plan(r#"{"subtasks": []}"#)));
    // Session records a handle, then dies without a result
    h.reasoning.push_script(SessionScript::held("sess-q"));

    h.scheduler.tick().await.unwrap();
    h.reasoning
        .close_session(&ovs_core::TaskId::new("root"), None)
        .await;
    h.scheduler.tick().await.unwrap();
    assert_eq!(h.task("root").status, TaskStatus::Failed);
    assert_eq!(h.task("root").session_id.as_deref(), Some("sess-q"));

    h.store
        .push_command(
            &h.worker_id,
            &ovs_core::Command::Answer {
                task_id: ovs_core::TaskId::new("root"),
                text: "use postgres".to_string(),
            },
            h.clock.epoch_ms(),
        )
        .unwrap();
    h.reasoning
        .push_script(SessionScript::success("sess-q", &success_payload("done"), 0.0));

    h.scheduler.tick().await.unwrap();

    // The session was resumed with the prior handle and the answer text
    let resumed = h.reasoning.calls().into_iter().find_map(|c| match c {
        ReasoningCall::Start {
            resumed: Some(session),
            prompt,
            ..
        } => Some((session, prompt)),
        _ => None,
    });
    let (session, prompt) = resumed.expect("a resumed start call");
    assert_eq!(session, "sess-q");
    assert_eq!(prompt, "use postgres");

    assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(h.task("root").status, TaskStatus::Done);
}

// --- Capacity cap ---

#[tokio::test]
async fn concurrency_cap_limits_spawns_per_tick() {
    let mut h = Harness::with_config(|c| c.max_agents = 2);
    h.add_root("root", "four tasks");
    h.reasoning.push_one_shot(Ok(plan(
        r#"{"subtasks": [
            {"title":"A","prompt":"a"},{"title":"B","prompt":"b"},
            {"title":"C","prompt":"c"},{"title":"D","prompt":"d"}
        ]}"#,
    )));
    for i in 0..4 {
        h.reasoning.push_script(SessionScript::held(&format!("s{i}")));
    }

    h.scheduler.tick().await.unwrap();
    assert_eq!(h.scheduler.in_flight_count(), 2);
    assert_eq!(h.task("task-0003").status, TaskStatus::Pending);
    assert_eq!(h.task("task-0004").status, TaskStatus::Pending);
}

// --- Error-result payloads ---

#[tokio::test]
async fn error_status_payload_fails_the_task() {
    let mut h = Harness::new();
    h.add_root("root", "try it");
    h.reasoning.push_one_shot(Ok(plan(r#"{"subtasks": []}"#)));
    h.reasoning.push_script(SessionScript::success(
        "s",
        "{\"status\":\"error\",\"message\":\"could not find the file\"}",
        0.0,
    ));

    h.scheduler.tick().await.unwrap();
    h.scheduler.tick().await.unwrap();

    let root = h.task("root");
    assert_eq!(root.status, TaskStatus::Failed);
    assert!(root.result.unwrap().contains("could not find the file"));
}

// --- Consecutive-error governor ---

#[tokio::test]
async fn governor_exits_fatal_after_repeated_tick_errors() {
    let h = Harness::new();
    // A scheduler pointed at a worker id that does not exist fails every
    // tick at the fetch step
    let mut broken = WorkerScheduler::new(
        h.store.clone(),
        ovs_core::WorkerId::new("ghost"),
        h.reasoning.clone(),
        h.chat.clone(),
        h.clock.clone(),
        SequentialIdGen::new("x"),
        SchedulerConfig {
            max_agents: 1,
            budget_usd: 0.0,
            default_model: ovs_core::ModelTier::Standard,
            poll_interval: Duration::from_millis(1),
            agent_timeout: Duration::from_secs(1),
            workspace: h.workspace.path().to_path_buf(),
        },
    );
    assert_eq!(broken.run().await, ExitReason::Fatal);
}
