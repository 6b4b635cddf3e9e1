// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_util::store;
use crate::Store;
use ovs_core::{Command, TaskId, WorkerId};

fn worker(s: &Store) -> WorkerId {
    let id = WorkerId::new("w-1");
    s.get_or_create_worker(&id, "proj", None, 100).unwrap();
    id
}

#[test]
fn commands_dequeue_in_insertion_order() {
    let s = store();
    let w = worker(&s);
    s.push_command(&w, &Command::Pause, 100).unwrap();
    s.push_command(
        &w,
        &Command::Answer {
            task_id: TaskId::new("t-1"),
            text: "yes".to_string(),
        },
        101,
    )
    .unwrap();
    s.push_command(&w, &Command::Resume, 102).unwrap();

    let commands = s.unhandled_commands(&w).unwrap();
    let names: Vec<&str> = commands.iter().map(|c| c.command.name()).collect();
    assert_eq!(names, vec!["pause", "answer", "resume"]);
}

#[test]
fn handled_commands_are_not_redelivered() {
    let s = store();
    let w = worker(&s);
    let id = s.push_command(&w, &Command::Kill, 100).unwrap();

    s.mark_command_handled(id).unwrap();
    assert!(s.unhandled_commands(&w).unwrap().is_empty());

    // Marking twice is a no-op
    s.mark_command_handled(id).unwrap();
    assert!(s.unhandled_commands(&w).unwrap().is_empty());
}

#[test]
fn commands_are_scoped_to_target_worker() {
    let s = store();
    let w = worker(&s);
    let other = WorkerId::new("w-2");
    s.get_or_create_worker(&other, "other", None, 100).unwrap();

    s.push_command(&other, &Command::Kill, 100).unwrap();
    assert!(s.unhandled_commands(&w).unwrap().is_empty());
    assert_eq!(s.unhandled_commands(&other).unwrap().len(), 1);
}

#[test]
fn unknown_command_kind_surfaces_as_custom() {
    let s = store();
    let w = worker(&s);
    // A newer relay wrote a kind this build does not know
    s.with_conn(|conn| {
        conn.execute(
            "INSERT INTO commands (worker_id, kind, payload, handled, created_at_ms) \
             VALUES (?1, 'hibernate', '{\"type\":\"hibernate\"}', 0, 100)",
            rusqlite::params![w.as_str()],
        )?;
        Ok(())
    })
    .unwrap();

    let commands = s.unhandled_commands(&w).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].command, Command::Custom);
}

#[test]
fn command_ids_strictly_increase() {
    let s = store();
    let w = worker(&s);
    let a = s.push_command(&w, &Command::Pause, 100).unwrap();
    let b = s.push_command(&w, &Command::Resume, 101).unwrap();
    assert!(a < b);
}
