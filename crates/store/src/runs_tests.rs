// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{DecompRun, RAW_OUTPUT_LIMIT};
use crate::test_util::store;
use ovs_core::{TaskId, WorkerId};

fn run(raw_prefix: String) -> DecompRun {
    DecompRun {
        worker_id: WorkerId::new("w-1"),
        task_id: TaskId::new("t-1"),
        started_at_ms: 1_000,
        finished_at_ms: 3_500,
        elapsed_ms: 2_500,
        model: "standard".to_string(),
        timeout_ms: 120_000,
        request_chars: 180,
        prompt_chars: 950,
        result_chars: 420,
        parse_attempts: 2,
        fallback: false,
        error_code: None,
        raw_prefix,
    }
}

#[test]
fn run_round_trips() {
    let s = store();
    s.record_decomp_run(&run("{\"subtasks\": []}".to_string())).unwrap();

    let runs = s.decomp_runs_for(&TaskId::new("t-1")).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].elapsed_ms, 2_500);
    assert_eq!(runs[0].parse_attempts, 2);
    assert!(!runs[0].fallback);
}

#[test]
fn raw_prefix_is_truncated_on_insert() {
    let s = store();
    s.record_decomp_run(&run("y".repeat(5 * RAW_OUTPUT_LIMIT))).unwrap();

    let runs = s.decomp_runs_for(&TaskId::new("t-1")).unwrap();
    assert_eq!(runs[0].raw_prefix.chars().count(), RAW_OUTPUT_LIMIT);
}

#[test]
fn runs_accumulate_in_order() {
    let s = store();
    let mut second = run(String::new());
    second.error_code = Some("timeout".to_string());
    s.record_decomp_run(&run(String::new())).unwrap();
    s.record_decomp_run(&second).unwrap();

    let runs = s.decomp_runs_for(&TaskId::new("t-1")).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].error_code.as_deref(), Some("timeout"));
}
