// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::sync::mpsc;

fn config(task: &str) -> SessionConfig {
    SessionConfig {
        task_id: TaskId::new(task),
        prompt: "prompt".to_string(),
        model: ModelTier::Standard,
        resume_session: None,
        workspace: PathBuf::from("/tmp"),
        allowed_tools: vec![],
    }
}

#[tokio::test]
async fn scripted_session_plays_back_and_closes() {
    let adapter = FakeReasoningAdapter::new();
    adapter.push_script(SessionScript::success("sess-1", "payload", 0.05));
    let (tx, mut rx) = mpsc::channel(16);

    adapter.start(config("t-1"), tx).await.unwrap();

    let (_, init) = rx.recv().await.unwrap();
    assert!(matches!(
        init,
        SessionEnvelope::Message(ReasoningMessage::Init { .. })
    ));
    let (_, result) = rx.recv().await.unwrap();
    assert!(matches!(
        result,
        SessionEnvelope::Message(ReasoningMessage::Result { .. })
    ));
    let (_, closed) = rx.recv().await.unwrap();
    assert_eq!(closed, SessionEnvelope::Closed { error: None });
}

#[tokio::test]
async fn held_session_stays_open_until_closed() {
    let adapter = FakeReasoningAdapter::new();
    adapter.push_script(SessionScript::held("sess-1"));
    let (tx, mut rx) = mpsc::channel(16);

    adapter.start(config("t-1"), tx).await.unwrap();
    let _ = rx.recv().await.unwrap(); // init
    assert_eq!(adapter.open_count(), 1);

    adapter
        .send_message(
            &TaskId::new("t-1"),
            ReasoningMessage::ToolUse {
                tool: "Bash".to_string(),
                input: serde_json::Value::Null,
            },
        )
        .await;
    let (_, msg) = rx.recv().await.unwrap();
    assert!(matches!(
        msg,
        SessionEnvelope::Message(ReasoningMessage::ToolUse { .. })
    ));

    adapter.close_session(&TaskId::new("t-1"), None).await;
    let (_, closed) = rx.recv().await.unwrap();
    assert_eq!(closed, SessionEnvelope::Closed { error: None });
    assert_eq!(adapter.open_count(), 0);
}

#[tokio::test]
async fn kill_closes_held_session_as_aborted() {
    let adapter = FakeReasoningAdapter::new();
    adapter.push_script(SessionScript::held("sess-1"));
    let (tx, mut rx) = mpsc::channel(16);

    adapter.start(config("t-1"), tx).await.unwrap();
    let _ = rx.recv().await.unwrap(); // init

    adapter.kill(&TaskId::new("t-1")).await.unwrap();
    let (_, closed) = rx.recv().await.unwrap();
    match closed {
        SessionEnvelope::Closed { error: Some(e) } => {
            assert_eq!(e.kind, ReasoningErrorKind::Aborted)
        }
        other => panic!("expected aborted close, got {other:?}"),
    }
}

#[tokio::test]
async fn one_shot_pops_queued_responses() {
    let adapter = FakeReasoningAdapter::new();
    adapter.push_one_shot(Ok("first".to_string()));

    let out = adapter
        .one_shot("q".to_string(), ModelTier::Fast, PathBuf::from("/tmp"))
        .await
        .unwrap();
    assert_eq!(out, "first");

    // Queue exhausted: scripted error
    assert!(adapter
        .one_shot("q".to_string(), ModelTier::Fast, PathBuf::from("/tmp"))
        .await
        .is_err());
}

#[tokio::test]
async fn start_error_is_injected_once() {
    let adapter = FakeReasoningAdapter::new();
    adapter.set_start_error(ReasoningError::new(ReasoningErrorKind::Unknown, "boom"));
    let (tx, _rx) = mpsc::channel(16);

    assert!(adapter.start(config("t-1"), tx.clone()).await.is_err());
    // Next start succeeds (with an empty default script)
    adapter.push_script(SessionScript::default());
    assert!(adapter.start(config("t-2"), tx).await.is_ok());
}

#[tokio::test]
async fn calls_are_recorded() {
    let adapter = FakeReasoningAdapter::new();
    adapter.push_script(SessionScript::default());
    let (tx, _rx) = mpsc::channel(16);

    adapter.start(config("t-1"), tx).await.unwrap();
    let _ = adapter.kill(&TaskId::new("t-1")).await;

    let calls = adapter.calls();
    assert!(matches!(calls[0], ReasoningCall::Start { .. }));
    assert!(matches!(calls[1], ReasoningCall::Kill { .. }));
}
