// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake reasoning adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    ReasoningAdapter, ReasoningError, ReasoningErrorKind, ReasoningMessage, SessionConfig,
    SessionEnvelope,
};
use async_trait::async_trait;
use ovs_core::{ModelTier, TaskId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Recorded call to FakeReasoningAdapter
#[derive(Debug, Clone)]
pub enum ReasoningCall {
    Start {
        task_id: TaskId,
        prompt: String,
        model: ModelTier,
        resumed: Option<String>,
    },
    Kill {
        task_id: TaskId,
    },
    OneShot {
        prompt: String,
        model: ModelTier,
    },
}

/// Script for one session: messages delivered immediately on start, then
/// either a `Closed` envelope or (when `hold` is set) nothing until the
/// test closes the session explicitly.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    pub messages: Vec<ReasoningMessage>,
    pub error: Option<ReasoningError>,
    pub hold: bool,
}

impl SessionScript {
    /// A session that reports init + a successful result and closes.
    pub fn success(session_id: &str, payload: &str, cost_usd: f64) -> Self {
        Self {
            messages: vec![
                ReasoningMessage::Init {
                    session_id: session_id.to_string(),
                },
                ReasoningMessage::Result {
                    payload: payload.to_string(),
                    cost_usd: Some(cost_usd),
                    stop_reason: Some("end_turn".to_string()),
                },
            ],
            error: None,
            hold: false,
        }
    }

    /// A session that fails with the given classified error.
    pub fn failure(error: ReasoningError) -> Self {
        Self {
            messages: vec![],
            error: Some(error),
            hold: false,
        }
    }

    /// A session that emits init and then stays open until the test
    /// closes it.
    pub fn held(session_id: &str) -> Self {
        Self {
            messages: vec![ReasoningMessage::Init {
                session_id: session_id.to_string(),
            }],
            error: None,
            hold: true,
        }
    }
}

/// Fake reasoning adapter.
///
/// Sessions play back queued scripts; one-shot calls pop queued responses.
/// All calls are recorded for assertions.
#[derive(Clone, Default)]
pub struct FakeReasoningAdapter {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    scripts: VecDeque<SessionScript>,
    one_shots: VecDeque<Result<String, ReasoningError>>,
    open: HashMap<TaskId, mpsc::Sender<(TaskId, SessionEnvelope)>>,
    calls: Vec<ReasoningCall>,
    start_error: Option<ReasoningError>,
}

impl FakeReasoningAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next session start.
    pub fn push_script(&self, script: SessionScript) {
        self.inner.lock().scripts.push_back(script);
    }

    /// Queue a response for the next one-shot call.
    pub fn push_one_shot(&self, response: Result<String, ReasoningError>) {
        self.inner.lock().one_shots.push_back(response);
    }

    /// Fail the next `start` call with this error.
    pub fn set_start_error(&self, error: ReasoningError) {
        self.inner.lock().start_error = Some(error);
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ReasoningCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of sessions currently open (held and not yet closed).
    pub fn open_count(&self) -> usize {
        self.inner.lock().open.len()
    }

    /// Send an extra message on a held session.
    pub async fn send_message(&self, task_id: &TaskId, message: ReasoningMessage) {
        let tx = self.inner.lock().open.get(task_id).cloned();
        if let Some(tx) = tx {
            let _ = tx
                .send((task_id.clone(), SessionEnvelope::Message(message)))
                .await;
        }
    }

    /// Close a held session with an optional error.
    pub async fn close_session(&self, task_id: &TaskId, error: Option<ReasoningError>) {
        let tx = self.inner.lock().open.remove(task_id);
        if let Some(tx) = tx {
            let _ = tx
                .send((task_id.clone(), SessionEnvelope::Closed { error }))
                .await;
        }
    }
}

#[async_trait]
impl ReasoningAdapter for FakeReasoningAdapter {
    async fn start(
        &self,
        config: SessionConfig,
        envelope_tx: mpsc::Sender<(TaskId, SessionEnvelope)>,
    ) -> Result<(), ReasoningError> {
        let script = {
            let mut inner = self.inner.lock();
            inner.calls.push(ReasoningCall::Start {
                task_id: config.task_id.clone(),
                prompt: config.prompt.clone(),
                model: config.model,
                resumed: config.resume_session.clone(),
            });
            if let Some(error) = inner.start_error.take() {
                return Err(error);
            }
            inner.scripts.pop_front().unwrap_or_default()
        };

        for message in script.messages {
            let _ = envelope_tx
                .send((config.task_id.clone(), SessionEnvelope::Message(message)))
                .await;
        }

        if script.hold {
            self.inner
                .lock()
                .open
                .insert(config.task_id.clone(), envelope_tx);
        } else {
            let _ = envelope_tx
                .send((
                    config.task_id.clone(),
                    SessionEnvelope::Closed {
                        error: script.error,
                    },
                ))
                .await;
        }
        Ok(())
    }

    async fn kill(&self, task_id: &TaskId) -> Result<(), ReasoningError> {
        let tx = {
            let mut inner = self.inner.lock();
            inner.calls.push(ReasoningCall::Kill {
                task_id: task_id.clone(),
            });
            inner.open.remove(task_id)
        };
        if let Some(tx) = tx {
            let _ = tx
                .send((
                    task_id.clone(),
                    SessionEnvelope::Closed {
                        error: Some(ReasoningError::new(
                            ReasoningErrorKind::Aborted,
                            "session aborted",
                        )),
                    },
                ))
                .await;
        }
        Ok(())
    }

    async fn one_shot(
        &self,
        prompt: String,
        model: ModelTier,
        _workspace: PathBuf,
    ) -> Result<String, ReasoningError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ReasoningCall::OneShot {
            prompt,
            model,
        });
        inner.one_shots.pop_front().unwrap_or_else(|| {
            Err(ReasoningError::new(
                ReasoningErrorKind::Unknown,
                "no scripted one-shot response",
            ))
        })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
