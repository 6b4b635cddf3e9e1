// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent pool: in-flight sessions keyed by task.
//!
//! At most one session per task. Sessions run as background I/O tasks;
//! their messages funnel into one channel the scheduler drains each tick,
//! so completion handling is serialized on the scheduler's thread of
//! control.

use crate::hooks::HookState;
use ovs_adapters::{
    ReasoningAdapter, ReasoningError, ReasoningErrorKind, ReasoningMessage, SessionConfig,
    SessionEnvelope,
};
use ovs_core::{Event, Task, TaskId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Prefixed to every task prompt so results arrive in the wire schema.
pub const RESPONSE_SCHEMA_INSTRUCTION: &str = "Respond with a single JSON object of the shape \
{\"status\": \"success\" | \"error\", \"message\": string, \"data\"?: object}. \
The message field is a short human-readable summary of the outcome.\n\n";

/// Events drained from the pool each scheduler tick.
#[derive(Debug)]
pub enum PoolEvent {
    /// The session reported its handle; persist it for resumption
    SessionInit { task_id: TaskId, session_id: String },
    /// A hook observation to append to the event log
    Hook { event: Event },
    /// The session produced its final payload
    Completed {
        task_id: TaskId,
        payload: String,
        cost_usd: f64,
        capability: Option<String>,
    },
    /// The session ended without a usable result
    Failed {
        task_id: TaskId,
        error: ReasoningError,
    },
}

struct InFlight {
    capability: Option<String>,
    hooks: HookState,
    deadline: Instant,
    timed_out: bool,
    completed: bool,
}

/// Pool of in-flight agent sessions for one worker.
pub struct AgentPool<R: ReasoningAdapter> {
    reasoning: R,
    workspace: PathBuf,
    default_timeout: Duration,
    envelope_tx: mpsc::Sender<(TaskId, SessionEnvelope)>,
    envelope_rx: mpsc::Receiver<(TaskId, SessionEnvelope)>,
    inflight: HashMap<TaskId, InFlight>,
    capability_costs: HashMap<String, f64>,
}

impl<R: ReasoningAdapter> AgentPool<R> {
    pub fn new(reasoning: R, workspace: PathBuf, default_timeout: Duration) -> Self {
        let (envelope_tx, envelope_rx) = mpsc::channel(256);
        Self {
            reasoning,
            workspace,
            default_timeout,
            envelope_tx,
            envelope_rx,
            inflight: HashMap::new(),
            capability_costs: HashMap::new(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_inflight(&self, task_id: &TaskId) -> bool {
        self.inflight.contains_key(task_id)
    }

    /// Cost accumulated per capability id across completed sessions.
    pub fn capability_costs(&self) -> &HashMap<String, f64> {
        &self.capability_costs
    }

    /// Launch a session for a task. The prompt is the task's prompt
    /// prefixed with the response-schema instruction.
    pub async fn spawn(
        &mut self,
        task: &Task,
        allowed_tools: Vec<String>,
        timeout_override: Option<Duration>,
        now: Instant,
    ) -> Result<(), ReasoningError> {
        let prompt = format!("{RESPONSE_SCHEMA_INSTRUCTION}{}", task.prompt);
        self.start_session(task, prompt, None, allowed_tools, timeout_override, now)
            .await
    }

    /// Resume a task's prior session with the user's answer as the next
    /// turn. The task must carry a session handle.
    pub async fn resume(
        &mut self,
        task: &Task,
        text: &str,
        allowed_tools: Vec<String>,
        timeout_override: Option<Duration>,
        now: Instant,
    ) -> Result<(), ReasoningError> {
        let session = task.session_id.clone().ok_or_else(|| {
            ReasoningError::new(
                ReasoningErrorKind::Unknown,
                format!("task {} has no session handle", task.id),
            )
        })?;
        self.start_session(
            task,
            text.to_string(),
            Some(session),
            allowed_tools,
            timeout_override,
            now,
        )
        .await
    }

    async fn start_session(
        &mut self,
        task: &Task,
        prompt: String,
        resume_session: Option<String>,
        allowed_tools: Vec<String>,
        timeout_override: Option<Duration>,
        now: Instant,
    ) -> Result<(), ReasoningError> {
        if self.inflight.contains_key(&task.id) {
            return Err(ReasoningError::new(
                ReasoningErrorKind::Unknown,
                format!("task {} already has a session", task.id),
            ));
        }

        let config = SessionConfig {
            task_id: task.id.clone(),
            prompt,
            model: task.model,
            resume_session,
            workspace: self.workspace.clone(),
            allowed_tools,
        };
        self.reasoning
            .start(config, self.envelope_tx.clone())
            .await?;

        let timeout = timeout_override.unwrap_or(self.default_timeout);
        self.inflight.insert(
            task.id.clone(),
            InFlight {
                capability: task.capability.clone(),
                hooks: HookState::new(),
                deadline: now + timeout,
                timed_out: false,
                completed: false,
            },
        );
        Ok(())
    }

    /// Abort one task's session if in flight. The closed envelope still
    /// arrives through `poll`, where it is swallowed as already-handled.
    pub async fn kill(&mut self, task_id: &TaskId) -> bool {
        if self.inflight.remove(task_id).is_none() {
            return false;
        }
        if let Err(e) = self.reasoning.kill(task_id).await {
            tracing::warn!(%task_id, error = %e, "failed to abort session");
        }
        true
    }

    /// Abort every in-flight session.
    pub async fn kill_all(&mut self) {
        let task_ids: Vec<TaskId> = self.inflight.keys().cloned().collect();
        for task_id in task_ids {
            self.kill(&task_id).await;
        }
    }

    /// Drain pending envelopes and enforce per-session timeouts. Returns
    /// the events the scheduler must process, in arrival order.
    pub async fn poll(&mut self, now: Instant) -> Vec<PoolEvent> {
        let mut events = Vec::new();

        while let Ok((task_id, envelope)) = self.envelope_rx.try_recv() {
            self.process_envelope(task_id, envelope, &mut events);
        }

        // Fire timeouts: abort the session now, reclassify its close when
        // it lands
        let expired: Vec<TaskId> = self
            .inflight
            .iter()
            .filter(|(_, s)| !s.timed_out && s.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for task_id in expired {
            tracing::warn!(%task_id, "agent session timed out");
            if let Some(session) = self.inflight.get_mut(&task_id) {
                session.timed_out = true;
            }
            if let Err(e) = self.reasoning.kill(&task_id).await {
                tracing::warn!(%task_id, error = %e, "failed to abort timed-out session");
            }
        }

        // Deliver any envelopes the aborts produced synchronously
        while let Ok((task_id, envelope)) = self.envelope_rx.try_recv() {
            self.process_envelope(task_id, envelope, &mut events);
        }

        events
    }

    fn process_envelope(
        &mut self,
        task_id: TaskId,
        envelope: SessionEnvelope,
        events: &mut Vec<PoolEvent>,
    ) {
        let Some(session) = self.inflight.get_mut(&task_id) else {
            // Session was killed or never tracked; drop its tail
            tracing::debug!(%task_id, "dropping envelope for untracked session");
            return;
        };

        match envelope {
            SessionEnvelope::Message(ReasoningMessage::Init { session_id }) => {
                events.push(PoolEvent::SessionInit {
                    task_id,
                    session_id,
                });
            }
            SessionEnvelope::Message(ReasoningMessage::ToolUse { tool, input }) => {
                for event in session.hooks.on_tool_use(&task_id, &tool, &input) {
                    events.push(PoolEvent::Hook { event });
                }
            }
            SessionEnvelope::Message(ReasoningMessage::Result {
                payload,
                cost_usd,
                stop_reason,
            }) => {
                session.completed = true;
                let cost_usd = cost_usd.unwrap_or(0.0);
                if let Some(capability) = &session.capability {
                    *self.capability_costs.entry(capability.clone()).or_insert(0.0) += cost_usd;
                }
                events.push(PoolEvent::Hook {
                    event: HookState::on_stop(&task_id, stop_reason),
                });
                events.push(PoolEvent::Completed {
                    task_id,
                    payload,
                    cost_usd,
                    capability: session.capability.clone(),
                });
            }
            SessionEnvelope::Closed { error } => {
                let session = match self.inflight.remove(&task_id) {
                    Some(s) => s,
                    None => return,
                };
                if session.completed {
                    if let Some(error) = error {
                        tracing::debug!(%task_id, error = %error, "session closed after result");
                    }
                    return;
                }
                let error = if session.timed_out {
                    ReasoningError::new(
                        ReasoningErrorKind::Timeout,
                        "session exceeded its timeout",
                    )
                } else {
                    error.unwrap_or_else(|| {
                        ReasoningError::new(
                            ReasoningErrorKind::Unknown,
                            "session ended without a result",
                        )
                    })
                };
                events.push(PoolEvent::Failed { task_id, error });
            }
        }
    }

    /// Await settlement of every in-flight session, up to `grace`.
    /// Returns the events observed while draining.
    pub async fn drain(&mut self, grace: Duration) -> Vec<PoolEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + grace;
        while !self.inflight.is_empty() {
            let recv = tokio::time::timeout_at(deadline, self.envelope_rx.recv()).await;
            match recv {
                Ok(Some((task_id, envelope))) => {
                    self.process_envelope(task_id, envelope, &mut events)
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        remaining = self.inflight.len(),
                        "drain grace expired with sessions still open"
                    );
                    break;
                }
            }
        }
        events
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
