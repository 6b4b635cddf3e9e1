// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reasoning-service adapter.
//!
//! One agent session is one invocation of the reasoning service bound to
//! one task. The service streams JSONL messages on stdout:
//!
//! ```text
//! {"type": "init", "session_id": "..."}
//! {"type": "tool_use", "tool": "Edit", "input": {...}}
//! {"type": "result", "payload": "...", "cost_usd": 0.42, "stop_reason": "end_turn"}
//! ```
//!
//! Unknown message types are skipped so a newer service never wedges the
//! stream. The adapter reports stream termination with a classified error
//! when the process fails; timeouts are enforced by the agent pool, not
//! here.

mod subprocess;

pub use subprocess::SubprocessReasoningAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeReasoningAdapter, ReasoningCall, SessionScript};

use async_trait::async_trait;
use ovs_core::{ModelTier, TaskId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Classification of reasoning-service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningErrorKind {
    Timeout,
    Aborted,
    /// Rate limit, overload, 5xx, 429
    Provider,
    Unknown,
}

impl std::fmt::Display for ReasoningErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasoningErrorKind::Timeout => write!(f, "timeout"),
            ReasoningErrorKind::Aborted => write!(f, "aborted"),
            ReasoningErrorKind::Provider => write!(f, "provider"),
            ReasoningErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified reasoning failure with both audiences' messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {technical}")]
pub struct ReasoningError {
    pub kind: ReasoningErrorKind,
    /// For logs and run records
    pub technical: String,
    /// For chat notifications
    pub user_message: String,
}

impl ReasoningError {
    pub fn new(kind: ReasoningErrorKind, technical: impl Into<String>) -> Self {
        let technical = technical.into();
        let user_message = match kind {
            ReasoningErrorKind::Timeout => "The agent timed out.".to_string(),
            ReasoningErrorKind::Aborted => "The agent was cancelled.".to_string(),
            ReasoningErrorKind::Provider => {
                "The reasoning service is overloaded; try again shortly.".to_string()
            }
            ReasoningErrorKind::Unknown => "The agent failed unexpectedly.".to_string(),
        };
        Self {
            kind,
            technical,
            user_message,
        }
    }

    /// Classify a raw failure string by its provider markers.
    pub fn classify(technical: impl Into<String>) -> Self {
        let technical = technical.into();
        let lower = technical.to_lowercase();
        let kind = if lower.contains("timed out") || lower.contains("timeout") {
            ReasoningErrorKind::Timeout
        } else if lower.contains("abort") || lower.contains("cancel") {
            ReasoningErrorKind::Aborted
        } else if lower.contains("rate limit")
            || lower.contains("overloaded")
            || lower.contains("429")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("529")
        {
            ReasoningErrorKind::Provider
        } else {
            ReasoningErrorKind::Unknown
        };
        Self::new(kind, technical)
    }
}

/// One message from a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReasoningMessage {
    /// First message: the session handle used for resumption
    #[serde(rename = "init")]
    Init { session_id: String },

    /// The agent invoked a tool
    #[serde(rename = "tool_use")]
    ToolUse {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    /// Final message: the result payload and session cost
    #[serde(rename = "result")]
    Result {
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

/// Stream-termination envelope delivered to the pool: every session ends
/// with exactly one `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnvelope {
    Message(ReasoningMessage),
    Closed { error: Option<ReasoningError> },
}

/// Configuration for starting (or resuming) one agent session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub task_id: TaskId,
    pub prompt: String,
    pub model: ModelTier,
    /// Resume handle from a prior session's init message
    pub resume_session: Option<String>,
    pub workspace: PathBuf,
    /// Tool allowlist from the task's capability; empty = unrestricted
    pub allowed_tools: Vec<String>,
}

/// Adapter for the external reasoning service.
#[async_trait]
pub trait ReasoningAdapter: Clone + Send + Sync + 'static {
    /// Start a session. Messages (and the final `Closed`) arrive on
    /// `envelope_tx` tagged with the session's task.
    async fn start(
        &self,
        config: SessionConfig,
        envelope_tx: mpsc::Sender<(TaskId, SessionEnvelope)>,
    ) -> Result<(), ReasoningError>;

    /// Abort an in-flight session. The stream still delivers its `Closed`
    /// envelope (classified as aborted).
    async fn kill(&self, task_id: &TaskId) -> Result<(), ReasoningError>;

    /// One-shot call: start a session with the given prompt and return
    /// the final result payload. Used by the decomposition driver and the
    /// notification formatter.
    async fn one_shot(
        &self,
        prompt: String,
        model: ModelTier,
        workspace: PathBuf,
    ) -> Result<String, ReasoningError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
