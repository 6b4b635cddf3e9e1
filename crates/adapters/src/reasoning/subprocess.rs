// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess reasoning adapter.
//!
//! Spawns the configured reasoning command with the prompt on argv and
//! parses the JSONL message stream from its stdout. The child is killed
//! when the session is aborted or the adapter is dropped.

use super::{
    ReasoningAdapter, ReasoningError, ReasoningErrorKind, ReasoningMessage, SessionConfig,
    SessionEnvelope,
};
use async_trait::async_trait;
use ovs_core::{ModelTier, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

/// Reasoning adapter that runs the service as a child process per session.
#[derive(Clone)]
pub struct SubprocessReasoningAdapter {
    /// Command line for the service entry point (first token is the
    /// program, the rest are leading arguments)
    command: String,
    sessions: Arc<Mutex<HashMap<TaskId, oneshot::Sender<()>>>>,
}

impl SubprocessReasoningAdapter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn build_command(
        &self,
        prompt: &str,
        model: ModelTier,
        resume_session: Option<&str>,
        allowed_tools: &[String],
        cwd: &Path,
    ) -> Result<Command, ReasoningError> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            ReasoningError::new(ReasoningErrorKind::Unknown, "empty reasoning command")
        })?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--model")
            .arg(model.to_string());
        if let Some(session) = resume_session {
            cmd.arg("--resume").arg(session);
        }
        if !allowed_tools.is_empty() {
            cmd.arg("--allowed-tools").arg(allowed_tools.join(","));
        }
        cmd.arg(prompt)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl ReasoningAdapter for SubprocessReasoningAdapter {
    async fn start(
        &self,
        config: SessionConfig,
        envelope_tx: mpsc::Sender<(TaskId, SessionEnvelope)>,
    ) -> Result<(), ReasoningError> {
        if !config.workspace.exists() {
            return Err(ReasoningError::new(
                ReasoningErrorKind::Unknown,
                format!("workspace does not exist: {}", config.workspace.display()),
            ));
        }

        let mut cmd = self.build_command(
            &config.prompt,
            config.model,
            config.resume_session.as_deref(),
            &config.allowed_tools,
            &config.workspace,
        )?;

        let mut child = cmd.spawn().map_err(|e| {
            ReasoningError::new(ReasoningErrorKind::Unknown, format!("spawn failed: {e}"))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ReasoningError::new(ReasoningErrorKind::Unknown, "child stdout unavailable")
        })?;
        let stderr = child.stderr.take();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.sessions
            .lock()
            .insert(config.task_id.clone(), shutdown_tx);

        tracing::debug!(task_id = %config.task_id, resumed = config.resume_session.is_some(), "reasoning session started");

        let sessions = Arc::clone(&self.sessions);
        let task_id = config.task_id;
        tokio::spawn(async move {
            let closed = read_stream(&task_id, child, stdout, stderr, &envelope_tx, shutdown_rx).await;
            sessions.lock().remove(&task_id);
            let _ = envelope_tx.send((task_id, closed)).await;
        });

        Ok(())
    }

    async fn kill(&self, task_id: &TaskId) -> Result<(), ReasoningError> {
        let shutdown_tx = self.sessions.lock().remove(task_id);
        match shutdown_tx {
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(ReasoningError::new(
                ReasoningErrorKind::Unknown,
                format!("no session for task {task_id}"),
            )),
        }
    }

    async fn one_shot(
        &self,
        prompt: String,
        model: ModelTier,
        workspace: PathBuf,
    ) -> Result<String, ReasoningError> {
        let mut cmd = self.build_command(&prompt, model, None, &[], &workspace)?;
        let output = cmd.output().await.map_err(|e| {
            ReasoningError::new(ReasoningErrorKind::Unknown, format!("spawn failed: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReasoningError::classify(format!(
                "reasoning command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        // The last result message wins; plain-text output is passed through
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut payload = None;
        for line in stdout.lines() {
            if let Ok(ReasoningMessage::Result { payload: p, .. }) = serde_json::from_str(line) {
                payload = Some(p);
            }
        }
        Ok(payload.unwrap_or_else(|| stdout.trim().to_string()))
    }
}

/// Read the child's JSONL stream until EOF or shutdown, forwarding
/// messages. Returns the `Closed` envelope to deliver.
async fn read_stream(
    task_id: &TaskId,
    mut child: tokio::process::Child,
    stdout: tokio::process::ChildStdout,
    stderr: Option<tokio::process::ChildStderr>,
    envelope_tx: &mpsc::Sender<(TaskId, SessionEnvelope)>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> SessionEnvelope {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!(%task_id, "reasoning session aborted");
                let _ = child.kill().await;
                return SessionEnvelope::Closed {
                    error: Some(ReasoningError::new(
                        ReasoningErrorKind::Aborted,
                        "session aborted",
                    )),
                };
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ReasoningMessage>(trimmed) {
                            Ok(message) => {
                                let envelope = SessionEnvelope::Message(message);
                                if envelope_tx.send((task_id.clone(), envelope)).await.is_err() {
                                    // Receiver gone; stop reading and kill the child
                                    let _ = child.kill().await;
                                    return SessionEnvelope::Closed { error: None };
                                }
                            }
                            Err(_) => {
                                tracing::debug!(%task_id, line = trimmed, "skipping unknown stream line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = child.kill().await;
                        return SessionEnvelope::Closed {
                            error: Some(ReasoningError::new(
                                ReasoningErrorKind::Unknown,
                                format!("stream read failed: {e}"),
                            )),
                        };
                    }
                }
            }
        }
    }

    // Natural EOF: collect exit status and stderr for classification
    let status = child.wait().await;
    let mut stderr_text = String::new();
    if let Some(mut stderr) = stderr {
        let _ = stderr.read_to_string(&mut stderr_text).await;
    }

    match status {
        Ok(status) if status.success() => SessionEnvelope::Closed { error: None },
        Ok(status) => SessionEnvelope::Closed {
            error: Some(ReasoningError::classify(format!(
                "reasoning command exited with {status}: {}",
                stderr_text.trim()
            ))),
        },
        Err(e) => SessionEnvelope::Closed {
            error: Some(ReasoningError::new(
                ReasoningErrorKind::Unknown,
                format!("wait failed: {e}"),
            )),
        },
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
