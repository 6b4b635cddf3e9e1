// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification dispatcher.
//!
//! Claims user-visible events from the store (exactly once), rewrites the
//! raw payload into a short human message via a one-shot formatter call,
//! and sends it through the chat channel. Also sweeps the workspace for
//! newly appeared images and forwards them. Nothing here ever blocks task
//! progression: formatter failures fall back to the raw prefix, send
//! failures are logged.

use ovs_adapters::{ChatAdapter, ReasoningAdapter};
use ovs_core::{Event, ModelTier, WorkerRecord};
use ovs_store::{Store, StoreError};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Events claimed per dispatch round.
const NOTIFY_BATCH: usize = 10;

/// Formatter calls are bounded; past this the raw fallback is used.
const FORMAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters of the raw payload used when formatting fails.
const RAW_FALLBACK_CHARS: usize = 500;

/// Image extensions forwarded from the workspace.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Per-worker notification dispatcher.
pub struct Notifier<R: ReasoningAdapter, C: ChatAdapter> {
    reasoning: R,
    chat: C,
    workspace: PathBuf,
    sent_images: HashSet<PathBuf>,
}

impl<R: ReasoningAdapter, C: ChatAdapter> Notifier<R, C> {
    pub fn new(reasoning: R, chat: C, workspace: PathBuf) -> Self {
        Self {
            reasoning,
            chat,
            workspace,
            sent_images: HashSet::new(),
        }
    }

    /// Claim and deliver pending notifications for this worker. Returns
    /// the number of events claimed.
    pub async fn dispatch(
        &mut self,
        store: &Store,
        worker: &WorkerRecord,
    ) -> Result<usize, StoreError> {
        let claimed = store.claim_unnotified(&worker.id, NOTIFY_BATCH)?;
        let count = claimed.len();

        let Some(chat_id) = worker.chat_id.as_deref() else {
            if count > 0 {
                tracing::debug!(worker = %worker.name, count, "no chat channel, dropping notifications");
            }
            return Ok(count);
        };

        for record in claimed {
            let raw = raw_text(&record.event);
            let body = self.format(&raw).await;
            if let Err(e) = self.chat.send_message(chat_id, &body).await {
                tracing::warn!(worker = %worker.name, error = %e, "chat send failed");
            }
        }

        self.sweep_images(chat_id).await;
        Ok(count)
    }

    /// Direct send used for command acknowledgments and one-off notices.
    /// Best-effort; failures are logged.
    pub async fn send_direct(&self, worker: &WorkerRecord, text: &str) {
        let Some(chat_id) = worker.chat_id.as_deref() else {
            return;
        };
        if let Err(e) = self.chat.send_message(chat_id, text).await {
            tracing::warn!(worker = %worker.name, error = %e, "chat send failed");
        }
    }

    /// Rewrite a raw payload as a short human message, falling back to
    /// the raw prefix when the formatter errors or times out.
    async fn format(&self, raw: &str) -> String {
        let prompt = format!(
            "Rewrite this task outcome as one short, friendly chat message. \
             Keep concrete details, drop JSON syntax. Respond with the message only.\n\n{raw}"
        );
        let call = self
            .reasoning
            .one_shot(prompt, ModelTier::Fast, self.workspace.clone());
        match tokio::time::timeout(FORMAT_TIMEOUT, call).await {
            Ok(Ok(formatted)) if !formatted.trim().is_empty() => formatted.trim().to_string(),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "formatter failed, using raw fallback");
                fallback(raw)
            }
            _ => fallback(raw),
        }
    }

    /// Forward images that appeared in the workspace since the last sweep.
    async fn sweep_images(&mut self, chat_id: &str) {
        let mut dir = match tokio::fs::read_dir(&self.workspace).await {
            Ok(dir) => dir,
            Err(_) => return,
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if !is_image || self.sent_images.contains(&path) {
                continue;
            }
            // Track regardless of outcome so a broken file is not retried
            // every tick
            self.sent_images.insert(path.clone());
            if let Err(e) = self.chat.send_image(chat_id, &path).await {
                tracing::warn!(path = %path.display(), error = %e, "image send failed");
            }
        }
    }
}

/// Plain-text rendition of a user-visible event, fed to the formatter.
fn raw_text(event: &Event) -> String {
    match event {
        Event::TaskDone {
            title, message, ..
        } => format!("Task \"{title}\" completed: {message}"),
        Event::TaskFailed { title, reason, .. } => {
            format!("Task \"{title}\" failed: {reason}")
        }
        Event::NeedsInput { question, .. } => {
            format!("An agent needs your input: {question}")
        }
        other => other.log_summary(),
    }
}

fn fallback(raw: &str) -> String {
    raw.chars().take(RAW_FALLBACK_CHARS).collect()
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
