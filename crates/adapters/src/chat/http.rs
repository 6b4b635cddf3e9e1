// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP bot-API chat adapter.
//!
//! Posts `sendMessage` / `sendPhoto` calls to `<api>/bot<token>/...`.
//! Message text is truncated to the service's length cap before sending.

use super::{ChatAdapter, ChatError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Chat services cap message length; longer texts are truncated with a
/// marker rather than rejected.
const MAX_MESSAGE_CHARS: usize = 4_000;

/// HTTP chat adapter
#[derive(Clone)]
pub struct HttpChatAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatAdapter {
    /// Create an adapter for the given API base URL and bot token.
    pub fn new(api: &str, token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: format!("{}/bot{}", api.trim_end_matches('/'), token),
        }
    }

    async fn check(response: reqwest::Response) -> Result<(), ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChatError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Truncate to the service cap, marking the cut.
fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    out.push('…');
    out
}

#[async_trait]
impl ChatAdapter for HttpChatAdapter {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": truncate_text(text),
            }))
            .send()
            .await
            .map_err(|e| ChatError::SendFailed(e.to_string()))?;
        Self::check(response).await
    }

    async fn send_image(&self, chat_id: &str, path: &Path) -> Result<(), ChatError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ChatError::SendFailed(format!("read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);

        let response = self
            .client
            .post(format!("{}/sendPhoto", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChatError::SendFailed(e.to_string()))?;
        Self::check(response).await
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
