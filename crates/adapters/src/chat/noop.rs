// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op chat adapter used when no chat credential is configured.

use super::{ChatAdapter, ChatError};
use async_trait::async_trait;
use std::path::Path;

/// Chat adapter that drops everything (logged at debug level).
#[derive(Clone, Default)]
pub struct NoopChatAdapter;

impl NoopChatAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatAdapter for NoopChatAdapter {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        tracing::debug!(chat_id, len = text.len(), "chat disabled, dropping message");
        Ok(())
    }

    async fn send_image(&self, chat_id: &str, path: &Path) -> Result<(), ChatError> {
        tracing::debug!(chat_id, path = %path.display(), "chat disabled, dropping image");
        Ok(())
    }
}
