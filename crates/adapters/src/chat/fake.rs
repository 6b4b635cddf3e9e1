// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake chat adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ChatAdapter, ChatError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded call to FakeChatAdapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    Message { chat_id: String, text: String },
    Image { chat_id: String, path: PathBuf },
}

/// Fake chat adapter that records sends and can inject failures.
#[derive(Clone, Default)]
pub struct FakeChatAdapter {
    inner: Arc<Mutex<FakeChatState>>,
}

#[derive(Default)]
struct FakeChatState {
    calls: Vec<ChatCall>,
    fail_next: bool,
}

impl FakeChatAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ChatCall> {
        self.inner.lock().calls.clone()
    }

    /// Text bodies of all recorded message sends
    pub fn messages(&self) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ChatCall::Message { text, .. } => Some(text.clone()),
                ChatCall::Image { .. } => None,
            })
            .collect()
    }

    /// Fail the next send with a SendFailed error
    pub fn fail_next(&self) {
        self.inner.lock().fail_next = true;
    }
}

#[async_trait]
impl ChatAdapter for FakeChatAdapter {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ChatCall::Message {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });
        if std::mem::take(&mut inner.fail_next) {
            return Err(ChatError::SendFailed("scripted failure".to_string()));
        }
        Ok(())
    }

    async fn send_image(&self, chat_id: &str, path: &Path) -> Result<(), ChatError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ChatCall::Image {
            chat_id: chat_id.to_string(),
            path: path.to_path_buf(),
        });
        if std::mem::take(&mut inner.fail_next) {
            return Err(ChatError::SendFailed("scripted failure".to_string()));
        }
        Ok(())
    }
}
