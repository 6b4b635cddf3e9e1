// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat-channel adapters.
//!
//! The chat relay inserts commands through the store; these adapters only
//! carry the outbound direction (notifications and images).

mod http;
mod noop;

pub use http::HttpChatAdapter;
pub use noop::NoopChatAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ChatCall, FakeChatAdapter};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from chat operations
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("chat service returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Adapter for sending messages to a chat channel
#[async_trait]
pub trait ChatAdapter: Clone + Send + Sync + 'static {
    /// Send a text message to a channel
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError>;

    /// Send an image file to a channel
    async fn send_image(&self, chat_id: &str, path: &Path) -> Result<(), ChatError>;
}
