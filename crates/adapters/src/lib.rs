// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ovs-adapters: process-boundary adapters.
//!
//! Everything that talks to something outside the Overseer processes lives
//! here behind a trait: the reasoning service (agent sessions and one-shot
//! calls), the chat service, and terminal-multiplexer sessions used by the
//! supervisor's spawn protocol.

pub mod chat;
pub mod reasoning;
pub mod session;

pub use chat::{ChatAdapter, ChatError, HttpChatAdapter, NoopChatAdapter};
pub use reasoning::{
    ReasoningAdapter, ReasoningError, ReasoningErrorKind, ReasoningMessage, SessionConfig,
    SessionEnvelope, SubprocessReasoningAdapter,
};
pub use session::{SessionAdapter, SessionError, TmuxAdapter};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use chat::{ChatCall, FakeChatAdapter};
#[cfg(any(test, feature = "test-support"))]
pub use reasoning::{FakeReasoningAdapter, ReasoningCall, SessionScript};
