// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type

use ovs_adapters::ReasoningError;
use ovs_store::StoreError;
use thiserror::Error;

/// Errors surfacing from a scheduler tick.
///
/// Store errors are treated as transient: the tick is abandoned and the
/// consecutive-error governor decides whether the worker survives.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error("worker record vanished: {0}")]
    WorkerGone(String),
}
