// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ovs-engine: the per-project worker scheduler.
//!
//! One `WorkerScheduler` owns one project: it decomposes root requests
//! into task graphs, runs dependency-resolved tasks as concurrent agent
//! sessions under capacity and budget caps, aggregates child results into
//! parents, and forwards outcomes to the chat channel. The shared store is
//! its only coordination surface with the supervisor and the relay.

pub mod aggregate;
pub mod decompose;
pub mod error;
pub mod hooks;
pub mod notify;
pub mod pool;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use decompose::{DecompOutcome, DecompPlan, Decomposer, SubtaskSpec};
pub use error::EngineError;
pub use hooks::HookState;
pub use notify::Notifier;
pub use pool::{AgentPool, PoolEvent};
pub use scheduler::{ExitReason, SchedulerConfig, TickOutcome, WorkerScheduler};
