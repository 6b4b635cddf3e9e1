//! Behavioral specifications for the Overseer orchestrator.
//!
//! These tests exercise the crates together against a real on-disk store
//! the way separate processes would: one handle per simulated process
//! role. See tests/specs/prelude.rs for shared fixtures.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/store_coordination.rs"]
mod store_coordination;

#[path = "specs/worker_lifecycle.rs"]
mod worker_lifecycle;

#[path = "specs/trigger_flow.rs"]
mod trigger_flow;
