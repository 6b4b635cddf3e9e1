// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ovs-daemon: the supervisor and the process entry points.
//!
//! `ovsd` is the single always-on process: it scans the store, respawns
//! dead workers, sweeps dormant workers that still own work, and fires
//! time triggers. `ovs-worker` is the per-project scheduler process it
//! spawns (fully detached, so a supervisor restart never orphans work).

pub mod liveness;
pub mod logging;
pub mod pidfile;
pub mod spawn;
pub mod supervisor;

pub use pidfile::PidFile;
pub use spawn::{SpawnError, SpawnOutcome};
pub use supervisor::{Supervisor, SupervisorError};
