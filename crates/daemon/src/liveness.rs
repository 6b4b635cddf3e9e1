// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS process liveness probes.

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Whether a process with this pid is alive (signal 0 probe).
///
/// EPERM counts as alive: the process exists, we just may not signal it.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "liveness_tests.rs"]
mod tests;
