// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overseer supervisor daemon (ovsd)
//!
//! The single always-on process. Scans the shared store at a fixed
//! cadence: respawns dead workers, sweeps dormant workers that own open
//! tasks, fires time triggers, and syncs manifests. Shutdown detaches
//! from children without killing them so ongoing work survives restarts.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use ovs_core::{Config, SystemClock, UuidIdGen};
use ovs_daemon::{logging, PidFile, Supervisor};
use ovs_store::Store;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("ovsd {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" | "help" => {
                println!("ovsd {}", env!("CARGO_PKG_VERSION"));
                println!("Overseer supervisor - spawns, reaps, and time-triggers workers");
                println!();
                println!("USAGE:");
                println!("    ovsd");
                println!();
                println!("Configuration comes from OVERSEER_* environment variables.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return;
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: ovsd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let log_path = config.log_dir.join("ovsd.log");
    logging::rotate_log_if_needed(&log_path);
    if let Err(e) = logging::write_startup_marker(&log_path, "ovsd") {
        eprintln!("error: cannot write log file: {e}");
        std::process::exit(1);
    }
    let _log_guard = match logging::setup(&log_path) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot set up logging: {e}");
            std::process::exit(1);
        }
    };

    // One supervisor per store
    let _pidfile = match PidFile::acquire(&config.pid_dir.join("ovsd.pid")) {
        Ok(pidfile) => pidfile,
        Err(e) => {
            logging::write_startup_error(&log_path, &e);
            eprintln!("ovsd is already running ({e})");
            std::process::exit(1);
        }
    };

    // The store is the one hard dependency: no store, no supervisor
    let store = match Store::open(&config.store_path) {
        Ok(store) => store,
        Err(e) => {
            logging::write_startup_error(&log_path, &e);
            error!(error = %e, "cannot open store");
            std::process::exit(1);
        }
    };

    let use_tmux = Supervisor::<SystemClock, UuidIdGen>::detect_tmux().await;
    info!(use_tmux, store = %config.store_path.display(), "supervisor starting");

    let mut supervisor = Supervisor::new(store, config, SystemClock, UuidIdGen, use_tmux);

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            std::process::exit(1);
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGINT handler");
            std::process::exit(1);
        }
    };

    let mut scan = tokio::time::interval(ovs_daemon::supervisor::SCAN_INTERVAL);
    loop {
        tokio::select! {
            _ = scan.tick() => {
                supervisor.tick().await;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, detaching from workers and exiting");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, detaching from workers and exiting");
                break;
            }
        }
    }

    info!("supervisor stopped");
}
