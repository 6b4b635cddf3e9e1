// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overseer worker (ovs-worker)
//!
//! Per-project scheduler process, normally spawned detached by ovsd.
//! Owns one workspace and drives its task graph until idle, killed, or
//! fatal. Exit codes: 0 clean shutdown or idle, 1 fatal.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use async_trait::async_trait;
use clap::Parser;
use ovs_adapters::{
    ChatAdapter, ChatError, HttpChatAdapter, NoopChatAdapter, SubprocessReasoningAdapter,
};
use ovs_core::{
    Config, Event, SystemClock, Task, TaskConfig, TaskId, UuidIdGen, WorkerId, WorkerStatus,
};
use ovs_core::{Clock, IdGen};
use ovs_daemon::{logging, PidFile};
use ovs_engine::{ExitReason, SchedulerConfig, WorkerScheduler};
use ovs_store::Store;
use std::path::Path;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ovs-worker", version, about = "Overseer per-project worker scheduler")]
struct Args {
    /// Worker identity (project name)
    #[arg(long)]
    name: String,

    /// Create a root task from this prompt when none is open
    #[arg(long)]
    prompt: Option<String>,

    /// Target chat channel for notifications
    #[arg(long)]
    chat_id: Option<String>,
}

/// Chat adapter selected at startup from the configured credentials.
#[derive(Clone)]
enum WorkerChat {
    Http(HttpChatAdapter),
    Noop(NoopChatAdapter),
}

#[async_trait]
impl ChatAdapter for WorkerChat {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        match self {
            WorkerChat::Http(inner) => inner.send_message(chat_id, text).await,
            WorkerChat::Noop(inner) => inner.send_message(chat_id, text).await,
        }
    }

    async fn send_image(&self, chat_id: &str, path: &Path) -> Result<(), ChatError> {
        match self {
            WorkerChat::Http(inner) => inner.send_image(chat_id, path).await,
            WorkerChat::Noop(inner) => inner.send_image(chat_id, path).await,
        }
    }
}

/// Load `KEY=VALUE` lines from the env file the supervisor materialized,
/// without overriding variables already present.
fn load_env_file() {
    let Ok(path) = std::env::var("OVERSEER_ENV_FILE") else {
        return;
    };
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return;
    };
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    load_env_file();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let log_path = config.log_dir.join(format!("worker-{}.log", args.name));
    logging::rotate_log_if_needed(&log_path);
    if let Err(e) = logging::write_startup_marker(&log_path, "ovs-worker") {
        eprintln!("error: cannot write log file: {e}");
        std::process::exit(1);
    }
    let log_guard = match logging::setup(&log_path) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot set up logging: {e}");
            std::process::exit(1);
        }
    };

    let code = run(args, config, &log_path).await;
    // Flush buffered log lines before exiting
    drop(log_guard);
    std::process::exit(code);
}

async fn run(args: Args, config: Config, log_path: &Path) -> i32 {
    let clock = SystemClock;
    let idgen = UuidIdGen;

    let store = match Store::open(&config.store_path) {
        Ok(store) => store,
        Err(e) => {
            logging::write_startup_error(log_path, &e);
            error!(error = %e, "cannot open store");
            return 1;
        }
    };

    // One worker process per name
    let _pidfile = match PidFile::acquire(&config.pid_file_for(&args.name)) {
        Ok(pidfile) => pidfile,
        Err(e) => {
            logging::write_startup_error(log_path, &e);
            error!(error = %e, "another worker owns this name");
            return 1;
        }
    };

    let now_ms = clock.epoch_ms();
    let worker = match store.get_or_create_worker(
        &WorkerId::new(idgen.next()),
        &args.name,
        args.chat_id.as_deref(),
        now_ms,
    ) {
        Ok(worker) => worker,
        Err(e) => {
            error!(error = %e, "cannot resolve worker record");
            return 1;
        }
    };
    let worker_id = worker.id.clone();

    // Claim the record: our pid, active status. The liveness session the
    // supervisor recorded (if any) is preserved.
    let startup = store
        .set_worker_process(
            &worker_id,
            Some(std::process::id()),
            worker.liveness_session.as_deref(),
            now_ms,
        )
        .and_then(|()| store.set_worker_status(&worker_id, WorkerStatus::Active, now_ms));
    if let Err(e) = startup {
        error!(error = %e, "cannot claim worker record");
        return 1;
    }

    // Adopt leftovers from a previous process that died without a signal
    // handler (SIGKILL, power loss): running tasks cannot be resumed
    match store.fail_running_tasks(&worker_id, "daemon shutdown (recovered)", now_ms) {
        Ok(adopted) => {
            for task in &adopted {
                let _ = store.append_event(
                    &worker_id,
                    &Event::TaskFailed {
                        task_id: task.id.clone(),
                        title: task.title.clone(),
                        reason: "daemon shutdown (recovered)".to_string(),
                    },
                    now_ms,
                );
            }
            if !adopted.is_empty() {
                info!(count = adopted.len(), "failed tasks left running by a dead worker");
            }
        }
        Err(e) => {
            error!(error = %e, "cannot adopt leftover tasks");
            return 1;
        }
    }

    // A prompt creates a root task when no root is open
    if let Some(prompt) = &args.prompt {
        let has_open_root = match store.root_tasks(&worker_id) {
            Ok(roots) => roots.iter().any(|r| !r.status.is_terminal()),
            Err(e) => {
                error!(error = %e, "cannot inspect root tasks");
                return 1;
            }
        };
        if !has_open_root {
            let title: String = prompt.chars().take(60).collect();
            let task = Task::new(
                TaskConfig::root(TaskId::new(idgen.next()), worker_id.clone(), title, prompt),
                clock.epoch_ms(),
            );
            if let Err(e) = store.create_task(&task) {
                error!(error = %e, "cannot create root task");
                return 1;
            }
            info!(task_id = %task.id, "root task created from prompt");
        }
    }

    let workspace = config.workspace_for(&args.name);
    if let Err(e) = std::fs::create_dir_all(&workspace) {
        error!(error = %e, workspace = %workspace.display(), "cannot create workspace");
        return 1;
    }

    let reasoning = SubprocessReasoningAdapter::new(config.reasoning_cmd.clone());
    let chat = match (&config.chat_api, &config.chat_token) {
        (Some(api), Some(token)) => WorkerChat::Http(HttpChatAdapter::new(api, token)),
        _ => {
            info!("chat credentials not configured, notifications disabled");
            WorkerChat::Noop(NoopChatAdapter::new())
        }
    };

    let scheduler_config = SchedulerConfig::from_config(&config, workspace);
    let mut scheduler = WorkerScheduler::new(
        store.clone(),
        worker_id.clone(),
        reasoning,
        chat,
        clock.clone(),
        idgen,
        scheduler_config,
    );

    info!(worker = %args.name, "worker scheduler running");

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            return 1;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGINT handler");
            return 1;
        }
    };

    let exit = tokio::select! {
        reason = scheduler.run() => reason,
        _ = sigterm.recv() => {
            if let Err(e) = scheduler.shutdown("daemon shutdown (SIGTERM)").await {
                error!(error = %e, "shutdown failed");
            }
            ExitReason::Killed
        }
        _ = sigint.recv() => {
            if let Err(e) = scheduler.shutdown("daemon shutdown (SIGINT)").await {
                error!(error = %e, "shutdown failed");
            }
            ExitReason::Killed
        }
    };

    let now_ms = clock.epoch_ms();
    match exit {
        ExitReason::Idle | ExitReason::Killed => {
            // Release the record: no pid, no liveness session
            let _ = store.set_worker_process(&worker_id, None, None, now_ms);
            info!(worker = %args.name, ?exit, "worker exiting cleanly");
            0
        }
        ExitReason::Fatal => {
            let _ = store.set_worker_process(&worker_id, None, None, now_ms);
            error!(worker = %args.name, "worker exiting after consecutive errors");
            1
        }
    }
}
