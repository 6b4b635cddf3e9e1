// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process configuration from environment variables.
//!
//! All three process roles read the same variable set once at startup.
//! Paths default to subdirectories of the state directory so a single
//! `OVERSEER_STATE_DIR` override relocates everything.

use crate::task::ModelTier;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine home directory and OVERSEER_STATE_DIR is unset")]
    NoStateDir,
    #[error("{var}={value:?} is not a valid number")]
    InvalidNumber { var: String, value: String },
    #[error("{var}={value:?} is not a model tier (fast|standard|deep)")]
    InvalidModel { var: String, value: String },
}

/// Resolved configuration for one process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Command line for the reasoning service entry point
    pub reasoning_cmd: String,
    /// Chat service credential; chat sends are disabled when unset
    pub chat_token: Option<String>,
    /// Chat service API base URL
    pub chat_api: Option<String>,
    pub state_dir: PathBuf,
    pub store_path: PathBuf,
    pub workspaces_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pid_dir: PathBuf,
    pub skill_dir: PathBuf,
    /// Materialized per-worker env files live under here (mode 0600)
    pub runtime_dir: PathBuf,
    /// Worker binary override for the supervisor spawn protocol
    pub worker_binary: Option<PathBuf>,
    pub default_model: ModelTier,
    /// Concurrent agent sessions per worker
    pub max_agents: usize,
    pub agent_timeout: Duration,
    pub poll_interval: Duration,
    /// Per-worker budget cap in USD; 0 means unbounded
    pub budget_usd: f64,
    /// Chat users allowed to issue commands; empty rejects all
    pub allowed_users: Vec<String>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        let state_dir = match var("OVERSEER_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoStateDir)?
                .join(".overseer"),
        };

        let path_or = |name: &str, default: PathBuf| var(name).map(PathBuf::from).unwrap_or(default);

        Ok(Config {
            reasoning_cmd: var("OVERSEER_REASONING_CMD").unwrap_or_else(|| "claude".to_string()),
            chat_token: var("OVERSEER_CHAT_TOKEN"),
            chat_api: var("OVERSEER_CHAT_API"),
            store_path: path_or("OVERSEER_STORE_PATH", state_dir.join("overseer.db")),
            workspaces_dir: path_or("OVERSEER_WORKSPACES_DIR", state_dir.join("workspaces")),
            log_dir: path_or("OVERSEER_LOG_DIR", state_dir.join("logs")),
            pid_dir: path_or("OVERSEER_PID_DIR", state_dir.join("pids")),
            skill_dir: path_or("OVERSEER_SKILL_DIR", state_dir.join("skills")),
            runtime_dir: state_dir.join("runtime"),
            worker_binary: var("OVERSEER_WORKER_BINARY").map(PathBuf::from),
            default_model: model_var("OVERSEER_MODEL")?,
            max_agents: num_var("OVERSEER_MAX_AGENTS", 5)?,
            agent_timeout: Duration::from_millis(num_var("OVERSEER_AGENT_TIMEOUT_MS", 600_000)?),
            poll_interval: Duration::from_millis(num_var("OVERSEER_POLL_MS", 2_000)?),
            budget_usd: float_var("OVERSEER_BUDGET_USD", 0.0)?,
            allowed_users: list_var("OVERSEER_ALLOWED_USERS"),
            state_dir,
        })
    }

    /// Workspace directory for a worker name.
    pub fn workspace_for(&self, name: &str) -> PathBuf {
        self.workspaces_dir.join(name)
    }

    /// Pid file path for a worker name.
    pub fn pid_file_for(&self, name: &str) -> PathBuf {
        self.pid_dir.join(format!("{name}.pid"))
    }

    /// Materialized env file path for a worker id.
    pub fn env_file_for(&self, worker_id: &str) -> PathBuf {
        self.runtime_dir.join("env").join(format!("{worker_id}.env"))
    }

    /// Whether a chat user may issue commands. An empty allowlist rejects
    /// everyone.
    pub fn user_allowed(&self, user: &str) -> bool {
        self.allowed_users.iter().any(|u| u == user)
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn num_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
            var: name.to_string(),
            value,
        }),
    }
}

fn float_var(name: &str, default: f64) -> Result<f64, ConfigError> {
    num_var(name, default)
}

fn model_var(name: &str) -> Result<ModelTier, ConfigError> {
    match var(name) {
        None => Ok(ModelTier::default()),
        Some(value) => ModelTier::parse(&value).ok_or(ConfigError::InvalidModel {
            var: name.to_string(),
            value,
        }),
    }
}

fn list_var(name: &str) -> Vec<String> {
    var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
