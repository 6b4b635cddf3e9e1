// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear_overseer_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("OVERSEER_") {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn defaults_apply_when_env_is_empty() {
    clear_overseer_env();
    std::env::set_var("OVERSEER_STATE_DIR", "/tmp/ovs-test-state");

    let config = Config::from_env().unwrap();
    assert_eq!(config.reasoning_cmd, "claude");
    assert_eq!(config.max_agents, 5);
    assert_eq!(config.agent_timeout, Duration::from_millis(600_000));
    assert_eq!(config.poll_interval, Duration::from_millis(2_000));
    assert_eq!(config.budget_usd, 0.0);
    assert_eq!(config.default_model, ModelTier::Standard);
    assert!(config.chat_token.is_none());
    assert_eq!(
        config.store_path,
        PathBuf::from("/tmp/ovs-test-state/overseer.db")
    );
}

#[test]
#[serial]
fn overrides_take_effect() {
    clear_overseer_env();
    std::env::set_var("OVERSEER_STATE_DIR", "/tmp/ovs-test-state");
    std::env::set_var("OVERSEER_MAX_AGENTS", "2");
    std::env::set_var("OVERSEER_MODEL", "deep");
    std::env::set_var("OVERSEER_BUDGET_USD", "1.5");
    std::env::set_var("OVERSEER_ALLOWED_USERS", "alice, bob");

    let config = Config::from_env().unwrap();
    assert_eq!(config.max_agents, 2);
    assert_eq!(config.default_model, ModelTier::Deep);
    assert_eq!(config.budget_usd, 1.5);
    assert_eq!(config.allowed_users, vec!["alice", "bob"]);
    assert!(config.user_allowed("alice"));
    assert!(!config.user_allowed("mallory"));
}

#[test]
#[serial]
fn empty_allowlist_rejects_everyone() {
    clear_overseer_env();
    std::env::set_var("OVERSEER_STATE_DIR", "/tmp/ovs-test-state");
    let config = Config::from_env().unwrap();
    assert!(!config.user_allowed("anyone"));
}

#[test]
#[serial]
fn invalid_number_is_an_error() {
    clear_overseer_env();
    std::env::set_var("OVERSEER_STATE_DIR", "/tmp/ovs-test-state");
    std::env::set_var("OVERSEER_MAX_AGENTS", "many");
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidNumber { .. })
    ));
}

#[test]
#[serial]
fn invalid_model_is_an_error() {
    clear_overseer_env();
    std::env::set_var("OVERSEER_STATE_DIR", "/tmp/ovs-test-state");
    std::env::set_var("OVERSEER_MODEL", "gigantic");
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidModel { .. })
    ));
}

#[test]
#[serial]
fn derived_paths() {
    clear_overseer_env();
    std::env::set_var("OVERSEER_STATE_DIR", "/tmp/ovs-test-state");
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.workspace_for("myproj"),
        PathBuf::from("/tmp/ovs-test-state/workspaces/myproj")
    );
    assert_eq!(
        config.pid_file_for("myproj"),
        PathBuf::from("/tmp/ovs-test-state/pids/myproj.pid")
    );
    assert_eq!(
        config.env_file_for("w-1"),
        PathBuf::from("/tmp/ovs-test-state/runtime/env/w-1.env")
    );
}
