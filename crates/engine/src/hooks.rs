// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session hook observers.
//!
//! The reasoning stream carries tool-use and stop signals; these hooks
//! turn them into store events: `file_changed` for Edit/Write, question
//! dedup by SHA-256 prefix, loop detection over a sliding tool window,
//! and `agent_stop`.

use ovs_core::{Event, TaskId};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

/// Window size for loop detection: this many identical tool names in a
/// row flag a loop.
pub const LOOP_WINDOW: usize = 5;

/// Tools whose use mutates files.
const FILE_TOOLS: &[&str] = &["Edit", "Write"];

/// Tools that ask the user a question.
const ASK_TOOLS: &[&str] = &["AskUserQuestion", "ask_user"];

/// 16-hex prefix of the SHA-256 of a question text.
pub fn question_hash(question: &str) -> String {
    let digest = Sha256::digest(question.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Hook state for one agent session.
#[derive(Debug, Default)]
pub struct HookState {
    tool_window: VecDeque<String>,
    asked: HashSet<String>,
    loop_flagged: bool,
}

impl HookState {
    pub fn new() -> Self {
        Self::default()
    }

    /// PostToolUse: returns the events this tool invocation produces.
    pub fn on_tool_use(
        &mut self,
        task_id: &TaskId,
        tool: &str,
        input: &serde_json::Value,
    ) -> Vec<Event> {
        let mut events = Vec::new();

        if FILE_TOOLS.contains(&tool) {
            if let Some(path) = input.get("file_path").and_then(|v| v.as_str()) {
                events.push(Event::FileChanged {
                    task_id: task_id.clone(),
                    path: PathBuf::from(path),
                });
            }
        }

        if ASK_TOOLS.contains(&tool) {
            if let Some(question) = extract_question(input) {
                let hash = question_hash(&question);
                if self.asked.insert(hash.clone()) {
                    events.push(Event::NeedsInput {
                        task_id: task_id.clone(),
                        question,
                    });
                } else {
                    events.push(Event::DuplicateQuestion {
                        task_id: task_id.clone(),
                        hash,
                    });
                }
            }
        }

        self.tool_window.push_back(tool.to_string());
        if self.tool_window.len() > LOOP_WINDOW {
            self.tool_window.pop_front();
        }
        if !self.loop_flagged
            && self.tool_window.len() == LOOP_WINDOW
            && self.tool_window.iter().all(|t| t == tool)
        {
            self.loop_flagged = true;
            events.push(Event::LoopDetected {
                task_id: task_id.clone(),
                tool: tool.to_string(),
            });
        }

        events
    }

    /// Stop: the session ended.
    pub fn on_stop(task_id: &TaskId, reason: Option<String>) -> Event {
        Event::AgentStop {
            task_id: task_id.clone(),
            reason,
        }
    }
}

/// Question text from an ask-user tool input: either a flat `question`
/// field or the first entry of a `questions` array.
fn extract_question(input: &serde_json::Value) -> Option<String> {
    if let Some(q) = input.get("question").and_then(|v| v.as_str()) {
        return Some(q.to_string());
    }
    input
        .get("questions")
        .and_then(|v| v.as_array())
        .and_then(|qs| qs.first())
        .and_then(|q| q.get("question"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
