// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-result wire schema and tolerant JSON extraction.
//!
//! Agents are instructed to answer with `{"status": "success"|"error",
//! "message": ..., "data"?: ...}` but real output arrives wrapped in prose
//! or fenced blocks often enough that parsing is three-stage: direct,
//! first fenced block, bracket-balanced scan.

use serde::{Deserialize, Serialize};

/// Maximum characters of a raw payload preserved when wrapping
/// unparseable output into the result schema.
pub const RAW_PREFIX_LIMIT: usize = 500;

/// Outcome tag of a task result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// The structured result an agent session reports for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: ResultStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TaskResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// Parse a raw agent payload, falling back to wrapping its first-line
    /// prefix as a success so aggregation shapes stay uniform.
    pub fn from_raw(raw: &str) -> Self {
        if let Some(value) = extract_json(raw) {
            if let Ok(result) = serde_json::from_value::<TaskResult>(value) {
                return result;
            }
        }
        Self::success(first_line_prefix(raw))
    }
}

/// One entry of an aggregated parent result, in child creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEntry {
    pub title: String,
    pub result: TaskResult,
}

/// First line of `raw`, truncated to [`RAW_PREFIX_LIMIT`] characters.
pub fn first_line_prefix(raw: &str) -> String {
    let line = raw.lines().next().unwrap_or_default().trim();
    line.chars().take(RAW_PREFIX_LIMIT).collect()
}

/// Extract a JSON value from loosely structured model output.
///
/// Attempts, in order: direct parse of the whole string, parse of the
/// first fenced code block, and a bracket-balanced scan from the first
/// `{` or `[`. Returns `None` when all three fail.
pub fn extract_json(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(block) = first_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(block.trim()) {
            return Some(value);
        }
    }

    balanced_slice(trimmed).and_then(|slice| serde_json::from_str(slice).ok())
}

/// Contents of the first ``` fenced block, language tag stripped.
fn first_fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_fence = &raw[open + 3..];
    // Skip the optional language tag up to the first newline
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// The shortest prefix starting at the first `{` or `[` whose brackets
/// balance, respecting JSON string and escape rules.
fn balanced_slice(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let bytes = raw.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
