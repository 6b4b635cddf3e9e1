// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decomposition driver.
//!
//! One reasoning call turns a root request into a dependency graph of
//! subtasks. Output parsing is tolerant (three-step JSON extraction), has
//! a one-shot fix-your-JSON retry, and falls back to a single-task plan so
//! a malformed response never hard-fails the root.

use ovs_adapters::{ReasoningAdapter, ReasoningError, ReasoningErrorKind};
use ovs_core::{extract_json, Clock, ModelTier, SkillDescriptor, TaskId, WorkerId};
use ovs_store::DecompRun;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock bound for one decomposition call.
pub const DECOMP_TIMEOUT: Duration = Duration::from_secs(120);

/// Turn bound stated in the decomposition contract.
const DECOMP_TURN_CAP: u32 = 3;

/// One subtask in a decomposition plan. Dependencies reference sibling
/// titles; the scheduler resolves them to ids after batch creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub title: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelTier>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
}

/// A parsed decomposition plan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecompPlan {
    pub subtasks: Vec<SubtaskSpec>,
}

/// Result of driving one decomposition, with its observability record.
#[derive(Debug)]
pub struct DecompOutcome {
    pub plan: Result<DecompPlan, ReasoningError>,
    pub run: DecompRun,
}

/// The fixed decomposition contract sent as the system instruction.
const DECOMP_CONTRACT: &str = "You are a task planner. Decompose the user's request into \
subtasks and respond with JSON only: {\"subtasks\": [{\"title\": string, \"prompt\": string, \
\"model\": \"fast\"|\"standard\"|\"deep\" (optional), \"skills\": [string] (optional), \
\"capability\": string (optional), \"deps\": [sibling title] (optional)}]}. \
Titles must be unique. Dependencies may only name sibling titles. Return an empty subtasks \
array when the request is simple enough to run as a single task.";

/// Driver for decomposition calls.
#[derive(Clone)]
pub struct Decomposer<R: ReasoningAdapter> {
    reasoning: R,
    timeout: Duration,
    model: ModelTier,
}

impl<R: ReasoningAdapter> Decomposer<R> {
    pub fn new(reasoning: R, model: ModelTier) -> Self {
        Self {
            reasoning,
            timeout: DECOMP_TIMEOUT,
            model,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Decompose `request` for the given root task. Never returns a parse
    /// error: unparseable output falls back to a single-task plan.
    pub async fn decompose(
        &self,
        worker_id: &WorkerId,
        root_id: &TaskId,
        request: &str,
        skills: &[SkillDescriptor],
        workspace: PathBuf,
        clock: &impl Clock,
    ) -> DecompOutcome {
        let started_at_ms = clock.epoch_ms();
        let prompt = build_prompt(request, skills);
        let mut run = DecompRun {
            worker_id: worker_id.clone(),
            task_id: root_id.clone(),
            started_at_ms,
            finished_at_ms: started_at_ms,
            elapsed_ms: 0,
            model: self.model.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
            request_chars: request.chars().count(),
            prompt_chars: prompt.chars().count(),
            result_chars: 0,
            parse_attempts: 0,
            fallback: false,
            error_code: None,
            raw_prefix: String::new(),
        };

        fn finish(run: &mut DecompRun, now_ms: u64) {
            run.finished_at_ms = now_ms;
            run.elapsed_ms = now_ms.saturating_sub(run.started_at_ms);
        }

        let raw = match self.call(prompt, &workspace).await {
            Ok(raw) => raw,
            Err(error) => {
                run.error_code = Some(error.kind.to_string());
                finish(&mut run, clock.epoch_ms());
                tracing::warn!(%root_id, kind = %error.kind, "decomposition call failed");
                return DecompOutcome {
                    plan: Err(error),
                    run,
                };
            }
        };
        run.result_chars = raw.chars().count();
        run.raw_prefix = raw.clone();

        run.parse_attempts = 1;
        if let Some(plan) = parse_plan(&raw) {
            finish(&mut run, clock.epoch_ms());
            let plan = inline_skills(plan, skills);
            return DecompOutcome {
                plan: Ok(plan),
                run,
            };
        }

        // One retry with a different, tighter prompt asking for a fix
        tracing::debug!(%root_id, "decomposition output unparseable, asking for a fix");
        run.parse_attempts = 2;
        let fix_prompt = format!(
            "The following was supposed to be JSON matching \
             {{\"subtasks\": [...]}} but does not parse. Respond with ONLY the corrected \
             JSON, nothing else.\n\n{raw}"
        );
        if let Ok(fixed) = self.call(fix_prompt, &workspace).await {
            if let Some(plan) = parse_plan(&fixed) {
                finish(&mut run, clock.epoch_ms());
                let plan = inline_skills(plan, skills);
                return DecompOutcome {
                    plan: Ok(plan),
                    run,
                };
            }
        }

        // Fallback: run the original request as a single task
        tracing::warn!(%root_id, "decomposition unparseable after retry, using single-task fallback");
        run.fallback = true;
        run.error_code = Some("parse".to_string());
        finish(&mut run, clock.epoch_ms());
        DecompOutcome {
            plan: Ok(DecompPlan {
                subtasks: vec![SubtaskSpec {
                    title: "Task".to_string(),
                    prompt: request.to_string(),
                    model: None,
                    skills: Vec::new(),
                    capability: None,
                    deps: Vec::new(),
                }],
            }),
            run,
        }
    }

    async fn call(
        &self,
        prompt: String,
        workspace: &std::path::Path,
    ) -> Result<String, ReasoningError> {
        let call = self
            .reasoning
            .one_shot(prompt, self.model, workspace.to_path_buf());
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ReasoningError::new(
                ReasoningErrorKind::Timeout,
                format!("decomposition timed out after {:?}", self.timeout),
            )),
        }
    }
}

/// Assemble the full decomposition prompt: contract, turn bound, skill
/// manifest, and the user's request.
fn build_prompt(request: &str, skills: &[SkillDescriptor]) -> String {
    let mut prompt = String::from(DECOMP_CONTRACT);
    prompt.push_str(&format!(
        " You have at most {DECOMP_TURN_CAP} turns to answer."
    ));
    if !skills.is_empty() {
        prompt.push_str("\n\nAvailable skills:\n");
        for skill in skills {
            prompt.push_str(&skill.manifest_line());
            prompt.push('\n');
        }
    }
    prompt.push_str("\n\nUser request:\n");
    prompt.push_str(request);
    prompt
}

/// Parse a raw response into a plan: accepts `{"subtasks": [...]}` or a
/// bare array, and validates dependency titles against siblings.
fn parse_plan(raw: &str) -> Option<DecompPlan> {
    let value = extract_json(raw)?;
    let subtasks_value = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(ref map) => map.get("subtasks")?.clone(),
        _ => return None,
    };
    let subtasks: Vec<SubtaskSpec> = serde_json::from_value(subtasks_value).ok()?;

    // Reject plans whose deps reference unknown titles
    let titles: std::collections::HashSet<&str> =
        subtasks.iter().map(|s| s.title.as_str()).collect();
    if titles.len() != subtasks.len() {
        return None;
    }
    for subtask in &subtasks {
        for dep in &subtask.deps {
            if !titles.contains(dep.as_str()) || dep == &subtask.title {
                return None;
            }
        }
    }
    Some(DecompPlan { subtasks })
}

/// Inline skill bodies into subtask prompts so skills reach the executing
/// agent regardless of filesystem injection.
fn inline_skills(mut plan: DecompPlan, skills: &[SkillDescriptor]) -> DecompPlan {
    for subtask in &mut plan.subtasks {
        if subtask.skills.is_empty() {
            continue;
        }
        let mut section = String::new();
        for name in &subtask.skills {
            if let Some(skill) = skills.iter().find(|s| &s.name == name) {
                if skill.body.is_empty() {
                    continue;
                }
                section.push_str(&format!("\n### {}\n{}\n", skill.name, skill.body));
            }
        }
        if !section.is_empty() {
            subtask
                .prompt
                .push_str(&format!("\n\n## Skill Instructions{section}"));
        }
    }
    plan
}

#[cfg(test)]
#[path = "decompose_tests.rs"]
mod tests;
