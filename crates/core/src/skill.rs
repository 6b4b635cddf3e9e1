// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skill descriptors and capability policies.
//!
//! Skills are named instruction bundles inlined into subtask prompts;
//! capabilities are named resource policies (tool allowlist, model tier,
//! timeout, budget) applied to the session that runs a task.

use crate::task::ModelTier;
use serde::{Deserialize, Serialize};

/// A named skill: short description for the decomposition manifest plus
/// the full instruction body inlined into prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    /// Full instruction text (the skill file's contents)
    #[serde(default)]
    pub body: String,
}

impl SkillDescriptor {
    /// One manifest line for the decomposition system instruction.
    pub fn manifest_line(&self) -> String {
        format!("- {}: {}", self.name, self.description)
    }
}

/// A named resource policy bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityPolicy {
    pub id: String,
    /// Tools the session may use; empty means unrestricted
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_usd: Option<f64>,
}

impl CapabilityPolicy {
    /// Built-in policies upserted by the supervisor's manifest sync.
    pub fn builtin() -> Vec<CapabilityPolicy> {
        vec![
            CapabilityPolicy {
                id: "read-only".to_string(),
                allowed_tools: vec!["Read".to_string(), "Grep".to_string(), "Glob".to_string()],
                model: None,
                timeout_ms: None,
                budget_usd: None,
            },
            CapabilityPolicy {
                id: "research".to_string(),
                allowed_tools: vec![
                    "Read".to_string(),
                    "Grep".to_string(),
                    "Glob".to_string(),
                    "WebFetch".to_string(),
                    "WebSearch".to_string(),
                ],
                model: Some(ModelTier::Deep),
                timeout_ms: None,
                budget_usd: None,
            },
            CapabilityPolicy {
                id: "quick".to_string(),
                allowed_tools: Vec::new(),
                model: Some(ModelTier::Fast),
                timeout_ms: Some(120_000),
                budget_usd: Some(0.5),
            },
        ]
    }
}

#[cfg(test)]
#[path = "skill_tests.rs"]
mod tests;
