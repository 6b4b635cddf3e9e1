// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time-trigger storage. The supervisor fetches due triggers, fires them,
//! and writes back last/next run times.

use crate::{Store, StoreError};
use ovs_core::{ModelTier, TimeTrigger, TriggerId};
use rusqlite::{params, OptionalExtension, Row};

const SELECT: &str = "SELECT id, worker_name, title, prompt, schedule, skills, model, capability, \
     enabled, last_run_ms, next_run_ms FROM triggers";

fn trigger_from_row(row: &Row<'_>) -> rusqlite::Result<(TimeTrigger, String, Option<String>)> {
    let skills_raw: String = row.get("skills")?;
    let model_raw: Option<String> = row.get("model")?;
    let trigger = TimeTrigger {
        id: TriggerId::new(row.get::<_, String>("id")?),
        worker_name: row.get("worker_name")?,
        title: row.get("title")?,
        prompt: row.get("prompt")?,
        schedule: row.get("schedule")?,
        skills: Vec::new(),
        model: None,
        capability: row.get("capability")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        last_run_ms: row.get::<_, Option<i64>>("last_run_ms")?.map(|v| v as u64),
        next_run_ms: row.get::<_, Option<i64>>("next_run_ms")?.map(|v| v as u64),
    };
    Ok((trigger, skills_raw, model_raw))
}

fn finish(raw: (TimeTrigger, String, Option<String>)) -> Result<TimeTrigger, StoreError> {
    let (mut trigger, skills_raw, model_raw) = raw;
    trigger.skills = serde_json::from_str(&skills_raw).map_err(|e| StoreError::Corrupt {
        column: "skills",
        id: trigger.id.to_string(),
        message: e.to_string(),
    })?;
    trigger.model = match model_raw {
        None => None,
        Some(raw) => Some(
            ModelTier::parse(&raw).ok_or_else(|| StoreError::Corrupt {
                column: "model",
                id: trigger.id.to_string(),
                message: format!("unknown model tier {raw:?}"),
            })?,
        ),
    };
    Ok(trigger)
}

impl Store {
    /// Insert or replace a trigger by id.
    pub fn upsert_trigger(&self, trigger: &TimeTrigger) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO triggers (id, worker_name, title, prompt, schedule, skills, model, \
                 capability, enabled, last_run_ms, next_run_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT(id) DO UPDATE SET worker_name = ?2, title = ?3, prompt = ?4, \
                 schedule = ?5, skills = ?6, model = ?7, capability = ?8, enabled = ?9, \
                 last_run_ms = ?10, next_run_ms = ?11",
                params![
                    trigger.id.as_str(),
                    trigger.worker_name,
                    trigger.title,
                    trigger.prompt,
                    trigger.schedule,
                    serde_json::to_string(&trigger.skills)?,
                    trigger.model.map(|m| m.to_string()),
                    trigger.capability,
                    trigger.enabled as i64,
                    trigger.last_run_ms.map(|v| v as i64),
                    trigger.next_run_ms.map(|v| v as i64),
                ],
            )?;
            Ok(())
        })
    }

    pub fn trigger(&self, id: &TriggerId) -> Result<Option<TimeTrigger>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT} WHERE id = ?1"),
                params![id.as_str()],
                trigger_from_row,
            )
            .optional()?
            .map(finish)
            .transpose()
        })
    }

    /// Enabled triggers whose next run is due at or before `now_ms`.
    /// Triggers without a computed next run are included so a fresh
    /// trigger fires its first computation.
    pub fn due_triggers(&self, now_ms: u64) -> Result<Vec<TimeTrigger>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT} WHERE enabled = 1 \
                 AND (next_run_ms IS NULL OR next_run_ms <= ?1) ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![now_ms as i64], trigger_from_row)?;
            rows.map(|r| finish(r?)).collect()
        })
    }

    /// Record a firing: last run and the recomputed next run.
    pub fn set_trigger_runs(
        &self,
        id: &TriggerId,
        last_run_ms: Option<u64>,
        next_run_ms: Option<u64>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE triggers SET last_run_ms = ?1, next_run_ms = ?2 WHERE id = ?3",
                params![
                    last_run_ms.map(|v| v as i64),
                    next_run_ms.map(|v| v as i64),
                    id.as_str()
                ],
            )?;
            Ok(())
        })
    }

    pub fn set_trigger_enabled(&self, id: &TriggerId, enabled: bool) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE triggers SET enabled = ?1 WHERE id = ?2",
                params![enabled as i64, id.as_str()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "triggers_tests.rs"]
mod tests;
