// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field schedule expressions for time triggers.
//!
//! Fields are minute, hour, day-of-month, month, day-of-week, interpreted
//! in UTC. Each field accepts `*`, `*/N`, a single value, or a comma list.
//! Day-of-month and day-of-week follow the standard disjunction: when both
//! are restricted, a timestamp matches if either does.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a schedule expression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid field {field:?}: {message}")]
    Field { field: String, message: String },
    #[error("value {value} out of range {min}..={max}")]
    Range { value: u32, min: u32, max: u32 },
}

/// One parsed schedule field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Field {
    /// `*`
    Any,
    /// `*/N`, stepping from the field minimum (so `*/10` on day-of-month
    /// fires on 1, 11, 21, 31)
    Step { n: u32, base: u32 },
    /// `V` or `V,V,...`
    Values(Vec<u32>),
}

impl Field {
    fn parse(s: &str, min: u32, max: u32) -> Result<Field, ScheduleError> {
        if s == "*" {
            return Ok(Field::Any);
        }
        if let Some(step) = s.strip_prefix("*/") {
            let n: u32 = step.parse().map_err(|_| ScheduleError::Field {
                field: s.to_string(),
                message: "step is not a number".to_string(),
            })?;
            if n == 0 {
                return Err(ScheduleError::Field {
                    field: s.to_string(),
                    message: "step must be positive".to_string(),
                });
            }
            return Ok(Field::Step { n, base: min });
        }
        let mut values = Vec::new();
        for part in s.split(',') {
            let v: u32 = part.parse().map_err(|_| ScheduleError::Field {
                field: s.to_string(),
                message: format!("{part:?} is not a number"),
            })?;
            if v < min || v > max {
                return Err(ScheduleError::Range { value: v, min, max });
            }
            values.push(v);
        }
        Ok(Field::Values(values))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Step { n, base } => value.saturating_sub(*base) % n == 0,
            Field::Values(values) => values.contains(&value),
        }
    }

    fn is_restricted(&self) -> bool {
        !matches!(self, Field::Any)
    }
}

/// A parsed five-field schedule expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    dom: Field,
    month: Field,
    dow: Field,
    /// Original expression, kept for display and persistence
    expr: String,
}

impl CronSchedule {
    /// Parse an expression like `*/15 9 * * 1-5`-style five-field specs
    /// (no ranges; wildcard, step, value, or comma list per field).
    pub fn parse(expr: &str) -> Result<CronSchedule, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }
        Ok(CronSchedule {
            minute: Field::parse(fields[0], 0, 59)?,
            hour: Field::parse(fields[1], 0, 23)?,
            dom: Field::parse(fields[2], 1, 31)?,
            month: Field::parse(fields[3], 1, 12)?,
            dow: Field::parse(fields[4], 0, 6)?,
            expr: expr.to_string(),
        })
    }

    /// The original expression text.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Whether the given UTC timestamp's minute matches this schedule.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !self.minute.matches(at.minute())
            || !self.hour.matches(at.hour())
            || !self.month.matches(at.month())
        {
            return false;
        }

        let dom_ok = self.dom.matches(at.day());
        // Day-of-week 0 = Sunday
        let dow_ok = self.dow.matches(at.weekday().num_days_from_sunday());

        // Standard rule: both restricted → either may match
        if self.dom.is_restricted() && self.dow.is_restricted() {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        }
    }

    /// The next matching minute strictly after `after`.
    ///
    /// Returns `None` if no minute matches within 366 days (an impossible
    /// expression such as `0 0 31 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = truncate_to_minute(after) + Duration::minutes(1);
        let horizon = after + Duration::days(366);
        while candidate <= horizon {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at - Duration::seconds(i64::from(at.second())) - Duration::nanoseconds(i64::from(at.nanosecond()))
}

/// Idempotency key for one firing: `cron:<trigger-id>:<iso-minute>`.
///
/// At-most-one root task per trigger per minute, regardless of how many
/// supervisor scans observe the due trigger.
pub fn firing_key(trigger_id: &str, at: DateTime<Utc>) -> String {
    format!("cron:{}:{}", trigger_id, at.format("%Y-%m-%dT%H:%MZ"))
}

crate::define_id! {
    /// Unique identifier for a time trigger.
    pub struct TriggerId;
}

/// A persisted time trigger managed by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeTrigger {
    pub id: TriggerId,
    /// Target worker by name; created on first firing if absent
    pub worker_name: String,
    pub title: String,
    pub prompt: String,
    /// Five-field schedule expression, UTC
    pub schedule: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<crate::task::ModelTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_ms: Option<u64>,
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
