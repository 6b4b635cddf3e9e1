// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skill descriptors, capability policies, and connector configs.
//!
//! All three are manifest-style tables: upserted idempotently by the
//! supervisor's periodic sync and read by workers at startup.

use crate::{Store, StoreError};
use ovs_core::{CapabilityPolicy, SkillDescriptor};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Transport a connector speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorTransport {
    Pipe,
    Http,
}

impl ConnectorTransport {
    pub fn parse(s: &str) -> Option<ConnectorTransport> {
        match s {
            "pipe" => Some(ConnectorTransport::Pipe),
            "http" => Some(ConnectorTransport::Http),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectorTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorTransport::Pipe => write!(f, "pipe"),
            ConnectorTransport::Http => write!(f, "http"),
        }
    }
}

/// A plug-in connector registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,
    /// Role scope this connector applies to; None means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub transport: ConnectorTransport,
    /// Opaque configuration blob, passed through untouched
    pub config: serde_json::Value,
}

impl ConnectorConfig {
    /// Built-in connector registrations. Stored rows with the same name
    /// override these.
    pub fn builtin() -> Vec<ConnectorConfig> {
        vec![
            ConnectorConfig {
                name: "filesystem".to_string(),
                scope: None,
                transport: ConnectorTransport::Pipe,
                config: serde_json::json!({}),
            },
            ConnectorConfig {
                name: "fetch".to_string(),
                scope: Some("worker".to_string()),
                transport: ConnectorTransport::Http,
                config: serde_json::json!({}),
            },
        ]
    }
}

impl Store {
    pub fn upsert_skill(&self, skill: &SkillDescriptor) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO skills (name, description, body) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(name) DO UPDATE SET description = ?2, body = ?3",
                params![skill.name, skill.description, skill.body],
            )?;
            Ok(())
        })
    }

    pub fn skill(&self, name: &str) -> Result<Option<SkillDescriptor>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, description, body FROM skills WHERE name = ?1",
                params![name],
                |row| {
                    Ok(SkillDescriptor {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        body: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub fn skills(&self) -> Result<Vec<SkillDescriptor>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, description, body FROM skills ORDER BY name")?;
            let rows = stmt.query_map([], |row| {
                Ok(SkillDescriptor {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    body: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<_>>().map_err(StoreError::from)
        })
    }

    pub fn upsert_capability(&self, policy: &CapabilityPolicy) -> Result<(), StoreError> {
        let payload = serde_json::to_string(policy)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO capabilities (id, policy) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET policy = ?2",
                params![policy.id, payload],
            )?;
            Ok(())
        })
    }

    pub fn capability(&self, id: &str) -> Result<Option<CapabilityPolicy>, StoreError> {
        let payload: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT policy FROM capabilities WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    pub fn upsert_connector(&self, connector: &ConnectorConfig) -> Result<(), StoreError> {
        let config = serde_json::to_string(&connector.config)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO connectors (name, scope, transport, config) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(name) DO UPDATE SET scope = ?2, transport = ?3, config = ?4",
                params![
                    connector.name,
                    connector.scope,
                    connector.transport.to_string(),
                    config
                ],
            )?;
            Ok(())
        })
    }

    /// Built-in connectors overlaid with stored registrations: a stored
    /// row with a built-in's name replaces it.
    pub fn connectors_merged(&self) -> Result<Vec<ConnectorConfig>, StoreError> {
        let stored = self.connectors()?;
        let mut merged = ConnectorConfig::builtin();
        for connector in stored {
            match merged.iter_mut().find(|c| c.name == connector.name) {
                Some(existing) => *existing = connector,
                None => merged.push(connector),
            }
        }
        merged.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(merged)
    }

    pub fn connectors(&self) -> Result<Vec<ConnectorConfig>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, scope, transport, config FROM connectors ORDER BY name")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            rows.map(|r| {
                let (name, scope, transport_raw, config_raw) = r?;
                let transport =
                    ConnectorTransport::parse(&transport_raw).ok_or_else(|| StoreError::Corrupt {
                        column: "transport",
                        id: name.clone(),
                        message: format!("unknown transport {transport_raw:?}"),
                    })?;
                Ok(ConnectorConfig {
                    name,
                    scope,
                    transport,
                    config: serde_json::from_str(&config_raw)?,
                })
            })
            .collect()
        })
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
