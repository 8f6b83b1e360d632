//! Configuration types

use crate::{ConfigError, ShapeResult};
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identifier columns for models the schema does not describe.
    pub default_id_fields: Vec<String>,
    /// Let inserts that provably miss every stored `where` filter skip
    /// filter and relation invalidation.
    pub precise_inserts: bool,
    /// Ids kept per model per record. Extra ids are truncated; the model key
    /// stays, so writes to the model still invalidate.
    pub max_tracked_ids: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_id_fields: vec!["id".to_string()],
            precise_inserts: true,
            max_tracked_ids: 10_000,
        }
    }
}

impl EngineConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `SHAPEKEY_DEFAULT_ID_FIELDS`: comma-separated id columns (default: `id`)
    /// - `SHAPEKEY_PRECISE_INSERTS`: `true`/`false` (default: true)
    /// - `SHAPEKEY_MAX_TRACKED_IDS`: ids kept per model (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_id_fields: std::env::var("SHAPEKEY_DEFAULT_ID_FIELDS")
                .ok()
                .map(|s| parse_field_list(&s))
                .filter(|fields| !fields.is_empty())
                .unwrap_or(defaults.default_id_fields),
            precise_inserts: std::env::var("SHAPEKEY_PRECISE_INSERTS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.precise_inserts),
            max_tracked_ids: std::env::var("SHAPEKEY_MAX_TRACKED_IDS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_tracked_ids),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - default_id_fields is non-empty and holds no empty names
    /// - max_tracked_ids > 0
    pub fn validate(&self) -> ShapeResult<()> {
        if self.default_id_fields.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_id_fields".to_string(),
                value: "[]".to_string(),
                reason: "at least one id field is required".to_string(),
            }
            .into());
        }

        if let Some(i) = self.default_id_fields.iter().position(|f| f.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: format!("default_id_fields[{}]", i),
                value: String::new(),
                reason: "id field names must be non-empty".to_string(),
            }
            .into());
        }

        if self.max_tracked_ids == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tracked_ids".to_string(),
                value: "0".to_string(),
                reason: "max_tracked_ids must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

fn parse_field_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
