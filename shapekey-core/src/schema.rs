//! Application schema installed into an engine.
//!
//! The schema is optional. It tells the extractor which columns identify a
//! row and which relation names map to which target models.

use crate::{ConfigError, ShapeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier configuration of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdConfig {
    /// Identifier type hint (`string`, `number`, `uuid`, ...).
    pub kind: String,
    /// Identifier columns. More than one produces composite ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// Named relation from one model to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub target: String,
    /// Cardinality hint (`one`, `many`).
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    pub id: IdConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: IdConfig {
                kind: "string".to_string(),
                fields: None,
            },
            relations: Vec::new(),
        }
    }

    pub fn with_id_fields(mut self, fields: Vec<String>) -> Self {
        self.id.fields = Some(fields);
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            target: target.into(),
            kind: "many".to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSchema {
    pub version: u32,
    pub models: Vec<ModelSchema>,
}

impl AppSchema {
    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Identifier columns declared for `model`, if any.
    pub fn id_fields(&self, model: &str) -> Option<&[String]> {
        self.model(model)
            .and_then(|m| m.id.fields.as_deref())
            .filter(|f| !f.is_empty())
    }

    /// Resolve a relation name used under `parent` to its target model.
    pub fn resolve_relation(&self, parent: &str, name: &str) -> Option<&str> {
        self.model(parent)?
            .relations
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.target.as_str())
    }

    /// Validate the schema.
    ///
    /// Validates:
    /// - model names are non-empty and unique
    /// - declared id fields are non-empty names
    /// - relation names and targets are non-empty
    pub fn validate(&self) -> ShapeResult<()> {
        let mut seen = HashSet::new();
        for (i, model) in self.models.iter().enumerate() {
            if model.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("schema.models[{}].name", i),
                    value: String::new(),
                    reason: "model name must be non-empty".to_string(),
                }
                .into());
            }
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    field: "schema.models".to_string(),
                    value: model.name.clone(),
                }
                .into());
            }
            if let Some(fields) = &model.id.fields {
                if let Some(j) = fields.iter().position(String::is_empty) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("schema.models[{}].id.fields[{}]", i, j),
                        value: String::new(),
                        reason: "id field must be non-empty".to_string(),
                    }
                    .into());
                }
            }
            for (j, relation) in model.relations.iter().enumerate() {
                if relation.name.is_empty() || relation.target.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("schema.models[{}].relations[{}]", i, j),
                        value: format!("{}->{}", relation.name, relation.target),
                        reason: "relation name and target must be non-empty".to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}
