//! Write model: what a transaction touched.

use crate::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Write action of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Field/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kv {
    pub field: String,
    pub value: Value,
}

impl Kv {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// One per-model write.
///
/// Action invariants: `insert` needs `sets` and no `where`; `update` needs
/// both; `delete` needs `where` and no `sets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub model: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sets: Vec<Kv>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl Change {
    pub fn insert(model: impl Into<String>, sets: Vec<Kv>) -> Self {
        Self {
            model: model.into(),
            action: Action::Insert,
            sets,
            filter: None,
        }
    }

    pub fn update(model: impl Into<String>, sets: Vec<Kv>, filter: Filter) -> Self {
        Self {
            model: model.into(),
            action: Action::Update,
            sets,
            filter: Some(filter),
        }
    }

    pub fn delete(model: impl Into<String>, filter: Filter) -> Self {
        Self {
            model: model.into(),
            action: Action::Delete,
            sets: Vec::new(),
            filter: Some(filter),
        }
    }

    /// Value assigned to `field`, last assignment wins.
    pub fn assigned(&self, field: &str) -> Option<&Value> {
        self.sets.iter().rev().find(|kv| kv.field == field).map(|kv| &kv.value)
    }

    /// Whether `sets` assigns any of `fields`.
    pub fn touches_any<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        self.sets
            .iter()
            .any(|kv| fields.iter().any(|f| f.as_ref() == kv.field))
    }
}

/// Everything one write transaction touched, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    pub changes: Vec<Change>,
}

impl Mutation {
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            tx_id: None,
            changes,
        }
    }

    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }

    /// Models touched by the mutation, deduplicated in first-seen order.
    pub fn models(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for change in &self.changes {
            if !seen.contains(&change.model.as_str()) {
                seen.push(change.model.as_str());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Condition;
    use serde_json::json;

    #[test]
    fn test_change_wire_format() {
        let change = Change::update(
            "posts",
            vec![Kv::new("published", json!(false))],
            Filter::conditions(vec![Condition::eq("id", json!("1"))]),
        );
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "posts",
                "action": "update",
                "sets": [{"field": "published", "value": false}],
                "where": {"conditions": [{"field": "id", "op": "eq", "value": "1"}]}
            })
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<Change, _> =
            serde_json::from_value(json!({"model": "posts", "action": "upsert"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_assigned_last_wins() {
        let change = Change::insert(
            "posts",
            vec![Kv::new("views", json!(1)), Kv::new("views", json!(2))],
        );
        assert_eq!(change.assigned("views"), Some(&json!(2)));
        assert_eq!(change.assigned("title"), None);
        assert!(change.touches_any(&["title", "views"]));
        assert!(!change.touches_any(&["title"]));
    }

    #[test]
    fn test_mutation_models_dedup() {
        let mutation = Mutation::new(vec![
            Change::insert("posts", vec![Kv::new("id", json!(1))]),
            Change::insert("users", vec![Kv::new("id", json!(1))]),
            Change::delete("posts", Filter::default()),
        ]);
        assert_eq!(mutation.models(), vec!["posts", "users"]);
    }
}
