//! Derived dependency records.

use crate::{Filter, Include, Kv, OrderBy, ShapeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Last row of an ordered, bounded page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationBoundary {
    pub order_by: Vec<OrderBy>,
    /// Field values of the last included row.
    pub row: BTreeMap<String, Value>,
    /// Stable tiebreaker for rows equal under `order_by`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Kv>,
}

/// Grouping keys and the key tuples observed in the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByKv {
    pub keys: Vec<String>,
    pub values: Vec<BTreeMap<String, Value>>,
}

impl GroupByKv {
    /// Whether a fully-specified key tuple was observed.
    pub fn contains_tuple(&self, tuple: &BTreeMap<String, Value>) -> bool {
        self.values.iter().any(|observed| {
            self.keys
                .iter()
                .all(|k| observed.get(k).unwrap_or(&Value::Null) == tuple.get(k).unwrap_or(&Value::Null))
        })
    }
}

/// Everything a cached result depends on.
///
/// Created once per fingerprint and never mutated in place: a newer
/// extraction replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    pub shape_id: ShapeId,
    /// Primary model of the statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model name to identifiers known to be in the result. Never holds empty lists.
    pub records: BTreeMap<String, Vec<String>>,
    pub filters: Vec<Filter>,
    /// Include nodes carrying a relation kind, models resolved.
    pub includes: Vec<Include>,
    /// Resolved models of loaded (kind-less) includes.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub relations: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_row: Option<PaginationBoundary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupByKv>,
    /// The result aggregates rows (`group_by` or `having`), so one inserted
    /// row cannot be tested against `filters` on its own.
    #[serde(default, skip_serializing_if = "is_false")]
    pub aggregate: bool,
    /// The statement carries fields this version does not model, so no
    /// inserted row can be proven to stay outside the result.
    #[serde(default, skip_serializing_if = "is_false")]
    pub opaque: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Dependencies {
    /// Empty record for a shape.
    pub fn new(shape_id: ShapeId) -> Self {
        Self {
            shape_id,
            model: None,
            records: BTreeMap::new(),
            filters: Vec::new(),
            includes: Vec::new(),
            relations: BTreeSet::new(),
            last_row: None,
            group_by: None,
            aggregate: false,
            opaque: false,
        }
    }

    /// Every model a write must touch for any rule to apply.
    pub fn referenced_models(&self) -> BTreeSet<&str> {
        let mut models: BTreeSet<&str> = self.records.keys().map(String::as_str).collect();
        if let Some(model) = &self.model {
            models.insert(model.as_str());
        }
        models.extend(self.includes.iter().filter_map(Include::model));
        models.extend(self.relations.iter().map(String::as_str));
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute_shape_id, Query, RelationKind};
    use serde_json::json;

    #[test]
    fn test_referenced_models_covers_all_parts() {
        let mut deps = Dependencies::new(compute_shape_id("{}"));
        deps.model = Some("posts".into());
        deps.records.insert("users".into(), vec!["7".into()]);
        deps.includes
            .push(Include::filter_by(RelationKind::Some, Query::new("comments")));
        deps.relations.insert("tags".into());

        let models: Vec<&str> = deps.referenced_models().into_iter().collect();
        assert_eq!(models, vec!["comments", "posts", "tags", "users"]);
    }

    #[test]
    fn test_group_tuple_lookup() {
        let group = GroupByKv {
            keys: vec!["author_id".into(), "category".into()],
            values: vec![BTreeMap::from([
                ("author_id".to_string(), json!(1)),
                ("category".to_string(), json!("news")),
            ])],
        };
        let seen = BTreeMap::from([
            ("author_id".to_string(), json!(1)),
            ("category".to_string(), json!("news")),
        ]);
        let fresh = BTreeMap::from([
            ("author_id".to_string(), json!(2)),
            ("category".to_string(), json!("news")),
        ]);
        assert!(group.contains_tuple(&seen));
        assert!(!group.contains_tuple(&fresh));
    }

    #[test]
    fn test_wire_format_omits_optional_parts() {
        let deps = Dependencies::new(compute_shape_id("{}"));
        let value = serde_json::to_value(&deps).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("records"));
        assert!(obj.contains_key("filters"));
        assert!(obj.contains_key("includes"));
        assert!(!obj.contains_key("last_row"));
        assert!(!obj.contains_key("group_by"));
        assert!(!obj.contains_key("relations"));
        assert!(!obj.contains_key("aggregate"));
        assert!(!obj.contains_key("opaque"));
    }
}
