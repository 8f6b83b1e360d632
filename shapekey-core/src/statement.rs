//! Request model: the typed, language-agnostic description of a read.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Top-level fields attached by calling clients for diagnostics only.
/// They are stripped before canonicalization.
pub const DIAGNOSTIC_FIELDS: &[&str] = &["orm_version", "sdk_version"];

/// Prefix of the open-ended operator escape hatch.
pub const CUSTOM_OP_PREFIX: &str = "custom:";

// ============================================================================
// OPERATORS
// ============================================================================

/// Operators from the fixed, enumerated set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KnownOp {
    // Equality
    Eq,
    Ne,
    In,
    NotIn,
    IsNull,
    // Ordering
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    // Text
    Contains,
    StartsWith,
    EndsWith,
    Like,
    Ilike,
    Regex,
    // Array / JSON
    Has,
    HasSome,
    HasEvery,
    JsonContains,
    // Length
    LenEq,
    LenGt,
    LenLt,
    // Existence
    Exists,
}

impl KnownOp {
    pub const ALL: [KnownOp; 24] = [
        KnownOp::Eq,
        KnownOp::Ne,
        KnownOp::In,
        KnownOp::NotIn,
        KnownOp::IsNull,
        KnownOp::Gt,
        KnownOp::Gte,
        KnownOp::Lt,
        KnownOp::Lte,
        KnownOp::Between,
        KnownOp::Contains,
        KnownOp::StartsWith,
        KnownOp::EndsWith,
        KnownOp::Like,
        KnownOp::Ilike,
        KnownOp::Regex,
        KnownOp::Has,
        KnownOp::HasSome,
        KnownOp::HasEvery,
        KnownOp::JsonContains,
        KnownOp::LenEq,
        KnownOp::LenGt,
        KnownOp::LenLt,
        KnownOp::Exists,
    ];

    /// Wire name of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownOp::Eq => "eq",
            KnownOp::Ne => "ne",
            KnownOp::In => "in",
            KnownOp::NotIn => "notIn",
            KnownOp::IsNull => "isNull",
            KnownOp::Gt => "gt",
            KnownOp::Gte => "gte",
            KnownOp::Lt => "lt",
            KnownOp::Lte => "lte",
            KnownOp::Between => "between",
            KnownOp::Contains => "contains",
            KnownOp::StartsWith => "startsWith",
            KnownOp::EndsWith => "endsWith",
            KnownOp::Like => "like",
            KnownOp::Ilike => "ilike",
            KnownOp::Regex => "regex",
            KnownOp::Has => "has",
            KnownOp::HasSome => "hasSome",
            KnownOp::HasEvery => "hasEvery",
            KnownOp::JsonContains => "jsonContains",
            KnownOp::LenEq => "lenEq",
            KnownOp::LenGt => "lenGt",
            KnownOp::LenLt => "lenLt",
            KnownOp::Exists => "exists",
        }
    }

    /// Look up an operator by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == name)
    }
}

/// Condition operator: a fixed operator or a `custom:*` extension.
///
/// Custom operators keep only the suffix after `custom:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Known(KnownOp),
    Custom(String),
}

impl Operator {
    /// Parse a wire operator name.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        if let Some(op) = KnownOp::from_name(name) {
            return Ok(Operator::Known(op));
        }
        match name.strip_prefix(CUSTOM_OP_PREFIX) {
            Some(suffix) => Ok(Operator::Custom(suffix.to_string())),
            None => Err(ValidationError::InvalidOperator {
                path: "op".to_string(),
                op: name.to_string(),
            }),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Operator::Custom(_))
    }

    pub fn known(&self) -> Option<KnownOp> {
        match self {
            Operator::Known(op) => Some(*op),
            Operator::Custom(_) => None,
        }
    }
}

impl From<KnownOp> for Operator {
    fn from(op: KnownOp) -> Self {
        Operator::Known(op)
    }
}

impl TryFrom<String> for Operator {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Operator::parse(&value)
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Known(op) => f.write_str(op.as_str()),
            Operator::Custom(suffix) => write!(f, "{}{}", CUSTOM_OP_PREFIX, suffix),
        }
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Leaf predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    /// Path into a nested or structured column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_path: Vec<String>,
    pub op: Operator,
    /// Absent and `null` encode identically (the field is omitted).
    #[serde(default, skip_serializing_if = "value_is_absent")]
    pub value: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn value_is_absent(value: &Option<Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

impl Condition {
    pub fn new(field: impl Into<String>, op: impl Into<Operator>, value: Value) -> Self {
        Self {
            field: field.into(),
            field_path: Vec::new(),
            op: op.into(),
            value: Some(value),
            extra: BTreeMap::new(),
        }
    }

    /// Create an equality condition.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, KnownOp::Eq, value)
    }
}

/// Boolean tree over conditions.
///
/// All four parts may be populated at once; the node then means
/// `conditions AND and[..] AND (or[..]) AND NOT not`. A node with nothing
/// populated matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    /// Combinators this version does not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Filter {
    /// Filter with a flat list of conditions.
    pub fn conditions(conditions: Vec<Condition>) -> Self {
        Self {
            conditions: Some(conditions),
            ..Default::default()
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self {
            and: Some(filters),
            ..Default::default()
        }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self {
            or: Some(filters),
            ..Default::default()
        }
    }

    pub fn negate(filter: Filter) -> Self {
        Self {
            not: Some(Box::new(filter)),
            ..Default::default()
        }
    }

    /// True when no part of the node is populated (matches everything).
    pub fn is_match_all(&self) -> bool {
        self.and.is_none()
            && self.or.is_none()
            && self.not.is_none()
            && self.conditions.is_none()
            && self.extra.is_empty()
    }

    /// Whether any node or condition in the tree carries fields this
    /// version does not model.
    pub fn has_unknown_fields(&self) -> bool {
        !self.extra.is_empty()
            || self.walk_conditions().iter().any(|c| !c.extra.is_empty())
            || self.and.iter().chain(self.or.iter()).flatten().any(Filter::has_unknown_fields)
            || self.not.as_ref().is_some_and(|n| n.has_unknown_fields())
    }

    /// Every condition in the tree, depth-first.
    pub fn walk_conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        if let Some(conditions) = &self.conditions {
            out.extend(conditions.iter());
        }
        for child in self.and.iter().flatten() {
            child.collect_conditions(out);
        }
        for child in self.or.iter().flatten() {
            child.collect_conditions(out);
        }
        if let Some(not) = &self.not {
            not.collect_conditions(out);
        }
    }

    /// Whether any condition in the tree uses a `custom:*` operator.
    pub fn has_custom_operator(&self) -> bool {
        self.walk_conditions().iter().any(|c| c.op.is_custom())
    }

    /// Names of all fields referenced by conditions in the tree.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .walk_conditions()
            .into_iter()
            .map(|c| c.field.as_str())
            .collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }
}

// ============================================================================
// ORDERING, QUERY, INCLUDES, PAGINATION
// ============================================================================

/// Ordering on a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls_first: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: None,
            nulls_first: None,
            case_sensitive: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            descending: Some(true),
            ..Self::asc(field)
        }
    }

    pub fn is_descending(&self) -> bool {
        self.descending.unwrap_or(false)
    }

    /// Null placement; defaults to nulls last ascending, nulls first descending.
    pub fn nulls_sort_first(&self) -> bool {
        self.nulls_first.unwrap_or(self.is_descending())
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive.unwrap_or(true)
    }
}

/// A read against one logical collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Target model (or relation name inside an include).
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<OrderBy>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<Vec<String>>,
    /// Fields this version does not model. Kept so they reach the canonical form.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Query {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ordering specification, if any entries are present.
    pub fn ordering(&self) -> Option<&[OrderBy]> {
        self.order_by.as_deref().filter(|o| !o.is_empty())
    }
}

/// Relation-existence filter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// At least one related row satisfies the query filter.
    Some,
    /// Every related row satisfies it (vacuously true when none exist).
    Every,
    /// No related row satisfies it (vacuously true when none exist).
    None,
}

/// Nested relation node.
///
/// Without `kind` the node loads related rows. With `kind` it filters the
/// parent rows by the relation instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Include {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RelationKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<Include>,
    /// Fields this version does not model. Kept so they reach the canonical form.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Include {
    /// Include that loads a relation.
    pub fn load(query: Query) -> Self {
        Self {
            query: Some(query),
            kind: None,
            includes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Include that filters the parent by a relation.
    pub fn filter_by(kind: RelationKind, query: Query) -> Self {
        Self {
            query: Some(query),
            kind: Some(kind),
            includes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_includes(mut self, includes: Vec<Include>) -> Self {
        self.includes = includes;
        self
    }

    pub fn model(&self) -> Option<&str> {
        self.query.as_ref().map(|q| q.model.as_str())
    }
}

/// Cursor pagination. Forward (`first`/`after`) and backward
/// (`last`/`before`) parameters are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Pagination {
    pub fn is_forward(&self) -> bool {
        self.first.is_some() || self.after.is_some()
    }

    pub fn is_backward(&self) -> bool {
        self.last.is_some() || self.before.is_some()
    }

    /// Page size, whichever direction is populated.
    pub fn page_size(&self) -> Option<i64> {
        self.first.or(self.last)
    }
}

// ============================================================================
// STATEMENT
// ============================================================================

/// Normalized description of a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<Include>,
    /// Diagnostic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orm_version: Option<String>,
    /// Diagnostic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,
    /// Fields this version does not model. Kept so they reach the canonical form.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Statement {
    pub fn new(query: Query) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_group_by(mut self, keys: Vec<String>, having: Option<Filter>) -> Self {
        self.group_by = Some(keys);
        self.having = having;
        self
    }

    pub fn with_includes(mut self, includes: Vec<Include>) -> Self {
        self.includes = includes;
        self
    }

    /// Whether the statement or its query carries fields this version does
    /// not model. Their effect on which rows match is unknown.
    pub fn has_unknown_fields(&self) -> bool {
        !self.extra.is_empty()
            || self.query.as_ref().is_some_and(|q| {
                !q.extra.is_empty() || q.filter.as_ref().is_some_and(Filter::has_unknown_fields)
            })
            || self.having.as_ref().is_some_and(Filter::has_unknown_fields)
    }

    /// Primary model, when a query is present.
    pub fn model(&self) -> Option<&str> {
        self.query.as_ref().map(|q| q.model.as_str())
    }

    /// Grouping keys, if the statement groups.
    pub fn grouping(&self) -> Option<&[String]> {
        self.group_by.as_deref().filter(|g| !g.is_empty())
    }

    /// Page size from pagination or the query limit.
    pub fn page_bound(&self) -> Option<i64> {
        self.pagination
            .as_ref()
            .and_then(Pagination::page_size)
            .or_else(|| self.query.as_ref().and_then(|q| q.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_parses_known_and_custom() {
        assert_eq!(Operator::parse("eq").unwrap(), Operator::Known(KnownOp::Eq));
        assert_eq!(
            Operator::parse("jsonContains").unwrap(),
            Operator::Known(KnownOp::JsonContains)
        );
        assert_eq!(
            Operator::parse("custom:near").unwrap(),
            Operator::Custom("near".to_string())
        );
        assert!(Operator::parse("approx").is_err());
        assert!(Operator::parse("EQ").is_err());
    }

    #[test]
    fn test_operator_wire_names_round_trip() {
        for op in KnownOp::ALL {
            assert_eq!(KnownOp::from_name(op.as_str()), Some(op));
        }
        assert_eq!(Operator::Custom("geo".into()).to_string(), "custom:geo");
    }

    #[test]
    fn test_unknown_operator_rejected_on_deserialize() {
        let result: Result<Condition, _> =
            serde_json::from_value(json!({"field": "a", "op": "fuzzy", "value": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_condition_omits_absent_value_and_path() {
        let cond = Condition {
            field: "deleted_at".into(),
            field_path: vec![],
            op: KnownOp::IsNull.into(),
            value: None,
            extra: BTreeMap::new(),
        };
        let value = serde_json::to_value(&cond).unwrap();
        assert_eq!(value, json!({"field": "deleted_at", "op": "isNull"}));
    }

    #[test]
    fn test_filter_walks_nested_conditions() {
        let filter = Filter {
            conditions: Some(vec![Condition::eq("status", json!("published"))]),
            or: Some(vec![
                Filter::conditions(vec![Condition::new("views", KnownOp::Gt, json!(1000))]),
                Filter::negate(Filter::conditions(vec![Condition::new(
                    "tags",
                    Operator::Custom("fts".into()),
                    json!("rust"),
                )])),
            ]),
            ..Default::default()
        };
        let fields: Vec<&str> = filter.walk_conditions().iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "views", "tags"]);
        assert!(filter.has_custom_operator());
        assert_eq!(filter.referenced_fields(), vec!["status", "tags", "views"]);
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(Filter::default().is_match_all());
        assert!(!Filter::conditions(vec![]).is_match_all());
    }

    #[test]
    fn test_order_by_defaults() {
        let asc = OrderBy::asc("created_at");
        assert!(!asc.is_descending());
        assert!(!asc.nulls_sort_first());
        assert!(asc.is_case_sensitive());

        let desc = OrderBy::desc("created_at");
        assert!(desc.nulls_sort_first());
    }

    #[test]
    fn test_statement_keeps_unknown_fields() {
        let stmt: Statement = serde_json::from_value(json!({
            "query": {"model": "posts"},
            "sdk_version": "1.2.3",
            "hint": {"index": "by_date"}
        }))
        .unwrap();
        assert_eq!(stmt.sdk_version.as_deref(), Some("1.2.3"));
        assert_eq!(stmt.extra.get("hint"), Some(&json!({"index": "by_date"})));
        assert!(stmt.has_unknown_fields());
    }

    #[test]
    fn test_nested_unknown_fields_round_trip() {
        let wire = json!({
            "query": {
                "model": "posts",
                "search": "rust",
                "where": {
                    "conditions": [{"field": "title", "op": "contains", "value": "db", "mode": "insensitive"}],
                    "xor": [{"conditions": []}]
                },
                "order_by": [{"field": "id", "collation": "C"}]
            },
            "pagination": {"first": 3, "hint": "fast"},
            "includes": [{"query": {"model": "tags", "take": 2}, "alias": "t"}]
        });
        let stmt: Statement = serde_json::from_value(wire.clone()).unwrap();
        let query = stmt.query.as_ref().unwrap();
        assert_eq!(query.extra.get("search"), Some(&json!("rust")));
        let filter = query.filter.as_ref().unwrap();
        assert!(filter.extra.contains_key("xor"));
        assert!(!filter.is_match_all());
        assert!(filter.has_unknown_fields());
        assert_eq!(query.order_by.as_ref().unwrap()[0].extra.get("collation"), Some(&json!("C")));
        assert!(stmt.has_unknown_fields());

        assert_eq!(serde_json::to_value(&stmt).unwrap(), wire);
    }

    #[test]
    fn test_known_fields_only_have_no_unknowns() {
        let stmt = Statement::new(Query::new("posts").with_filter(Filter::conditions(vec![
            Condition::eq("published", json!(true)),
        ])));
        assert!(!stmt.has_unknown_fields());
    }

    #[test]
    fn test_relation_kind_wire_names() {
        let inc: Include = serde_json::from_value(json!({
            "query": {"model": "comments"},
            "kind": "every"
        }))
        .unwrap();
        assert_eq!(inc.kind, Some(RelationKind::Every));
        assert!(serde_json::from_value::<Include>(json!({"kind": "most"})).is_err());
    }

    #[test]
    fn test_page_bound_prefers_pagination() {
        let stmt = Statement::new(Query::new("posts").with_limit(50)).with_pagination(Pagination {
            first: Some(10),
            ..Default::default()
        });
        assert_eq!(stmt.page_bound(), Some(10));
        assert_eq!(Statement::new(Query::new("posts").with_limit(5)).page_bound(), Some(5));
    }
}
