//! shapekey Test Utilities
//!
//! Shared test infrastructure for the shapekey workspace:
//! - Proptest generators for statements, filters and mutations
//! - Fixtures for the common blog-style scenarios
//! - Custom assertions for validation paths
//! - The cross-implementation conformance vectors

pub use shapekey_core::{
    canonicalize, canonicalize_statement, compute_shape_id, statement_shape_id, Action, AppSchema,
    Change, Condition, Filter, Include, KnownOp, Kv, ModelSchema, Mutation, Operator, OrderBy,
    Pagination, Query, RelationKind, ShapeError, ShapeId, ShapeResult, Statement, ValidationError,
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies. Every generated statement and mutation is valid.

    use super::*;
    use proptest::prelude::*;

    /// Generate a field or model name.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,10}"
    }

    /// Generate a scalar: bool, integer, float, string or null.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            (-1_000_000i64..1_000_000).prop_map(Value::from),
            (-1.0e6f64..1.0e6).prop_map(Value::from),
            "\\PC{0,12}".prop_map(Value::String),
            Just(Value::Null),
        ]
    }

    /// Generate an arbitrary JSON value, nesting up to three levels.
    pub fn arb_json() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map(arb_name(), inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Generate fields a newer client might send that no model struct names.
    pub fn arb_extra() -> impl Strategy<Value = BTreeMap<String, Value>> {
        prop::collection::btree_map("x_[a-z]{1,6}", arb_scalar(), 0..2)
    }

    pub fn arb_known_op() -> impl Strategy<Value = KnownOp> {
        prop::sample::select(KnownOp::ALL.to_vec())
    }

    /// Generate an operator; roughly one in five is `custom:*`.
    pub fn arb_operator() -> impl Strategy<Value = Operator> {
        prop_oneof![
            4 => arb_known_op().prop_map(Operator::Known),
            1 => "[a-z]{1,8}".prop_map(Operator::Custom),
        ]
    }

    pub fn arb_condition() -> impl Strategy<Value = Condition> {
        (
            arb_name(),
            prop::collection::vec(arb_name(), 0..2),
            arb_operator(),
            prop::option::of(arb_scalar()),
        )
            .prop_map(|(field, field_path, op, value)| Condition {
                field,
                field_path,
                op,
                value,
                extra: BTreeMap::new(),
            })
    }

    /// Generate a filter tree mixing conditions and combinators.
    pub fn arb_filter() -> impl Strategy<Value = Filter> {
        let leaf = prop::collection::vec(arb_condition(), 1..4).prop_map(Filter::conditions);
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::and),
                prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::or),
                inner.clone().prop_map(Filter::negate),
                (
                    prop::collection::vec(arb_condition(), 1..3),
                    prop::collection::vec(inner, 1..3),
                )
                    .prop_map(|(conditions, and)| Filter {
                        conditions: Some(conditions),
                        and: Some(and),
                        ..Default::default()
                    }),
            ]
        })
    }

    pub fn arb_order_by() -> impl Strategy<Value = OrderBy> {
        (
            arb_name(),
            prop::option::of(any::<bool>()),
            prop::option::of(any::<bool>()),
            prop::option::of(any::<bool>()),
        )
            .prop_map(|(field, descending, nulls_first, case_sensitive)| OrderBy {
                field,
                descending,
                nulls_first,
                case_sensitive,
                extra: BTreeMap::new(),
            })
    }

    pub fn arb_query() -> impl Strategy<Value = Query> {
        (
            arb_name(),
            prop::option::of(prop::collection::vec(arb_name(), 1..4)),
            prop::option::of(arb_filter()),
            prop::option::of(prop::collection::vec(arb_order_by(), 1..3)),
            prop::option::of(0i64..1000),
            prop::option::of(0i64..1000),
            arb_extra(),
        )
            .prop_map(|(model, fields, filter, order_by, limit, offset, extra)| Query {
                model,
                fields,
                filter,
                order_by,
                limit,
                offset,
                distinct: None,
                extra,
            })
    }

    /// Generate pagination that never mixes directions.
    pub fn arb_pagination() -> impl Strategy<Value = Pagination> {
        prop_oneof![
            (prop::option::of(1i64..100), prop::option::of("[A-Za-z0-9]{4,12}")).prop_map(
                |(first, after)| Pagination {
                    first,
                    after,
                    ..Default::default()
                }
            ),
            (prop::option::of(1i64..100), prop::option::of("[A-Za-z0-9]{4,12}")).prop_map(
                |(last, before)| Pagination {
                    last,
                    before,
                    ..Default::default()
                }
            ),
        ]
    }

    pub fn arb_relation_kind() -> impl Strategy<Value = RelationKind> {
        prop_oneof![
            Just(RelationKind::Some),
            Just(RelationKind::Every),
            Just(RelationKind::None),
        ]
    }

    /// Generate a nested include tree.
    pub fn arb_include() -> impl Strategy<Value = Include> {
        let leaf = (arb_query(), prop::option::of(arb_relation_kind())).prop_map(|(query, kind)| {
            Include {
                query: Some(query),
                kind,
                includes: Vec::new(),
                extra: BTreeMap::new(),
            }
        });
        leaf.prop_recursive(2, 8, 2, |inner| {
            (
                arb_query(),
                prop::option::of(arb_relation_kind()),
                prop::collection::vec(inner, 1..3),
            )
                .prop_map(|(query, kind, includes)| Include {
                    query: Some(query),
                    kind,
                    includes,
                    extra: BTreeMap::new(),
                })
        })
    }

    /// Generate a valid statement.
    pub fn arb_statement() -> impl Strategy<Value = Statement> {
        (
            arb_query(),
            prop::option::of(arb_pagination()),
            prop::option::of(prop::collection::vec(arb_name(), 1..3)),
            prop::collection::vec(arb_include(), 0..3),
        )
            .prop_map(|(query, pagination, group_by, includes)| Statement {
                query: Some(query),
                pagination,
                group_by,
                includes,
                ..Default::default()
            })
    }

    /// Generate a diagnostic field pair.
    pub fn arb_diagnostics() -> impl Strategy<Value = (Option<String>, Option<String>)> {
        (
            prop::option::of("[0-9]\\.[0-9]{1,2}\\.[0-9]{1,2}"),
            prop::option::of("[0-9]\\.[0-9]{1,2}\\.[0-9]{1,2}"),
        )
    }

    pub fn arb_kv() -> impl Strategy<Value = Kv> {
        (arb_name(), arb_scalar()).prop_map(|(field, value)| Kv { field, value })
    }

    /// Generate a change that satisfies its action's invariants.
    pub fn arb_change(model: impl Strategy<Value = String>) -> impl Strategy<Value = Change> {
        (
            model,
            prop_oneof![Just(Action::Insert), Just(Action::Update), Just(Action::Delete)],
            prop::collection::vec(arb_kv(), 1..4),
            arb_filter(),
        )
            .prop_map(|(model, action, sets, filter)| match action {
                Action::Insert => Change::insert(model, sets),
                Action::Update => Change::update(model, sets, filter),
                Action::Delete => Change::delete(model, filter),
            })
    }

    /// Generate a valid mutation touching models drawn from `arb_name`.
    pub fn arb_mutation() -> impl Strategy<Value = Mutation> {
        (
            prop::option::of("tx_[0-9a-f]{8}"),
            prop::collection::vec(arb_change(arb_name()), 1..4),
        )
            .prop_map(|(tx_id, changes)| Mutation { tx_id, changes })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built statements, mutations and schemas.

    use super::*;

    /// Rows returned for a statement, keyed by model name.
    pub type Hint = BTreeMap<String, Vec<Value>>;

    pub fn where_id(id: Value) -> Filter {
        Filter::conditions(vec![Condition::eq("id", id)])
    }

    /// `posts where published = true`.
    pub fn published_posts() -> Statement {
        Statement::new(Query::new("posts").with_filter(Filter::conditions(vec![Condition::eq(
            "published",
            json!(true),
        )])))
    }

    /// A hint with a single post row.
    pub fn single_post_hint(id: &str) -> Hint {
        Hint::from([("posts".to_string(), vec![json!({"id": id, "published": true})])])
    }

    /// Set `published = false` on one post.
    pub fn unpublish_post(id: &str) -> Mutation {
        Mutation::new(vec![Change::update(
            "posts",
            vec![Kv::new("published", json!(false))],
            where_id(json!(id)),
        )])
    }

    /// Plain posts ordered by score descending, first page of `size`.
    pub fn top_posts(size: i64) -> Statement {
        Statement::new(Query::new("posts").with_order_by(vec![OrderBy::desc("score")]))
            .with_pagination(Pagination {
                first: Some(size),
                ..Default::default()
            })
    }

    /// Rows for `top_posts` in page order.
    pub fn top_posts_hint(scores: &[i64]) -> Hint {
        let rows = scores
            .iter()
            .enumerate()
            .map(|(i, score)| json!({"id": format!("p{}", i + 1), "score": score}))
            .collect();
        Hint::from([("posts".to_string(), rows)])
    }

    /// Posts counted per category.
    pub fn posts_by_category() -> Statement {
        Statement::new(Query::new("posts")).with_group_by(vec!["category".into()], None)
    }

    /// Users, their loaded posts, filtered by having no flagged comments.
    pub fn users_without_flags() -> Statement {
        Statement::new(Query::new("users")).with_includes(vec![
            Include::load(Query::new("posts")),
            Include::filter_by(
                RelationKind::None,
                Query::new("comments").with_filter(Filter::conditions(vec![Condition::eq(
                    "flagged",
                    json!(true),
                )])),
            ),
        ])
    }

    /// Blog schema with users, posts and comments.
    pub fn blog_schema() -> AppSchema {
        AppSchema {
            version: 1,
            models: vec![
                ModelSchema::new("users")
                    .with_relation("posts", "posts")
                    .with_relation("comments", "comments"),
                ModelSchema::new("posts")
                    .with_relation("author", "users")
                    .with_relation("comments", "comments"),
                ModelSchema::new("comments").with_relation("post", "posts"),
            ],
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for shapekey-specific validation.

    use super::*;

    /// Assert that a result is a validation error at `path`.
    #[track_caller]
    pub fn assert_validation_error_at<T: std::fmt::Debug>(result: &ShapeResult<T>, path: &str) {
        match result {
            Err(ShapeError::Validation(err)) => {
                assert_eq!(err.path(), path, "Wrong path in validation error: {}", err);
            }
            other => panic!("Expected validation error at {}, got: {:?}", path, other),
        }
    }

    /// Assert that a shape id has the wire format.
    #[track_caller]
    pub fn assert_shape_id_format(id: &ShapeId) {
        assert!(
            ShapeId::parse(id.as_str()).is_ok(),
            "Shape id {} is not s_ + 64 lowercase hex",
            id
        );
    }
}

// ============================================================================
// CONFORMANCE VECTORS
// ============================================================================

pub mod vectors {
    //! Shared (statement, canonical string, shape id) triples.

    use super::*;

    /// Raw vector file shipped with this crate.
    pub const STATEMENT_VECTORS: &str = include_str!("../vectors/statements.json");

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ConformanceVector {
        pub name: String,
        /// Statement as received on the wire, diagnostics included.
        pub statement: Value,
        pub canonical: String,
        pub shape_id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct VectorSet {
        pub version: u32,
        pub hash: String,
        pub vectors: Vec<ConformanceVector>,
    }

    /// Parse the shipped statement vectors.
    pub fn statement_vectors() -> serde_json::Result<VectorSet> {
        serde_json::from_str(STATEMENT_VECTORS)
    }
}
