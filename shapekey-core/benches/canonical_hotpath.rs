use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use shapekey_core::{
    canonicalize_statement, statement_shape_id, Condition, Filter, Include, KnownOp, OrderBy,
    Pagination, Query, RelationKind, Statement,
};
use std::hint::black_box;

fn feed_statement() -> Statement {
    let filter = Filter {
        conditions: Some(vec![
            Condition::eq("published", json!(true)),
            Condition::new("score", KnownOp::Gte, json!(0.75)),
        ]),
        or: Some(vec![
            Filter::conditions(vec![Condition::new("tags", KnownOp::HasSome, json!(["rust", "db"]))]),
            Filter::conditions(vec![Condition::new("title", KnownOp::Ilike, json!("%cache%"))]),
        ]),
        ..Default::default()
    };
    let mut stmt = Statement::new(
        Query::new("posts")
            .with_filter(filter)
            .with_order_by(vec![OrderBy::desc("created_at"), OrderBy::asc("id")]),
    )
    .with_pagination(Pagination {
        first: Some(25),
        after: Some("eyJpZCI6NDJ9".into()),
        ..Default::default()
    })
    .with_includes(vec![
        Include::load(Query::new("author")),
        Include::filter_by(
            RelationKind::Some,
            Query::new("comments").with_filter(Filter::conditions(vec![Condition::eq(
                "flagged",
                json!(false),
            )])),
        ),
    ]);
    stmt.sdk_version = Some("2.4.1".into());
    stmt
}

fn bench_canonicalize(c: &mut Criterion) {
    let stmt = feed_statement();

    c.bench_function("canonical/statement", |b| {
        b.iter(|| {
            let canonical = canonicalize_statement(black_box(&stmt)).expect("canonicalize");
            black_box(canonical.len());
        });
    });

    c.bench_function("canonical/shape_id", |b| {
        b.iter(|| {
            let id = statement_shape_id(black_box(&stmt)).expect("shape id");
            black_box(id);
        });
    });
}

criterion_group!(benches, bench_canonicalize);
criterion_main!(benches);
