//! Cross-implementation conformance: every shipped vector must reproduce its
//! canonical string and shape id exactly.

use proptest::prelude::*;
use shapekey_core::{canonicalize, canonicalize_statement, compute_shape_id, ShapeId, Statement};
use shapekey_engine::ShapeEngine;
use shapekey_test_utils::{generators, vectors};

#[test]
fn vectors_reproduce_canonical_form_and_shape_id() {
    let set = vectors::statement_vectors().expect("parse vectors");
    let engine = ShapeEngine::default();

    for vector in &set.vectors {
        let statement: Statement = serde_json::from_value(vector.statement.clone())
            .unwrap_or_else(|e| panic!("{}: statement does not parse: {}", vector.name, e));

        let canonical = canonicalize_statement(&statement).expect("canonicalize");
        assert_eq!(canonical, vector.canonical, "canonical form of {}", vector.name);

        let id = engine.shape_id(&statement).expect("shape id");
        assert_eq!(id.as_str(), vector.shape_id, "shape id of {}", vector.name);
        assert_eq!(compute_shape_id(&vector.canonical), id);
    }
}

#[test]
fn canonical_vectors_are_fixed_points() {
    let set = vectors::statement_vectors().expect("parse vectors");
    for vector in &set.vectors {
        let reparsed: serde_json::Value =
            serde_json::from_str(&vector.canonical).expect("canonical form is JSON");
        assert_eq!(canonicalize(&reparsed), vector.canonical, "{}", vector.name);
    }
}

#[test]
fn diagnostic_only_differences_share_a_shape_id() {
    let set = vectors::statement_vectors().expect("parse vectors");
    let id_of = |name: &str| {
        set.vectors
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.shape_id.clone())
            .unwrap_or_else(|| panic!("missing vector {}", name))
    };
    assert_eq!(id_of("published_posts"), id_of("diagnostics_stripped"));
}

#[test]
fn nested_unknown_fields_reach_the_fingerprint() {
    let set = vectors::statement_vectors().expect("parse vectors");
    let vector = set
        .vectors
        .iter()
        .find(|v| v.name == "nested_unknown_fields")
        .expect("nested_unknown_fields vector");
    let statement: Statement = serde_json::from_value(vector.statement.clone()).expect("parse");
    assert!(statement.has_unknown_fields());

    let mut stripped = vector.statement.clone();
    let query = stripped["query"].as_object_mut().expect("query object");
    query.remove("search");
    query["where"]["conditions"][0]
        .as_object_mut()
        .expect("condition object")
        .remove("mode");
    let stripped: Statement = serde_json::from_value(stripped).expect("parse");

    let engine = ShapeEngine::default();
    assert_ne!(engine.shape_id(&statement).unwrap(), engine.shape_id(&stripped).unwrap());
    assert_eq!(
        canonicalize_statement(&stripped).unwrap(),
        set.vectors[0].canonical,
        "without the unknown fields it is the published_posts shape"
    );
}

#[test]
fn malformed_shape_ids_are_rejected() {
    let good = compute_shape_id("{}");
    assert!(ShapeId::parse(good.as_str()).is_ok());

    let upper = good.as_str().to_uppercase().replacen("S_", "s_", 1);
    let cases = [
        good.digest_hex().to_string(),
        format!("x_{}", good.digest_hex()),
        upper,
        good.as_str()[..good.as_str().len() - 1].to_string(),
        format!("{}0", good.as_str()),
    ];
    for case in cases {
        assert!(ShapeId::parse(&case).is_err(), "{} accepted", case);
        assert!(serde_json::from_value::<ShapeId>(serde_json::json!(case)).is_err());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Canonicalization is deterministic for every valid statement.
    #[test]
    fn prop_statement_fingerprint_is_deterministic(stmt in generators::arb_statement()) {
        let engine = ShapeEngine::default();
        let first = engine.shape_id(&stmt).unwrap();
        let second = engine.shape_id(&stmt.clone()).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Diagnostic fields never affect the fingerprint.
    #[test]
    fn prop_diagnostics_do_not_change_fingerprint(
        stmt in generators::arb_statement(),
        (orm, sdk) in generators::arb_diagnostics(),
    ) {
        let mut tagged = stmt.clone();
        tagged.orm_version = orm;
        tagged.sdk_version = sdk;
        prop_assert_eq!(
            canonicalize_statement(&stmt).unwrap(),
            canonicalize_statement(&tagged).unwrap()
        );
    }

    /// An unknown field anywhere under `query` changes the fingerprint.
    #[test]
    fn prop_nested_unknown_field_changes_fingerprint(
        stmt in generators::arb_statement(),
        key in "x_[a-z]{1,6}",
        value in generators::arb_scalar(),
    ) {
        let mut extended = stmt.clone();
        let query = extended.query.as_mut().unwrap();
        prop_assume!(!query.extra.contains_key(&key));
        query.extra.insert(key, value);
        prop_assert_ne!(
            canonicalize_statement(&stmt).unwrap(),
            canonicalize_statement(&extended).unwrap()
        );
    }

    /// A statement survives a wire round trip with the same fingerprint.
    #[test]
    fn prop_wire_round_trip_keeps_fingerprint(stmt in generators::arb_statement()) {
        let wire = serde_json::to_string(&stmt).unwrap();
        let parsed: Statement = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(
            canonicalize_statement(&stmt).unwrap(),
            canonicalize_statement(&parsed).unwrap()
        );
    }
}
