//! Three-valued filter evaluation over the values a change assigns.
//!
//! `Some(true)`/`Some(false)` are definite answers. `None` means the answer
//! cannot be decided from the assigned values (missing field, null,
//! incomparable types, collation-dependent text, operator semantics owned by
//! the database).

use serde_json::{Number, Value};
use shapekey_core::{Change, Condition, Filter, KnownOp, Operator};
use std::cmp::Ordering;

/// Evaluate `filter` against the row described by `change.sets`.
pub fn eval_filter(filter: &Filter, change: &Change) -> Option<bool> {
    if !filter.extra.is_empty() {
        return None;
    }
    let mut parts: Vec<Option<bool>> = Vec::new();

    if let Some(conditions) = &filter.conditions {
        parts.extend(conditions.iter().map(|c| eval_condition(c, change)));
    }
    if let Some(children) = &filter.and {
        parts.extend(children.iter().map(|f| eval_filter(f, change)));
    }
    if let Some(children) = &filter.or {
        parts.push(if children.is_empty() {
            None
        } else {
            any(children.iter().map(|f| eval_filter(f, change)))
        });
    }
    if let Some(not) = &filter.not {
        parts.push(eval_filter(not, change).map(|b| !b));
    }

    all(parts)
}

fn all(values: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for value in values {
        match value {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown {
        None
    } else {
        Some(true)
    }
}

fn any(values: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for value in values {
        match value {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }
    if unknown {
        None
    } else {
        Some(false)
    }
}

fn eval_condition(condition: &Condition, change: &Change) -> Option<bool> {
    let op = match &condition.op {
        Operator::Known(op) => *op,
        Operator::Custom(_) => return None,
    };
    if !condition.extra.is_empty() {
        return None;
    }

    let mut actual = change.assigned(&condition.field)?;
    for segment in &condition.field_path {
        actual = actual.as_object()?.get(segment)?;
    }
    let target = condition.value.as_ref().unwrap_or(&Value::Null);

    if op == KnownOp::IsNull {
        return match target {
            Value::Null | Value::Bool(true) => Some(actual.is_null()),
            Value::Bool(false) => Some(!actual.is_null()),
            _ => None,
        };
    }
    if actual.is_null() {
        return None;
    }

    match op {
        KnownOp::Eq => values_equal(actual, target),
        KnownOp::Ne => values_equal(actual, target).map(|eq| !eq),
        KnownOp::In => any(target.as_array()?.iter().map(|t| values_equal(actual, t))),
        KnownOp::NotIn => {
            any(target.as_array()?.iter().map(|t| values_equal(actual, t))).map(|found| !found)
        }
        KnownOp::Gt => compare_values(actual, target).map(|o| o == Ordering::Greater),
        KnownOp::Gte => compare_values(actual, target).map(|o| o != Ordering::Less),
        KnownOp::Lt => compare_values(actual, target).map(|o| o == Ordering::Less),
        KnownOp::Lte => compare_values(actual, target).map(|o| o != Ordering::Greater),
        KnownOp::Between => match target.as_array()?.as_slice() {
            [low, high] => all([
                compare_values(actual, low).map(|o| o != Ordering::Less),
                compare_values(actual, high).map(|o| o != Ordering::Greater),
            ]),
            _ => None,
        },
        KnownOp::Contains => matched(actual.as_str()?.contains(target.as_str()?)),
        KnownOp::StartsWith => matched(actual.as_str()?.starts_with(target.as_str()?)),
        KnownOp::EndsWith => matched(actual.as_str()?.ends_with(target.as_str()?)),
        KnownOp::Like => matched(like(actual.as_str()?, target.as_str()?, true)),
        KnownOp::Ilike => matched(like(actual.as_str()?, target.as_str()?, false)),
        KnownOp::Has => any(actual.as_array()?.iter().map(|v| values_equal(v, target))),
        KnownOp::HasSome => {
            let items = actual.as_array()?;
            any(target
                .as_array()?
                .iter()
                .map(|t| any(items.iter().map(|v| values_equal(v, t)))))
        }
        KnownOp::HasEvery => {
            let items = actual.as_array()?;
            all(target
                .as_array()?
                .iter()
                .map(|t| any(items.iter().map(|v| values_equal(v, t)))))
        }
        KnownOp::LenEq => length_cmp(actual, target).map(|o| o == Ordering::Equal),
        KnownOp::LenGt => length_cmp(actual, target).map(|o| o == Ordering::Greater),
        KnownOp::LenLt => length_cmp(actual, target).map(|o| o == Ordering::Less),
        // Regex dialects and JSON containment differ between databases;
        // existence depends on rows this core never sees.
        KnownOp::Regex | KnownOp::JsonContains | KnownOp::Exists | KnownOp::IsNull => None,
    }
}

/// A byte-level text match holds under every collation; a miss may not.
fn matched(hit: bool) -> Option<bool> {
    hit.then_some(true)
}

/// Equality as the database would decide it.
///
/// Numbers compare by exact value (`1 == 1.0`). Identical strings are equal;
/// different strings may still be equal under a case- or accent-insensitive
/// collation, or as two spellings of one decimal or instant, so that case is
/// `None`. Mixed kinds are `None` because databases coerce differently.
pub fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y).map(|o| o == Ordering::Equal),
        (Value::String(x), Value::String(y)) => matched(x == y),
        (Value::Bool(x), Value::Bool(y)) => Some(x == y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => matched(a == b),
        _ => None,
    }
}

/// Order two values the way any database would. `None` when that order is
/// not fixed.
///
/// Strings never order here: decimals and timestamps travel as strings, and
/// text order depends on the column collation.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Largest magnitude below which every integer is exact as an `f64`.
const F64_EXACT_INT: u128 = 1 << 53;

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (exact_int(x), exact_int(y)) {
        return Some(a.cmp(&b));
    }
    lossless_f64(x)?.partial_cmp(&lossless_f64(y)?)
}

fn exact_int(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn lossless_f64(n: &Number) -> Option<f64> {
    match exact_int(n) {
        Some(i) if i.unsigned_abs() <= F64_EXACT_INT => Some(i as f64),
        Some(_) => None,
        None => n.as_f64(),
    }
}

fn length_cmp(actual: &Value, target: &Value) -> Option<Ordering> {
    let len = match actual {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        _ => return None,
    };
    Some((len as u64).cmp(&target.as_u64()?))
}

/// SQL `LIKE`: `%` matches any run, `_` one character, `\` escapes.
fn like(text: &str, pattern: &str, case_sensitive: bool) -> bool {
    let fold = |s: &str| {
        if case_sensitive {
            s.chars().collect::<Vec<_>>()
        } else {
            s.to_lowercase().chars().collect()
        }
    };
    let text = fold(text);
    let pattern = fold(pattern);

    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.into_iter();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::AnyRun,
            '_' => LikeToken::AnyOne,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            c => LikeToken::Literal(c),
        });
    }

    // reachable[j]: pattern prefix of length j matches the text consumed so far
    let mut reachable = vec![false; tokens.len() + 1];
    reachable[0] = true;
    for j in 0..tokens.len() {
        if tokens[j] == LikeToken::AnyRun && reachable[j] {
            reachable[j + 1] = true;
        }
    }
    for &c in &text {
        let mut next = vec![false; tokens.len() + 1];
        for j in 0..tokens.len() {
            if !reachable[j] {
                continue;
            }
            match tokens[j] {
                LikeToken::AnyRun => {
                    next[j] = true;
                    next[j + 1] = true;
                }
                LikeToken::AnyOne => next[j + 1] = true,
                LikeToken::Literal(l) if l == c => next[j + 1] = true,
                LikeToken::Literal(_) => {}
            }
        }
        for j in 0..tokens.len() {
            if tokens[j] == LikeToken::AnyRun && next[j] {
                next[j + 1] = true;
            }
        }
        reachable = next;
    }
    reachable[tokens.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    AnyRun,
    AnyOne,
    Literal(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shapekey_core::Kv;

    fn row(sets: Vec<(&str, Value)>) -> Change {
        Change::insert("posts", sets.into_iter().map(|(f, v)| Kv::new(f, v)).collect())
    }

    fn cond(field: &str, op: KnownOp, value: Value) -> Filter {
        Filter::conditions(vec![Condition::new(field, op, value)])
    }

    #[test]
    fn test_equality_and_membership() {
        let r = row(vec![("status", json!("draft")), ("views", json!(10))]);
        assert_eq!(eval_filter(&cond("status", KnownOp::Eq, json!("draft")), &r), Some(true));
        assert_eq!(eval_filter(&cond("status", KnownOp::Ne, json!("draft")), &r), Some(false));
        assert_eq!(eval_filter(&cond("views", KnownOp::Eq, json!(10.0)), &r), Some(true));
        assert_eq!(
            eval_filter(&cond("status", KnownOp::In, json!(["live", "draft"])), &r),
            Some(true)
        );
        assert_eq!(eval_filter(&cond("status", KnownOp::In, json!("draft")), &r), None);
        assert_eq!(eval_filter(&cond("views", KnownOp::NotIn, json!([1, 2])), &r), Some(true));
    }

    #[test]
    fn test_distinct_strings_are_never_proven_unequal() {
        let r = row(vec![("status", json!("Draft"))]);
        // A case-insensitive collation treats these as equal.
        assert_eq!(eval_filter(&cond("status", KnownOp::Eq, json!("draft")), &r), None);
        assert_eq!(eval_filter(&cond("status", KnownOp::Ne, json!("draft")), &r), None);
        assert_eq!(eval_filter(&cond("status", KnownOp::NotIn, json!(["live"])), &r), None);
        assert_eq!(eval_filter(&cond("status", KnownOp::Ne, json!("Draft")), &r), Some(false));
    }

    #[test]
    fn test_string_ordering_is_unknown() {
        let price = row(vec![("price", json!("10.00"))]);
        assert_eq!(eval_filter(&cond("price", KnownOp::Gt, json!("9.99")), &price), None);
        assert_eq!(eval_filter(&cond("price", KnownOp::Lte, json!("9.99")), &price), None);

        let at = row(vec![("at", json!("2024-01-01T08:00:00Z"))]);
        assert_eq!(
            eval_filter(&cond("at", KnownOp::Gt, json!("2024-01-01T09:30:00+02:00")), &at),
            None
        );
        assert_eq!(
            eval_filter(&cond("at", KnownOp::Between, json!(["2024-01-01", "2024-01-02"])), &at),
            None
        );
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let r = row(vec![("seq", json!(9_007_199_254_740_993_i64))]);
        assert_eq!(eval_filter(&cond("seq", KnownOp::Ne, json!(9_007_199_254_740_992_i64)), &r), Some(true));
        assert_eq!(eval_filter(&cond("seq", KnownOp::Gt, json!(9_007_199_254_740_992_i64)), &r), Some(true));
        assert_eq!(eval_filter(&cond("seq", KnownOp::Eq, json!(u64::MAX)), &r), Some(false));
        // Beyond 2^53 an f64 cannot tell neighbouring integers apart.
        assert_eq!(eval_filter(&cond("seq", KnownOp::Eq, json!(9.007_199_254_740_992e15)), &r), None);
        assert_eq!(eval_filter(&cond("seq", KnownOp::Gt, json!(1.5)), &r), None);

        let small = row(vec![("n", json!(3))]);
        assert_eq!(eval_filter(&cond("n", KnownOp::Gt, json!(2.5)), &small), Some(true));
        assert_eq!(eval_filter(&cond("n", KnownOp::Eq, json!(3.0)), &small), Some(true));
    }

    #[test]
    fn test_unknown_fields_make_evaluation_unknown() {
        let r = row(vec![("title", json!("db"))]);
        let mut condition = Condition::eq("title", json!("db"));
        condition.extra.insert("mode".into(), json!("insensitive"));
        assert_eq!(eval_filter(&Filter::conditions(vec![condition]), &r), None);

        let mut filter = cond("title", KnownOp::Eq, json!(1));
        filter.extra.insert("xor".into(), json!([]));
        assert_eq!(eval_filter(&filter, &r), None);
    }

    #[test]
    fn test_ordering_operators() {
        let r = row(vec![("views", json!(10))]);
        assert_eq!(eval_filter(&cond("views", KnownOp::Gt, json!(5)), &r), Some(true));
        assert_eq!(eval_filter(&cond("views", KnownOp::Gte, json!(10)), &r), Some(true));
        assert_eq!(eval_filter(&cond("views", KnownOp::Lt, json!(10)), &r), Some(false));
        assert_eq!(eval_filter(&cond("views", KnownOp::Between, json!([1, 9])), &r), Some(false));
        assert_eq!(eval_filter(&cond("views", KnownOp::Gt, json!("5")), &r), None);
    }

    #[test]
    fn test_missing_and_null_are_unknown() {
        let r = row(vec![("title", Value::Null)]);
        assert_eq!(eval_filter(&cond("views", KnownOp::Gt, json!(5)), &r), None);
        assert_eq!(eval_filter(&cond("title", KnownOp::Eq, json!("x")), &r), None);
        assert_eq!(eval_filter(&cond("title", KnownOp::IsNull, json!(true)), &r), Some(true));
        assert_eq!(eval_filter(&cond("title", KnownOp::IsNull, json!(false)), &r), Some(false));
    }

    #[test]
    fn test_kleene_combinators() {
        let r = row(vec![("a", json!(1))]);
        let yes = cond("a", KnownOp::Eq, json!(1));
        let no = cond("a", KnownOp::Eq, json!(2));
        let unknown = cond("b", KnownOp::Eq, json!(1));

        assert_eq!(eval_filter(&Filter::and(vec![no.clone(), unknown.clone()]), &r), Some(false));
        assert_eq!(eval_filter(&Filter::and(vec![yes.clone(), unknown.clone()]), &r), None);
        assert_eq!(eval_filter(&Filter::or(vec![yes.clone(), unknown.clone()]), &r), Some(true));
        assert_eq!(eval_filter(&Filter::or(vec![no.clone(), unknown.clone()]), &r), None);
        assert_eq!(eval_filter(&Filter::negate(no), &r), Some(true));
        assert_eq!(eval_filter(&Filter::negate(unknown), &r), None);
        assert_eq!(eval_filter(&Filter::default(), &r), Some(true));
        assert_eq!(eval_filter(&Filter::or(vec![]), &r), None);
    }

    #[test]
    fn test_mixed_node_means_conjunction() {
        let r = row(vec![("a", json!(1)), ("b", json!(2))]);
        let filter = Filter {
            conditions: Some(vec![Condition::eq("a", json!(1))]),
            or: Some(vec![cond("b", KnownOp::Eq, json!(3))]),
            ..Default::default()
        };
        assert_eq!(eval_filter(&filter, &r), Some(false));
    }

    #[test]
    fn test_text_and_array_operators() {
        let r = row(vec![("title", json!("Hello Rust")), ("tags", json!(["a", "b"]))]);
        assert_eq!(eval_filter(&cond("title", KnownOp::StartsWith, json!("Hello")), &r), Some(true));
        // A byte-level miss may still match under the column collation.
        assert_eq!(eval_filter(&cond("title", KnownOp::Like, json!("%rust")), &r), None);
        assert_eq!(eval_filter(&cond("title", KnownOp::Ilike, json!("%rust")), &r), Some(true));
        assert_eq!(eval_filter(&cond("title", KnownOp::Like, json!("H_llo%")), &r), Some(true));
        assert_eq!(eval_filter(&cond("tags", KnownOp::Has, json!("b")), &r), Some(true));
        assert_eq!(eval_filter(&cond("tags", KnownOp::HasEvery, json!(["a", "c"])), &r), None);
        assert_eq!(eval_filter(&cond("tags", KnownOp::HasEvery, json!(["a", "b"])), &r), Some(true));
        assert_eq!(eval_filter(&cond("tags", KnownOp::HasSome, json!(["c", "a"])), &r), Some(true));
        assert_eq!(eval_filter(&cond("tags", KnownOp::LenGt, json!(1)), &r), Some(true));
        assert_eq!(eval_filter(&cond("title", KnownOp::Regex, json!("^H")), &r), None);
    }

    #[test]
    fn test_field_path_descends_into_objects() {
        let r = row(vec![("meta", json!({"lang": "en"}))]);
        let mut condition = Condition::eq("meta", json!("en"));
        condition.field_path = vec!["lang".into()];
        let filter = Filter::conditions(vec![condition]);
        assert_eq!(eval_filter(&filter, &r), Some(true));
    }

    #[test]
    fn test_like_escapes() {
        assert!(like("100%", "100\\%", true));
        assert!(!like("1000", "100\\%", true));
        assert!(like("", "%", true));
        assert!(!like("", "_", true));
    }
}
