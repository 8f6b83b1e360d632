//! Scalar helpers: identifier rendering and composite keys.
//!
//! Scalars are plain JSON values. Dates travel as ISO-8601 strings and
//! arbitrary-precision numbers as strings, so no implementation has to agree
//! on float precision for them.

use crate::canonical::canonicalize;
use serde_json::Value;

/// Separator between `field=value` pairs of a composite identifier.
pub const COMPOSITE_SEPARATOR: &str = "|";

/// Render a scalar as an identifier string.
///
/// Strings are taken verbatim; every other value uses its canonical JSON form.
pub fn scalar_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonicalize(other),
    }
}

/// Build a composite identifier from `(field, value)` pairs.
///
/// Pairs are sorted by field name so every implementation agrees on one
/// string per multi-column key: `a=1|b=x`.
pub fn composite_id<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut pairs: Vec<(&str, &Value)> = parts.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    pairs
        .into_iter()
        .map(|(field, value)| format!("{}={}", field, scalar_to_id(value)))
        .collect::<Vec<_>>()
        .join(COMPOSITE_SEPARATOR)
}

/// Identifier of a result row given its identifier fields.
///
/// A single field yields the bare value; several fields yield a composite id.
/// Returns `None` when any identifier field is missing or null.
pub fn row_identifier<S: AsRef<str>>(row: &Value, id_fields: &[S]) -> Option<String> {
    let obj = row.as_object()?;
    let mut parts = Vec::with_capacity(id_fields.len());
    for field in id_fields {
        let field = field.as_ref();
        match obj.get(field) {
            Some(Value::Null) | None => return None,
            Some(value) => parts.push((field, value)),
        }
    }
    match parts.as_slice() {
        [] => None,
        [(_, value)] => Some(scalar_to_id(value)),
        _ => Some(composite_id(parts)),
    }
}
