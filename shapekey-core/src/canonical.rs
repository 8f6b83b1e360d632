//! Canonical JSON encoding.
//!
//! Produces one byte string per logical value:
//! - object keys sorted ascending by code point (byte-wise on UTF-8)
//! - array order preserved
//! - no insignificant whitespace
//! - strings escaped minimally (`"`, `\`, and control characters only)
//! - numbers rendered with the ECMAScript shortest round-trip rules
//!
//! Diagnostic statement fields are removed by name before encoding. Any other
//! top-level field is kept, including ones this version does not model.

use crate::{compute_shape_id, EncodingError, ShapeId, ShapeResult, Statement, DIAGNOSTIC_FIELDS};
use serde_json::{Number, Value};
use std::fmt::Write;

/// Canonical form of an arbitrary JSON value.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Canonical form of a statement, diagnostic fields stripped.
pub fn canonicalize_statement(statement: &Statement) -> ShapeResult<String> {
    let mut value = serde_json::to_value(statement).map_err(|e| EncodingError::NotRepresentable {
        subject: "statement".to_string(),
        reason: e.to_string(),
    })?;
    strip_diagnostics(&mut value)?;
    Ok(canonicalize(&value))
}

/// Shape id of a statement.
pub fn statement_shape_id(statement: &Statement) -> ShapeResult<ShapeId> {
    Ok(compute_shape_id(&canonicalize_statement(statement)?))
}

/// Remove the fixed set of diagnostic fields from the top level.
pub fn strip_diagnostics(value: &mut Value) -> Result<(), EncodingError> {
    let obj = value.as_object_mut().ok_or_else(|| EncodingError::NotAnObject {
        subject: "statement".to_string(),
    })?;
    for field in DIAGNOSTIC_FIELDS {
        obj.remove(*field);
    }
    Ok(())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_number(out: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
        return;
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
        return;
    }
    match n.as_f64() {
        Some(f) if f.is_finite() => out.push_str(&format_float(f)),
        // serde_json cannot hold non-finite numbers; keep the encoding total anyway.
        _ => out.push_str("null"),
    }
}

/// Render a finite double the way ECMAScript `Number.prototype.toString` does.
pub fn format_float(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    let negative = f < 0.0;
    // Rust's Display yields the shortest digits that round-trip.
    let (digits, point) = decimal_digits(&format!("{}", f.abs()));
    let k = digits.len() as i32;
    let n = point;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        out.push_str(&digits[..n as usize]);
        out.push('.');
        out.push_str(&digits[n as usize..]);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(&digits);
    } else {
        let e = n - 1;
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if e < 0 { '-' } else { '+' });
        let _ = write!(out, "{}", e.abs());
    }
    out
}

/// Split a positive decimal rendering into significant digits and the
/// position of the decimal point relative to their start.
fn decimal_digits(repr: &str) -> (String, i32) {
    let (mantissa, exp) = match repr.split_once(|c: char| c == 'e' || c == 'E') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (repr, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let mut digits: String = int_part.chars().chain(frac_part.chars()).collect();
    let mut point = int_part.len() as i32 + exp;

    let leading = digits.len() - digits.trim_start_matches('0').len();
    digits.drain(..leading);
    point -= leading as i32;
    let trimmed = digits.trim_end_matches('0').len();
    digits.truncate(trimmed);

    if digits.is_empty() {
        return ("0".to_string(), 1);
    }
    (digits, point)
}
