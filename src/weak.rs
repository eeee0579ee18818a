//! Weak decoding: the small set of coercions the loader accepts when
//! pulling typed fields out of raw JSON nodes.
//!
//! Errors are bare causes ("expected a string, got array") so callers can
//! prefix them with the locus of the failing entity.

use std::time::Duration;

use crate::parser::Json;

pub type WeakResult<T> = Result<T, String>;

pub fn to_string(node: &Json) -> WeakResult<String> {
    match node {
        Json::Str(s) => Ok(s.clone()),
        Json::Num(n) => Ok(format_number(*n)),
        Json::Bool(true) => Ok("1".to_string()),
        Json::Bool(false) => Ok("0".to_string()),
        Json::Null => Ok(String::new()),
        other => Err(format!("expected a string, got {}", other.kind_desc())),
    }
}

pub fn to_bool(node: &Json) -> WeakResult<bool> {
    match node {
        Json::Bool(b) => Ok(*b),
        Json::Num(n) => Ok(*n != 0.0),
        Json::Str(s) => match s.as_str() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(format!("cannot parse '{s}' as a boolean")),
        },
        Json::Null => Ok(false),
        other => Err(format!("expected a boolean, got {}", other.kind_desc())),
    }
}

/// A single scalar coerces to a one-element list; null to an empty one.
pub fn to_string_vec(node: &Json) -> WeakResult<Vec<String>> {
    match node {
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                to_string(&item.val).map_err(|cause| format!("element {}: {cause}", i + 1))
            })
            .collect(),
        Json::Null => Ok(Vec::new()),
        Json::Str(_) | Json::Num(_) | Json::Bool(_) => Ok(vec![to_string(node)?]),
        other => Err(format!(
            "expected a list of strings, got {}",
            other.kind_desc()
        )),
    }
}

/// Strings use the humantime grammar ("1s", "1m 30s"). Bare numbers are a
/// whole number of nanoseconds, matching the 64-bit-nanosecond decode of
/// existing template corpora.
pub fn to_duration(node: &Json) -> WeakResult<Duration> {
    match node {
        Json::Str(s) => humantime::parse_duration(s)
            .map_err(|e| format!("cannot parse '{s}' as a duration: {e}")),
        Json::Num(n) => {
            if *n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
                Err(format!(
                    "cannot use {n} as a duration: expected a non-negative whole number of nanoseconds"
                ))
            } else {
                Ok(Duration::from_nanos(*n as u64))
            }
        }
        other => Err(format!("expected a duration, got {}", other.kind_desc())),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9_007_199_254_740_992.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
