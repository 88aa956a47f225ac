//! Outcome-to-value extraction with typed fallbacks.
//!
//! Upstream payloads are untrusted: every field is optional, and any missing
//! or mistyped field degrades to its fallback instead of failing the run.

use serde_json::Value;

use crate::types::{FetchOutcome, Section};

/// Returns `decode(payload)` for a non-null success, `fallback` otherwise.
/// A decoder that finds nothing usable also yields `fallback`.
pub fn extract<T, F>(outcome: &FetchOutcome, fallback: T, decode: F) -> T
where
    F: FnOnce(&Value) -> Option<T>,
{
    match outcome.payload() {
        Some(payload) => decode(payload).unwrap_or(fallback),
        None => fallback,
    }
}

/// Walks `path` through nested objects; any missing key yields `None`.
pub fn pointer<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// `data.meta.total` of a count endpoint.
pub fn decode_total(payload: &Value) -> Option<u64> {
    pointer(payload, &["data", "meta", "total"]).and_then(as_count)
}

/// Non-negative whole count. Non-negative floats are truncated; anything
/// else (negative, NaN, string, object) is rejected.
fn as_count(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    match v.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f <= u64::MAX as f64 => Some(f as u64),
        _ => None,
    }
}

/// `data.course.lecture_sections` of the course-detail endpoint.
pub fn decode_sections(payload: &Value) -> Option<Vec<Section>> {
    let raw = pointer(payload, &["data", "course", "lecture_sections"])?.as_array()?;
    Some(raw.iter().filter_map(decode_section).collect())
}

fn decode_section(v: &Value) -> Option<Section> {
    let obj = v.as_object()?;
    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let name = obj.get("name").and_then(Value::as_str).map(str::to_string);
    let lectures = obj.get("lectures").and_then(Value::as_array).map_or(0, Vec::len);
    Some(Section { id, name, lectures })
}
