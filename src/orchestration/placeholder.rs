//! `${task_id}` substitution in task inputs.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::core::TaskId;

/// Matches `${id}` where `id` is a task id.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").unwrap());

/// Matches a string that is nothing but one placeholder.
static WHOLE_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$\{([A-Za-z0-9_.\-]+)\}$").unwrap());

/// Render a payload for embedding inside a larger string.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace placeholders in one value, recursing into arrays and objects.
///
/// A string that is exactly `${id}` becomes the payload itself; embedded
/// placeholders become the payload's text. Ids without a payload are left
/// as written.
pub fn resolve_value(value: &Value, payloads: &HashMap<TaskId, Value>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(caps) = WHOLE_PLACEHOLDER_RE.captures(s) {
                if let Some(payload) = payloads.get(&TaskId::new(&caps[1])) {
                    return payload.clone();
                }
            }
            let replaced = PLACEHOLDER_RE.replace_all(s, |caps: &Captures| {
                match payloads.get(&TaskId::new(&caps[1])) {
                    Some(payload) => as_text(payload),
                    None => caps[0].to_string(),
                }
            });
            Value::String(replaced.into_owned())
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, payloads)).collect()),
        Value::Object(fields) => Value::Object(resolve_inputs(fields, payloads)),
        other => other.clone(),
    }
}

/// Resolve every input field of a task.
pub fn resolve_inputs(inputs: &Map<String, Value>, payloads: &HashMap<TaskId, Value>) -> Map<String, Value> {
    inputs
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, payloads)))
        .collect()
}

/// Task ids referenced by placeholders anywhere in `value`.
pub fn referenced_ids(value: &Value) -> Vec<TaskId> {
    let mut ids = Vec::new();
    collect_ids(value, &mut ids);
    ids
}

fn collect_ids(value: &Value, ids: &mut Vec<TaskId>) {
    match value {
        Value::String(s) => {
            for caps in PLACEHOLDER_RE.captures_iter(s) {
                let id = TaskId::new(&caps[1]);
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_ids(v, ids)),
        Value::Object(fields) => fields.values().for_each(|v| collect_ids(v, ids)),
        _ => {}
    }
}
