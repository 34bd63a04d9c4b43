//! Desired-state payloads and the attribute differ.
//!
//! A desired state is built once per run from declarative input, sanitized
//! (unset entries dropped), then narrowed to the minimal update payload by
//! [`AttributeDiffer::diff`] before it is submitted.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{ReconcileError, Result};

/// Attribute name to value mapping, as sent to and read from the APIs.
pub type Attributes = Map<String, Value>;

/// Drop every null-valued entry. Empty lists and strings are kept.
pub fn sanitize(attributes: Attributes) -> Attributes {
    attributes
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .collect()
}

/// Serialize typed parameters into a sanitized attribute map.
pub fn to_attributes<T: Serialize>(params: &T) -> Result<Attributes> {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => Ok(sanitize(map)),
        Ok(other) => Err(ReconcileError::InvalidInput(format!(
            "parameters must form a mapping, got {other}"
        ))),
        Err(e) => Err(ReconcileError::InvalidInput(e.to_string())),
    }
}

/// Per-field comparison strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStrategy {
    /// Plain equality.
    Scalar,
    /// Order-insensitive, duplicate-count-sensitive list equality.
    UnorderedSet,
    /// List of child records with server-assigned ids.
    ///
    /// Elements are compared on `compare` keys only. When membership or
    /// length differ, the whole desired list is sent followed by a
    /// `{id, _destroy: true}` marker for every child currently present
    /// remotely, kept ones included. The API re-creates kept children from
    /// the desired list, so this replace-and-destroy-all payload is the
    /// update contract, not an accident.
    Relational { compare: &'static [&'static str] },
    /// Nested structure compared after recursively removing the listed
    /// server-assigned keys and null entries on both sides.
    StripKeys { keys: &'static [&'static str] },
}

/// Computes the update payload between a desired and a retrieved attribute set.
#[derive(Debug, Clone, Default)]
pub struct AttributeDiffer {
    strategies: BTreeMap<&'static str, FieldStrategy>,
}

impl AttributeDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `strategy` for `name`; unlisted fields are [`FieldStrategy::Scalar`].
    pub fn field(mut self, name: &'static str, strategy: FieldStrategy) -> Self {
        self.strategies.insert(name, strategy);
        self
    }

    /// Attributes of `desired` that differ from, or are absent in, `retrieved`.
    ///
    /// Keys present only in `retrieved` are ignored. An empty result means
    /// no update call is needed.
    pub fn diff(&self, desired: &Attributes, retrieved: &Attributes) -> Attributes {
        let mut diff = Attributes::new();
        for (key, want) in desired {
            let have = retrieved.get(key);
            let strategy = self
                .strategies
                .get(key.as_str())
                .unwrap_or(&FieldStrategy::Scalar);

            let changed = match strategy {
                FieldStrategy::Scalar => have != Some(want),
                FieldStrategy::UnorderedSet => {
                    have.is_none_or(|have| !same_multiset(want, have))
                }
                FieldStrategy::Relational { compare } => {
                    if let Some(update) = relational_update(want, have, compare) {
                        diff.insert(key.clone(), update);
                    }
                    continue;
                }
                FieldStrategy::StripKeys { keys } => {
                    have.is_none_or(|have| strip_keys(want, keys) != strip_keys(have, keys))
                }
            };

            if changed {
                diff.insert(key.clone(), want.clone());
            }
        }
        diff
    }
}

fn sorted_members(list: &Value) -> Option<Vec<String>> {
    let mut members: Vec<String> = list.as_array()?.iter().map(Value::to_string).collect();
    members.sort();
    Some(members)
}

fn same_multiset(a: &Value, b: &Value) -> bool {
    match (sorted_members(a), sorted_members(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn project_keys(element: &Value, keys: &[&str]) -> Value {
    let projected: Map<String, Value> = keys
        .iter()
        .filter_map(|k| element.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();
    Value::Object(projected)
}

/// The relational payload for a field, or `None` when the lists already match.
fn relational_update(want: &Value, have: Option<&Value>, compare: &[&str]) -> Option<Value> {
    let desired = want.as_array().cloned().unwrap_or_default();
    let current = have.and_then(Value::as_array).cloned().unwrap_or_default();

    let current_keys: Vec<Value> = current.iter().map(|c| project_keys(c, compare)).collect();
    let all_present = desired
        .iter()
        .all(|d| current_keys.contains(&project_keys(d, compare)));

    if all_present && desired.len() == current.len() {
        return None;
    }

    let markers = current
        .iter()
        .filter_map(|c| c.get("id"))
        .map(|id| json!({"id": id, "_destroy": true}));
    Some(Value::Array(desired.into_iter().chain(markers).collect()))
}

/// Recursively remove `keys` and null entries from every object in `value`.
pub fn strip_keys(value: &Value, keys: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, v)| !v.is_null() && !keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), strip_keys(v, keys)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| strip_keys(v, keys)).collect()),
        other => other.clone(),
    }
}
