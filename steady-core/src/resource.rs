//! Remote resource identity and projection of raw listing items.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

use crate::payload::Attributes;

/// Server-assigned identifier, string or integer depending on the API.
///
/// Better Uptime returns ids as strings in `data[].id` but as integers in
/// relational attributes such as `status_page_section_id`, so equality is
/// defined on the textual form.
#[derive(Debug, Clone)]
pub struct RemoteId(Value);

impl RemoteId {
    /// Accept a string or number, reject anything else.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(value.clone())),
            Value::Number(_) => Some(Self(value.clone())),
            _ => None,
        }
    }

    /// The id exactly as the API returned it.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The id as a JSON number when it is numeric, for relational payload fields.
    pub fn to_numeric(&self) -> Value {
        match &self.0 {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| self.0.clone()),
            other => other.clone(),
        }
    }

    fn key(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl PartialEq for RemoteId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RemoteId {}

impl Hash for RemoteId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl From<i64> for RemoteId {
    fn from(id: i64) -> Self {
        Self(Value::from(id))
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self(Value::from(id))
    }
}

/// A located remote resource: its id and the attributes worth comparing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource {
    pub id: RemoteId,
    pub attributes: Attributes,
}

/// How a raw listing item maps onto a [`RemoteResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// JSON:API style `{ "id": .., "attributes": {..} }` (Better Uptime).
    JsonApi,
    /// Flat object; only the listed keys are kept (Flagsmith).
    Flat(&'static [&'static str]),
}

impl Projection {
    /// Attributes of a raw item, empty when absent or null.
    pub fn attributes(self, item: &Value) -> Attributes {
        match self {
            Projection::JsonApi => item
                .get("attributes")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            Projection::Flat(keys) => keys
                .iter()
                .filter_map(|k| item.get(*k).map(|v| (k.to_string(), v.clone())))
                .collect::<Map<_, _>>(),
        }
    }

    pub fn project(self, item: &Value) -> Option<RemoteResource> {
        let id = RemoteId::from_value(item.get("id")?)?;
        Some(RemoteResource {
            id,
            attributes: self.attributes(item),
        })
    }

    /// Id of the resource in a creation response body.
    pub fn created_id(self, body: Option<&Value>) -> Option<RemoteId> {
        let body = body?;
        let id = match self {
            Projection::JsonApi => body.get("data")?.get("id")?,
            Projection::Flat(_) => body.get("id")?,
        };
        RemoteId::from_value(id)
    }
}
