//! Result of a run, as reported to the caller.

use serde::Serialize;
use serde_json::{Map, Value};

/// `{changed, msg?, skipped?, ...}` reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    /// Resource-kind-specific fields.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Outcome {
    pub fn changed() -> Self {
        Self {
            changed: true,
            ..Default::default()
        }
    }

    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn skipped(msg: impl Into<String>) -> Self {
        Self {
            skipped: true,
            msg: Some(msg.into()),
            ..Default::default()
        }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}
