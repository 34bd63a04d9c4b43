//! Flagsmith segment reconciler.
//!
//! Segment names are lower-cased. The `none` and `custom` segments are
//! managed by Flagsmith itself and are skipped without any call.

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{Reconciler, State, attr_str};
use crate::clients::Flagsmith;
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::payload::{AttributeDiffer, Attributes, FieldStrategy};

const FIELDS: &[&str] = &["name", "description", "rules", "project"];

/// Server-assigned keys inside nested rules.
const RULE_KEYS: &[&str] = &["id", "rule", "segment"];

const UNMANAGED: &[&str] = &["none", "custom"];

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentSpec {
    pub state: State,
    pub project_name: String,
    pub name: String,
    pub description: Option<String>,
    /// Rule tree, structured or as a JSON string.
    pub rules: Value,
}

impl SegmentSpec {
    pub fn normalized_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// The rule tree; strings are parsed as JSON, single quotes tolerated.
    pub fn parsed_rules(&self) -> Result<Value> {
        match &self.rules {
            Value::String(text) => serde_json::from_str(&text.replace('\'', "\"")).map_err(|e| {
                ReconcileError::InvalidInput(format!("rules is not valid JSON: {e}"))
            }),
            other => Ok(other.clone()),
        }
    }
}

pub struct SegmentReconciler<'a> {
    client: &'a Flagsmith<'a>,
}

impl<'a> SegmentReconciler<'a> {
    pub fn new(client: &'a Flagsmith<'a>) -> Self {
        Self { client }
    }
}

impl Reconciler for SegmentReconciler<'_> {
    type Spec = SegmentSpec;

    fn reconcile(&self, spec: &SegmentSpec) -> Result<Outcome> {
        let name = spec.normalized_name();
        if UNMANAGED.contains(&name.as_str()) {
            info!("Segment {} is not managed, skipping", name);
            return Ok(Outcome::skipped(format!("segment {name} is not managed")));
        }
        let rules = spec.parsed_rules()?;

        info!("Reconciling segment {} in {}", name, spec.project_name);
        let project = self.client.project_id(&spec.project_name)?;
        let collection = self.client.segments(&project);
        let converger = self
            .client
            .converger("segment", collection.clone(), FIELDS)
            .with_differ(
                AttributeDiffer::new().field("rules", FieldStrategy::StripKeys { keys: RULE_KEYS }),
            );

        let start = self.client.search(&collection, &name)?;
        let remote = converger.locate(&start, |segment| {
            attr_str(&segment.attributes, "name") == Some(name.as_str())
        })?;

        let mut desired = Attributes::new();
        desired.insert("name".to_string(), Value::String(name.clone()));
        if let Some(description) = &spec.description {
            desired.insert("description".to_string(), Value::String(description.clone()));
        }
        desired.insert("rules".to_string(), rules);
        desired.insert("project".to_string(), project.to_numeric());

        let converged = converger.converge(spec.state, &desired, remote)?;
        Ok(converged.to_outcome("segment"))
    }
}
