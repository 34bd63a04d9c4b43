//! Flagsmith feature reconciler, keyed by name within a project.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{Reconciler, State, attr_str};
use crate::clients::Flagsmith;
use crate::error::Result;
use crate::outcome::Outcome;
use crate::payload::{AttributeDiffer, FieldStrategy, to_attributes};

const FIELDS: &[&str] = &[
    "name",
    "type",
    "default_enabled",
    "initial_value",
    "description",
    "is_archived",
    "tags",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    #[serde(skip_serializing)]
    pub state: State,
    #[serde(skip_serializing)]
    pub project_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: Option<String>,
    pub default_enabled: Option<bool>,
    pub initial_value: Option<String>,
    pub description: Option<String>,
    pub is_archived: Option<bool>,
    /// Tag labels; submitted as tag ids.
    #[serde(skip_serializing)]
    pub tags: Option<Vec<String>>,
}

pub struct FeatureReconciler<'a> {
    client: &'a Flagsmith<'a>,
}

impl<'a> FeatureReconciler<'a> {
    pub fn new(client: &'a Flagsmith<'a>) -> Self {
        Self { client }
    }
}

impl Reconciler for FeatureReconciler<'_> {
    type Spec = FeatureSpec;

    fn reconcile(&self, spec: &FeatureSpec) -> Result<Outcome> {
        info!("Reconciling feature {} in {}", spec.name, spec.project_name);
        let project = self.client.project_id(&spec.project_name)?;
        let collection = self.client.features(&project);
        let converger = self
            .client
            .converger("feature", collection.clone(), FIELDS)
            .with_differ(AttributeDiffer::new().field("tags", FieldStrategy::UnorderedSet));

        // The feature search endpoint is addressed without the trailing slash.
        let start = self
            .client
            .search(collection.trim_end_matches('/'), &spec.name)?;
        let remote = converger.locate(&start, |feature| {
            attr_str(&feature.attributes, "name") == Some(spec.name.as_str())
        })?;

        let mut desired = to_attributes(spec)?;
        if spec.state == State::Present
            && let Some(labels) = &spec.tags
        {
            let ids = self.client.tag_ids(&project, labels);
            desired.insert("tags".to_string(), Value::Array(ids));
        }

        let converged = converger.converge(spec.state, &desired, remote)?;
        Ok(converged.to_outcome("feature"))
    }
}
