//! Flagsmith project tag reconciler, keyed by label.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{Reconciler, State, attr_str};
use crate::clients::Flagsmith;
use crate::error::Result;
use crate::outcome::Outcome;
use crate::payload::to_attributes;

const FIELDS: &[&str] = &["label", "color", "description"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSpec {
    #[serde(skip_serializing)]
    pub state: State,
    #[serde(skip_serializing)]
    pub project_name: String,
    pub label: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

/// A random `#RRGGBB` colour, uppercase hex.
pub fn random_color() -> String {
    let rgb: u32 = rand::thread_rng().gen_range(0..=0xFF_FFFF);
    format!("#{rgb:06X}")
}

pub struct TagReconciler<'a> {
    client: &'a Flagsmith<'a>,
}

impl<'a> TagReconciler<'a> {
    pub fn new(client: &'a Flagsmith<'a>) -> Self {
        Self { client }
    }
}

impl Reconciler for TagReconciler<'_> {
    type Spec = TagSpec;

    fn reconcile(&self, spec: &TagSpec) -> Result<Outcome> {
        info!("Reconciling tag {} in {}", spec.label, spec.project_name);
        let project = self.client.project_id(&spec.project_name)?;
        let collection = self.client.tags(&project);
        let converger = self.client.converger("tag", collection.clone(), FIELDS);

        let remote = converger.locate(&collection, |tag| {
            attr_str(&tag.attributes, "label") == Some(spec.label.as_str())
        })?;

        let mut desired = to_attributes(spec)?;
        if spec.state == State::Present && remote.is_none() && spec.color.is_none() {
            desired.insert("color".to_string(), Value::String(random_color()));
        }

        let converged = converger.converge(spec.state, &desired, remote)?;
        Ok(converged.to_outcome("tag"))
    }
}
