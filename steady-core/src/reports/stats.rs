//! Feature usage statistics across the environments of a project.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::clients::{Flagsmith, with_query};
use crate::date;
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::paginate::PageShape;
use crate::resource::RemoteId;

#[derive(Debug, Clone, Deserialize)]
pub struct StatsSpec {
    pub project_name: String,
}

/// Enabled/disabled counts of one feature, captured at `datetime`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStats {
    pub name: Value,
    pub datetime: String,
    pub enabled: u64,
    pub disabled: u64,
    pub default_enabled: Value,
    pub initial_value: Value,
    pub is_archived: Value,
    pub created_date: Value,
}

impl FeatureStats {
    fn new(feature: &Value, captured_at: &str) -> Self {
        let field = |key: &str| feature.get(key).cloned().unwrap_or(Value::Null);
        Self {
            name: field("name"),
            datetime: captured_at.to_string(),
            enabled: 0,
            disabled: 0,
            default_enabled: field("default_enabled"),
            initial_value: field("initial_value"),
            is_archived: field("is_archived"),
            created_date: field("created_date"),
        }
    }
}

pub struct StatsReader<'a> {
    client: &'a Flagsmith<'a>,
}

impl<'a> StatsReader<'a> {
    pub fn new(client: &'a Flagsmith<'a>) -> Self {
        Self { client }
    }

    /// Per-feature counts, in feature listing order.
    pub fn collect(&self, spec: &StatsSpec) -> Result<Vec<FeatureStats>> {
        let project = self.client.project_id(&spec.project_name)?;
        let pages = self.client.paginator(PageShape::ResultsNext);

        let features = pages.collect_all(&self.client.features(&project))?;
        let captured_at = date::now_utc();
        let mut stats = Vec::with_capacity(features.len());
        let mut index: HashMap<RemoteId, usize> = HashMap::new();
        for feature in &features {
            if let Some(id) = feature.get("id").and_then(RemoteId::from_value) {
                index.insert(id, stats.len());
                stats.push(FeatureStats::new(feature, &captured_at));
            }
        }

        let project_key = project.to_string();
        let environments = with_query(
            &self.client.environments(),
            &[("project", project_key.as_str())],
        )?;
        for key in self.client.environment_keys(&environments)? {
            let states = pages.collect_all(&self.client.feature_states(&key))?;
            debug!("{} feature states in one environment", states.len());
            for state in &states {
                let Some(slot) = state
                    .get("feature")
                    .and_then(RemoteId::from_value)
                    .and_then(|id| index.get(&id))
                else {
                    continue;
                };
                let entry = &mut stats[*slot];
                if state.get("enabled").and_then(Value::as_bool).unwrap_or(false) {
                    entry.enabled += 1;
                } else {
                    entry.disabled += 1;
                }
            }
        }

        info!("Collected usage of {} features", stats.len());
        Ok(stats)
    }

    pub fn read(&self, spec: &StatsSpec) -> Result<Outcome> {
        let stats = self.collect(spec)?;
        let stats = serde_json::to_value(stats)
            .map_err(|e| ReconcileError::decode("stats", e.to_string()))?;
        Ok(Outcome::unchanged().with("stats", stats))
    }
}
