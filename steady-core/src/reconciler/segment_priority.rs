//! Reorders segment overrides so pricing-plan segments come last.
//!
//! For every (environment, feature) pair touched by a plan segment, the
//! non-plan segment overrides keep their listed order with priorities
//! `0..n`; plan segments follow, sorted by plan priority, at `n + priority`.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::Reconciler;
use crate::clients::flagsmith::name_is;
use crate::clients::{Flagsmith, expect_status, with_query};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::paginate::PageShape;
use crate::resource::RemoteId;

#[derive(Debug, Clone, Deserialize)]
pub struct PricingPlan {
    pub flagsmith_plan_name: String,
    pub priority: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityReorderSpec {
    pub project_name: String,
    pub environment_names: Vec<String>,
    pub pricing_plans: BTreeMap<String, PricingPlan>,
}

/// One `{id, priority}` entry of an update-priorities request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityEntry {
    pub id: RemoteId,
    pub priority: i64,
}

/// Target priorities for the feature segments of one (environment, feature).
///
/// `plan_priorities` maps plan segment ids to their plan priority.
pub fn plan_priorities(
    feature_segments: &[Value],
    plan_priorities: &HashMap<RemoteId, i64>,
) -> Vec<PriorityEntry> {
    let mut others = Vec::new();
    let mut plans = Vec::new();
    for fs in feature_segments {
        let Some(id) = fs.get("id").and_then(RemoteId::from_value) else {
            continue;
        };
        let plan = fs
            .get("segment")
            .and_then(RemoteId::from_value)
            .and_then(|segment| plan_priorities.get(&segment).copied());
        match plan {
            Some(priority) => plans.push(PriorityEntry { id, priority }),
            None => others.push(id),
        }
    }

    let offset = others.len() as i64;
    plans.sort_by_key(|p| p.priority);

    others
        .into_iter()
        .enumerate()
        .map(|(index, id)| PriorityEntry {
            id,
            priority: index as i64,
        })
        .chain(plans.into_iter().map(|p| PriorityEntry {
            id: p.id,
            priority: offset + p.priority,
        }))
        .collect()
}

fn already_ordered(feature_segments: &[Value], target: &[PriorityEntry]) -> bool {
    target.iter().all(|entry| {
        feature_segments.iter().any(|fs| {
            fs.get("id").and_then(RemoteId::from_value).as_ref() == Some(&entry.id)
                && fs.get("priority").and_then(Value::as_i64) == Some(entry.priority)
        })
    })
}

pub struct SegmentPriorityReconciler<'a> {
    client: &'a Flagsmith<'a>,
}

impl<'a> SegmentPriorityReconciler<'a> {
    pub fn new(client: &'a Flagsmith<'a>) -> Self {
        Self { client }
    }

    fn environment_id(&self, project: &RemoteId, name: &str) -> Result<RemoteId> {
        let start = self
            .client
            .search(&self.client.project_environments(project), name)?;
        self.client
            .paginator(PageShape::BareArray)
            .find_first(&start, |e| name_is(e, name))?
            .and_then(|e| e.get("id").and_then(RemoteId::from_value))
            .ok_or_else(|| ReconcileError::not_found("environment", name))
    }

    fn segment_id(&self, project: &RemoteId, name: &str) -> Result<RemoteId> {
        let start = self.client.search(&self.client.segments(project), name)?;
        self.client
            .paginator(PageShape::ResultsNext)
            .find_first(&start, |s| name_is(s, name))?
            .and_then(|s| s.get("id").and_then(RemoteId::from_value))
            .ok_or_else(|| ReconcileError::not_found("segment", name))
    }

    /// (environment, feature) pairs the plan segments override, first seen first.
    fn overridden_pairs(
        &self,
        project: &RemoteId,
        environments: &[RemoteId],
        segments: &[RemoteId],
    ) -> Result<Vec<(RemoteId, RemoteId)>> {
        let mut pairs: Vec<(RemoteId, RemoteId)> = Vec::new();
        for segment in segments {
            let associated = self
                .client
                .paginator(PageShape::ResultsNext)
                .collect_all(&self.client.associated_features(project, segment))?;
            if associated.is_empty() {
                info!("No features attached to segment {}, skipping", segment);
                continue;
            }
            for item in &associated {
                let environment = item.get("environment").and_then(RemoteId::from_value);
                let feature = item.get("feature").and_then(RemoteId::from_value);
                if let (Some(environment), Some(feature)) = (environment, feature)
                    && environments.contains(&environment)
                {
                    let pair = (environment, feature);
                    if !pairs.contains(&pair) {
                        pairs.push(pair);
                    }
                }
            }
        }
        Ok(pairs)
    }
}

impl Reconciler for SegmentPriorityReconciler<'_> {
    type Spec = PriorityReorderSpec;

    fn reconcile(&self, spec: &PriorityReorderSpec) -> Result<Outcome> {
        let project = self.client.project_id(&spec.project_name)?;
        let environments = spec
            .environment_names
            .iter()
            .map(|name| self.environment_id(&project, name))
            .collect::<Result<Vec<_>>>()?;

        let mut priorities = HashMap::new();
        let mut segments = Vec::new();
        for (plan, config) in &spec.pricing_plans {
            let segment = self.segment_id(&project, &config.flagsmith_plan_name)?;
            debug!("Plan {} is segment {}", plan, segment);
            priorities.insert(segment.clone(), config.priority);
            segments.push(segment);
        }

        let pairs = self.overridden_pairs(&project, &environments, &segments)?;
        let mut reordered = 0;
        for (environment, feature) in &pairs {
            let (environment, feature) = (environment.to_string(), feature.to_string());
            let start = with_query(
                &self.client.feature_segments(),
                &[("environment", environment.as_str()), ("feature", feature.as_str())],
            )?;
            let current = self
                .client
                .paginator(PageShape::ResultsNext)
                .collect_all(&start)?;

            let target = plan_priorities(&current, &priorities);
            if target.is_empty() || already_ordered(&current, &target) {
                debug!("Feature {} in environment {} already ordered", feature, environment);
                continue;
            }

            info!(
                "Reordering {} segment overrides of feature {} in environment {}",
                target.len(),
                feature,
                environment
            );
            let body: Vec<Value> = target
                .iter()
                .map(|e| json!({"id": e.id.as_value(), "priority": e.priority}))
                .collect();
            let response = self
                .client
                .api()
                .post(&self.client.update_priorities(), &Value::Array(body))?;
            expect_status(response, 200, "update segment priorities")?;
            reordered += 1;
        }

        let outcome = if reordered > 0 {
            Outcome::changed()
        } else {
            Outcome::unchanged()
        };
        Ok(outcome.with("reordered", reordered))
    }
}
