//! Scoped sections and resources of a status page.
//!
//! Sections owned by a run carry the `"<Scope> - "` name prefix. Sections
//! with another prefix belong to another configuration and are never
//! touched. Resources are only considered inside sections tracked by the
//! current run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{Converger, State, attr_str};
use crate::clients::BetterUptime;
use crate::error::Result;
use crate::payload::to_attributes;
use crate::resource::{RemoteId, RemoteResource};

/// A desired section of a status page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub position: Option<i64>,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

/// A desired resource inside a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Pronounceable name of the monitor shown by this resource.
    pub monitor: String,
    pub public_name: Option<String>,
    pub explanation: Option<String>,
    pub widget_type: Option<String>,
    pub position: Option<i64>,
}

#[derive(Serialize)]
struct SectionPayload<'s> {
    name: &'s str,
    position: Option<i64>,
}

#[derive(Serialize)]
struct ResourcePayload<'s> {
    resource_id: Value,
    resource_type: &'static str,
    status_page_section_id: Value,
    public_name: Option<&'s str>,
    explanation: Option<&'s str>,
    widget_type: Option<&'s str>,
    position: Option<i64>,
}

/// `"backend"` -> `"Backend - "`.
pub fn scope_prefix(scope: &str) -> String {
    let mut chars = scope.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    };
    format!("{capitalized} - ")
}

/// Reconciles the sections and resources of one status page within a scope.
pub struct SectionReconciler<'a> {
    client: &'a BetterUptime<'a>,
    page: RemoteId,
    prefix: String,
}

impl<'a> SectionReconciler<'a> {
    pub fn new(client: &'a BetterUptime<'a>, page: RemoteId, scope: &str) -> Self {
        Self {
            client,
            page,
            prefix: scope_prefix(scope),
        }
    }

    fn section_converger(&self) -> Converger<'_> {
        self.client
            .converger("status page section", self.client.sections(&self.page))
    }

    fn resource_converger(&self) -> Converger<'_> {
        self.client
            .converger("status page resource", self.client.resources(&self.page))
    }

    /// Converge sections, prune stale ones, then converge resources.
    ///
    /// Returns whether any call mutated remote state.
    pub fn reconcile(&self, sections: &[SectionSpec]) -> Result<bool> {
        let (tracked, mut changed) = self.reconcile_sections(sections)?;
        if !tracked.is_empty() {
            changed |= self.reconcile_resources(&tracked)?;
        }
        Ok(changed)
    }

    fn reconcile_sections<'s>(
        &self,
        sections: &'s [SectionSpec],
    ) -> Result<(Vec<(RemoteId, &'s SectionSpec)>, bool)> {
        let converger = self.section_converger();
        let scoped: Vec<RemoteResource> = self
            .client
            .list(&self.client.sections(&self.page))?
            .into_iter()
            .filter(|s| attr_str(&s.attributes, "name").is_some_and(|n| n.starts_with(&self.prefix)))
            .collect();
        debug!("{} remote sections under '{}'", scoped.len(), self.prefix);

        let mut changed = false;
        let mut tracked = Vec::with_capacity(sections.len());
        for section in sections {
            let name = format!("{}{}", self.prefix, section.name);
            let desired = to_attributes(&SectionPayload {
                name: &name,
                position: section.position,
            })?;
            let remote = scoped
                .iter()
                .find(|s| attr_str(&s.attributes, "name") == Some(name.as_str()))
                .cloned();

            let converged = converger.converge(State::Present, &desired, remote)?;
            changed |= converged.changed();
            let id = converger.resolved_id(&converged)?;
            tracked.push((id, section));
        }

        let touched: HashSet<&RemoteId> = tracked.iter().map(|(id, _)| id).collect();
        for stale in scoped.iter().filter(|s| !touched.contains(&s.id)) {
            info!(
                "Pruning section {} ({})",
                stale.id,
                attr_str(&stale.attributes, "name").unwrap_or_default()
            );
            converger.delete(&stale.id)?;
            changed = true;
        }

        Ok((tracked, changed))
    }

    fn reconcile_resources(&self, tracked: &[(RemoteId, &SectionSpec)]) -> Result<bool> {
        let converger = self.resource_converger();
        let section_ids: HashSet<&RemoteId> = tracked.iter().map(|(id, _)| id).collect();
        let remote: Vec<RemoteResource> = self
            .client
            .list(&self.client.resources(&self.page))?
            .into_iter()
            .filter(|r| {
                r.attributes
                    .get("status_page_section_id")
                    .and_then(RemoteId::from_value)
                    .is_some_and(|id| section_ids.contains(&id))
            })
            .collect();

        let mut changed = false;
        let mut touched: HashSet<RemoteId> = HashSet::new();
        for (section_id, section) in tracked {
            for resource in &section.resources {
                let monitor_id = self.client.monitor_id_by_name(&resource.monitor)?;
                let desired = to_attributes(&ResourcePayload {
                    resource_id: monitor_id.to_numeric(),
                    resource_type: "Monitor",
                    status_page_section_id: section_id.to_numeric(),
                    public_name: resource.public_name.as_deref(),
                    explanation: resource.explanation.as_deref(),
                    widget_type: resource.widget_type.as_deref(),
                    position: resource.position,
                })?;
                let existing = remote
                    .iter()
                    .find(|r| {
                        !touched.contains(&r.id)
                            && r.attributes
                                .get("resource_id")
                                .and_then(RemoteId::from_value)
                                .is_some_and(|id| id == monitor_id)
                    })
                    .cloned();

                let converged = converger.converge(State::Present, &desired, existing)?;
                changed |= converged.changed();
                let id = converger.resolved_id(&converged)?;
                touched.insert(id);
            }
        }

        for stale in remote.iter().filter(|r| !touched.contains(&r.id)) {
            info!("Pruning resource {}", stale.id);
            converger.delete(&stale.id)?;
            changed = true;
        }

        Ok(changed)
    }
}
