//! Flagsmith API endpoints and id lookups.
//!
//! Most listings use `{results, next}`; the project listing is a bare array.
//! Every collection URL ends with a slash.

use serde_json::Value;
use tracing::debug;

use super::{ApiClient, with_query};
use crate::error::{ReconcileError, Result};
use crate::paginate::{PageShape, Paginator};
use crate::reconciler::{Converger, scalar_text};
use crate::resource::{Projection, RemoteId};

/// Flagsmith client rooted at an API base URL such as `https://api.flagsmith.com/api/v1`.
pub struct Flagsmith<'a> {
    api: ApiClient<'a>,
    base: String,
}

impl<'a> Flagsmith<'a> {
    pub fn new(api: ApiClient<'a>, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api(&self) -> &ApiClient<'a> {
        &self.api
    }

    pub fn paginator(&self, shape: PageShape) -> Paginator<'_> {
        Paginator::new(&self.api, shape)
    }

    /// A [`Converger`] over a Flagsmith collection keeping `fields` for comparison.
    pub fn converger(
        &self,
        noun: &'static str,
        collection: String,
        fields: &'static [&'static str],
    ) -> Converger<'_> {
        Converger::new(
            &self.api,
            noun,
            collection,
            PageShape::ResultsNext,
            Projection::Flat(fields),
        )
    }

    pub fn projects(&self) -> String {
        format!("{}/projects/", self.base)
    }

    pub fn organisations(&self) -> String {
        format!("{}/organisations/", self.base)
    }

    pub fn tags(&self, project: &RemoteId) -> String {
        format!("{}/projects/{}/tags/", self.base, project)
    }

    pub fn features(&self, project: &RemoteId) -> String {
        format!("{}/projects/{}/features/", self.base, project)
    }

    pub fn segments(&self, project: &RemoteId) -> String {
        format!("{}/projects/{}/segments/", self.base, project)
    }

    pub fn associated_features(&self, project: &RemoteId, segment: &RemoteId) -> String {
        format!(
            "{}/projects/{}/segments/{}/associated-features/",
            self.base, project, segment
        )
    }

    pub fn project_environments(&self, project: &RemoteId) -> String {
        format!("{}/projects/{}/environments/", self.base, project)
    }

    pub fn environments(&self) -> String {
        format!("{}/environments/", self.base)
    }

    pub fn feature_states(&self, environment_key: &str) -> String {
        format!("{}/environments/{}/featurestates/", self.base, environment_key)
    }

    pub fn feature_segments(&self) -> String {
        format!("{}/features/feature-segments/", self.base)
    }

    pub fn update_priorities(&self) -> String {
        format!("{}/features/feature-segments/update-priorities/", self.base)
    }

    pub fn groups(&self, organisation: &RemoteId) -> String {
        format!("{}/organisations/{}/groups/", self.base, organisation)
    }

    pub fn group_permissions(&self, organisation: &RemoteId) -> String {
        format!(
            "{}/organisations/{}/user-group-permissions/",
            self.base, organisation
        )
    }

    /// `<collection>?search=<term>`
    pub fn search(&self, collection: &str, term: &str) -> Result<String> {
        with_query(collection, &[("search", term)])
    }

    /// Id of the project named `name`.
    ///
    /// A failing listing is an error, not an absent project.
    pub fn project_id(&self, name: &str) -> Result<RemoteId> {
        let found = self
            .paginator(PageShape::BareArray)
            .find_first(&self.projects(), |p| name_is(p, name))?;
        item_id(found.as_ref()).ok_or_else(|| ReconcileError::not_found("project", name))
    }

    /// Id of the organisation named `name`.
    pub fn organisation_id(&self, name: &str) -> Result<RemoteId> {
        let found = self
            .paginator(PageShape::ResultsNext)
            .find_first(&self.organisations(), |o| name_is(o, name))?;
        item_id(found.as_ref()).ok_or_else(|| ReconcileError::not_found("organisation", name))
    }

    /// Ids of the project tags carrying one of `labels`, in listing order.
    ///
    /// Unknown labels are silently left out.
    pub fn tag_ids(&self, project: &RemoteId, labels: &[String]) -> Vec<Value> {
        let found = self.paginator(PageShape::ResultsNext).collect_matching(
            &self.tags(project),
            labels.len(),
            |t| {
                t.get("label")
                    .and_then(Value::as_str)
                    .is_some_and(|l| labels.iter().any(|want| want == l))
            },
        );
        debug!("Resolved {} of {} tag labels", found.len(), labels.len());
        found.iter().filter_map(|t| t.get("id").cloned()).collect()
    }

    /// `api_key` of every environment in a listing.
    pub fn environment_keys(&self, url: &str) -> Result<Vec<String>> {
        Ok(self
            .paginator(PageShape::ResultsNext)
            .collect_all(url)?
            .iter()
            .filter_map(|e| e.get("api_key").and_then(scalar_text))
            .collect())
    }
}

pub(crate) fn name_is(item: &Value, name: &str) -> bool {
    item.get("name").and_then(Value::as_str) == Some(name)
}

fn item_id(item: Option<&Value>) -> Option<RemoteId> {
    item.and_then(|item| item.get("id"))
        .and_then(RemoteId::from_value)
}
