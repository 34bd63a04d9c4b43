//! Better Uptime API endpoints.
//!
//! Listings use the `{data, pagination: {next}}` envelope and JSON:API
//! items (`{id, type, attributes}`).

use tracing::debug;

use super::ApiClient;
use crate::error::{ReconcileError, Result};
use crate::paginate::{PageShape, Paginator};
use crate::reconciler::{Converger, attr_str};
use crate::resource::{Projection, RemoteId, RemoteResource};

pub const DEFAULT_BASE_URL: &str = "https://betteruptime.com/api/v2";

/// Better Uptime client rooted at an API base URL.
pub struct BetterUptime<'a> {
    api: ApiClient<'a>,
    base: String,
}

impl<'a> BetterUptime<'a> {
    pub fn new(api: ApiClient<'a>, base: impl Into<String>) -> Self {
        Self {
            api,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api(&self) -> &ApiClient<'a> {
        &self.api
    }

    pub fn paginator(&self) -> Paginator<'_> {
        Paginator::new(&self.api, PageShape::DataPagination)
    }

    /// A [`Converger`] over a Better Uptime collection.
    pub fn converger(&self, noun: &'static str, collection: String) -> Converger<'_> {
        Converger::new(
            &self.api,
            noun,
            collection,
            PageShape::DataPagination,
            Projection::JsonApi,
        )
    }

    pub fn monitors(&self) -> String {
        format!("{}/monitors", self.base)
    }

    pub fn monitor_sla(&self, monitor: &RemoteId) -> String {
        format!("{}/monitors/{}/sla", self.base, monitor)
    }

    pub fn policies(&self) -> String {
        format!("{}/policies", self.base)
    }

    pub fn status_pages(&self) -> String {
        format!("{}/status-pages", self.base)
    }

    pub fn sections(&self, page: &RemoteId) -> String {
        format!("{}/status-pages/{}/sections", self.base, page)
    }

    pub fn resources(&self, page: &RemoteId) -> String {
        format!("{}/status-pages/{}/resources", self.base, page)
    }

    pub fn status_reports(&self, page: &RemoteId) -> String {
        format!("{}/status-pages/{}/status-reports", self.base, page)
    }

    pub fn status_updates(&self, page: &RemoteId, report: &RemoteId) -> String {
        format!(
            "{}/status-pages/{}/status-reports/{}/status-updates",
            self.base, page, report
        )
    }

    /// Every item of a listing, projected. Items without an id are dropped.
    pub fn list(&self, url: &str) -> Result<Vec<RemoteResource>> {
        Ok(self
            .paginator()
            .collect_all(url)?
            .iter()
            .filter_map(|item| Projection::JsonApi.project(item))
            .collect())
    }

    /// First resource of a listing whose string attribute `key` equals `value`.
    pub fn find_by(&self, start_url: &str, key: &str, value: &str) -> Result<Option<RemoteResource>> {
        debug!("Looking up {}={} from {}", key, value, start_url);
        let found = self.paginator().find_first(start_url, |item| {
            item.get("attributes")
                .and_then(|a| a.as_object())
                .and_then(|a| attr_str(a, key))
                == Some(value)
        })?;
        Ok(found.and_then(|item| Projection::JsonApi.project(&item)))
    }

    pub fn status_page_by_subdomain(&self, subdomain: &str) -> Result<Option<RemoteResource>> {
        self.find_by(&self.status_pages(), "subdomain", subdomain)
    }

    /// Id of the monitor whose pronounceable name is `name`.
    pub fn monitor_id_by_name(&self, name: &str) -> Result<RemoteId> {
        self.find_by(&self.monitors(), "pronounceable_name", name)?
            .map(|m| m.id)
            .ok_or_else(|| ReconcileError::not_found("monitor", name))
    }

    /// Id of the escalation policy named `name`.
    pub fn policy_id_by_name(&self, name: &str) -> Result<RemoteId> {
        self.find_by(&self.policies(), "name", name)?
            .map(|p| p.id)
            .ok_or_else(|| ReconcileError::not_found("escalation policy", name))
    }
}
