//! Status page reports: create a report, or append updates to an existing one.
//!
//! An existing report is found by title, report type, and start time
//! compared to the minute.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::clients::BetterUptime;
use crate::date;
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::payload::{Attributes, to_attributes};
use crate::reconciler::{Converged, Reconciler, attr_str};
use crate::resource::{RemoteId, RemoteResource};

const REPORT_DATES: &[&str] = &["published_at", "starts_at", "ends_at"];
const UPDATE_DATES: &[&str] = &["published_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Create,
    Update,
}

/// Status set on every affected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Degraded,
    Downtime,
    Maintenance,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Manual,
    Maintenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportUpdate {
    pub message: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReportSpec {
    #[serde(skip_serializing)]
    pub subdomain: String,
    #[serde(skip_serializing)]
    pub state: ReportAction,
    #[serde(skip_serializing)]
    pub status: ResourceStatus,
    pub title: String,
    pub report_type: ReportType,
    pub message: Option<String>,
    #[serde(skip_serializing, default)]
    pub report_update: Option<Vec<ReportUpdate>>,
    /// Restricts affected resources to these sections.
    #[serde(skip_serializing, default)]
    pub section_name: Option<Vec<String>>,
    pub published_at: Option<String>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
}

impl StatusReportSpec {
    /// Conditional requirements and date formats, checked before any call.
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str, action: &str| {
            Err(ReconcileError::InvalidInput(format!(
                "state is {action} but the following are missing: {field}"
            )))
        };
        match self.state {
            ReportAction::Create if self.message.is_none() => return missing("message", "create"),
            ReportAction::Update if self.report_update.is_none() => {
                return missing("report_update", "update");
            }
            ReportAction::Update if self.starts_at.is_none() => {
                return missing("starts_at", "update");
            }
            _ => {}
        }

        date::validate_fields(&to_attributes(self)?, REPORT_DATES)?;
        for update in self.report_update.iter().flatten() {
            date::validate_fields(&to_attributes(update)?, UPDATE_DATES)?;
        }
        Ok(())
    }

    /// Whether `report` is the one this spec updates.
    fn matches(&self, report: &RemoteResource) -> bool {
        let same_title = attr_str(&report.attributes, "title") == Some(self.title.as_str());
        let same_type = report.attributes.get("report_type")
            == serde_json::to_value(self.report_type).ok().as_ref();
        let same_start = match (
            self.starts_at.as_deref().and_then(date::parse_input),
            attr_str(&report.attributes, "starts_at").and_then(date::parse_remote),
        ) {
            (Some(wanted), Some(remote)) => date::same_minute(wanted, remote),
            _ => false,
        };
        same_title && same_type && same_start
    }
}

pub struct StatusReportReconciler<'a> {
    client: &'a BetterUptime<'a>,
}

impl<'a> StatusReportReconciler<'a> {
    pub fn new(client: &'a BetterUptime<'a>) -> Self {
        Self { client }
    }

    /// `{status_page_resource_id, status}` for every affected resource.
    ///
    /// A resource listed in several selected sections appears once per
    /// listing entry; entries are not deduplicated.
    fn affected_resources(&self, page: &RemoteId, spec: &StatusReportSpec) -> Result<Vec<Value>> {
        let resources = self.client.list(&self.client.resources(page))?;
        let selected = match &spec.section_name {
            None => resources,
            Some(names) => {
                let sections: HashSet<RemoteId> = self
                    .client
                    .list(&self.client.sections(page))?
                    .into_iter()
                    .filter(|s| {
                        attr_str(&s.attributes, "name").is_some_and(|n| names.iter().any(|w| w == n))
                    })
                    .map(|s| s.id)
                    .collect();
                resources
                    .into_iter()
                    .filter(|r| {
                        r.attributes
                            .get("status_page_section_id")
                            .and_then(RemoteId::from_value)
                            .is_some_and(|id| sections.contains(&id))
                    })
                    .collect()
            }
        };

        Ok(selected
            .iter()
            .map(|r| json!({"status_page_resource_id": r.id.as_value(), "status": spec.status}))
            .collect())
    }
}

impl Reconciler for StatusReportReconciler<'_> {
    type Spec = StatusReportSpec;

    fn reconcile(&self, spec: &StatusReportSpec) -> Result<Outcome> {
        spec.validate()?;

        let page = self
            .client
            .status_page_by_subdomain(&spec.subdomain)?
            .ok_or_else(|| ReconcileError::not_found("status page", spec.subdomain.as_str()))?;

        let affected = self.affected_resources(&page.id, spec)?;
        if affected.is_empty() {
            info!("No resource affected on {}, nothing to report", spec.subdomain);
            return Ok(Outcome::unchanged().with_msg("No affected resources"));
        }

        let reports = self
            .client
            .converger("status report", self.client.status_reports(&page.id));

        let report_id = match spec.state {
            ReportAction::Create => {
                let mut payload = to_attributes(spec)?;
                payload.insert("affected_resources".to_string(), Value::Array(affected));
                let id = reports.create(&payload)?;
                reports.resolved_id(&Converged::Created { id })?
            }
            ReportAction::Update => {
                let report = reports
                    .locate(&self.client.status_reports(&page.id), |r| spec.matches(r))?
                    .ok_or_else(|| ReconcileError::not_found("status page report", spec.title.as_str()))?;

                let updates = self.client.converger(
                    "status update",
                    self.client.status_updates(&page.id, &report.id),
                );
                for update in spec.report_update.iter().flatten() {
                    let mut payload: Attributes = to_attributes(update)?;
                    payload.insert(
                        "affected_resources".to_string(),
                        Value::Array(affected.clone()),
                    );
                    updates.create(&payload)?;
                }
                report.id
            }
        };

        Ok(Outcome::changed().with("id", report_id.as_value().clone()))
    }
}
