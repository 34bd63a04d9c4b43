//! Status page reconciler.
//!
//! The page converges first; its id then parents the scoped sections and
//! resources handled by [`SectionReconciler`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::sections::{SectionReconciler, SectionSpec};
use super::{Reconciler, State, attr_str};
use crate::clients::BetterUptime;
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::payload::to_attributes;
use crate::resource::RemoteId;

/// Desired state of a status page, keyed by subdomain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPageSpec {
    #[serde(skip_serializing)]
    pub state: State,
    /// Known page id; skips the listing lookup.
    #[serde(skip_serializing, default)]
    pub id: Option<Value>,
    pub subdomain: String,
    #[serde(default = "default_company_name")]
    pub company_name: String,
    #[serde(default = "default_company_url")]
    pub company_url: String,
    pub contact_url: Option<String>,
    pub logo_url: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub custom_domain: Option<String>,
    pub custom_css: Option<String>,
    pub google_analytics_id: Option<String>,
    pub min_incident_length: Option<i64>,
    pub announcement: Option<String>,
    pub announcement_embed_visible: Option<bool>,
    pub announcement_embed_custom_css: Option<String>,
    pub announcement_embed_link: Option<String>,
    pub subscribable: Option<bool>,
    pub hide_from_search_engines: Option<bool>,
    pub password_enabled: Option<bool>,
    pub password: Option<String>,
    pub history: Option<i64>,
    #[serde(skip_serializing, default)]
    pub scope: Option<String>,
    #[serde(skip_serializing, default)]
    pub sections: Option<Vec<SectionSpec>>,
}

fn default_company_name() -> String {
    "ToucanToco".to_string()
}

fn default_company_url() -> String {
    "https://www.toucantoco.com".to_string()
}

fn default_timezone() -> String {
    "Paris".to_string()
}

impl StatusPageSpec {
    pub fn validate(&self) -> Result<()> {
        if self.sections.is_some() && self.scope.as_deref().is_none_or(str::is_empty) {
            return Err(ReconcileError::InvalidInput(
                "sections is set but the following are missing: scope".to_string(),
            ));
        }
        if let Some(id) = &self.id
            && RemoteId::from_value(id).is_none()
        {
            return Err(ReconcileError::InvalidInput(format!(
                "id must be a string or an integer, got {id}"
            )));
        }
        Ok(())
    }
}

pub struct StatusPageReconciler<'a> {
    client: &'a BetterUptime<'a>,
}

impl<'a> StatusPageReconciler<'a> {
    pub fn new(client: &'a BetterUptime<'a>) -> Self {
        Self { client }
    }
}

impl Reconciler for StatusPageReconciler<'_> {
    type Spec = StatusPageSpec;

    fn reconcile(&self, spec: &StatusPageSpec) -> Result<Outcome> {
        spec.validate()?;
        info!("Reconciling status page {}", spec.subdomain);

        let desired = to_attributes(spec)?;
        let converger = self
            .client
            .converger("status page", self.client.status_pages());

        let remote = match spec.id.as_ref().and_then(RemoteId::from_value) {
            Some(id) => converger.fetch(&id)?,
            None => converger.locate(&self.client.status_pages(), |page| {
                attr_str(&page.attributes, "subdomain") == Some(spec.subdomain.as_str())
            })?,
        };

        let converged = converger.converge(spec.state, &desired, remote)?;
        let mut changed = converged.changed();

        if spec.state == State::Present
            && let (Some(sections), Some(scope)) = (&spec.sections, &spec.scope)
        {
            let page = converger.resolved_id(&converged)?;
            changed |= SectionReconciler::new(self.client, page, scope).reconcile(sections)?;
        }

        let mut outcome = converged.to_outcome("status page");
        outcome.changed = changed;
        Ok(outcome)
    }
}
