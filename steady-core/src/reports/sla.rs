//! Monitor SLA lookup.

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::clients::{BetterUptime, expect_status, with_query};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;

#[derive(Debug, Clone, Deserialize)]
pub struct SlaSpec {
    /// URL of the monitored endpoint.
    pub url: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

pub struct SlaReader<'a> {
    client: &'a BetterUptime<'a>,
}

impl<'a> SlaReader<'a> {
    pub fn new(client: &'a BetterUptime<'a>) -> Self {
        Self { client }
    }

    /// SLA attributes of the monitor, plus its `monitor_creation_date`.
    pub fn read(&self, spec: &SlaSpec) -> Result<Outcome> {
        let start = with_query(&self.client.monitors(), &[("url", spec.url.as_str())])?;
        let monitor = self
            .client
            .find_by(&start, "url", &spec.url)?
            .ok_or_else(|| ReconcileError::not_found("monitor", spec.url.as_str()))?;

        let range: Vec<(&str, &str)> = [("from", &spec.from), ("to", &spec.to)]
            .into_iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
            .collect();
        let sla_url = self.client.monitor_sla(&monitor.id);
        let url = if range.is_empty() {
            sla_url
        } else {
            with_query(&sla_url, &range)?
        };

        info!("Reading SLA of monitor {}", monitor.id);
        let response = expect_status(self.client.api().get(&url)?, 200, "get monitor SLA")?;
        let attributes = response
            .body
            .as_ref()
            .and_then(|b| b.get("data"))
            .and_then(|d| d.get("attributes"))
            .and_then(Value::as_object)
            .ok_or_else(|| ReconcileError::decode(&url, "SLA without data.attributes"))?;

        let mut outcome = Outcome::unchanged();
        outcome.data = attributes.clone();
        let created_at = monitor
            .attributes
            .get("created_at")
            .cloned()
            .unwrap_or(Value::Null);
        Ok(outcome.with("monitor_creation_date", created_at))
    }
}
