//! Monitor reconciler - converges a Better Uptime monitor, keyed by URL.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{Reconciler, State, scalar_text};
use crate::clients::BetterUptime;
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::payload::{AttributeDiffer, FieldStrategy, to_attributes};
use crate::resource::RemoteResource;

/// Kind of check a monitor performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorType {
    ExpectedStatusCode,
    Imap,
    Keyword,
    KeywordAbsence,
    Ping,
    Pop,
    Smtp,
    Status,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub name: String,
    pub value: String,
}

/// Desired state of a monitor.
///
/// Fields marked `skip_serializing` steer the run and are never submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSpec {
    #[serde(skip_serializing)]
    pub state: State,
    pub url: String,
    pub monitor_type: Option<MonitorType>,
    #[serde(skip_serializing, default)]
    pub metadata: Option<Vec<Value>>,
    /// Translated into `policy_id` before submission.
    #[serde(skip_serializing, default)]
    pub policy_name: Option<String>,
    pub expected_status_codes: Option<Vec<u16>>,
    pub request_headers: Option<Vec<RequestHeader>>,
    pub domain_expiration: Option<i64>,
    pub ssl_expiration: Option<i64>,
    pub policy_id: Option<String>,
    pub follow_redirects: Option<bool>,
    pub required_keyword: Option<String>,
    #[serde(default)]
    pub call: bool,
    #[serde(default)]
    pub sms: bool,
    #[serde(default = "default_true")]
    pub email: bool,
    #[serde(default)]
    pub push: bool,
    pub team_wait: Option<i64>,
    #[serde(default)]
    pub paused: bool,
    pub port: Option<String>,
    pub regions: Option<Vec<String>>,
    pub monitor_group_id: Option<String>,
    pub pronounceable_name: Option<String>,
    pub recovery_period: Option<i64>,
    pub verify_ssl: Option<bool>,
    #[serde(default = "default_check_frequency")]
    pub check_frequency: i64,
    #[serde(default = "default_confirmation_period")]
    pub confirmation_period: i64,
    pub http_method: Option<String>,
    pub request_timeout: Option<i64>,
    pub request_body: Option<String>,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    pub maintenance_from: Option<String>,
    pub maintenance_to: Option<String>,
    pub maintenance_timezone: Option<String>,
    pub remember_cookies: Option<bool>,
}

fn default_true() -> bool {
    true
}

fn default_check_frequency() -> i64 {
    300
}

fn default_confirmation_period() -> i64 {
    120
}

impl MonitorSpec {
    /// A monitor spec with input defaults applied.
    pub fn new(state: State, url: impl Into<String>) -> Self {
        Self {
            state,
            url: url.into(),
            monitor_type: None,
            metadata: None,
            policy_name: None,
            expected_status_codes: None,
            request_headers: None,
            domain_expiration: None,
            ssl_expiration: None,
            policy_id: None,
            follow_redirects: None,
            required_keyword: None,
            call: false,
            sms: false,
            email: true,
            push: false,
            team_wait: None,
            paused: false,
            port: None,
            regions: None,
            monitor_group_id: None,
            pronounceable_name: None,
            recovery_period: None,
            verify_ssl: None,
            check_frequency: default_check_frequency(),
            confirmation_period: default_confirmation_period(),
            http_method: None,
            request_timeout: None,
            request_body: None,
            auth_username: None,
            auth_password: None,
            maintenance_from: None,
            maintenance_to: None,
            maintenance_timezone: None,
            remember_cookies: None,
        }
    }

    /// Conditional requirements between parameters.
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str, because: &str| {
            Err(ReconcileError::InvalidInput(format!(
                "{because} but the following are missing: {field}"
            )))
        };

        let Some(kind) = self.monitor_type else {
            if self.state == State::Present {
                return missing("monitor_type", "state is present");
            }
            return Ok(());
        };

        let needs_port = matches!(kind, MonitorType::Tcp | MonitorType::Udp);
        let needs_keyword = matches!(
            kind,
            MonitorType::Udp | MonitorType::Keyword | MonitorType::KeywordAbsence
        );
        let because = format!("monitor_type is {}", kind.as_str());

        if needs_port && self.port.is_none() {
            return missing("port", &because);
        }
        if needs_keyword && self.required_keyword.is_none() {
            return missing("required_keyword", &because);
        }
        if kind == MonitorType::ExpectedStatusCode && self.expected_status_codes.is_none() {
            return missing("expected_status_codes", &because);
        }
        Ok(())
    }

    /// Natural key: URL, plus the port when one is desired.
    fn matches(&self, remote: &RemoteResource) -> bool {
        let same_url = remote.attributes.get("url").and_then(Value::as_str) == Some(self.url.as_str());
        let same_port = match &self.port {
            Some(port) => remote.attributes.get("port").and_then(scalar_text).as_ref() == Some(port),
            None => true,
        };
        same_url && same_port
    }
}

impl MonitorType {
    fn as_str(self) -> &'static str {
        match self {
            MonitorType::ExpectedStatusCode => "expected_status_code",
            MonitorType::Imap => "imap",
            MonitorType::Keyword => "keyword",
            MonitorType::KeywordAbsence => "keyword_absence",
            MonitorType::Ping => "ping",
            MonitorType::Pop => "pop",
            MonitorType::Smtp => "smtp",
            MonitorType::Status => "status",
            MonitorType::Tcp => "tcp",
            MonitorType::Udp => "udp",
        }
    }
}

/// Monitor reconciler against the Better Uptime monitors collection.
pub struct MonitorReconciler<'a> {
    client: &'a BetterUptime<'a>,
}

impl<'a> MonitorReconciler<'a> {
    pub fn new(client: &'a BetterUptime<'a>) -> Self {
        Self { client }
    }

    fn differ() -> AttributeDiffer {
        AttributeDiffer::new().field(
            "request_headers",
            FieldStrategy::Relational {
                compare: &["name", "value"],
            },
        )
    }
}

impl Reconciler for MonitorReconciler<'_> {
    type Spec = MonitorSpec;

    fn reconcile(&self, spec: &MonitorSpec) -> Result<Outcome> {
        spec.validate()?;
        info!("Reconciling monitor {}", spec.url);

        let mut desired = to_attributes(spec)?;
        let converger = self
            .client
            .converger("monitor", self.client.monitors())
            .with_differ(Self::differ());

        let remote = converger.locate(&self.client.monitors(), |m| spec.matches(m))?;

        if spec.state == State::Present
            && let Some(policy) = &spec.policy_name
        {
            let policy_id = self.client.policy_id_by_name(policy)?;
            desired.insert("policy_id".to_string(), Value::String(policy_id.to_string()));
        }

        let converged = converger.converge(spec.state, &desired, remote)?;
        Ok(converged.to_outcome("monitor"))
    }
}
