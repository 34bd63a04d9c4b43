//! Clients for the upstream REST APIs.
//!
//! - [`http`]: the blocking HTTP capability and its reqwest implementation
//! - [`betteruptime`]: monitor, status page and status report endpoints
//! - [`flagsmith`]: project, feature, tag, segment and user-group endpoints

pub mod betteruptime;
pub mod flagsmith;
pub mod http;

pub use betteruptime::BetterUptime;
pub use flagsmith::Flagsmith;
pub use http::{HttpClient, HttpResponse, ReqwestClient};

use serde_json::Value;
use tracing::debug;

use crate::error::{ReconcileError, Result};

/// Authorization scheme sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>` (Better Uptime).
    Bearer,
    /// `Authorization: Token <token>` (Flagsmith admin API).
    Token,
    /// `Authorization: Api-Key <token>` (Flagsmith organisation API keys).
    ApiKey,
}

impl AuthScheme {
    fn header_value(self, token: &str) -> String {
        match self {
            AuthScheme::Bearer => format!("Bearer {token}"),
            AuthScheme::Token => format!("Token {token}"),
            AuthScheme::ApiKey => format!("Api-Key {token}"),
        }
    }
}

/// An [`HttpClient`] bound to one set of credentials.
pub struct ApiClient<'a> {
    http: &'a dyn HttpClient,
    headers: Vec<(String, String)>,
}

impl<'a> ApiClient<'a> {
    pub fn new(http: &'a dyn HttpClient, scheme: AuthScheme, token: &str) -> Self {
        let mut headers = vec![("Authorization".to_string(), scheme.header_value(token))];
        if scheme != AuthScheme::Bearer {
            headers.push(("Accept".to_string(), "application/json".to_string()));
        }
        Self { http, headers }
    }

    pub fn get(&self, url: &str) -> Result<HttpResponse> {
        debug!("GET {}", url);
        self.http.get(url, &self.headers)
    }

    pub fn post(&self, url: &str, body: &Value) -> Result<HttpResponse> {
        debug!("POST {}", url);
        self.http.post(url, &self.headers, body)
    }

    pub fn patch(&self, url: &str, body: &Value) -> Result<HttpResponse> {
        debug!("PATCH {}", url);
        self.http.patch(url, &self.headers, body)
    }

    pub fn delete(&self, url: &str) -> Result<HttpResponse> {
        debug!("DELETE {}", url);
        self.http.delete(url, &self.headers)
    }
}

/// Fail with [`ReconcileError::Upstream`] unless `response` has `expected` status.
pub fn expect_status(response: HttpResponse, expected: u16, action: &str) -> Result<HttpResponse> {
    if response.status == expected {
        Ok(response)
    } else {
        Err(ReconcileError::Upstream {
            action: action.to_string(),
            status: response.status,
            body: response.text,
        })
    }
}

/// Append query parameters to `base`, percent-encoding them.
pub fn with_query(base: &str, params: &[(&str, &str)]) -> Result<String> {
    reqwest::Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| ReconcileError::InvalidInput(format!("invalid URL {base}: {e}")))
}
