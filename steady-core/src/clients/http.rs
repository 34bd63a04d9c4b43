//! HTTP capability consumed by every reconciler.

use serde_json::Value;
use tracing::debug;

use crate::error::{ReconcileError, Result};

/// Request headers as `(name, value)` pairs.
pub type Headers = [(String, String)];

/// Status and decoded body of an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// JSON body, `None` when the body is empty or not JSON.
    pub body: Option<Value>,
    /// Raw body text, kept for error reporting.
    pub text: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        let text = body.as_ref().map(Value::to_string).unwrap_or_default();
        Self { status, body, text }
    }
}

/// Minimal blocking HTTP client.
///
/// URLs are fully qualified. Timeouts and retries are the implementor's
/// concern; callers assume a reliable transport.
pub trait HttpClient {
    fn get(&self, url: &str, headers: &Headers) -> Result<HttpResponse>;

    fn post(&self, url: &str, headers: &Headers, body: &Value) -> Result<HttpResponse>;

    fn patch(&self, url: &str, headers: &Headers, body: &Value) -> Result<HttpResponse>;

    fn delete(&self, url: &str, headers: &Headers) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by a blocking reqwest client.
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(concat!("steady/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReconcileError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }

    fn send(
        &self,
        request: reqwest::blocking::RequestBuilder,
        headers: &Headers,
    ) -> Result<HttpResponse> {
        let request = headers
            .iter()
            .fold(request, |req, (name, value)| req.header(name, value));
        let response = request
            .send()
            .map_err(|e| ReconcileError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ReconcileError::Transport(e.to_string()))?;
        let body = serde_json::from_str(&text).ok();
        debug!("HTTP {} ({} bytes)", status, text.len());

        Ok(HttpResponse { status, body, text })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &Headers) -> Result<HttpResponse> {
        self.send(self.inner.get(url), headers)
    }

    fn post(&self, url: &str, headers: &Headers, body: &Value) -> Result<HttpResponse> {
        self.send(self.inner.post(url).json(body), headers)
    }

    fn patch(&self, url: &str, headers: &Headers, body: &Value) -> Result<HttpResponse> {
        self.send(self.inner.patch(url).json(body), headers)
    }

    fn delete(&self, url: &str, headers: &Headers) -> Result<HttpResponse> {
        self.send(self.inner.delete(url), headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_mirrors_body() {
        let resp = HttpResponse::new(201, Some(json!({"id": 3})));
        assert_eq!(resp.text, r#"{"id":3}"#);
        assert_eq!(HttpResponse::new(204, None).text, "");
    }
}
