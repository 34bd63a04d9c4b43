//! Shared test utilities for steady-core integration tests.
//!
//! [`MockHttp`] serves scripted responses per `(method, url)` in FIFO order
//! and records every call, so tests can assert exact request sequences.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use serde_json::{Value, json};
use steady_core::ReconcileError;
use steady_core::clients::http::Headers;
use steady_core::clients::{ApiClient, AuthScheme, BetterUptime, Flagsmith, HttpClient, HttpResponse};

pub const BU: &str = "https://bu.test/api/v2";
pub const FS: &str = "https://fs.test/api/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

#[derive(Default)]
pub struct MockHttp {
    routes: RefCell<HashMap<(Method, String), VecDeque<HttpResponse>>>,
    calls: RefCell<Vec<Call>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next `method` call to `url`.
    pub fn on(&self, method: Method, url: impl Into<String>, status: u16, body: Value) -> &Self {
        let body = if body.is_null() { None } else { Some(body) };
        self.routes
            .borrow_mut()
            .entry((method, url.into()))
            .or_default()
            .push_back(HttpResponse::new(status, body));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn calls_with(&self, method: Method) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.url == url)
            .count()
    }

    /// Body of the single `method` call to `url`.
    pub fn body_of(&self, method: Method, url: &str) -> Value {
        let matching: Vec<Call> = self
            .calls()
            .into_iter()
            .filter(|c| c.method == method && c.url == url)
            .collect();
        assert_eq!(matching.len(), 1, "expected one {method:?} {url}");
        matching[0].body.clone().unwrap_or(Value::Null)
    }

    /// Whether every queued response was consumed.
    pub fn exhausted(&self) -> bool {
        self.routes.borrow().values().all(VecDeque::is_empty)
    }

    fn serve(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> steady_core::Result<HttpResponse> {
        self.calls.borrow_mut().push(Call {
            method,
            url: url.to_string(),
            body: body.cloned(),
            headers: headers.to_vec(),
        });
        self.routes
            .borrow_mut()
            .get_mut(&(method, url.to_string()))
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ReconcileError::Transport(format!("unexpected {method:?} {url}")))
    }
}

impl HttpClient for MockHttp {
    fn get(&self, url: &str, headers: &Headers) -> steady_core::Result<HttpResponse> {
        self.serve(Method::Get, url, headers, None)
    }

    fn post(&self, url: &str, headers: &Headers, body: &Value) -> steady_core::Result<HttpResponse> {
        self.serve(Method::Post, url, headers, Some(body))
    }

    fn patch(&self, url: &str, headers: &Headers, body: &Value) -> steady_core::Result<HttpResponse> {
        self.serve(Method::Patch, url, headers, Some(body))
    }

    fn delete(&self, url: &str, headers: &Headers) -> steady_core::Result<HttpResponse> {
        self.serve(Method::Delete, url, headers, None)
    }
}

pub fn better_uptime(http: &MockHttp) -> BetterUptime<'_> {
    BetterUptime::new(ApiClient::new(http, AuthScheme::Bearer, "bu-token"), BU)
}

pub fn flagsmith(http: &MockHttp, scheme: AuthScheme) -> Flagsmith<'_> {
    Flagsmith::new(ApiClient::new(http, scheme, "fs-token"), FS)
}

/// A `{data, pagination}` page.
pub fn data_page(items: Vec<Value>, next: Option<&str>) -> Value {
    json!({"data": items, "pagination": {"next": next}})
}

/// A `{results, next}` page.
pub fn results_page(items: Vec<Value>, next: Option<&str>) -> Value {
    json!({"count": items.len(), "results": items, "next": next, "previous": null})
}

/// A JSON:API item.
pub fn item(id: &str, kind: &str, attributes: Value) -> Value {
    json!({"id": id, "type": kind, "attributes": attributes})
}

/// `{"data": item}` creation response.
pub fn created(id: &str, kind: &str) -> Value {
    json!({"data": item(id, kind, json!({}))})
}
