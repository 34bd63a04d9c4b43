//! Cursor-linked page traversal.
//!
//! The two APIs use three listing envelopes, see [`PageShape`]. Traversal is
//! an iterative loop over the `next` cursor: one request per page, never
//! re-requesting a URL already visited.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::{ApiClient, expect_status};
use crate::error::{ReconcileError, Result};

/// Listing envelope of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageShape {
    /// `{"data": [..], "pagination": {"next": url | null}}`
    DataPagination,
    /// `{"results": [..], "next": url | null}`
    ResultsNext,
    /// A bare array; the listing is a single page.
    BareArray,
}

/// One decoded listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<String>,
}

impl PageShape {
    pub fn decode(self, url: &str, body: Option<&Value>) -> Result<Page> {
        let body = body.ok_or_else(|| ReconcileError::decode(url, "empty listing body"))?;
        let (items, next) = match self {
            PageShape::DataPagination => (
                body.get("data"),
                body.get("pagination").and_then(|p| p.get("next")),
            ),
            PageShape::ResultsNext => (body.get("results"), body.get("next")),
            PageShape::BareArray => (Some(body), None),
        };

        let items = items
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| ReconcileError::decode(url, format!("{self:?} listing without items")))?;
        let next = next
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(Page { items, next })
    }
}

/// Walks a paginated listing.
pub struct Paginator<'a> {
    api: &'a ApiClient<'a>,
    shape: PageShape,
}

impl<'a> Paginator<'a> {
    pub fn new(api: &'a ApiClient<'a>, shape: PageShape) -> Self {
        Self { api, shape }
    }

    fn fetch(&self, url: &str) -> Result<Page> {
        let response = expect_status(self.api.get(url)?, 200, &format!("listing {url}"))?;
        let page = self.shape.decode(url, response.body.as_ref())?;
        debug!("Fetched page {} ({} items)", url, page.items.len());
        Ok(page)
    }

    /// Visit pages in order until `visit` returns `false` or the cursor runs out.
    fn walk(
        &self,
        start_url: &str,
        mut visit: impl FnMut(Page) -> bool,
    ) -> Result<()> {
        let mut visited = HashSet::new();
        let mut url = start_url.to_string();
        loop {
            let page = self.fetch(&url)?;
            visited.insert(url);
            let next = page.next.clone();
            if !visit(page) {
                return Ok(());
            }
            match next {
                Some(next) if visited.contains(&next) => {
                    warn!("Pagination cursor points back to {}, stopping", next);
                    return Ok(());
                }
                Some(next) => url = next,
                None => return Ok(()),
            }
        }
    }

    /// First item matching `predicate`, in listing order.
    ///
    /// Any non-200 page is an error: callers use this where absence of the
    /// item is meaningful.
    pub fn find_first(
        &self,
        start_url: &str,
        mut predicate: impl FnMut(&Value) -> bool,
    ) -> Result<Option<Value>> {
        let mut found = None;
        self.walk(start_url, |page| {
            found = page.items.into_iter().find(|item| predicate(item));
            found.is_none()
        })?;
        Ok(found)
    }

    /// Every item of every page, in page order.
    pub fn collect_all(&self, start_url: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        self.walk(start_url, |page| {
            items.extend(page.items);
            true
        })?;
        Ok(items)
    }

    /// Items matching `predicate`, stopping once `wanted` matches are found.
    ///
    /// Batch lookups tolerate API errors: any failing page aborts the
    /// traversal and yields an empty result, leaving the caller to report
    /// the missing keys.
    pub fn collect_matching(
        &self,
        start_url: &str,
        wanted: usize,
        mut predicate: impl FnMut(&Value) -> bool,
    ) -> Vec<Value> {
        let mut matches = Vec::new();
        let walked = self.walk(start_url, |page| {
            matches.extend(page.items.into_iter().filter(|item| predicate(item)));
            matches.len() < wanted
        });

        match walked {
            Ok(()) => matches,
            Err(e) => {
                warn!("Batch lookup at {} failed: {}", start_url, e);
                Vec::new()
            }
        }
    }
}
