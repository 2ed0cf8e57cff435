//! Lazy iteration over multi-page list responses.

use std::collections::VecDeque;

use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::Value;

use airsdk_core::{AirError, Result};
use airsdk_transport::ApiResponse;

use crate::endpoint::EndpointClient;
use crate::model::Model;

/// One page of a list response.
///
/// Only `count`, `next` and `results` are consumed; `previous` and any
/// other envelope keys are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct Page {
    #[serde(default)]
    pub(crate) count: Option<u64>,
    #[serde(default)]
    pub(crate) next: Option<String>,
    pub(crate) results: Vec<Value>,
}

impl Page {
    pub(crate) fn from_response(response: ApiResponse) -> Result<Self> {
        let status = response.status;
        match response.body {
            // Some collections answer with a bare array; treat it as the only page.
            Some(Value::Array(results)) => Ok(Self {
                count: Some(results.len() as u64),
                next: None,
                results,
            }),
            Some(body @ Value::Object(_)) => serde_json::from_value(body).map_err(|e| {
                AirError::unexpected(Some(status), format!("malformed list page: {e}"))
            }),
            _ => Err(AirError::unexpected(Some(status), response.text)),
        }
    }
}

/// Lazy sequence of instances over a paginated list.
///
/// Pages are requested one at a time as the caller advances; a cursor that
/// is never advanced sends nothing. Iteration ends when the server reports
/// no `next` page or returns an empty one.
pub struct Cursor {
    endpoint: EndpointClient,
    filters: Vec<(String, String)>,
    page_size: usize,
    offset: usize,
    buffer: VecDeque<Value>,
    total: Option<u64>,
    exhausted: bool,
    pages_fetched: usize,
}

impl Cursor {
    pub(crate) fn new(
        endpoint: EndpointClient,
        filters: Vec<(String, String)>,
        page_size: usize,
    ) -> Self {
        Self::starting_at(endpoint, filters, page_size, 0)
    }

    pub(crate) fn starting_at(
        endpoint: EndpointClient,
        filters: Vec<(String, String)>,
        page_size: usize,
        offset: usize,
    ) -> Self {
        Self {
            endpoint,
            filters,
            page_size,
            offset,
            buffer: VecDeque::new(),
            total: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Next instance, fetching another page when the buffer runs dry.
    pub async fn try_next(&mut self) -> Result<Option<Model>> {
        loop {
            if let Some(value) = self.buffer.pop_front() {
                return self.endpoint.materialize(value).map(Some);
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        let page = self
            .endpoint
            .fetch_page(&self.filters, self.page_size, self.offset)
            .await?;
        self.pages_fetched += 1;
        if page.count.is_some() {
            self.total = page.count;
        }
        if page.next.is_none() || page.results.is_empty() {
            self.exhausted = true;
        }
        self.offset += page.results.len();
        self.buffer.extend(page.results);
        Ok(())
    }

    /// Server-reported total, known once the first page has been fetched.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Effective filters, scope included.
    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    /// Drain the cursor.
    pub async fn collect(mut self) -> Result<Vec<Model>> {
        let mut out = Vec::new();
        while let Some(model) = self.try_next().await? {
            out.push(model);
        }
        Ok(out)
    }

    /// First matching instance; fetches at most one page.
    pub async fn first(mut self) -> Result<Option<Model>> {
        self.try_next().await
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Model>> {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.try_next().await?.map(|model| (model, cursor)))
        })
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("endpoint", &self.endpoint)
            .field("filters", &self.filters)
            .field("page_size", &self.page_size)
            .field("offset", &self.offset)
            .field("buffered", &self.buffer.len())
            .field("total", &self.total)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
