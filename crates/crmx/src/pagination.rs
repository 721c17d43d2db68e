//! 📚 Paginated fetching: draining `limit`/`offset` collections one page at a time.
//!
//! 🧠 Knowledge graph:
//! - [`Paginator::next_page`] is the primitive. It hands back `Some(Page)` while there
//!   is data and `None` once the collection (or the caller's cap) is exhausted. The
//!   end of a collection is a short page or an empty page. Nothing is thrown to
//!   break out of the loop.
//! - [`fetch_all`] / [`fetch_all_as`] drain everything for discovery scans where any
//!   error is fatal.
//! - Exports drive `next_page` themselves so a failure halfway keeps the pages already
//!   fetched and reports `offset()` as the place to resume.
//! - ⚠️ No dedup. If the source collection changes mid-scan, records can be skipped
//!   or repeated. Don't migrate a CRM while someone is still using it.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::{ApiClient, decode};
use crate::error::ApiError;

/// 📏 How to walk a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: usize,
    /// Stop after this many records in total.
    pub limit: Option<usize>,
    /// Start this far into the collection.
    pub offset: usize,
}

impl PageRequest {
    pub fn all(page_size: usize) -> Self {
        Self {
            page_size,
            limit: None,
            offset: 0,
        }
    }
}

/// 📦 One page worth of records plus the sentinel telling the caller whether to ask again.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub has_more: bool,
    /// Offset the next request would use.
    pub next_offset: usize,
}

/// 🚶 Walks one endpoint page by page.
#[derive(Debug)]
pub struct Paginator<'a> {
    client: &'a ApiClient,
    endpoint: String,
    page_size: usize,
    limit: Option<usize>,
    offset: usize,
    fetched: usize,
    exhausted: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a ApiClient, endpoint: impl Into<String>, request: PageRequest) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            page_size: request.page_size.max(1),
            limit: request.limit,
            offset: request.offset,
            fetched: 0,
            exhausted: false,
        }
    }

    /// 🧭 Where the next request would start. After a failure, this is the resume point.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub async fn next_page(&mut self) -> Result<Option<Page>, ApiError> {
        if self.exhausted {
            return Ok(None);
        }
        let batch = match self.limit {
            Some(limit) if self.fetched >= limit => {
                self.exhausted = true;
                return Ok(None);
            }
            Some(limit) => self.page_size.min(limit - self.fetched),
            None => self.page_size,
        };

        if self.client.is_cancelled() {
            // -- not exhausted: the same offset is where a resumed run picks up
            return Err(ApiError::Cancelled);
        }
        let path = page_path(&self.endpoint, batch, self.offset);
        debug!("📚 [{}] GET {}", self.client.label(), path);
        let value = self.client.get(&path).await?;
        let records: Vec<Value> = decode(&path, value)?;

        self.fetched += records.len();
        self.offset += records.len();

        let cap_reached = self.limit.is_some_and(|limit| self.fetched >= limit);
        let has_more = records.len() >= batch && !cap_reached;
        if !has_more {
            self.exhausted = true;
        }
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(Page {
            records,
            has_more,
            next_offset: self.offset,
        }))
    }
}

/// `/clients` → `/clients?limit=500&offset=0`; `/x?a=1` → `/x?a=1&limit=500&offset=0`
pub(crate) fn page_path(endpoint: &str, limit: usize, offset: usize) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}limit={limit}&offset={offset}")
}

/// 🔄 Drain an endpoint completely, in order.
pub async fn fetch_all(
    client: &ApiClient,
    endpoint: &str,
    request: PageRequest,
) -> Result<Vec<Value>, ApiError> {
    let mut paginator = Paginator::new(client, endpoint, request);
    let mut all_records = Vec::new();
    while let Some(page) = paginator.next_page().await? {
        all_records.extend(page.records);
    }
    Ok(all_records)
}

/// 🧩 [`fetch_all`], then decode every record into `T`.
pub async fn fetch_all_as<T: DeserializeOwned>(
    client: &ApiClient,
    endpoint: &str,
    request: PageRequest,
) -> Result<Vec<T>, ApiError> {
    let records = fetch_all(client, endpoint, request).await?;
    decode(endpoint, Value::Array(records))
}
