//! Shared pagination machinery under the query and scan iterators.

use std::collections::VecDeque;
use std::sync::Arc;
use store::{AttributeMap, QueryResponse, StoreClient};

/// A cursor-bearing request: the template re-sent for every page, with the
/// continuation key advanced between calls.
#[derive(Debug, Clone)]
pub(crate) enum PageRequest {
    Query(store::QueryRequest),
    Scan(store::ScanRequest),
}

impl PageRequest {
    fn set_cursor(&mut self, cursor: Option<AttributeMap>) {
        match self {
            PageRequest::Query(req) => req.exclusive_start_key = cursor,
            PageRequest::Scan(req) => req.exclusive_start_key = cursor,
        }
    }

    fn set_limit(&mut self, limit: Option<u64>) {
        match self {
            PageRequest::Query(req) => req.limit = limit,
            PageRequest::Scan(req) => req.limit = limit,
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            PageRequest::Query(req) => &req.table_name,
            PageRequest::Scan(req) => &req.table_name,
        }
    }

    async fn fetch(&self, client: &dyn StoreClient) -> store::Result<QueryResponse> {
        match self {
            PageRequest::Query(req) => client.query(req.clone()).await,
            PageRequest::Scan(req) => client.scan(req.clone()).await,
        }
    }
}

/// Pages drives one paginated RPC: each `next_page` call issues a single
/// request, advancing the cursor and aggregating counts and capacity.
pub(crate) struct Pages {
    client: Arc<dyn StoreClient>,
    request: PageRequest,
    /// Upper bound on items delivered across all pages.
    limit: Option<u64>,
    /// Per-request page size; combined with `limit` to clamp each RPC's
    /// Limit and avoid over-fetch.
    page_size: Option<u64>,
    delivered: u64,
    exhausted: bool,
    started: bool,
    count: u64,
    scanned_count: u64,
    consumed_capacity: f64,
    last_evaluated_key: Option<AttributeMap>,
}

impl Pages {
    pub fn new(
        client: Arc<dyn StoreClient>,
        request: PageRequest,
        limit: Option<u64>,
        page_size: Option<u64>,
    ) -> Self {
        Self {
            client,
            request,
            limit,
            page_size,
            delivered: 0,
            exhausted: false,
            started: false,
            count: 0,
            scanned_count: 0,
            consumed_capacity: 0.0,
            last_evaluated_key: None,
        }
    }

    pub async fn next_page(&mut self) -> Option<store::Result<Vec<AttributeMap>>> {
        if self.exhausted {
            return None;
        }

        // Clamp this request's Limit to the items still wanted.
        let remaining = self.limit.map(|limit| limit - self.delivered);
        let rpc_limit = match (self.page_size, remaining) {
            (Some(page), Some(rem)) => Some(page.min(rem)),
            (Some(page), None) => Some(page),
            (None, Some(rem)) => Some(rem),
            (None, None) => None,
        };
        self.request.set_limit(rpc_limit);

        self.started = true;
        let response = match self.request.fetch(self.client.as_ref()).await {
            Ok(response) => response,
            Err(err) => {
                self.exhausted = true;
                return Some(Err(err));
            }
        };

        tracing::trace!(
            table = %self.request.table_name(),
            items = response.items.len(),
            scanned = response.scanned_count,
            more = response.last_evaluated_key.is_some(),
            "fetched page",
        );

        self.count += response.items.len() as u64;
        self.scanned_count += response.scanned_count;
        if let Some(capacity) = &response.consumed_capacity {
            self.consumed_capacity += capacity.capacity_units.unwrap_or_default();
        }

        self.delivered += response.items.len() as u64;
        self.last_evaluated_key = response.last_evaluated_key.clone();
        self.request.set_cursor(response.last_evaluated_key);

        if self.last_evaluated_key.is_none() || matches!(self.limit, Some(l) if self.delivered >= l)
        {
            self.exhausted = true;
        }

        Some(Ok(response.items))
    }

    pub fn count(&self) -> u64 {
        self.count
    }
    pub fn scanned_count(&self) -> u64 {
        self.scanned_count
    }
    pub fn consumed_capacity(&self) -> f64 {
        self.consumed_capacity
    }
    pub fn last_evaluated_key(&self) -> Option<&AttributeMap> {
        self.last_evaluated_key.as_ref()
    }
    pub fn started(&self) -> bool {
        self.started
    }
}

/// Items flattens Pages into single items, tracking the key of the last
/// item handed out so resumption does not skip locally-buffered items.
pub(crate) struct Items {
    pub pages: Pages,
    buffer: VecDeque<AttributeMap>,
    last_yielded: Option<AttributeMap>,
}

impl Items {
    pub fn new(pages: Pages) -> Self {
        Self {
            pages,
            buffer: VecDeque::new(),
            last_yielded: None,
        }
    }

    pub async fn next(&mut self) -> Option<store::Result<AttributeMap>> {
        while self.buffer.is_empty() {
            match self.pages.next_page().await {
                Some(Ok(items)) => self.buffer.extend(items),
                Some(Err(err)) => return Some(Err(err)),
                None => return None,
            }
        }
        let item = self.buffer.pop_front().expect("buffer is non-empty");
        self.last_yielded = Some(item.clone());
        Some(Ok(item))
    }

    /// The continuation key: while items are buffered locally this is the
    /// key of the last yielded item, not the server's own cursor, so a
    /// capture-and-resume replays the buffered remainder.
    pub fn last_evaluated_key(&self, key_properties: &[String]) -> Option<AttributeMap> {
        if !self.buffer.is_empty() {
            return self.last_yielded.as_ref().map(|last| {
                last.iter()
                    .filter(|(name, _)| key_properties.contains(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            });
        }
        self.pages.last_evaluated_key().cloned()
    }
}
