//! Lazy page-by-page walking of paginated REST endpoints.
//!
//! Two conventions are supported:
//! - GitHub style: the `Link` response header carries a `rel="next"` URL.
//! - ecosyste.ms style: `page`/`per_page` query parameters with a
//!   `total-pages` response header.
//!
//! The walker never retries; a failed fetch ends the walk. Retrying is the
//! client's job.

use crate::error::{CrawlError, Result};
use crate::http::client::RateLimitedClient;
use crate::logger;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use url::Url;

pub const TOTAL_PAGES: &str = "total-pages";
pub const TOTAL_COUNT: &str = "total-count";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaginationStyle {
    /// Follow `Link: <...>; rel="next"` until absent.
    LinkHeader,
    /// Increment `page` until `total-pages`, an empty page, or (without the
    /// header) a short page.
    PageNumber { per_page: u32 },
}

/// Finite, non-restartable sequence of pages.
pub struct PageWalker<T> {
    client: RateLimitedClient,
    style: PaginationStyle,
    base_url: String,
    next_url: Option<String>,
    page: u32,
    items_key: Option<String>,
    total_count: Option<u64>,
    total_pages: Option<u64>,
    pages_fetched: u32,
    finished: bool,
    _item: PhantomData<T>,
}

impl<T: DeserializeOwned> PageWalker<T> {
    pub fn new(client: RateLimitedClient, url: impl Into<String>, style: PaginationStyle) -> Self {
        let url = url.into();
        Self {
            client,
            style,
            next_url: Some(url.clone()),
            base_url: url,
            page: 1,
            items_key: None,
            total_count: None,
            total_pages: None,
            pages_fetched: 0,
            finished: false,
            _item: PhantomData,
        }
    }

    /// Read items from `body[key]` instead of a top-level array
    /// (e.g. GitHub search's `{"items": [...]}`).
    pub fn with_items_key(mut self, key: impl Into<String>) -> Self {
        self.items_key = Some(key.into());
        self
    }

    /// `total-count` reported by the most recent page.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// `total-pages` reported by the most recent page.
    pub fn total_pages(&self) -> Option<u64> {
        self.total_pages
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Fetch the next page. `Ok(None)` once the walk is over.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.finished {
            return Ok(None);
        }

        let url = match self.style {
            PaginationStyle::LinkHeader => match self.next_url.take() {
                Some(url) => url,
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            },
            PaginationStyle::PageNumber { per_page } => {
                with_page(&self.base_url, self.page, per_page)?
            }
        };

        let response = match self.client.fetch(&url, &[]).await {
            Ok(r) => r,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };
        self.pages_fetched += 1;
        self.total_count = response.header_u64(TOTAL_COUNT).or(self.total_count);
        self.total_pages = response.header_u64(TOTAL_PAGES).or(self.total_pages);

        let items = match self.extract_items(&url, &response.body) {
            Ok(items) => items,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };
        if items.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        match self.style {
            PaginationStyle::LinkHeader => {
                self.next_url = response.next_link();
                if self.next_url.is_none() {
                    self.finished = true;
                }
            }
            PaginationStyle::PageNumber { per_page } => {
                let last = match response.header_u64(TOTAL_PAGES) {
                    Some(total) => u64::from(self.page) >= total,
                    None => items.len() < per_page as usize,
                };
                if last {
                    self.finished = true;
                } else {
                    self.page += 1;
                }
            }
        }

        Ok(Some(items))
    }

    /// Drain every page; the first error aborts the whole walk.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    /// Drain every page, stopping at the first error and returning what was
    /// gathered so far.
    pub async fn collect_partial(mut self) -> Vec<T> {
        let mut all = Vec::new();
        loop {
            match self.next_page().await {
                Ok(Some(items)) => all.extend(items),
                Ok(None) => break,
                Err(e) => {
                    logger::warn(&format!(
                        "Stopping walk of {} after {} pages: {}",
                        self.base_url, self.pages_fetched, e
                    ));
                    break;
                }
            }
        }
        all
    }

    fn extract_items(&self, url: &str, body: &Value) -> Result<Vec<T>> {
        let list = match &self.items_key {
            Some(key) => body.get(key),
            None => Some(body),
        };
        match list {
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| {
                    T::deserialize(v).map_err(|e| {
                        CrawlError::Parse(format!("unexpected item from {}: {}", url, e))
                    })
                })
                .collect(),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(_) => Err(CrawlError::Parse(format!(
                "expected a list of items from {}",
                url
            ))),
        }
    }
}

/// Extract the `rel="next"` URL from a `Link` header value.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|p| {
            let p = p.trim();
            p == r#"rel="next""# || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        let url = target.trim_start_matches('<').trim_end_matches('>');
        (!url.is_empty()).then(|| url.to_string())
    })
}

/// `url` with `page`/`per_page` set, replacing any existing values.
pub fn with_page(url: &str, page: u32, per_page: u32) -> Result<String> {
    let mut parsed =
        Url::parse(url).map_err(|e| CrawlError::Parse(format!("invalid URL {}: {}", url, e)))?;
    let retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "page" && k != "per_page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        for (k, v) in &retained {
            query.append_pair(k, v);
        }
        query.append_pair("page", &page.to_string());
        query.append_pair("per_page", &per_page.to_string());
    }
    Ok(parsed.into())
}
