//! Adapter for the secondary page store.
//!
//! Records live as pages in one database. Listing is cursor-paginated with
//! `start_cursor`/`next_cursor`; writes go through the pages endpoint. Field
//! translation is delegated to a [`SchemaMapping`].

use crate::adapter::{Fetched, StoreAdapter};
use crate::error::{StoreError, StoreResult};
use crate::http::{HttpClient, HttpRequest};
use crate::mapping::SchemaMapping;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tandem_protocol::{Fingerprint, Record, Side};
use tracing::{debug, warn};

/// Largest page the store will return per query.
pub const MAX_PAGE_SIZE: usize = 100;

/// Connection settings for [`SecondaryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryConfig {
    /// API root, e.g. `https://api.notion.com/v1`.
    pub api_url: String,
    /// Integration token.
    pub token: String,
    /// Database holding the pages.
    pub database_id: String,
    /// Value of the `Notion-Version` header.
    pub api_version: String,
    /// Pages per query, capped at [`MAX_PAGE_SIZE`].
    pub page_size: usize,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
}

impl SecondaryConfig {
    /// Creates settings against the public API root.
    pub fn new(token: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            api_url: "https://api.notion.com/v1".to_string(),
            token: token.into(),
            database_id: database_id.into(),
            api_version: "2022-06-28".to_string(),
            page_size: MAX_PAGE_SIZE,
            page_delay: Duration::ZERO,
        }
    }

    /// Overrides the API root.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the API version header.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Sets the pause between page requests.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }
}

/// One page of a database query.
#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Secondary store adapter.
pub struct SecondaryStore<C: HttpClient> {
    client: C,
    config: SecondaryConfig,
    mapping: SchemaMapping,
    retry: RetryPolicy,
}

impl<C: HttpClient> SecondaryStore<C> {
    /// Creates an adapter with the default mapping and retry policy.
    pub fn new(client: C, config: SecondaryConfig) -> Self {
        Self {
            client,
            config,
            mapping: SchemaMapping::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the schema mapping.
    pub fn with_mapping(mut self, mapping: SchemaMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The schema mapping in use.
    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    /// Translates a record into page properties.
    pub fn record_to_native(&self, record: &Record) -> StoreResult<Map<String, Value>> {
        Ok(self.mapping.record_to_native(record)?)
    }

    /// Translates a page object into a record.
    pub fn native_to_record(&self, page: &Value) -> StoreResult<Record> {
        Ok(self.mapping.native_to_record(page)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_url)
    }

    fn send(&self, request: HttpRequest) -> StoreResult<Value> {
        let request = request
            .bearer(&self.config.token)
            .header("Notion-Version", &self.config.api_version);
        self.client.execute(&request)?.error_for_status()?.json()
    }

    fn query(&self, body: Value) -> StoreResult<QueryPage> {
        let url = self.url(&format!("databases/{}/query", self.config.database_id));
        let page = self.send(HttpRequest::post(url, body))?;
        serde_json::from_value(page).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl<C: HttpClient> StoreAdapter for SecondaryStore<C> {
    fn side(&self) -> Side {
        Side::Secondary
    }

    fn probe(&self) -> StoreResult<()> {
        let url = self.url(&format!("databases/{}", self.config.database_id));
        self.retry
            .run("probe secondary", || self.send(HttpRequest::get(&url)))?;
        Ok(())
    }

    fn fetch_all(&self) -> StoreResult<Fetched> {
        let mut fetched = Fetched::default();
        let mut cursor: Option<String> = None;
        let mut page = 1;

        loop {
            let mut body = json!({ "page_size": self.config.page_size.min(MAX_PAGE_SIZE) });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }
            let result = self
                .retry
                .run(&format!("fetch page {page}"), || self.query(body.clone()))?;
            debug!(page, pages = result.results.len(), "fetched secondary page");

            for item in &result.results {
                if item.get("archived").and_then(Value::as_bool) == Some(true) {
                    continue;
                }
                match self.mapping.native_to_record(item) {
                    Ok(record) => fetched.records.push(record),
                    Err(err) => {
                        warn!(item = %err.item, reason = %err.reason, "skipping secondary page");
                        fetched.skipped.push(err);
                    }
                }
            }

            match result.next_cursor {
                Some(next) if result.has_more => cursor = Some(next),
                _ => break,
            }
            page += 1;
            if !self.config.page_delay.is_zero() {
                std::thread::sleep(self.config.page_delay);
            }
        }

        Ok(fetched)
    }

    fn upsert(&self, record: &Record) -> StoreResult<Record> {
        let properties = Value::Object(self.record_to_native(record)?);
        let page = match &record.secondary_id {
            Some(page_id) => {
                let url = self.url(&format!("pages/{page_id}"));
                let body = json!({ "properties": properties });
                self.retry.run(&format!("update page {page_id}"), || {
                    self.send(HttpRequest::patch(&url, body.clone()))
                })?
            }
            None => {
                let url = self.url("pages");
                let body = json!({
                    "parent": { "database_id": self.config.database_id },
                    "properties": properties,
                });
                self.retry
                    .run_if("create page", StoreError::is_rate_limited, || {
                        self.send(HttpRequest::post(&url, body.clone()))
                    })?
            }
        };
        self.native_to_record(&page)
    }

    fn mark_linked(&self, record_id: &str, counterpart_id: &str) -> StoreResult<bool> {
        let url = self.url(&format!("pages/{record_id}"));
        let body = json!({ "properties": self.mapping.link_properties(counterpart_id) });
        let result = self.retry.run(&format!("link page {record_id}"), || {
            self.send(HttpRequest::patch(&url, body.clone()))
        });
        match result {
            Ok(_) => Ok(true),
            Err(StoreError::Status { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn set_fingerprint(&self, record_id: &str, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let properties = self.mapping.fingerprint_properties(fingerprint);
        if properties.is_empty() {
            return Ok(false);
        }
        let url = self.url(&format!("pages/{record_id}"));
        let body = json!({ "properties": properties });
        let result = self.retry.run(&format!("fingerprint page {record_id}"), || {
            self.send(HttpRequest::patch(&url, body.clone()))
        });
        match result {
            Ok(_) => Ok(true),
            Err(StoreError::Status { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Record>> {
        let Some(filter) = self.mapping.fingerprint_filter(fingerprint) else {
            return Ok(None);
        };
        let body = json!({ "filter": filter, "page_size": 1 });
        let result = self
            .retry
            .run("find page by fingerprint", || self.query(body.clone()))?;
        match result.results.first() {
            Some(page) => Ok(Some(self.native_to_record(page)?)),
            None => Ok(None),
        }
    }
}
