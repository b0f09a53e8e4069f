//! Adapter for the primary relational store.
//!
//! The primary store is a table exposed over a PostgREST-style API: rows are
//! read with `offset`/`limit` ranges ordered by creation time, written with
//! `POST`/`PATCH`, and filtered with `column=eq.value` query parameters.

use crate::adapter::{Fetched, StoreAdapter};
use crate::error::{StoreError, StoreResult, TranslationError};
use crate::http::{HttpClient, HttpRequest};
use crate::retry::RetryPolicy;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tandem_protocol::{parse_date, parse_timestamp, Fingerprint, Record, Side};
use tracing::{debug, warn};

/// Column holding the record text.
pub const TEXT_COLUMN: &str = "decision";
/// Column holding the category.
pub const CATEGORY_COLUMN: &str = "type";
/// Column holding the effective date.
pub const DATE_COLUMN: &str = "date";
/// Column holding the stored fingerprint.
pub const FINGERPRINT_COLUMN: &str = "checksum";
/// Column holding the secondary page id.
pub const LINK_COLUMN: &str = "notion_page_id";
/// Column holding the link flag.
pub const LINKED_COLUMN: &str = "notion_synced";

/// Connection settings for [`PrimaryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryConfig {
    /// Project URL, without the `/rest/v1` suffix.
    pub base_url: String,
    /// Service key sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Table holding the records.
    pub table: String,
    /// Rows per page.
    pub page_size: usize,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
}

impl PrimaryConfig {
    /// Creates settings with a page size of 100 and no inter-page pause.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            page_size: 100,
            page_delay: Duration::ZERO,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the pause between page requests.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

/// Primary store adapter.
pub struct PrimaryStore<C: HttpClient> {
    client: C,
    config: PrimaryConfig,
    retry: RetryPolicy,
}

impl<C: HttpClient> PrimaryStore<C> {
    /// Creates an adapter with the default retry policy.
    pub fn new(client: C, config: PrimaryConfig) -> Self {
        Self {
            client,
            config,
            retry: RetryPolicy::default(),
        }
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

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("apikey", &self.config.api_key)
            .bearer(&self.config.api_key)
            .header("Accept", "application/json")
    }

    fn send_rows(&self, request: HttpRequest) -> StoreResult<Vec<Value>> {
        let request = self.authorize(request);
        self.client.execute(&request)?.error_for_status()?.json()
    }

    fn first_record(&self, rows: Vec<Value>) -> StoreResult<Option<Record>> {
        match rows.first() {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }
}

impl<C: HttpClient> StoreAdapter for PrimaryStore<C> {
    fn side(&self) -> Side {
        Side::Primary
    }

    fn probe(&self) -> StoreResult<()> {
        let url = format!("{}?select=id&limit=1", self.config.table_url());
        self.retry
            .run("probe primary", || self.send_rows(HttpRequest::get(&url)))?;
        Ok(())
    }

    fn fetch_all(&self) -> StoreResult<Fetched> {
        let page_size = self.config.page_size;
        let mut fetched = Fetched::default();
        let mut offset = 0;
        let mut page = 1;

        loop {
            let url = format!(
                "{}?select=*&order=created_at.asc,id.asc&offset={offset}&limit={page_size}",
                self.config.table_url()
            );
            let rows = self.retry.run(&format!("fetch page {page}"), || {
                self.send_rows(HttpRequest::get(&url))
            })?;
            let count = rows.len();
            debug!(page, rows = count, "fetched primary page");

            for row in &rows {
                match row_to_record(row) {
                    Ok(record) => fetched.records.push(record),
                    Err(err) => {
                        warn!(item = %err.item, reason = %err.reason, "skipping primary row");
                        fetched.skipped.push(err);
                    }
                }
            }

            if count < page_size {
                break;
            }
            offset += count;
            page += 1;
            if !self.config.page_delay.is_zero() {
                std::thread::sleep(self.config.page_delay);
            }
        }

        Ok(fetched)
    }

    fn upsert(&self, record: &Record) -> StoreResult<Record> {
        let body = Value::Object(record_to_row(record));
        let rows = match &record.primary_id {
            Some(id) => {
                let url = format!("{}?id=eq.{id}", self.config.table_url());
                self.retry.run(&format!("update row {id}"), || {
                    self.send_rows(
                        HttpRequest::patch(&url, body.clone())
                            .header("Prefer", "return=representation"),
                    )
                })?
            }
            None => {
                let url = self.config.table_url();
                // An insert that timed out may have landed; only a rejected
                // call is safe to repeat.
                self.retry
                    .run_if("insert row", StoreError::is_rate_limited, || {
                        self.send_rows(
                            HttpRequest::post(&url, body.clone())
                                .header("Prefer", "return=representation"),
                        )
                    })?
            }
        };

        match self.first_record(rows)? {
            Some(stored) => Ok(stored),
            None => Err(StoreError::Status {
                status: 404,
                body: format!("no row with id {}", record.label()),
            }),
        }
    }

    fn mark_linked(&self, record_id: &str, counterpart_id: &str) -> StoreResult<bool> {
        let url = format!("{}?id=eq.{record_id}&select=id", self.config.table_url());
        let body = json!({ LINK_COLUMN: counterpart_id, LINKED_COLUMN: true });
        let rows = self.retry.run(&format!("link row {record_id}"), || {
            self.send_rows(
                HttpRequest::patch(&url, body.clone()).header("Prefer", "return=representation"),
            )
        })?;
        Ok(!rows.is_empty())
    }

    fn set_fingerprint(&self, record_id: &str, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let url = format!("{}?id=eq.{record_id}&select=id", self.config.table_url());
        let body = json!({ FINGERPRINT_COLUMN: fingerprint.as_str() });
        let rows = self.retry.run(&format!("fingerprint row {record_id}"), || {
            self.send_rows(
                HttpRequest::patch(&url, body.clone()).header("Prefer", "return=representation"),
            )
        })?;
        Ok(!rows.is_empty())
    }

    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Record>> {
        let url = format!(
            "{}?select=*&{FINGERPRINT_COLUMN}=eq.{}&limit=1",
            self.config.table_url(),
            fingerprint.as_str()
        );
        let rows = self
            .retry
            .run("find row by fingerprint", || self.send_rows(HttpRequest::get(&url)))?;
        self.first_record(rows)
    }
}

/// Builds the JSON row written on insert or update.
///
/// `updated_at` is left to the database, which stamps it on every write;
/// the stored value is read back from the returned representation.
pub fn record_to_row(record: &Record) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert(TEXT_COLUMN.into(), json!(record.text));
    row.insert(CATEGORY_COLUMN.into(), json!(record.category));
    row.insert(
        DATE_COLUMN.into(),
        match record.effective_date {
            Some(date) => json!(date.format("%Y-%m-%d").to_string()),
            None => Value::Null,
        },
    );
    row.insert(
        FINGERPRINT_COLUMN.into(),
        json!(record.content_fingerprint().as_str()),
    );
    if let Some(page_id) = &record.secondary_id {
        row.insert(LINK_COLUMN.into(), json!(page_id));
    }
    row.insert(LINKED_COLUMN.into(), json!(record.secondary_id.is_some()));
    row
}

/// Parses one JSON row into a `Record`.
pub fn row_to_record(row: &Value) -> Result<Record, TranslationError> {
    let id = match row.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(TranslationError::new("<unknown row>", "row has no id")),
    };
    let counterpart = optional_str(row, LINK_COLUMN)
        .ok()
        .flatten()
        .filter(|page_id| !page_id.is_empty());
    let fail = |reason: String| {
        TranslationError::new(&id, reason).with_counterpart(counterpart.clone())
    };

    let text = optional_str(row, TEXT_COLUMN).map_err(&fail)?;
    let category = optional_str(row, CATEGORY_COLUMN).map_err(&fail)?;
    let effective_date = match optional_str(row, DATE_COLUMN).map_err(&fail)? {
        Some(date) if !date.is_empty() => Some(
            parse_date(&date).ok_or_else(|| fail(format!("invalid date {date:?}")))?,
        ),
        _ => None,
    };
    let updated_at = match optional_str(row, "updated_at").map_err(&fail)? {
        Some(stamp) => Some(
            parse_timestamp(&stamp).ok_or_else(|| fail(format!("invalid timestamp {stamp:?}")))?,
        ),
        None => None,
    };
    let linked = match row.get(LINKED_COLUMN) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => return Err(fail(format!("{LINKED_COLUMN} is not a boolean: {other}"))),
    };
    let fingerprint = optional_str(row, FINGERPRINT_COLUMN)
        .map_err(&fail)?
        .and_then(|hex| Fingerprint::from_hex(&hex));

    Ok(Record {
        primary_id: Some(id.clone()),
        secondary_id: counterpart.clone(),
        text: text.unwrap_or_default(),
        category: category.unwrap_or_default(),
        effective_date,
        fingerprint,
        linked,
        updated_at,
    })
}

fn optional_str(row: &Value, column: &str) -> Result<Option<String>, String> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(format!("{column} is not a string: {other}")),
    }
}
