//! HTTP client for the upstream catalog API.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::error::{SyncError, SyncResult};
use crate::config::UpstreamSettings;

/// Where the raw catalog records come from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_integrations(&self) -> SyncResult<Vec<Value>>;
    async fn fetch_servers(&self) -> SyncResult<Vec<Value>>;
}

/// Returns whether a page response announces a following page.
///
/// The upstream reports the next page URL, older versions used a boolean.
/// Any other non-empty value counts as set.
pub fn has_next(page: &Value) -> bool {
    match page.get("next") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Extracts the records array of a response: either the body itself when it
/// is an array, or its `records_field`. A missing field yields no records.
fn extract_records(mut body: Value, records_field: &str) -> SyncResult<Vec<Value>> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(ref mut map) => match map.remove(records_field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err(SyncError::InvalidPayload(format!(
                "field '{}' is not an array",
                records_field
            ))),
        },
        _ => Err(SyncError::InvalidPayload(
            "response body is neither an object nor an array".to_string(),
        )),
    }
}

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    servers_page_size: usize,
    page_delay: Duration,
}

impl UpstreamClient {
    pub fn new(settings: &UpstreamSettings) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_sec))
            .build()?;

        // Paths are appended with a leading slash
        let base_url = settings.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            servers_page_size: settings.servers_page_size,
            page_delay: Duration::from_millis(settings.page_delay_ms),
        })
    }

    async fn get_json(&self, resource_path: &str, query: &[(&str, usize)]) -> SyncResult<Value> {
        let url = format!("{}{}", self.base_url, resource_path);
        debug!("GET {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::InvalidPayload(format!("{} did not return valid JSON: {}", url, e))
        })
    }

    /// Retrieves every page of a paginated collection, in offset order.
    ///
    /// Stops at the first page that does not announce a next one. Any failing
    /// page aborts the whole fetch.
    pub async fn fetch_all(
        &self,
        resource_path: &str,
        records_field: &str,
        page_size: usize,
    ) -> SyncResult<Vec<Value>> {
        let mut records = Vec::new();
        let mut offset = 0;
        let mut pages = 0;

        loop {
            if pages > 0 {
                tokio::time::sleep(self.page_delay).await;
            }

            let page = self
                .get_json(
                    resource_path,
                    &[("offset", offset), ("count_per_page", page_size)],
                )
                .await?;
            if !page.is_object() {
                return Err(SyncError::InvalidPayload(format!(
                    "page at offset {} of {} is not an object",
                    offset, resource_path
                )));
            }
            let more = has_next(&page);
            let page_records = extract_records(page, records_field)?;
            pages += 1;
            debug!(
                "Fetched {} {} at offset {}",
                page_records.len(),
                records_field,
                offset
            );
            records.extend(page_records);

            if !more {
                break;
            }
            offset += page_size;
        }

        info!(
            "Fetched {} {} records in {} pages",
            records.len(),
            records_field,
            pages
        );
        Ok(records)
    }

    /// Single request variant for collections served in one response.
    pub async fn fetch_one(&self, resource_path: &str, records_field: &str) -> SyncResult<Vec<Value>> {
        let body = self.get_json(resource_path, &[]).await?;
        let records = extract_records(body, records_field)?;
        info!("Fetched {} {} records", records.len(), records_field);
        Ok(records)
    }
}

#[async_trait]
impl CatalogSource for UpstreamClient {
    async fn fetch_integrations(&self) -> SyncResult<Vec<Value>> {
        self.fetch_one("/integrations", "integrations").await
    }

    async fn fetch_servers(&self) -> SyncResult<Vec<Value>> {
        self.fetch_all("/servers", "servers", self.servers_page_size)
            .await
    }
}
