//! HTTP client for end-to-end tests
//!
//! Thin wrapper around reqwest with one method per mirror endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Sync Endpoints
    // ========================================================================

    /// POST /download
    pub async fn download(&self) -> Response {
        self.client
            .post(format!("{}/download", self.base_url))
            .send()
            .await
            .expect("Download request failed")
    }

    /// GET /sync/status
    pub async fn get_sync_status(&self) -> Value {
        self.get_json("/sync/status").await
    }

    // ========================================================================
    // Read Endpoints
    // ========================================================================

    /// GET /
    pub async fn get_home(&self) -> Value {
        self.get_json("/").await
    }

    /// GET /integrations
    pub async fn get_integrations(&self) -> Value {
        self.get_json("/integrations").await
    }

    /// GET /servers?offset=..&count_per_page=..
    pub async fn get_servers(&self, offset: usize, count_per_page: usize) -> Response {
        self.client
            .get(format!("{}/servers", self.base_url))
            .query(&[("offset", offset), ("count_per_page", count_per_page)])
            .send()
            .await
            .expect("Servers request failed")
    }

    /// GET /servers/{name}
    pub async fn get_server(&self, name: &str) -> Response {
        self.client
            .get(format!("{}/servers/{}", self.base_url, name))
            .send()
            .await
            .expect("Server request failed")
    }

    /// Every server in the mirror, walking the pagination to the end.
    pub async fn get_all_servers(&self, count_per_page: usize) -> Vec<Value> {
        let mut servers = Vec::new();
        let mut offset = 0;
        loop {
            let page: Value = self
                .get_servers(offset, count_per_page)
                .await
                .json()
                .await
                .expect("Invalid servers page");
            servers.extend(page["servers"].as_array().cloned().unwrap_or_default());
            if page["next"] != true {
                return servers;
            }
            offset += count_per_page;
        }
    }

    async fn get_json(&self, route: &str) -> Value {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, route))
            .send()
            .await
            .expect("Request failed");
        assert!(
            response.status().is_success(),
            "GET {} returned {}",
            route,
            response.status()
        );
        response.json().await.expect("Invalid JSON response")
    }
}
