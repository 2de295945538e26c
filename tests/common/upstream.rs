//! Fake upstream catalog API
//!
//! Wraps a wiremock server that answers `/integrations` and the paginated
//! `/servers` resource the way the real catalog API does.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Raw integration record as served by the upstream API
pub fn integration(slug: &str) -> Value {
    json!({
        "name": slug.to_uppercase(),
        "slug": slug,
        "url": format!("https://integrations.example.com/{}", slug),
    })
}

/// Raw server record linked to the given integration slugs
pub fn server_record(name: &str, slugs: &[&str]) -> Value {
    let integrations: Vec<Value> = slugs
        .iter()
        .map(|slug| json!({"slug": slug, "name": slug.to_uppercase()}))
        .collect();
    json!({
        "name": name,
        "url": format!("https://www.pulsemcp.com/servers/{}", name),
        "short_description": format!("The {} server", name),
        "github_stars": 42,
        "package_registry": "npm",
        "package_name": format!("@example/{}", name),
        "EXPERIMENTAL_ai_generated_description": null,
        "integrations": integrations,
    })
}

pub struct MockUpstream {
    server: MockServer,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Replaces whatever was served before with the given catalog, paginated
    /// by `page_size` servers.
    pub async fn serve_catalog(&self, integrations: &[Value], servers: &[Value], page_size: usize) {
        self.serve_catalog_with_delay(integrations, servers, page_size, Duration::ZERO)
            .await;
    }

    /// Like `serve_catalog`, every servers page answering after `delay`.
    pub async fn serve_catalog_with_delay(
        &self,
        integrations: &[Value],
        servers: &[Value],
        page_size: usize,
        delay: Duration,
    ) {
        self.server.reset().await;

        Mock::given(method("GET"))
            .and(path("/integrations"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "integrations": integrations })),
            )
            .mount(&self.server)
            .await;

        let pages: Vec<&[Value]> = if servers.is_empty() {
            vec![&[]]
        } else {
            servers.chunks(page_size).collect()
        };
        let page_count = pages.len();

        for (index, page) in pages.into_iter().enumerate() {
            let offset = index * page_size;
            let next = if index + 1 < page_count {
                json!(format!(
                    "{}/servers?offset={}&count_per_page={}",
                    self.server.uri(),
                    offset + page_size,
                    page_size
                ))
            } else {
                Value::Null
            };
            Mock::given(method("GET"))
                .and(path("/servers"))
                .and(query_param("offset", offset.to_string()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({ "servers": page, "next": next }))
                        .set_delay(delay),
                )
                .mount(&self.server)
                .await;
        }
    }

    /// Makes the servers page at `offset` fail, taking precedence over the
    /// served catalog.
    pub async fn fail_servers_page(&self, offset: usize, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Offsets of every `/servers` request received so far, in arrival order.
    pub async fn requested_offsets(&self) -> Vec<usize> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == "/servers")
            .filter_map(|request| {
                request
                    .url
                    .query_pairs()
                    .find(|(key, _)| key == "offset")
                    .and_then(|(_, value)| value.parse().ok())
            })
            .collect()
    }
}
