//! Maps raw upstream records to catalog entities.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::error::{SyncError, SyncResult};
use crate::mirror_store::{CatalogSnapshot, Integration, Server};

#[derive(Deserialize)]
struct RawIntegration {
    name: String,
    slug: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawIntegrationRef {
    slug: String,
}

#[derive(Deserialize)]
struct RawServer {
    name: String,
    url: Option<String>,
    external_url: Option<String>,
    short_description: Option<String>,
    source_code_url: Option<String>,
    github_stars: Option<Value>,
    package_registry: Option<String>,
    package_name: Option<String>,
    package_download_count: Option<Value>,
    #[serde(rename = "EXPERIMENTAL_ai_generated_description")]
    experimental_ai_generated_description: Option<String>,
    integrations: Option<Vec<RawIntegrationRef>>,
}

impl From<RawIntegration> for Integration {
    fn from(raw: RawIntegration) -> Self {
        Integration {
            name: raw.name,
            slug: raw.slug,
            url: raw.url,
        }
    }
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64)
        .then_some(value as i64)
}

/// Reads an optional counter the way SQLite INTEGER affinity would: integers,
/// integral floats and numeric strings are kept, anything else is dropped.
fn lenient_integer(server: &str, field: &str, value: Option<Value>) -> Option<i64> {
    let parsed = match &value {
        None | Some(Value::Null) => return None,
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        Some(_) => None,
    };
    if parsed.is_none() {
        if let Some(value) = &value {
            warn!(
                "Server '{}': ignoring non-integer {} value {}",
                server, field, value
            );
        }
    }
    parsed
}

impl From<RawServer> for Server {
    fn from(raw: RawServer) -> Self {
        let github_stars = lenient_integer(&raw.name, "github_stars", raw.github_stars);
        let package_download_count =
            lenient_integer(&raw.name, "package_download_count", raw.package_download_count);
        Server {
            name: raw.name,
            url: raw.url,
            external_url: raw.external_url,
            short_description: raw.short_description,
            source_code_url: raw.source_code_url,
            github_stars,
            package_registry: raw.package_registry,
            package_name: raw.package_name,
            package_download_count,
            experimental_ai_generated_description: raw.experimental_ai_generated_description,
            integration_slugs: raw
                .integrations
                .unwrap_or_default()
                .into_iter()
                .map(|i| i.slug)
                .collect(),
        }
    }
}

fn parse_records<R, T>(kind: &'static str, records: &[Value]) -> SyncResult<Vec<T>>
where
    R: DeserializeOwned,
    T: From<R>,
{
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            if !record.is_object() {
                return Err(SyncError::InvalidRecord {
                    kind,
                    index,
                    reason: "not a JSON object".to_string(),
                });
            }
            R::deserialize(record)
                .map(T::from)
                .map_err(|e| SyncError::InvalidRecord {
                    kind,
                    index,
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Builds the snapshot to persist. Slug references are not checked here, the
/// store's foreign keys reject dangling ones.
pub fn normalize(raw_integrations: &[Value], raw_servers: &[Value]) -> SyncResult<CatalogSnapshot> {
    Ok(CatalogSnapshot {
        integrations: parse_records::<RawIntegration, _>("integration", raw_integrations)?,
        servers: parse_records::<RawServer, _>("server", raw_servers)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_every_server_field() {
        let servers = vec![json!({
            "name": "Filesystem",
            "url": "https://www.pulsemcp.com/servers/filesystem",
            "external_url": "https://example.com",
            "short_description": "Files",
            "source_code_url": "https://github.com/example/fs",
            "github_stars": 1200,
            "package_registry": "npm",
            "package_name": "@example/fs",
            "package_download_count": 45000,
            "EXPERIMENTAL_ai_generated_description": "Reads files",
            "integrations": [{"slug": "files", "name": "Files"}, {"slug": "local"}],
            "ignored_field": 3
        })];

        let snapshot = normalize(&[], &servers).unwrap();

        let server = &snapshot.servers[0];
        assert_eq!(server.name, "Filesystem");
        assert_eq!(server.github_stars, Some(1200));
        assert_eq!(server.package_download_count, Some(45000));
        assert_eq!(
            server.experimental_ai_generated_description.as_deref(),
            Some("Reads files")
        );
        assert_eq!(server.integration_slugs, vec!["files", "local"]);
    }

    #[test]
    fn missing_optionals_become_none() {
        let snapshot = normalize(
            &[json!({"name": "Slack", "slug": "slack"})],
            &[json!({"name": "Bare", "url": null})],
        )
        .unwrap();

        assert_eq!(snapshot.integrations[0].url, None);
        let server = &snapshot.servers[0];
        assert_eq!(server.url, None);
        assert_eq!(server.github_stars, None);
        assert!(server.integration_slugs.is_empty());
    }

    #[test]
    fn integral_floats_and_numeric_strings_become_integers() {
        let snapshot = normalize(
            &[],
            &[
                json!({"name": "a", "github_stars": 12.0, "package_download_count": "1200"}),
                json!({"name": "b", "github_stars": " 7 ", "package_download_count": "3.0"}),
            ],
        )
        .unwrap();

        assert_eq!(snapshot.servers[0].github_stars, Some(12));
        assert_eq!(snapshot.servers[0].package_download_count, Some(1200));
        assert_eq!(snapshot.servers[1].github_stars, Some(7));
        assert_eq!(snapshot.servers[1].package_download_count, Some(3));
    }

    #[test]
    fn unusable_counters_are_dropped_without_failing() {
        let snapshot = normalize(
            &[],
            &[
                json!({"name": "a", "github_stars": "lots", "package_download_count": 1.5}),
                json!({"name": "b", "github_stars": [1], "package_download_count": {"n": 2}}),
                json!({"name": "c", "github_stars": true, "package_download_count": 1e300}),
            ],
        )
        .unwrap();

        assert_eq!(snapshot.servers.len(), 3);
        for server in &snapshot.servers {
            assert_eq!(server.github_stars, None, "{}", server.name);
            assert_eq!(server.package_download_count, None, "{}", server.name);
        }
    }

    #[test]
    fn keeps_record_order() {
        let snapshot = normalize(
            &[
                json!({"name": "B", "slug": "b"}),
                json!({"name": "A", "slug": "a"}),
            ],
            &[],
        )
        .unwrap();

        let slugs: Vec<&str> = snapshot.integrations.iter().map(|i| i.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b", "a"]);
    }

    #[test]
    fn does_not_check_slug_existence() {
        let snapshot = normalize(&[], &[json!({"name": "s", "integrations": [{"slug": "ghost"}]})])
            .unwrap();

        assert_eq!(snapshot.servers[0].integration_slugs, vec!["ghost"]);
    }

    #[test]
    fn server_without_name_is_rejected() {
        let err = normalize(&[], &[json!({"name": "ok"}), json!({"url": "x"})]).unwrap_err();

        match err {
            SyncError::InvalidRecord { kind, index, reason } => {
                assert_eq!(kind, "server");
                assert_eq!(index, 1);
                assert!(reason.contains("name"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn non_object_record_is_rejected() {
        let err = normalize(&[json!("slack")], &[]).unwrap_err();

        assert!(matches!(
            err,
            SyncError::InvalidRecord {
                kind: "integration",
                index: 0,
                ..
            }
        ));
    }

    #[test]
    fn integration_ref_without_slug_is_rejected() {
        let err = normalize(&[], &[json!({"name": "s", "integrations": [{"name": "x"}]})])
            .unwrap_err();

        assert!(matches!(err, SyncError::InvalidRecord { kind: "server", .. }));
    }
}
