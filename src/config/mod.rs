mod file_config;

pub use file_config::{FileConfig, UpstreamConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.pulsemcp.com/v0beta";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub read_pool_size: usize,
    pub upstream_url: Option<String>,
    pub sync_on_startup: bool,
    pub sync_interval_hours: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub read_pool_size: usize,
    pub sync_on_startup: bool,
    /// 0 disables periodic syncs.
    pub sync_interval_hours: u64,

    pub upstream: UpstreamSettings,
}

/// How the upstream catalog API is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub servers_page_size: usize,
    pub page_delay_ms: u64,
    pub request_timeout_sec: u64,
    pub sync_deadline_sec: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            servers_page_size: 5000,
            page_delay_ms: 200,
            request_timeout_sec: 30,
            sync_deadline_sec: 600,
        }
    }
}

impl UpstreamSettings {
    pub fn sync_deadline(&self) -> Duration {
        Duration::from_secs(self.sync_deadline_sec)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from("pulsemcp.db"));

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port && port != 0 {
            bail!("port and metrics_port must differ, both are {}", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let content_cache_age_sec = file
            .content_cache_age_sec
            .unwrap_or(cli.content_cache_age_sec);

        let read_pool_size = file.read_pool_size.unwrap_or(cli.read_pool_size);
        if read_pool_size == 0 {
            bail!("read_pool_size must be at least 1");
        }

        let sync_on_startup = file.sync_on_startup.unwrap_or(cli.sync_on_startup);
        let sync_interval_hours = file
            .sync_interval_hours
            .unwrap_or(cli.sync_interval_hours);

        // Upstream settings - merge [upstream] section with defaults
        let defaults = UpstreamSettings::default();
        let up_file = file.upstream.unwrap_or_default();
        let upstream = UpstreamSettings {
            base_url: up_file
                .base_url
                .or_else(|| cli.upstream_url.clone())
                .unwrap_or(defaults.base_url),
            servers_page_size: up_file
                .servers_page_size
                .unwrap_or(defaults.servers_page_size),
            page_delay_ms: up_file.page_delay_ms.unwrap_or(defaults.page_delay_ms),
            request_timeout_sec: up_file
                .request_timeout_sec
                .unwrap_or(defaults.request_timeout_sec),
            sync_deadline_sec: up_file
                .sync_deadline_sec
                .unwrap_or(defaults.sync_deadline_sec),
        };

        if upstream.base_url.trim().is_empty() {
            bail!("upstream base_url must not be empty");
        }
        if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://")
        {
            bail!("upstream base_url must be an http(s) URL: {}", upstream.base_url);
        }
        if upstream.servers_page_size == 0 {
            bail!("upstream servers_page_size must be greater than 0");
        }
        if upstream.request_timeout_sec == 0 {
            bail!("upstream request_timeout_sec must be greater than 0");
        }
        if upstream.sync_deadline_sec == 0 {
            bail!("upstream sync_deadline_sec must be greater than 0");
        }

        Ok(Self {
            db_path,
            port,
            metrics_port,
            logging_level,
            content_cache_age_sec,
            read_pool_size,
            sync_on_startup,
            sync_interval_hours,
            upstream,
        })
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        match self.sync_interval_hours {
            0 => None,
            hours => Some(Duration::from_secs(hours * 3600)),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_cli(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: Some(dir.path().join("mirror.db")),
            port: 7890,
            metrics_port: 9091,
            read_pool_size: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("body"),
            Some(RequestsLoggingLevel::Body)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            logging_level: RequestsLoggingLevel::Headers,
            upstream_url: Some("http://localhost:3002/v0beta".to_string()),
            sync_on_startup: true,
            sync_interval_hours: 24,
            ..base_cli(&temp_dir)
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("mirror.db"));
        assert_eq!(config.port, 7890);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.read_pool_size, 4);
        assert!(config.sync_on_startup);
        assert_eq!(config.sync_interval(), Some(Duration::from_secs(24 * 3600)));
        assert_eq!(config.upstream.base_url, "http://localhost:3002/v0beta");
        assert_eq!(config.upstream.servers_page_size, 5000);
        assert_eq!(config.upstream.page_delay_ms, 200);
        assert_eq!(config.upstream.sync_deadline(), Duration::from_secs(600));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            upstream_url: Some("http://cli-upstream".to_string()),
            ..base_cli(&temp_dir)
        };
        let file_config = FileConfig {
            port: Some(4000),
            logging_level: Some("body".to_string()),
            sync_interval_hours: Some(0),
            upstream: Some(UpstreamConfig {
                base_url: Some("http://toml-upstream".to_string()),
                servers_page_size: Some(50),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.sync_interval(), None);
        assert_eq!(config.upstream.base_url, "http://toml-upstream");
        assert_eq!(config.upstream.servers_page_size, 50);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.upstream.request_timeout_sec, 30);
    }

    #[test]
    fn test_resolve_defaults_db_path() {
        let cli = CliConfig {
            port: 7890,
            metrics_port: 9091,
            read_pool_size: 1,
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, PathBuf::from("pulsemcp.db"));
        assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_URL);
    }

    #[test]
    fn test_resolve_missing_db_directory_error() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/nonexistent/path/mirror.db")),
            ..base_cli(&TempDir::new().unwrap())
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_db_path_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().to_path_buf()),
            ..base_cli(&temp_dir)
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn test_resolve_rejects_zero_page_size() {
        let temp_dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            upstream: Some(UpstreamConfig {
                servers_page_size: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&base_cli(&temp_dir), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("servers_page_size"));
    }

    #[test]
    fn test_resolve_rejects_empty_base_url() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            upstream_url: Some("  ".to_string()),
            ..base_cli(&temp_dir)
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_resolve_rejects_same_ports() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            metrics_port: 7890,
            ..base_cli(&temp_dir)
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }
}
