use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_catalog_mirror::config::{AppConfig, CliConfig, FileConfig};
use mcp_catalog_mirror::mirror_store::{MirrorStore, SqliteMirrorStore};
use mcp_catalog_mirror::server::{self, run_server, RequestsLoggingLevel, ServerConfig};
use mcp_catalog_mirror::sync::{CatalogSync, SyncError, UpstreamClient};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite mirror database file. Defaults to pulsemcp.db.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 7890)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// The maximum age in seconds clients may cache read responses. 0 disables the header.
    #[clap(long, default_value_t = 60)]
    pub content_cache_age_sec: usize,

    /// Number of read-only SQLite connections serving the read API.
    #[clap(long, default_value_t = 4)]
    pub read_pool_size: usize,

    /// Base URL of the upstream catalog API.
    #[clap(long)]
    pub upstream_url: Option<String>,

    /// Run a sync before starting to serve.
    #[clap(long)]
    pub sync_on_startup: bool,

    /// Interval in hours between automatic syncs. Set to 0 to disable.
    #[clap(long, default_value_t = 0)]
    pub sync_interval_hours: u64,

    /// Run a single sync and exit without serving.
    #[clap(long)]
    pub sync_once: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            content_cache_age_sec: self.content_cache_age_sec,
            read_pool_size: self.read_pool_size,
            upstream_url: self.upstream_url.clone(),
            sync_on_startup: self.sync_on_startup,
            sync_interval_hours: self.sync_interval_hours,
        }
    }
}

fn spawn_periodic_sync(sync: CatalogSync, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match sync.run_sync("schedule").await {
                Ok(summary) => info!(
                    "Scheduled sync mirrored {} servers",
                    summary.server_count
                ),
                Err(SyncError::AlreadyRunning) => {
                    warn!("Skipping scheduled sync, another one is running")
                }
                Err(e) => error!("Scheduled sync failed: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening SQLite mirror database at {:?}...", config.db_path);
    let store = Arc::new(SqliteMirrorStore::new(&config.db_path, config.read_pool_size)?);
    let stale = store.mark_stale_sync_runs_failed()?;
    if stale > 0 {
        warn!("Marked {} interrupted sync runs as failed", stale);
    }

    info!("Initializing metrics...");
    server::metrics::init_metrics();
    server::metrics::set_mirrored_items(&store.get_counts()?);

    info!("Upstream catalog at {}", config.upstream.base_url);
    let source = Arc::new(UpstreamClient::new(&config.upstream)?);
    let sync = CatalogSync::new(source, store.clone(), config.upstream.sync_deadline());

    if cli_args.sync_once {
        let summary = sync.run_sync("cli").await?;
        info!(
            "Mirrored {} integrations, {} servers and {} links in {}ms",
            summary.integration_count,
            summary.server_count,
            summary.link_count,
            summary.duration_ms
        );
        return Ok(());
    }

    if config.sync_on_startup {
        // Serving the previous snapshot is fine when the startup sync fails
        if let Err(e) = sync.run_sync("startup").await {
            error!("Startup sync failed: {}", e);
        }
    }

    if let Some(interval) = config.sync_interval() {
        info!(
            "Periodic sync enabled: every {} hours",
            config.sync_interval_hours
        );
        spawn_periodic_sync(sync.clone(), interval);
    }

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level,
        port: config.port,
        metrics_port: config.metrics_port,
        content_cache_age_sec: config.content_cache_age_sec,
    };
    run_server(server_config, store, sync).await
}
