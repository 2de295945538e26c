use anyhow::{Context, Result};
use std::time::{Duration, Instant};

use tracing::{error, info};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{http_cache, log_requests, metrics::metrics_handler, state::*, ServerConfig};
use crate::mirror_store::{Server, SyncRun};
use crate::sync::{CatalogSync, SyncError, SyncStage, SyncSummary};

const DEFAULT_COUNT_PER_PAGE: usize = 500;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub integrations: usize,
    pub servers: usize,
    pub links: usize,
    pub sync_stage: SyncStage,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            SyncError::Upstream { .. }
            | SyncError::Transport(_)
            | SyncError::InvalidPayload(_)
            | SyncError::InvalidRecord { .. } => StatusCode::BAD_GATEWAY,
            SyncError::Store(_) | SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SyncError::AlreadyRunning => StatusCode::CONFLICT,
        };
        let (status, body) = match &self {
            SyncError::Upstream { status, body } => (Some(*status), Some(body.clone())),
            _ => (None, None),
        };
        let payload = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            status,
            body,
        };
        (status_code, Json(payload)).into_response()
    }
}

fn store_error(err: anyhow::Error) -> Response {
    error!("Store read failed: {:#}", err);
    let payload = ErrorBody {
        error: "store",
        message: format!("{:#}", err),
        status: None,
        body: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}

#[derive(Serialize)]
struct IntegrationRef {
    slug: String,
}

/// Read API shape of a server: links are reported as integration objects.
#[derive(Serialize)]
struct ServerResponse {
    name: String,
    url: Option<String>,
    external_url: Option<String>,
    short_description: Option<String>,
    source_code_url: Option<String>,
    github_stars: Option<i64>,
    package_registry: Option<String>,
    package_name: Option<String>,
    package_download_count: Option<i64>,
    #[serde(rename = "EXPERIMENTAL_ai_generated_description")]
    experimental_ai_generated_description: Option<String>,
    integrations: Vec<IntegrationRef>,
}

impl From<Server> for ServerResponse {
    fn from(server: Server) -> Self {
        ServerResponse {
            name: server.name,
            url: server.url,
            external_url: server.external_url,
            short_description: server.short_description,
            source_code_url: server.source_code_url,
            github_stars: server.github_stars,
            package_registry: server.package_registry,
            package_name: server.package_name,
            package_download_count: server.package_download_count,
            experimental_ai_generated_description: server.experimental_ai_generated_description,
            integrations: server
                .integration_slugs
                .into_iter()
                .map(|slug| IntegrationRef { slug })
                .collect(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ServersQuery {
    offset: Option<usize>,
    count_per_page: Option<usize>,
}

#[derive(Serialize)]
struct ServersPageResponse {
    servers: Vec<ServerResponse>,
    next: bool,
    total: usize,
}

#[derive(Serialize)]
struct DownloadResponse {
    message: String,
    #[serde(flatten)]
    summary: SyncSummary,
}

#[derive(Serialize)]
struct SyncStatusResponse {
    stage: SyncStage,
    last_summary: Option<SyncSummary>,
    last_error: Option<String>,
    last_run: Option<SyncRun>,
}

async fn home(State(state): State<ServerState>) -> Response {
    let counts = match state.store.get_counts() {
        Ok(counts) => counts,
        Err(err) => return store_error(err),
    };
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        integrations: counts.integrations,
        servers: counts.servers,
        links: counts.links,
        sync_stage: state.sync.status().stage,
    })
    .into_response()
}

async fn post_download(State(sync): State<CatalogSync>) -> Response {
    match sync.run_sync("http").await {
        Ok(summary) => Json(DownloadResponse {
            message: format!(
                "Mirrored {} servers and {} integrations",
                summary.server_count, summary.integration_count
            ),
            summary,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_sync_status(
    State(sync): State<CatalogSync>,
    State(store): State<GuardedMirrorStore>,
) -> Response {
    let last_run = match store.get_last_sync_run() {
        Ok(run) => run,
        Err(err) => return store_error(err),
    };
    let status = sync.status();
    Json(SyncStatusResponse {
        stage: status.stage,
        last_summary: status.last_summary,
        last_error: status.last_error,
        last_run,
    })
    .into_response()
}

async fn get_integrations(State(store): State<GuardedMirrorStore>) -> Response {
    match store.list_integrations() {
        Ok(integrations) => Json(integrations).into_response(),
        Err(err) => store_error(err),
    }
}

async fn get_servers(
    State(store): State<GuardedMirrorStore>,
    Query(query): Query<ServersQuery>,
) -> Response {
    let offset = query.offset.unwrap_or(0);
    let count_per_page = query.count_per_page.unwrap_or(DEFAULT_COUNT_PER_PAGE);

    let page = match store.list_servers(offset, count_per_page) {
        Ok(page) => page,
        Err(err) => return store_error(err),
    };
    let next = offset.saturating_add(count_per_page) < page.total;
    Json(ServersPageResponse {
        servers: page.servers.into_iter().map(ServerResponse::from).collect(),
        next,
        total: page.total,
    })
    .into_response()
}

async fn get_server(State(store): State<GuardedMirrorStore>, Path(name): Path<String>) -> Response {
    match store.get_server(&name) {
        Ok(Some(server)) => Json(ServerResponse::from(server)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => store_error(err),
    }
}

impl ServerState {
    fn new(config: ServerConfig, store: GuardedMirrorStore, sync: CatalogSync) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            store,
            sync,
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    store: GuardedMirrorStore,
    sync: CatalogSync,
) -> Result<Router> {
    let state = ServerState::new(config.clone(), store, sync);

    let mut read_routes: Router = Router::new()
        .route("/integrations", get(get_integrations))
        .route("/servers", get(get_servers))
        .route("/servers/{name}", get(get_server))
        .with_state(state.clone());
    if config.content_cache_age_sec > 0 {
        read_routes = read_routes.layer(middleware::from_fn_with_state(
            config.content_cache_age_sec,
            http_cache,
        ));
    }

    let sync_routes: Router = Router::new()
        .route("/download", post(post_download))
        .route("/sync/status", get(get_sync_status))
        .with_state(state.clone());

    let app: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .merge(read_routes)
        .merge(sync_routes)
        .layer(middleware::from_fn_with_state(state, log_requests));

    Ok(app)
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_server(
    config: ServerConfig,
    store: GuardedMirrorStore,
    sync: CatalogSync,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, store, sync)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    tokio::try_join!(
        async { axum::serve(listener, app).await.context("Server failed") },
        async {
            axum::serve(metrics_listener, make_metrics_app())
                .await
                .context("Metrics server failed")
        },
    )?;
    Ok(())
}
