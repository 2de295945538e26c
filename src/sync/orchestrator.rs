//! Runs fetch, normalize and persist as one guarded sync.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use super::error::{SyncError, SyncResult};
use super::fetcher::CatalogSource;
use super::normalizer::normalize;
use super::persister::persist_snapshot;
use crate::mirror_store::{CatalogCounts, MirrorStore, SyncRunStatus};
use crate::server::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Idle,
    Fetching,
    Normalizing,
    Persisting,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub integration_count: usize,
    pub server_count: usize,
    pub link_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub stage: SyncStage,
    pub last_summary: Option<SyncSummary>,
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            stage: SyncStage::Idle,
            last_summary: None,
            last_error: None,
        }
    }
}

/// Entry point of the sync pipeline. Cheap to clone, clones share the guard
/// and the status.
#[derive(Clone)]
pub struct CatalogSync {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn MirrorStore>,
    sync_deadline: Duration,
    guard: Arc<Mutex<()>>,
    status: Arc<RwLock<SyncStatus>>,
}

impl CatalogSync {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn MirrorStore>,
        sync_deadline: Duration,
    ) -> Self {
        Self {
            source,
            store,
            sync_deadline,
            guard: Arc::new(Mutex::new(())),
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Replaces the mirrored catalog with a fresh copy of the upstream one.
    ///
    /// Fails with [`SyncError::AlreadyRunning`] without waiting when another
    /// sync holds the guard. The pipeline runs in its own task, so dropping
    /// the returned future does not interrupt a started sync.
    pub async fn run_sync(&self, triggered_by: &str) -> SyncResult<SyncSummary> {
        let guard = match self.guard.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Sync requested by {} while another is running", triggered_by);
                metrics::record_sync_run("rejected", Duration::ZERO);
                return Err(SyncError::AlreadyRunning);
            }
        };

        let started = Instant::now();
        info!("Starting catalog sync (triggered by {})", triggered_by);
        let run_id = match self.store.record_sync_start(triggered_by) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to record sync start: {:#}", e);
                None
            }
        };

        let this = self.clone();
        match tokio::spawn(async move { this.run_guarded(guard, started, run_id).await }).await {
            Ok(result) => result,
            Err(e) => {
                let err = SyncError::Internal(e.to_string());
                error!("Sync task aborted: {}", err);
                self.finish_failed(&err);
                metrics::record_sync_run("failed", started.elapsed());
                self.record_finish(run_id, SyncRunStatus::Failed, None, Some(&err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_guarded(
        &self,
        _guard: OwnedMutexGuard<()>,
        started: Instant,
        run_id: Option<i64>,
    ) -> SyncResult<SyncSummary> {
        let result = self.run_stages(started).await;

        let (run_status, counts, error_message) = match &result {
            Ok(summary) => {
                info!(
                    "Catalog sync done in {}ms: {} integrations, {} servers, {} links",
                    summary.duration_ms,
                    summary.integration_count,
                    summary.server_count,
                    summary.link_count
                );
                self.update_status(|status| {
                    status.stage = SyncStage::Done;
                    status.last_summary = Some(summary.clone());
                    status.last_error = None;
                });
                metrics::record_sync_run("succeeded", started.elapsed());
                let counts = CatalogCounts {
                    integrations: summary.integration_count,
                    servers: summary.server_count,
                    links: summary.link_count,
                };
                metrics::set_mirrored_items(&counts);
                (SyncRunStatus::Succeeded, Some(counts), None)
            }
            Err(e) => {
                error!("Catalog sync failed after {:?}: {}", started.elapsed(), e);
                self.finish_failed(e);
                metrics::record_sync_run("failed", started.elapsed());
                (SyncRunStatus::Failed, None, Some(e.to_string()))
            }
        };

        self.record_finish(run_id, run_status, counts, error_message.as_deref());
        result
    }

    /// Closes the history row of a run. Bookkeeping failures are only logged.
    fn record_finish(
        &self,
        run_id: Option<i64>,
        status: SyncRunStatus,
        counts: Option<CatalogCounts>,
        error_message: Option<&str>,
    ) {
        let Some(run_id) = run_id else {
            return;
        };
        if let Err(e) = self
            .store
            .record_sync_finish(run_id, status, counts, error_message)
        {
            error!("Failed to record sync run {} result: {:#}", run_id, e);
        }
    }

    async fn run_stages(&self, started: Instant) -> SyncResult<SyncSummary> {
        self.enter_stage(SyncStage::Fetching);
        let stage_started = Instant::now();
        let (raw_integrations, raw_servers) = tokio::time::timeout(self.sync_deadline, async {
            let integrations = self.source.fetch_integrations().await?;
            let servers = self.source.fetch_servers().await?;
            Ok::<_, SyncError>((integrations, servers))
        })
        .await
        .map_err(|_| SyncError::Timeout(self.sync_deadline))??;
        info!(
            "Fetched {} integration and {} server records in {:?}",
            raw_integrations.len(),
            raw_servers.len(),
            stage_started.elapsed()
        );

        self.enter_stage(SyncStage::Normalizing);
        let snapshot = normalize(&raw_integrations, &raw_servers)?;
        drop(raw_integrations);
        drop(raw_servers);

        self.enter_stage(SyncStage::Persisting);
        let stage_started = Instant::now();
        let store = self.store.clone();
        let counts = tokio::task::spawn_blocking(move || persist_snapshot(store.as_ref(), &snapshot))
            .await
            .map_err(|e| SyncError::Internal(e.to_string()))??;
        info!("Persisted catalog in {:?}", stage_started.elapsed());

        Ok(SyncSummary {
            integration_count: counts.integrations,
            server_count: counts.servers,
            link_count: counts.links,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn enter_stage(&self, stage: SyncStage) {
        info!("Sync stage: {:?}", stage);
        self.update_status(|status| status.stage = stage);
    }

    fn finish_failed(&self, err: &SyncError) {
        self.update_status(|status| {
            status.stage = SyncStage::Failed;
            status.last_error = Some(err.to_string());
        });
    }

    fn update_status<F: FnOnce(&mut SyncStatus)>(&self, f: F) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}
