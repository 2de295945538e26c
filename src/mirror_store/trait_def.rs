//! MirrorStore trait definition.

use super::models::{
    CatalogCounts, Integration, Server, ServersPage, SyncRun, SyncRunStatus,
};
use anyhow::Result;
use rusqlite::Connection;

/// Callback that writes a whole catalog snapshot through the given connection.
pub type CatalogWriter<'a> = &'a mut dyn FnMut(&Connection) -> rusqlite::Result<CatalogCounts>;

/// Storage backend of the mirror.
///
/// Reads may run concurrently with a sync; they observe either the previous
/// or the new snapshot, never a partially written one.
pub trait MirrorStore: Send + Sync {
    // =========================================================================
    // Catalog Reads
    // =========================================================================

    /// All integrations ordered by slug.
    fn list_integrations(&self) -> Result<Vec<Integration>>;

    /// A window of servers ordered by name, each with its integration slugs,
    /// together with the total number of servers.
    fn list_servers(&self, offset: usize, limit: usize) -> Result<ServersPage>;

    fn get_server(&self, name: &str) -> Result<Option<Server>>;

    fn get_counts(&self) -> Result<CatalogCounts>;

    // =========================================================================
    // Catalog Writes
    // =========================================================================

    /// Runs `writer` inside a single write transaction and commits only if it
    /// succeeds. Any error rolls the whole transaction back.
    fn replace_catalog(&self, writer: CatalogWriter<'_>) -> rusqlite::Result<CatalogCounts>;

    // =========================================================================
    // Sync History
    // =========================================================================

    /// Records the start of a sync run. Returns the run id.
    fn record_sync_start(&self, triggered_by: &str) -> Result<i64>;

    fn record_sync_finish(
        &self,
        run_id: i64,
        status: SyncRunStatus,
        counts: Option<CatalogCounts>,
        error_message: Option<&str>,
    ) -> Result<()>;

    fn get_last_sync_run(&self) -> Result<Option<SyncRun>>;

    /// Marks runs left in `running` state by a previous process as failed.
    fn mark_stale_sync_runs_failed(&self) -> Result<usize>;
}
