//! SQLite-backed mirror store.
//!
//! One write connection is used by the sync pipeline; reads go through a small
//! round-robin pool of read-only connections. The database runs in WAL mode so
//! readers keep seeing the last committed snapshot while a sync transaction is
//! open.

use super::models::*;
use super::schema::MIRROR_VERSIONED_SCHEMAS;
use super::trait_def::{CatalogWriter, MirrorStore};
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

#[derive(Clone)]
pub struct SqliteMirrorStore {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Vec<Arc<Mutex<Connection>>>,
    read_index: Arc<AtomicUsize>,
}

const SERVER_COLUMNS: &str = "name, url, external_url, short_description, source_code_url,
    github_stars, package_registry, package_name, package_download_count,
    experimental_ai_generated_description";

fn open_schema(conn: &Connection) -> Result<()> {
    let latest_schema = MIRROR_VERSIONED_SCHEMAS
        .last()
        .context("No mirror schema defined")?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;

    if table_count == 0 {
        info!("Creating mirror db schema at version {}", latest_schema.version);
        return latest_schema.create(conn);
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    let schema = MIRROR_VERSIONED_SCHEMAS
        .iter()
        .find(|s| s.version as i64 == db_version)
        .with_context(|| format!("Unknown mirror database version {}", db_version))?;
    if schema.version != latest_schema.version {
        bail!(
            "Mirror database is at version {}, this build expects {}",
            schema.version,
            latest_schema.version
        );
    }
    schema
        .validate(conn)
        .with_context(|| format!("Mirror schema validation failed for version {}", db_version))
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    // A panic while holding the lock drops any open transaction, which rolls
    // it back, so the connection itself is still usable.
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Row counts of the catalog tables as seen by `conn`.
pub fn count_catalog_rows(conn: &Connection) -> rusqlite::Result<CatalogCounts> {
    let count = |table: &str| -> rusqlite::Result<usize> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get::<_, i64>(0)
        })
        .map(|n| n as usize)
    };
    Ok(CatalogCounts {
        integrations: count("integrations")?,
        servers: count("servers")?,
        links: count("server_integrations")?,
    })
}

impl SqliteMirrorStore {
    /// Opens (or creates) the mirror database at `db_path`.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `read_pool_size` - Number of read-only connections serving the read API
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();

        let write_conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open mirror database at {:?}", db_path))?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;

        open_schema(&write_conn)?;

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .context("Failed to open read connection")?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        let store = SqliteMirrorStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        };

        let counts = store.get_counts()?;
        info!(
            "Opened mirror database: {} servers, {} integrations, {} links",
            counts.servers, counts.integrations, counts.links
        );
        Ok(store)
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    /// Parses a server row selected with `SERVER_COLUMNS`, without links.
    fn parse_server_row(row: &Row) -> rusqlite::Result<Server> {
        Ok(Server {
            name: row.get(0)?,
            url: row.get(1)?,
            external_url: row.get(2)?,
            short_description: row.get(3)?,
            source_code_url: row.get(4)?,
            github_stars: row.get(5)?,
            package_registry: row.get(6)?,
            package_name: row.get(7)?,
            package_download_count: row.get(8)?,
            experimental_ai_generated_description: row.get(9)?,
            integration_slugs: Vec::new(),
        })
    }

    fn row_to_sync_run(row: &Row) -> rusqlite::Result<SyncRun> {
        let status_str: String = row.get("status")?;
        let started_at_str: String = row.get("started_at")?;
        let finished_at_str: Option<String> = row.get("finished_at")?;
        let integration_count: Option<i64> = row.get("integration_count")?;
        let server_count: Option<i64> = row.get("server_count")?;

        Ok(SyncRun {
            id: row.get("id")?,
            started_at: Self::parse_datetime(&started_at_str).unwrap_or_else(Utc::now),
            finished_at: finished_at_str.as_deref().and_then(Self::parse_datetime),
            status: SyncRunStatus::parse(&status_str).unwrap_or(SyncRunStatus::Failed),
            integration_count: integration_count.map(|n| n as usize),
            server_count: server_count.map(|n| n as usize),
            error_message: row.get("error_message")?,
            triggered_by: row.get("triggered_by")?,
        })
    }
}

impl MirrorStore for SqliteMirrorStore {
    fn list_integrations(&self) -> Result<Vec<Integration>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);

        let mut stmt =
            conn.prepare_cached("SELECT slug, name, url FROM integrations ORDER BY slug")?;
        let integrations = stmt
            .query_map([], |row| {
                Ok(Integration {
                    slug: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(integrations)
    }

    fn list_servers(&self, offset: usize, limit: usize) -> Result<ServersPage> {
        let read_conn = self.get_read_conn();
        let mut conn = lock(&read_conn);
        // Count, window and links must come from the same snapshot.
        let tx = conn.transaction()?;

        let total: i64 = tx.query_row("SELECT COUNT(*) FROM servers", [], |r| r.get(0))?;

        let mut servers = {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {} FROM servers ORDER BY name LIMIT ?1 OFFSET ?2",
                SERVER_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![to_sql_int(limit), to_sql_int(offset)],
                    Self::parse_server_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut links: HashMap<String, Vec<String>> = HashMap::new();
        {
            let mut stmt = tx.prepare_cached(
                "SELECT si.server_name, si.integration_slug
                 FROM server_integrations si
                 JOIN (SELECT name FROM servers ORDER BY name LIMIT ?1 OFFSET ?2) w
                   ON w.name = si.server_name
                 ORDER BY si.integration_slug",
            )?;
            let mut rows = stmt.query(params![to_sql_int(limit), to_sql_int(offset)])?;
            while let Some(row) = rows.next()? {
                links.entry(row.get(0)?).or_default().push(row.get(1)?);
            }
        }
        tx.finish()?;

        for server in servers.iter_mut() {
            server.integration_slugs = links.remove(&server.name).unwrap_or_default();
        }

        Ok(ServersPage {
            servers,
            total: total as usize,
        })
    }

    fn get_server(&self, name: &str) -> Result<Option<Server>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM servers WHERE name = ?1",
            SERVER_COLUMNS
        ))?;
        let mut server = match stmt
            .query_row(params![name], Self::parse_server_row)
            .optional()?
        {
            Some(server) => server,
            None => return Ok(None),
        };

        let mut stmt = conn.prepare_cached(
            "SELECT integration_slug FROM server_integrations
             WHERE server_name = ?1 ORDER BY integration_slug",
        )?;
        server.integration_slugs = stmt
            .query_map(params![name], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(server))
    }

    fn get_counts(&self) -> Result<CatalogCounts> {
        let read_conn = self.get_read_conn();
        let mut conn = lock(&read_conn);
        let tx = conn.transaction()?;
        let counts = count_catalog_rows(&*tx)?;
        tx.finish()?;
        Ok(counts)
    }

    fn replace_catalog(&self, writer: CatalogWriter<'_>) -> rusqlite::Result<CatalogCounts> {
        let mut conn = lock(&self.write_conn);
        let tx = conn.transaction()?;
        // Dropping `tx` on the error path rolls everything back.
        let counts = writer(&*tx)?;
        tx.commit()?;
        Ok(counts)
    }

    fn record_sync_start(&self, triggered_by: &str) -> Result<i64> {
        let conn = lock(&self.write_conn);
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "INSERT INTO sync_runs (started_at, status, triggered_by) VALUES (?1, ?2, ?3)",
            params![now, SyncRunStatus::Running.as_str(), triggered_by],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_sync_finish(
        &self,
        run_id: i64,
        status: SyncRunStatus,
        counts: Option<CatalogCounts>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = lock(&self.write_conn);
        let now = Self::format_datetime(&Utc::now());

        let updated = conn.execute(
            "UPDATE sync_runs
             SET finished_at = ?1, status = ?2, integration_count = ?3, server_count = ?4,
                 error_message = ?5
             WHERE id = ?6",
            params![
                now,
                status.as_str(),
                counts.map(|c| to_sql_int(c.integrations)),
                counts.map(|c| to_sql_int(c.servers)),
                error_message,
                run_id
            ],
        )?;
        if updated == 0 {
            bail!("Sync run {} not found", run_id);
        }
        Ok(())
    }

    fn get_last_sync_run(&self) -> Result<Option<SyncRun>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        let mut stmt = conn.prepare_cached(
            "SELECT id, started_at, finished_at, status, integration_count, server_count,
                    error_message, triggered_by
             FROM sync_runs ORDER BY id DESC LIMIT 1",
        )?;
        let run = stmt.query_row([], Self::row_to_sync_run).optional()?;
        Ok(run)
    }

    fn mark_stale_sync_runs_failed(&self) -> Result<usize> {
        let conn = lock(&self.write_conn);
        let now = Self::format_datetime(&Utc::now());

        let count = conn.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = ?2, error_message = ?3
             WHERE status = ?4",
            params![
                SyncRunStatus::Failed.as_str(),
                now,
                "Sync was interrupted (server restart)",
                SyncRunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }
}
