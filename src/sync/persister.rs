//! Writes a normalized catalog snapshot into the store.
//!
//! Everything here runs against a single open transaction: the catalog tables
//! are dropped and rebuilt, integrations are merged, then servers and their
//! links. Committing (or dropping the transaction to roll back) is left to the
//! caller that owns the transaction.

use super::error::{SyncError, SyncResult};
use crate::mirror_store::{
    count_catalog_rows, CatalogCounts, CatalogSnapshot, Integration, MirrorStore, Server,
    CATALOG_TABLES,
};
use rusqlite::{params, Connection};
use tracing::debug;

/// Drops and recreates the catalog tables. Sync history is left untouched.
pub fn reset_catalog_tables(conn: &Connection) -> rusqlite::Result<()> {
    for table in CATALOG_TABLES.iter().rev() {
        table.drop_if_exists(conn)?;
    }
    for table in CATALOG_TABLES {
        table.create(conn)?;
    }
    Ok(())
}

/// Inserts the integration, or overwrites the non-key fields of the row that
/// already has its slug.
pub fn merge_integration(conn: &Connection, integration: &Integration) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO integrations (slug, name, url) VALUES (?1, ?2, ?3)
         ON CONFLICT(slug) DO UPDATE SET name = excluded.name, url = excluded.url",
    )?;
    stmt.execute(params![integration.slug, integration.name, integration.url])?;
    Ok(())
}

/// Inserts the server or overwrites the row with the same name, then replaces
/// its integration links with exactly the ones carried by `server`.
pub fn merge_server(conn: &Connection, server: &Server) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO servers (
            name, url, external_url, short_description, source_code_url, github_stars,
            package_registry, package_name, package_download_count,
            experimental_ai_generated_description
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(name) DO UPDATE SET
            url = excluded.url,
            external_url = excluded.external_url,
            short_description = excluded.short_description,
            source_code_url = excluded.source_code_url,
            github_stars = excluded.github_stars,
            package_registry = excluded.package_registry,
            package_name = excluded.package_name,
            package_download_count = excluded.package_download_count,
            experimental_ai_generated_description = excluded.experimental_ai_generated_description",
    )?;
    stmt.execute(params![
        server.name,
        server.url,
        server.external_url,
        server.short_description,
        server.source_code_url,
        server.github_stars,
        server.package_registry,
        server.package_name,
        server.package_download_count,
        server.experimental_ai_generated_description,
    ])?;

    set_server_integrations(conn, &server.name, &server.integration_slugs)
}

/// Replaces the link set of a server. Links to unknown slugs violate the
/// foreign key and fail the statement.
pub fn set_server_integrations(
    conn: &Connection,
    server_name: &str,
    slugs: &[String],
) -> rusqlite::Result<()> {
    conn.prepare_cached("DELETE FROM server_integrations WHERE server_name = ?1")?
        .execute(params![server_name])?;

    // OR IGNORE only covers the primary key: repeated slugs collapse, foreign
    // key violations still abort.
    let mut insert = conn.prepare_cached(
        "INSERT OR IGNORE INTO server_integrations (server_name, integration_slug)
         VALUES (?1, ?2)",
    )?;
    for slug in slugs {
        insert.execute(params![server_name, slug])?;
    }
    Ok(())
}

/// Rebuilds the catalog tables from `snapshot`.
///
/// Must run inside a transaction: on error nothing written here may become
/// visible, so the caller drops the transaction instead of committing it.
pub fn persist(conn: &Connection, snapshot: &CatalogSnapshot) -> rusqlite::Result<CatalogCounts> {
    reset_catalog_tables(conn)?;

    for integration in &snapshot.integrations {
        merge_integration(conn, integration)?;
    }
    debug!("Merged {} integration records", snapshot.integrations.len());

    for server in &snapshot.servers {
        merge_server(conn, server)?;
    }
    debug!("Merged {} server records", snapshot.servers.len());

    count_catalog_rows(conn)
}

/// Swaps the stored catalog for `snapshot` in one write transaction.
pub fn persist_snapshot(
    store: &dyn MirrorStore,
    snapshot: &CatalogSnapshot,
) -> SyncResult<CatalogCounts> {
    store
        .replace_catalog(&mut |conn| persist(conn, snapshot))
        .map_err(SyncError::Store)
}
