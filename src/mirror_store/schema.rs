//! SQLite schema of the mirror database.
//!
//! The three catalog tables are rebuilt from scratch by every sync, while
//! `sync_runs` keeps the history of sync attempts across refreshes.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

// =============================================================================
// Catalog Tables
// =============================================================================

const INTEGRATIONS_TABLE: Table = Table {
    name: "integrations",
    columns: &[
        sqlite_column!("slug", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text),
    ],
    primary_key: &[],
    indices: &[],
};

const SERVERS_TABLE: Table = Table {
    name: "servers",
    columns: &[
        sqlite_column!("name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("url", &SqlType::Text),
        sqlite_column!("external_url", &SqlType::Text),
        sqlite_column!("short_description", &SqlType::Text),
        sqlite_column!("source_code_url", &SqlType::Text),
        sqlite_column!("github_stars", &SqlType::Integer),
        sqlite_column!("package_registry", &SqlType::Text),
        sqlite_column!("package_name", &SqlType::Text),
        sqlite_column!("package_download_count", &SqlType::Integer),
        sqlite_column!("experimental_ai_generated_description", &SqlType::Text),
    ],
    primary_key: &[],
    indices: &[],
};

const SERVER_FK: ForeignKey = ForeignKey {
    foreign_table: "servers",
    foreign_column: "name",
    on_delete: ForeignKeyOnChange::Cascade,
};

const INTEGRATION_FK: ForeignKey = ForeignKey {
    foreign_table: "integrations",
    foreign_column: "slug",
    on_delete: ForeignKeyOnChange::Cascade,
};

const SERVER_INTEGRATIONS_TABLE: Table = Table {
    name: "server_integrations",
    columns: &[
        sqlite_column!(
            "server_name",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SERVER_FK)
        ),
        sqlite_column!(
            "integration_slug",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&INTEGRATION_FK)
        ),
    ],
    primary_key: &["server_name", "integration_slug"],
    indices: &[(
        "idx_server_integrations_slug",
        "integration_slug",
    )],
};

// =============================================================================
// Sync History
// =============================================================================

const SYNC_RUNS_TABLE: Table = Table {
    name: "sync_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("integration_count", &SqlType::Integer),
        sqlite_column!("server_count", &SqlType::Integer),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
    ],
    primary_key: &[],
    indices: &[("idx_sync_runs_started", "started_at DESC")],
};

/// Catalog tables in creation order: parents before the link table.
pub const CATALOG_TABLES: &[Table] = &[
    INTEGRATIONS_TABLE,
    SERVERS_TABLE,
    SERVER_INTEGRATIONS_TABLE,
];

pub const MIRROR_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        INTEGRATIONS_TABLE,
        SERVERS_TABLE,
        SERVER_INTEGRATIONS_TABLE,
        SYNC_RUNS_TABLE,
    ],
}];
