use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Catalog Entities
// =============================================================================

/// An integration tag (e.g. "github", "slack") that servers can be linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub name: String,
    pub slug: String,
    pub url: Option<String>,
}

/// A mirrored catalog server with the slugs of the integrations it links to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub short_description: Option<String>,
    pub source_code_url: Option<String>,
    pub github_stars: Option<i64>,
    pub package_registry: Option<String>,
    pub package_name: Option<String>,
    pub package_download_count: Option<i64>,
    #[serde(rename = "EXPERIMENTAL_ai_generated_description")]
    pub experimental_ai_generated_description: Option<String>,
    pub integration_slugs: Vec<String>,
}

/// Everything one sync epoch writes to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub integrations: Vec<Integration>,
    pub servers: Vec<Server>,
}

/// Row counts of the catalog tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub integrations: usize,
    pub servers: usize,
    pub links: usize,
}

/// A window over the servers table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServersPage {
    pub servers: Vec<Server>,
    pub total: usize,
}

// =============================================================================
// Sync Runs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Succeeded,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Running => "running",
            SyncRunStatus::Succeeded => "succeeded",
            SyncRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SyncRunStatus::Running),
            "succeeded" => Some(SyncRunStatus::Succeeded),
            "failed" => Some(SyncRunStatus::Failed),
            _ => None,
        }
    }
}

/// One recorded sync attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SyncRunStatus,
    pub integration_count: Option<usize>,
    pub server_count: Option<usize>,
    pub error_message: Option<String>,
    pub triggered_by: String,
}
