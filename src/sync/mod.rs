mod error;
mod fetcher;
mod normalizer;
mod orchestrator;
pub mod persister;

pub use error::{SyncError, SyncResult};
pub use fetcher::{has_next, CatalogSource, UpstreamClient};
pub use normalizer::normalize;
pub use orchestrator::{CatalogSync, SyncStage, SyncStatus, SyncSummary};
pub use persister::persist_snapshot;
