//! MCP Catalog Mirror Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod mirror_store;
pub mod server;
pub mod sqlite_persistence;
pub mod sync;

// Re-export commonly used types for convenience
pub use mirror_store::{MirrorStore, SqliteMirrorStore};
pub use server::{run_server, RequestsLoggingLevel};
pub use sync::{CatalogSync, SyncError, UpstreamClient};
