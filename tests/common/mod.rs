//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{integration, server_record, MockUpstream, TestClient, TestServer};
//!
//! #[tokio::test]
//! async fn test_download() {
//!     let upstream = MockUpstream::start().await;
//!     upstream
//!         .serve_catalog(&[integration("github")], &[server_record("alpha", &["github"])], 10)
//!         .await;
//!     let server = TestServer::spawn(&upstream.uri(), 10).await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.download().await;
//!     assert!(response.status().is_success());
//! }
//! ```

mod client;
mod constants;
mod server;
mod upstream;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
pub use server::TestServer;
pub use upstream::{integration, server_record, MockUpstream};
